pub mod discounts;
pub mod fee_types;
pub mod installments;
pub mod payments;
pub mod reports;
pub mod schedules;
pub mod structures;

pub use discounts::{
    ApplyDiscountRequest, ApproveDiscountRequest, CreateDiscountCategoryRequest,
    DiscountCategoryResponse, DiscountRowRequest,
};
pub use fee_types::{CreateFeeTypeRequest, FeeTypeResponse};
pub use installments::{
    InstallmentListParams, InstallmentResponse, SweepRequest, SweepResponse,
    UpdateInstallmentRequest,
};
pub use payments::{
    CancelReceiptRequest, CreateDonorRequest, DonorResponse, PaymentItemRequest,
    ReceiptListParams, ReceiptResponse, RecordPaymentRequest,
};
pub use reports::{
    CollectionBucket, CollectionParams, CollectionSummary, DuesReport, DuesReportParams,
    StudentDues,
};
pub use schedules::{CreateFeeScheduleRequest, FeeScheduleResponse, UpdateFeeScheduleRequest};
pub use structures::{
    CreateFeeStructureRequest, FeeRowRequest, FeeStructureResponse, ScheduledEntryRequest,
    StructureAuditResponse, UpdateFeeStructureRequest,
};

use rust_decimal::Decimal;
use validator::ValidationError;

pub(crate) fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("positive_amount"))
    }
}

pub(crate) fn non_negative_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value >= Decimal::ZERO {
        Ok(())
    } else {
        Err(ValidationError::new("non_negative_amount"))
    }
}
