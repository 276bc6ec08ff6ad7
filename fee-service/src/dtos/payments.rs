use crate::models::{
    AcademicYearSnapshot, Cancellation, Donation, Donor, FeeReceipt, PaymentMethod,
    ReceiptCategory, ReceiptItem, ReceiptStatus, SchoolSnapshot, StudentSnapshot,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PaymentItemRequest {
    #[validate(length(min = 1, message = "installment_id is required"))]
    pub installment_id: String,
    #[validate(custom(function = "super::positive_amount"))]
    pub paid_amount: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(length(min = 1, message = "student_id is required"))]
    pub student_id: String,
    #[serde(default)]
    pub category: ReceiptCategory,
    #[validate(length(min = 1, message = "At least one item is required"), nested)]
    pub items: Vec<PaymentItemRequest>,
    pub payment: PaymentMethod,
    pub remarks: Option<String>,
    pub donor_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CancelReceiptRequest {
    #[validate(length(min = 1, max = 500, message = "A reason of up to 500 characters is required"))]
    pub reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDonorRequest {
    #[validate(length(min = 1, max = 150, message = "Name must be 1-150 characters"))]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReceiptListParams {
    pub student_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub include_cancelled: bool,
}

/// Receipts are addressed by `receipt_id`; `id` is the internal key.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiptResponse {
    pub id: String,
    pub receipt_id: String,
    pub academic_year_id: String,
    pub category: ReceiptCategory,
    pub student: StudentSnapshot,
    pub school: SchoolSnapshot,
    pub academic_year: AcademicYearSnapshot,
    pub items: Vec<ReceiptItem>,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub due_amount: Decimal,
    pub payment: PaymentMethod,
    pub remarks: Option<String>,
    pub donor_id: Option<String>,
    pub status: ReceiptStatus,
    pub cancellation: Option<Cancellation>,
    pub issued_by: String,
    pub issued_on: NaiveDate,
    pub issued_at: String,
}

impl From<FeeReceipt> for ReceiptResponse {
    fn from(receipt: FeeReceipt) -> Self {
        Self {
            id: receipt.id,
            receipt_id: receipt.receipt_id,
            academic_year_id: receipt.academic_year_id,
            category: receipt.category,
            student: receipt.student,
            school: receipt.school,
            academic_year: receipt.academic_year,
            items: receipt.items,
            total_amount: receipt.total_amount,
            paid_amount: receipt.paid_amount,
            due_amount: receipt.due_amount,
            payment: receipt.payment,
            remarks: receipt.remarks,
            donor_id: receipt.donor_id,
            status: receipt.status,
            cancellation: receipt.cancellation,
            issued_by: receipt.issued_by,
            issued_on: receipt.issued_on,
            issued_at: receipt.issued_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DonorResponse {
    pub id: String,
    pub name: String,
    pub total_donated: Decimal,
    pub donations: Vec<Donation>,
    pub created_at: String,
}

impl From<Donor> for DonorResponse {
    fn from(donor: Donor) -> Self {
        Self {
            id: donor.id,
            name: donor.name,
            total_donated: donor.total_donated,
            donations: donor.donations,
            created_at: donor.created_at.to_rfc3339(),
        }
    }
}
