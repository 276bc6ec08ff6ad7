//! Pure fee arithmetic: no I/O, no clocks. Services feed these functions
//! what they read from the store and commit what comes back.

pub mod compiler;
pub mod discount;
pub mod payment;
pub mod receipt_number;
pub mod schedule;

pub use compiler::{compile, compile_delta, CompileContext, InstallmentDraft};
pub use discount::{Assignment, DiscountPlan, DiscountRow, RowBase};
pub use payment::{PaymentItem, PaymentLine, ReceiptTotals};
pub use receipt_number::{counter_key, format_receipt_id};
pub use schedule::compute_scheduled_dates;
