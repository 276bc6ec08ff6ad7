use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Receipt series. Each school numbers every series independently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptCategory {
    #[default]
    Academic,
    Transport,
    PreviousBalance,
    Miscellaneous,
}

impl ReceiptCategory {
    /// Two-letter prefix of the human-readable receipt id.
    pub fn code(&self) -> &'static str {
        match self {
            ReceiptCategory::Academic => "AC",
            ReceiptCategory::Transport => "TR",
            ReceiptCategory::PreviousBalance => "PB",
            ReceiptCategory::Miscellaneous => "MS",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Cheque {
        cheque_number: String,
        bank_name: String,
        cheque_date: NaiveDate,
    },
    DemandDraft {
        dd_number: String,
        bank_name: String,
        dd_date: NaiveDate,
    },
    Upi {
        transaction_id: String,
    },
    Card {
        transaction_id: String,
        last_four: Option<String>,
    },
    BankTransfer {
        reference_number: String,
        bank_name: Option<String>,
    },
}

impl PaymentMethod {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Cheque { .. } => "cheque",
            PaymentMethod::DemandDraft { .. } => "demand_draft",
            PaymentMethod::Upi { .. } => "upi",
            PaymentMethod::Card { .. } => "card",
            PaymentMethod::BankTransfer { .. } => "bank_transfer",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub student_id: String,
    pub name: String,
    pub admission_no: String,
    pub class_name: String,
    pub section_name: String,
    pub parent_name: Option<String>,
    pub parent_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolSnapshot {
    pub school_id: String,
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicYearSnapshot {
    pub academic_year_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub installment_id: String,
    pub fee_type_id: String,
    pub fee_type: String,
    pub due_date: NaiveDate,
    pub net_amount: Decimal,
    pub paid_amount: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    pub cancelled_by: String,
    pub cancelled_at: DateTime<Utc>,
}

/// Proof of payment. The student, school and academic-year blocks are
/// copied at issue time and never follow later edits to those records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeReceipt {
    #[serde(rename = "_id")]
    pub id: String,
    pub receipt_id: String,
    pub school_id: String,
    pub academic_year_id: String,
    pub category: ReceiptCategory,
    pub sequence: i64,
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
    /// School-local business date; also encoded in `receipt_id`.
    pub issued_on: NaiveDate,
    pub issued_at: DateTime<Utc>,
    pub revision: i64,
}

/// Per-school, per-series counter document (`_id = "<school>:<code>"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceCounter {
    #[serde(rename = "_id")]
    pub key: String,
    pub seq: i64,
}
