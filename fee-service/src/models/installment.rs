use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle of an installment.
///
/// `Upcoming -> Due` happens in the due sweep; a fully covered installment
/// becomes `Paid`, or `Late` when it was already `Due`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Upcoming,
    Due,
    Paid,
    Late,
}

impl InstallmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallmentStatus::Upcoming => "upcoming",
            InstallmentStatus::Due => "due",
            InstallmentStatus::Paid => "paid",
            InstallmentStatus::Late => "late",
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, InstallmentStatus::Paid | InstallmentStatus::Late)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FragmentStatus {
    Pending,
    Approved,
}

/// A discount category's share of one installment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscountFragment {
    pub discount_id: String,
    pub discount_amount: Decimal,
    pub is_percentage: bool,
    pub value: Decimal,
    pub status: FragmentStatus,
}

/// The atomic receivable: one per (student, fee row, due date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeInstallment {
    #[serde(rename = "_id")]
    pub id: String,
    pub student_id: String,
    pub section_id: String,
    pub school_id: String,
    pub academic_year_id: String,
    pub fee_type_id: String,
    pub schedule_type_id: String,
    pub fee_structure_id: String,
    pub row_id: String,
    pub due_date: NaiveDate,
    pub total_amount: Decimal,
    pub total_discount_amount: Decimal,
    pub net_amount: Decimal,
    pub paid_amount: Decimal,
    pub discounts: Vec<DiscountFragment>,
    pub status: InstallmentStatus,
    /// Bumped on every write; writers compare-and-swap on it.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeeInstallment {
    pub fn outstanding(&self) -> Decimal {
        self.net_amount - self.paid_amount
    }

    pub fn discount(&self, discount_id: &str) -> Option<&DiscountFragment> {
        self.discounts.iter().find(|d| d.discount_id == discount_id)
    }

    /// Recomputes the discount total and net amount from the fragments.
    pub fn recompute_net(&mut self) {
        self.total_discount_amount = self.discounts.iter().map(|d| d.discount_amount).sum();
        self.net_amount = self.total_amount - self.total_discount_amount;
    }

    /// Re-derives the status after `paid_amount` or `net_amount` changed.
    ///
    /// Covered installments (net above zero, fully paid) settle as `Late`
    /// if they were `Due` and `Paid` otherwise. Settled installments that
    /// are no longer covered reopen as `Due` once the due date is reached
    /// and `Upcoming` before it.
    pub fn resettle(&mut self, today: NaiveDate) {
        let covered = self.net_amount > Decimal::ZERO && self.paid_amount >= self.net_amount;
        self.status = match (covered, self.status) {
            (true, InstallmentStatus::Due) => InstallmentStatus::Late,
            (true, InstallmentStatus::Upcoming) => InstallmentStatus::Paid,
            (true, settled) => settled,
            (false, status) if status.is_settled() => {
                if self.due_date <= today {
                    InstallmentStatus::Due
                } else {
                    InstallmentStatus::Upcoming
                }
            }
            (false, open) => open,
        };
    }
}
