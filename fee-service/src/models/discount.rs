use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of a discount on one (fee row, section) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassDiscount {
    pub row_id: String,
    pub section_id: String,
    pub fee_type_id: String,
    pub is_percentage: bool,
    pub value: Decimal,
    /// Installments per student on this row.
    pub breakdown: i32,
    /// Amount taken off each installment.
    pub discount_amount: Decimal,
    pub total_students: i64,
}

/// A concession budget pool and the cohort it currently covers.
///
/// `budget_remaining` and the counters are always re-derived from the
/// installments that carry this discount, inside the same commit that
/// changes those installments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountCategory {
    #[serde(rename = "_id")]
    pub id: String,
    pub school_id: String,
    pub name: String,
    pub description: Option<String>,
    pub budget_allocated: Decimal,
    pub budget_remaining: Decimal,
    pub class_list: Vec<ClassDiscount>,
    pub total_students: i64,
    pub total_approved: i64,
    pub total_pending: i64,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DiscountCategory {
    pub fn new(
        school_id: String,
        name: String,
        description: Option<String>,
        budget_allocated: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            school_id,
            name,
            description,
            budget_allocated,
            budget_remaining: budget_allocated,
            class_list: Vec::new(),
            total_students: 0,
            total_approved: 0,
            total_pending: 0,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn budget_used(&self) -> Decimal {
        self.budget_allocated - self.budget_remaining
    }
}
