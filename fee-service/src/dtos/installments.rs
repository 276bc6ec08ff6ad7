use crate::models::{DiscountFragment, FeeInstallment, InstallmentStatus};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct InstallmentListParams {
    pub student_id: Option<String>,
    pub section_id: Option<String>,
    pub fee_structure_id: Option<String>,
    pub status: Option<InstallmentStatus>,
    pub due_on_or_before: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateInstallmentRequest {
    #[validate(custom(function = "super::non_negative_amount"))]
    pub total_amount: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {
    /// Defaults to today.
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SweepResponse {
    pub as_of: NaiveDate,
    pub updated: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstallmentResponse {
    pub id: String,
    pub student_id: String,
    pub section_id: String,
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
    pub outstanding: Decimal,
    pub discounts: Vec<DiscountFragment>,
    pub status: InstallmentStatus,
    pub revision: i64,
    pub updated_at: String,
}

impl From<FeeInstallment> for InstallmentResponse {
    fn from(inst: FeeInstallment) -> Self {
        let outstanding = inst.outstanding();
        Self {
            id: inst.id,
            student_id: inst.student_id,
            section_id: inst.section_id,
            academic_year_id: inst.academic_year_id,
            fee_type_id: inst.fee_type_id,
            schedule_type_id: inst.schedule_type_id,
            fee_structure_id: inst.fee_structure_id,
            row_id: inst.row_id,
            due_date: inst.due_date,
            total_amount: inst.total_amount,
            total_discount_amount: inst.total_discount_amount,
            net_amount: inst.net_amount,
            paid_amount: inst.paid_amount,
            outstanding,
            discounts: inst.discounts,
            status: inst.status,
            revision: inst.revision,
            updated_at: inst.updated_at.to_rfc3339(),
        }
    }
}
