use crate::models::{FeeRow, FeeStructure, MaterializationState, RosterEntry};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ScheduledEntryRequest {
    pub date: NaiveDate,
    #[validate(custom(function = "super::positive_amount"))]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FeeRowRequest {
    #[validate(length(min = 1, message = "fee_type_id is required"))]
    pub fee_type_id: String,
    #[validate(length(min = 1, message = "schedule_type_id is required"))]
    pub schedule_type_id: String,
    #[validate(length(min = 1, message = "At least one scheduled entry is required"), nested)]
    pub scheduled_dates: Vec<ScheduledEntryRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFeeStructureRequest {
    #[validate(length(min = 1, max = 150, message = "Name must be 1-150 characters"))]
    pub name: String,
    #[validate(length(min = 1, message = "category_id is required"))]
    pub category_id: String,
    #[validate(length(min = 1, message = "At least one class is required"))]
    pub classes: Vec<String>,
    #[validate(length(min = 1, message = "At least one fee row is required"), nested)]
    pub fee_rows: Vec<FeeRowRequest>,
    /// Explicit student ids; every student of `classes` when omitted.
    pub roster: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateFeeStructureRequest {
    #[serde(default)]
    #[validate(nested)]
    pub added_rows: Vec<FeeRowRequest>,
    #[serde(default)]
    pub added_students: Vec<String>,
    #[serde(default)]
    pub removed_students: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StructureAuditResponse {
    pub structure_id: String,
    pub expected_installments: u64,
    pub actual_installments: u64,
    pub consistent: bool,
    /// Set when a repair job was queued.
    pub requeued_job_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeeStructureResponse {
    pub id: String,
    pub academic_year_id: String,
    pub name: String,
    pub category_id: String,
    pub classes: Vec<String>,
    pub fee_rows: Vec<FeeRow>,
    pub roster: Vec<RosterEntry>,
    pub materialization: MaterializationState,
    pub expected_installments: u64,
    pub revision: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<FeeStructure> for FeeStructureResponse {
    fn from(structure: FeeStructure) -> Self {
        let expected_installments = structure.expected_installments();
        Self {
            id: structure.id,
            academic_year_id: structure.academic_year_id,
            name: structure.name,
            category_id: structure.category_id,
            classes: structure.classes,
            fee_rows: structure.fee_rows,
            roster: structure.roster,
            materialization: structure.materialization,
            expected_installments,
            revision: structure.revision,
            created_at: structure.created_at.to_rfc3339(),
            updated_at: structure.updated_at.to_rfc3339(),
        }
    }
}
