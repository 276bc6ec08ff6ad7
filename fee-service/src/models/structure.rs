use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledEntry {
    pub date: NaiveDate,
    pub amount: Decimal,
}

/// One line of a fee structure: a fee type billed on a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRow {
    pub id: String,
    pub fee_type_id: String,
    pub schedule_type_id: String,
    pub scheduled_dates: Vec<ScheduledEntry>,
    pub total_amount: Decimal,
    pub breakdown: u32,
}

impl FeeRow {
    /// Builds a row with a fresh id; `total_amount` and `breakdown` are
    /// always derived from the entries.
    pub fn new(
        fee_type_id: String,
        schedule_type_id: String,
        scheduled_dates: Vec<ScheduledEntry>,
    ) -> Self {
        let total_amount = scheduled_dates.iter().map(|e| e.amount).sum();
        let breakdown = scheduled_dates.len() as u32;
        Self {
            id: Uuid::new_v4().to_string(),
            fee_type_id,
            schedule_type_id,
            scheduled_dates,
            total_amount,
            breakdown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RosterEntry {
    pub student_id: String,
    pub section_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MaterializationStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl MaterializationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterializationStatus::Pending => "pending",
            MaterializationStatus::Running => "running",
            MaterializationStatus::Succeeded => "succeeded",
            MaterializationStatus::Failed => "failed",
        }
    }
}

/// Durable progress of the background job that writes a structure's
/// installments. Readable by clients and by the recovery sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializationState {
    pub status: MaterializationStatus,
    pub job_id: Option<String>,
    pub attempts: i32,
    pub installments_created: i64,
    pub duplicates_skipped: i64,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl MaterializationState {
    pub fn pending(job_id: String) -> Self {
        Self {
            status: MaterializationStatus::Pending,
            job_id: Some(job_id),
            attempts: 0,
            installments_created: 0,
            duplicates_skipped: 0,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeStructure {
    #[serde(rename = "_id")]
    pub id: String,
    pub school_id: String,
    pub academic_year_id: String,
    pub name: String,
    pub category_id: String,
    /// Section ids the structure is offered to.
    pub classes: Vec<String>,
    pub fee_rows: Vec<FeeRow>,
    pub roster: Vec<RosterEntry>,
    pub materialization: MaterializationState,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeeStructure {
    pub fn row(&self, row_id: &str) -> Option<&FeeRow> {
        self.fee_rows.iter().find(|r| r.id == row_id)
    }

    pub fn has_student(&self, student_id: &str) -> bool {
        self.roster.iter().any(|e| e.student_id == student_id)
    }

    /// Number of installments a fully materialized structure holds.
    pub fn expected_installments(&self) -> u64 {
        let entries: u64 = self.fee_rows.iter().map(|r| r.breakdown as u64).sum();
        entries * self.roster.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn row_totals_follow_entries() {
        let date = NaiveDate::from_ymd_opt(2026, 4, 10).unwrap();
        let row = FeeRow::new(
            "tuition".to_string(),
            "quarterly".to_string(),
            vec![
                ScheduledEntry { date, amount: dec!(2000) },
                ScheduledEntry { date, amount: dec!(2000.50) },
            ],
        );
        assert_eq!(row.total_amount, dec!(4000.50));
        assert_eq!(row.breakdown, 2);
    }
}
