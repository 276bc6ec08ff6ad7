use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFeeScheduleRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 1, max = 31, message = "Day must be between 1 and 31"))]
    pub day: u32,
    #[validate(length(min = 1, max = 12, message = "Between 1 and 12 months are required"))]
    pub months: Vec<u32>,
    /// Month order used by the school's other schedules, e.g. April first.
    #[serde(default)]
    pub existing_month_order: Vec<u32>,
    /// Calendar year of the first due date; defaults to the year the
    /// active academic year starts in.
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFeeScheduleRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, max = 31, message = "Day must be between 1 and 31"))]
    pub day: Option<u32>,
    #[validate(length(min = 1, max = 12, message = "Between 1 and 12 months are required"))]
    pub months: Option<Vec<u32>>,
    pub existing_month_order: Option<Vec<u32>>,
    pub year: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeeScheduleResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub day: u32,
    pub months: Vec<u32>,
    pub scheduled_dates: Vec<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<crate::models::FeeSchedule> for FeeScheduleResponse {
    fn from(schedule: crate::models::FeeSchedule) -> Self {
        Self {
            id: schedule.id,
            name: schedule.name,
            description: schedule.description,
            day: schedule.day,
            months: schedule.months,
            scheduled_dates: schedule.scheduled_dates,
            created_at: schedule.created_at.to_rfc3339(),
            updated_at: schedule.updated_at.to_rfc3339(),
        }
    }
}
