use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named recurrence ("Quarterly", "Monthly") with its concrete due dates.
///
/// `scheduled_dates` is derived from `day` and `months` and always has one
/// entry per month, in the stored month order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeSchedule {
    #[serde(rename = "_id")]
    pub id: String,
    pub school_id: String,
    pub name: String,
    pub description: Option<String>,
    pub day: u32,
    pub months: Vec<u32>,
    pub scheduled_dates: Vec<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeeSchedule {
    pub fn new(
        school_id: String,
        name: String,
        description: Option<String>,
        day: u32,
        months: Vec<u32>,
        scheduled_dates: Vec<NaiveDate>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            school_id,
            name,
            description,
            day,
            months,
            scheduled_dates,
            created_at: now,
            updated_at: now,
        }
    }
}
