//! Reference data owned by the student-information system.
//!
//! The fee service only reads these collections; the one exception is
//! [`FeeType`], which schools define through this service.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct School {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    #[serde(rename = "_id")]
    pub id: String,
    pub school_id: String,
    pub class_name: String,
    pub section_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parent {
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: String,
    pub school_id: String,
    pub section_id: String,
    pub name: String,
    pub admission_no: String,
    pub parent: Option<Parent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcademicYear {
    #[serde(rename = "_id")]
    pub id: String,
    pub school_id: String,
    pub name: String,
    pub is_active: bool,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeType {
    #[serde(rename = "_id")]
    pub id: String,
    pub school_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FeeType {
    pub fn new(school_id: String, name: String, description: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            school_id,
            name,
            description,
            created_at: Utc::now(),
        }
    }
}
