use crate::models::ReceiptCategory;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct DuesReportParams {
    pub section_id: Option<String>,
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudentDues {
    pub student_id: String,
    pub section_id: String,
    pub installments: u64,
    pub total_amount: Decimal,
    pub discount_amount: Decimal,
    pub net_amount: Decimal,
    pub paid_amount: Decimal,
    pub outstanding: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DuesReport {
    pub school_id: String,
    pub academic_year_id: String,
    pub as_of: NaiveDate,
    pub students: Vec<StudentDues>,
    pub total_outstanding: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct CollectionParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionBucket {
    pub method: String,
    pub category: ReceiptCategory,
    pub receipts: u64,
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub school_id: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub buckets: Vec<CollectionBucket>,
    pub total_receipts: u64,
    pub total_amount: Decimal,
}
