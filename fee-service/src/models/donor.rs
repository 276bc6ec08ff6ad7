use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub receipt_id: String,
    pub student_id: String,
    pub amount: Decimal,
    pub donated_at: DateTime<Utc>,
}

/// A sponsor whose contributions fund student payments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donor {
    #[serde(rename = "_id")]
    pub id: String,
    pub school_id: String,
    pub name: String,
    pub total_donated: Decimal,
    pub donations: Vec<Donation>,
    pub revision: i64,
    pub created_at: DateTime<Utc>,
}

impl Donor {
    pub fn new(school_id: String, name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            school_id,
            name,
            total_donated: Decimal::ZERO,
            donations: Vec::new(),
            revision: 0,
            created_at: Utc::now(),
        }
    }

    pub fn record(&mut self, donation: Donation) {
        self.total_donated += donation.amount;
        self.donations.push(donation);
    }

    /// Removes the donation tied to a receipt, returning its amount.
    pub fn reverse(&mut self, receipt_id: &str) -> Option<Decimal> {
        let index = self
            .donations
            .iter()
            .position(|d| d.receipt_id == receipt_id)?;
        let donation = self.donations.remove(index);
        self.total_donated -= donation.amount;
        Some(donation.amount)
    }
}
