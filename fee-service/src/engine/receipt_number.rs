use crate::models::ReceiptCategory;
use chrono::NaiveDate;

/// Digits of the zero-padded serial at the end of a receipt id.
pub const SEQUENCE_WIDTH: usize = 5;

/// `<code><DDMMYY><serial>`, e.g. `AC18102600042`.
pub fn format_receipt_id(category: ReceiptCategory, issued_on: NaiveDate, sequence: i64) -> String {
    format!(
        "{}{}{:0width$}",
        category.code(),
        issued_on.format("%d%m%y"),
        sequence,
        width = SEQUENCE_WIDTH
    )
}

/// Key of the counter document for one school's receipt series.
pub fn counter_key(school_id: &str, category: ReceiptCategory) -> String {
    format!("{}:{}", school_id, category.code())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{
        AcademicYearSnapshot, FeeReceipt, PaymentMethod, ReceiptItem, ReceiptStatus,
        SchoolSnapshot, StudentSnapshot,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;

    pub(crate) fn receipt_with(items: Vec<ReceiptItem>) -> FeeReceipt {
        let paid: Decimal = items.iter().map(|i| i.paid_amount).sum();
        FeeReceipt {
            id: "r1".to_string(),
            receipt_id: "AC01072600001".to_string(),
            school_id: "school".to_string(),
            academic_year_id: "ay".to_string(),
            category: ReceiptCategory::Academic,
            sequence: 1,
            student: StudentSnapshot {
                student_id: "s1".to_string(),
                name: "Asha".to_string(),
                admission_no: "A-1".to_string(),
                class_name: "5".to_string(),
                section_name: "A".to_string(),
                parent_name: None,
                parent_phone: None,
            },
            school: SchoolSnapshot {
                school_id: "school".to_string(),
                name: "Green Valley".to_string(),
                address: None,
            },
            academic_year: AcademicYearSnapshot {
                academic_year_id: "ay".to_string(),
                name: "2026-27".to_string(),
            },
            items,
            total_amount: paid,
            paid_amount: paid,
            due_amount: Decimal::ZERO,
            payment: PaymentMethod::Cash,
            remarks: None,
            donor_id: None,
            status: ReceiptStatus::Active,
            cancellation: None,
            issued_by: "clerk".to_string(),
            issued_on: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
            issued_at: Utc::now(),
            revision: 0,
        }
    }

    #[test]
    fn receipt_id_layout() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(
            format_receipt_id(ReceiptCategory::Academic, date, 42),
            "AC18102600042"
        );
        assert_eq!(
            format_receipt_id(ReceiptCategory::Transport, date, 123456),
            "TR181026123456"
        );
    }

    #[test]
    fn counters_are_per_school_and_series() {
        assert_eq!(counter_key("s1", ReceiptCategory::Academic), "s1:AC");
        assert_ne!(
            counter_key("s1", ReceiptCategory::Academic),
            counter_key("s1", ReceiptCategory::Transport)
        );
        assert_ne!(
            counter_key("s1", ReceiptCategory::Academic),
            counter_key("s2", ReceiptCategory::Academic)
        );
    }
}
