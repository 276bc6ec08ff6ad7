use crate::error::FeeError;
use crate::models::{FeeInstallment, FeeReceipt, PaymentMethod, ReceiptItem};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

/// Amount submitted against one installment.
#[derive(Debug, Clone)]
pub struct PaymentItem {
    pub installment_id: String,
    pub paid_amount: Decimal,
}

/// An installment after the payment and the receipt line describing it.
#[derive(Debug, Clone)]
pub struct PaymentLine {
    pub installment: FeeInstallment,
    pub item: ReceiptItem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiptTotals {
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub due_amount: Decimal,
}

pub fn validate_items(items: &[PaymentItem]) -> Result<(), FeeError> {
    if items.is_empty() {
        return Err(FeeError::validation("A payment needs at least one item"));
    }
    let mut seen = HashSet::new();
    for item in items {
        if item.paid_amount <= Decimal::ZERO {
            return Err(FeeError::validation(format!(
                "Paid amount for installment {} must be greater than zero",
                item.installment_id
            )));
        }
        if !seen.insert(item.installment_id.as_str()) {
            return Err(FeeError::validation(format!(
                "Installment {} appears twice in the payment",
                item.installment_id
            )));
        }
    }
    Ok(())
}

fn require(value: &str, field: &str, method: &PaymentMethod) -> Result<(), FeeError> {
    if value.trim().is_empty() {
        return Err(FeeError::validation(format!(
            "{} is required for {} payments",
            field,
            method.name()
        )));
    }
    Ok(())
}

/// Checks the method-specific reference fields.
pub fn validate_method(method: &PaymentMethod) -> Result<(), FeeError> {
    match method {
        PaymentMethod::Cash => Ok(()),
        PaymentMethod::Cheque {
            cheque_number,
            bank_name,
            ..
        } => {
            require(cheque_number, "cheque_number", method)?;
            require(bank_name, "bank_name", method)
        }
        PaymentMethod::DemandDraft {
            dd_number,
            bank_name,
            ..
        } => {
            require(dd_number, "dd_number", method)?;
            require(bank_name, "bank_name", method)
        }
        PaymentMethod::Upi { transaction_id } => require(transaction_id, "transaction_id", method),
        PaymentMethod::Card {
            transaction_id,
            last_four,
        } => {
            require(transaction_id, "transaction_id", method)?;
            match last_four {
                Some(digits) if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) => {
                    Err(FeeError::validation("last_four must be exactly 4 digits"))
                }
                _ => Ok(()),
            }
        }
        PaymentMethod::BankTransfer {
            reference_number, ..
        } => require(reference_number, "reference_number", method),
    }
}

/// Applies every item to its installment. Nothing is applied unless every
/// item fits within what is still outstanding.
pub fn plan_payment(
    items: &[PaymentItem],
    installments: Vec<FeeInstallment>,
    student_id: &str,
    fee_type_names: &HashMap<String, String>,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<PaymentLine>, FeeError> {
    validate_items(items)?;
    let mut by_id: HashMap<String, FeeInstallment> = installments
        .into_iter()
        .map(|i| (i.id.clone(), i))
        .collect();

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let mut inst = by_id
            .remove(&item.installment_id)
            .ok_or_else(|| FeeError::not_found("Installment", &item.installment_id))?;
        if inst.student_id != student_id {
            return Err(FeeError::validation(format!(
                "Installment {} does not belong to student {}",
                inst.id, student_id
            )));
        }
        let fee_type = fee_type_names
            .get(&inst.fee_type_id)
            .cloned()
            .unwrap_or_else(|| inst.fee_type_id.clone());

        let outstanding = inst.outstanding();
        if item.paid_amount > outstanding {
            return Err(FeeError::Overpayment {
                fee_type,
                outstanding,
                submitted: item.paid_amount,
            });
        }

        inst.paid_amount += item.paid_amount;
        inst.resettle(today);
        inst.updated_at = now;
        lines.push(PaymentLine {
            item: ReceiptItem {
                installment_id: inst.id.clone(),
                fee_type_id: inst.fee_type_id.clone(),
                fee_type,
                due_date: inst.due_date,
                net_amount: inst.net_amount,
                paid_amount: item.paid_amount,
            },
            installment: inst,
        });
    }
    Ok(lines)
}

pub fn totals(lines: &[PaymentLine]) -> ReceiptTotals {
    lines.iter().fold(ReceiptTotals::default(), |acc, line| ReceiptTotals {
        total_amount: acc.total_amount + line.item.net_amount,
        paid_amount: acc.paid_amount + line.item.paid_amount,
        due_amount: acc.due_amount + line.installment.outstanding(),
    })
}

/// Takes a receipt's items back off their installments.
pub fn plan_cancellation(
    receipt: &FeeReceipt,
    installments: Vec<FeeInstallment>,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<FeeInstallment>, FeeError> {
    let mut by_id: HashMap<String, FeeInstallment> = installments
        .into_iter()
        .map(|i| (i.id.clone(), i))
        .collect();

    let mut reverted = Vec::with_capacity(receipt.items.len());
    for item in &receipt.items {
        let mut inst = by_id.remove(&item.installment_id).ok_or_else(|| {
            FeeError::Integrity(format!(
                "Receipt {} references missing installment {}",
                receipt.receipt_id, item.installment_id
            ))
        })?;
        inst.paid_amount -= item.paid_amount;
        if inst.paid_amount < Decimal::ZERO {
            return Err(FeeError::Integrity(format!(
                "Cancelling receipt {} would leave installment {} with a negative paid amount",
                receipt.receipt_id, inst.id
            )));
        }
        inst.resettle(today);
        inst.updated_at = now;
        reverted.push(inst);
    }
    Ok(reverted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InstallmentStatus;
    use rust_decimal_macros::dec;

    fn inst(id: &str, status: InstallmentStatus, net: Decimal, paid: Decimal) -> FeeInstallment {
        let now = Utc::now();
        FeeInstallment {
            id: id.to_string(),
            student_id: "s1".to_string(),
            section_id: "sec".to_string(),
            school_id: "school".to_string(),
            academic_year_id: "ay".to_string(),
            fee_type_id: "ft-tuition".to_string(),
            schedule_type_id: "st".to_string(),
            fee_structure_id: "fs".to_string(),
            row_id: "row".to_string(),
            due_date: NaiveDate::from_ymd_opt(2026, 6, 10).unwrap(),
            total_amount: net,
            total_discount_amount: Decimal::ZERO,
            net_amount: net,
            paid_amount: paid,
            discounts: vec![],
            status,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn names() -> HashMap<String, String> {
        HashMap::from([("ft-tuition".to_string(), "Tuition".to_string())])
    }

    fn item(id: &str, amount: Decimal) -> PaymentItem {
        PaymentItem {
            installment_id: id.to_string(),
            paid_amount: amount,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 1).unwrap()
    }

    #[test]
    fn exact_payment_settles_late_when_due() {
        let lines = plan_payment(
            &[item("i1", dec!(5000))],
            vec![inst("i1", InstallmentStatus::Due, dec!(5000), Decimal::ZERO)],
            "s1",
            &names(),
            today(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(lines[0].installment.status, InstallmentStatus::Late);
        assert_eq!(lines[0].item.fee_type, "Tuition");
        let t = totals(&lines);
        assert_eq!(t.paid_amount, dec!(5000));
        assert_eq!(t.due_amount, Decimal::ZERO);
    }

    #[test]
    fn overpayment_names_fee_type() {
        let err = plan_payment(
            &[item("i1", dec!(1))],
            vec![inst("i1", InstallmentStatus::Late, dec!(5000), dec!(5000))],
            "s1",
            &names(),
            today(),
            Utc::now(),
        )
        .unwrap_err();
        match err {
            FeeError::Overpayment {
                fee_type,
                outstanding,
                submitted,
            } => {
                assert_eq!(fee_type, "Tuition");
                assert_eq!(outstanding, Decimal::ZERO);
                assert_eq!(submitted, dec!(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn one_bad_item_rejects_all() {
        let result = plan_payment(
            &[item("i1", dec!(100)), item("i2", dec!(900))],
            vec![
                inst("i1", InstallmentStatus::Due, dec!(500), Decimal::ZERO),
                inst("i2", InstallmentStatus::Due, dec!(500), Decimal::ZERO),
            ],
            "s1",
            &names(),
            today(),
            Utc::now(),
        );
        assert!(matches!(result, Err(FeeError::Overpayment { .. })));
    }

    #[test]
    fn duplicate_and_zero_items_are_invalid() {
        assert!(validate_items(&[]).is_err());
        assert!(validate_items(&[item("i1", Decimal::ZERO)]).is_err());
        assert!(validate_items(&[item("i1", dec!(1)), item("i1", dec!(2))]).is_err());
    }

    #[test]
    fn method_references_are_required() {
        assert!(validate_method(&PaymentMethod::Cash).is_ok());
        assert!(validate_method(&PaymentMethod::Upi {
            transaction_id: " ".to_string()
        })
        .is_err());
        assert!(validate_method(&PaymentMethod::Card {
            transaction_id: "tx-1".to_string(),
            last_four: Some("12a4".to_string()),
        })
        .is_err());
        assert!(validate_method(&PaymentMethod::Cheque {
            cheque_number: "004512".to_string(),
            bank_name: "State Bank".to_string(),
            cheque_date: NaiveDate::from_ymd_opt(2026, 7, 1).unwrap(),
        })
        .is_ok());
    }

    #[test]
    fn cancellation_reopens_installment() {
        let lines = plan_payment(
            &[item("i1", dec!(5000))],
            vec![inst("i1", InstallmentStatus::Due, dec!(5000), Decimal::ZERO)],
            "s1",
            &names(),
            today(),
            Utc::now(),
        )
        .unwrap();
        let receipt_items: Vec<ReceiptItem> = lines.iter().map(|l| l.item.clone()).collect();
        let paid: Vec<FeeInstallment> = lines.into_iter().map(|l| l.installment).collect();

        let receipt = crate::engine::receipt_number::tests::receipt_with(receipt_items);
        let reverted = plan_cancellation(&receipt, paid, today(), Utc::now()).unwrap();
        assert_eq!(reverted[0].paid_amount, Decimal::ZERO);
        assert_eq!(reverted[0].status, InstallmentStatus::Due);
    }

    #[test]
    fn cancellation_never_goes_negative() {
        let receipt = crate::engine::receipt_number::tests::receipt_with(vec![ReceiptItem {
            installment_id: "i1".to_string(),
            fee_type_id: "ft-tuition".to_string(),
            fee_type: "Tuition".to_string(),
            due_date: NaiveDate::from_ymd_opt(2026, 6, 10).unwrap(),
            net_amount: dec!(5000),
            paid_amount: dec!(300),
        }]);
        let result = plan_cancellation(
            &receipt,
            vec![inst("i1", InstallmentStatus::Due, dec!(5000), dec!(100))],
            today(),
            Utc::now(),
        );
        assert!(matches!(result, Err(FeeError::Integrity(_))));
    }
}
