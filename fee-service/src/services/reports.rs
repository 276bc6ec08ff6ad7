use super::fee_service::{today, FeeService, Scope};
use super::store::{InstallmentFilter, ReceiptFilter};
use crate::dtos::{
    CollectionBucket, CollectionParams, CollectionSummary, DuesReport, DuesReportParams,
    StudentDues,
};
use crate::error::FeeError;
use crate::models::{FeeInstallment, FeeReceipt};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

fn student_dues(installments: Vec<FeeInstallment>) -> Vec<StudentDues> {
    let mut by_student: BTreeMap<String, StudentDues> = BTreeMap::new();
    for inst in installments {
        let dues = by_student
            .entry(inst.student_id.clone())
            .or_insert_with(|| StudentDues {
                student_id: inst.student_id.clone(),
                section_id: inst.section_id.clone(),
                installments: 0,
                total_amount: Decimal::ZERO,
                discount_amount: Decimal::ZERO,
                net_amount: Decimal::ZERO,
                paid_amount: Decimal::ZERO,
                outstanding: Decimal::ZERO,
            });
        dues.installments += 1;
        dues.total_amount += inst.total_amount;
        dues.discount_amount += inst.total_discount_amount;
        dues.net_amount += inst.net_amount;
        dues.paid_amount += inst.paid_amount;
        dues.outstanding += inst.outstanding();
    }
    by_student.into_values().collect()
}

fn collection_buckets(receipts: &[FeeReceipt]) -> Vec<CollectionBucket> {
    let mut buckets: BTreeMap<(&'static str, &'static str), CollectionBucket> = BTreeMap::new();
    for receipt in receipts {
        let method = receipt.payment.name();
        let bucket = buckets
            .entry((method, receipt.category.code()))
            .or_insert_with(|| CollectionBucket {
                method: method.to_string(),
                category: receipt.category,
                receipts: 0,
                amount: Decimal::ZERO,
            });
        bucket.receipts += 1;
        bucket.amount += receipt.paid_amount;
    }
    buckets.into_values().collect()
}

impl FeeService {
    /// Per-student totals over installments due on or before `as_of`
    /// (today when absent).
    pub async fn dues_report(
        &self,
        scope: &Scope,
        params: DuesReportParams,
    ) -> Result<DuesReport, FeeError> {
        let as_of = params.as_of.unwrap_or_else(today);
        let installments = self
            .store
            .find_installments(&InstallmentFilter {
                academic_year_id: Some(scope.academic_year_id().to_string()),
                section_id: params.section_id,
                due_on_or_before: Some(as_of),
                ..InstallmentFilter::for_school(&scope.school_id)
            })
            .await?;

        let students = student_dues(installments);
        let total_outstanding = students.iter().map(|s| s.outstanding).sum();
        Ok(DuesReport {
            school_id: scope.school_id.clone(),
            academic_year_id: scope.academic_year_id().to_string(),
            as_of,
            students,
            total_outstanding,
        })
    }

    /// Active receipts issued in the range, grouped by method and series.
    pub async fn collection_summary(
        &self,
        school_id: &str,
        params: CollectionParams,
    ) -> Result<CollectionSummary, FeeError> {
        if let (Some(from), Some(to)) = (params.from, params.to) {
            if from > to {
                return Err(FeeError::validation("`from` must not be after `to`"));
            }
        }
        let receipts = self
            .store
            .list_receipts(&ReceiptFilter {
                school_id: school_id.to_string(),
                student_id: None,
                issued_from: params.from,
                issued_to: params.to,
                include_cancelled: false,
            })
            .await?;

        let buckets = collection_buckets(&receipts);
        Ok(CollectionSummary {
            school_id: school_id.to_string(),
            from: params.from,
            to: params.to,
            total_receipts: buckets.iter().map(|b| b.receipts).sum(),
            total_amount: buckets.iter().map(|b| b.amount).sum(),
            buckets,
        })
    }
}
