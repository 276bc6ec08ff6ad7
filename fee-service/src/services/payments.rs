use super::fee_service::{today, FeeService, Scope, MAX_COMMIT_ATTEMPTS};
use super::metrics;
use super::store::{CancellationCommit, InstallmentFilter, PaymentCommit, ReceiptFilter};
use crate::dtos::{CancelReceiptRequest, ReceiptListParams, RecordPaymentRequest};
use crate::engine::payment::{self, PaymentItem};
use crate::engine::format_receipt_id;
use crate::error::FeeError;
use crate::models::{
    AcademicYearSnapshot, Cancellation, Donation, FeeReceipt, ReceiptStatus, SchoolSnapshot,
    StudentSnapshot,
};
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

impl FeeService {
    async fn student_snapshot(
        &self,
        school_id: &str,
        student_id: &str,
    ) -> Result<StudentSnapshot, FeeError> {
        let student = self
            .store
            .find_students(school_id, &[student_id.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| FeeError::not_found("Student", student_id))?;
        let section = self
            .store
            .find_section(school_id, &student.section_id)
            .await?
            .ok_or_else(|| FeeError::not_found("Section", &student.section_id))?;

        Ok(StudentSnapshot {
            student_id: student.id,
            name: student.name,
            admission_no: student.admission_no,
            class_name: section.class_name,
            section_name: section.section_name,
            parent_name: student.parent.as_ref().map(|p| p.name.clone()),
            parent_phone: student.parent.and_then(|p| p.phone),
        })
    }

    /// Records a payment and issues its receipt.
    ///
    /// Every item is validated against fresh installment data before any
    /// write. Installments, the receipt and the donor's contribution are
    /// committed together; if another writer touched one of the
    /// installments in the meantime the whole operation is re-validated and
    /// retried. A retried attempt burns its receipt sequence number.
    pub async fn record_payment(
        &self,
        scope: &Scope,
        req: RecordPaymentRequest,
    ) -> Result<FeeReceipt, FeeError> {
        let school_id = scope.school_id.as_str();
        let items: Vec<PaymentItem> = req
            .items
            .iter()
            .map(|i| PaymentItem {
                installment_id: i.installment_id.clone(),
                paid_amount: i.paid_amount,
            })
            .collect();
        payment::validate_items(&items)?;
        payment::validate_method(&req.payment)?;

        let student = self.student_snapshot(school_id, &req.student_id).await?;
        let school = self
            .store
            .find_school(school_id)
            .await?
            .ok_or_else(|| FeeError::not_found("School", school_id))?;
        if let Some(donor_id) = &req.donor_id {
            self.get_donor(school_id, donor_id).await?;
        }
        let fee_type_names: HashMap<String, String> = self
            .store
            .list_fee_types(school_id)
            .await?
            .into_iter()
            .map(|t| (t.id, t.name))
            .collect();
        let installment_ids: Vec<String> = items.iter().map(|i| i.installment_id.clone()).collect();

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let installments = self
                .store
                .find_installments(&InstallmentFilter {
                    installment_ids: Some(installment_ids.clone()),
                    ..InstallmentFilter::for_school(school_id)
                })
                .await?;

            let lines = match payment::plan_payment(
                &items,
                installments,
                &req.student_id,
                &fee_type_names,
                today(),
                Utc::now(),
            ) {
                Ok(lines) => lines,
                Err(e) => {
                    if matches!(e, FeeError::Overpayment { .. }) {
                        metrics::record_payment_rejected("overpayment");
                        tracing::warn!(
                            school_id = %school_id,
                            student_id = %req.student_id,
                            error = %e,
                            "Payment rejected"
                        );
                    }
                    return Err(e);
                }
            };
            let totals = payment::totals(&lines);

            let sequence = self.store.next_sequence(school_id, req.category).await?;
            let issued_at = Utc::now();
            let issued_on = issued_at.date_naive();
            let receipt_id = format_receipt_id(req.category, issued_on, sequence);

            let donor = match &req.donor_id {
                Some(donor_id) => {
                    let mut donor = self.get_donor(school_id, donor_id).await?;
                    donor.record(Donation {
                        receipt_id: receipt_id.clone(),
                        student_id: req.student_id.clone(),
                        amount: totals.paid_amount,
                        donated_at: issued_at,
                    });
                    Some(donor)
                }
                None => None,
            };

            let (installments, receipt_items): (Vec<_>, Vec<_>) =
                lines.into_iter().map(|l| (l.installment, l.item)).unzip();

            let receipt = FeeReceipt {
                id: Uuid::new_v4().to_string(),
                receipt_id,
                school_id: school_id.to_string(),
                academic_year_id: scope.academic_year_id().to_string(),
                category: req.category,
                sequence,
                student: student.clone(),
                school: SchoolSnapshot {
                    school_id: school.id.clone(),
                    name: school.name.clone(),
                    address: school.address.clone(),
                },
                academic_year: AcademicYearSnapshot {
                    academic_year_id: scope.academic_year.id.clone(),
                    name: scope.academic_year.name.clone(),
                },
                items: receipt_items,
                total_amount: totals.total_amount,
                paid_amount: totals.paid_amount,
                due_amount: totals.due_amount,
                payment: req.payment.clone(),
                remarks: req.remarks.clone(),
                donor_id: req.donor_id.clone(),
                status: ReceiptStatus::Active,
                cancellation: None,
                issued_by: scope.user_id.clone(),
                issued_on,
                issued_at,
                revision: 0,
            };

            match self
                .store
                .commit_payment(PaymentCommit {
                    installments,
                    receipt: receipt.clone(),
                    donor,
                })
                .await
            {
                Ok(()) => {
                    metrics::record_payment(receipt.category, &receipt.payment, receipt.paid_amount);
                    tracing::info!(
                        school_id = %school_id,
                        student_id = %req.student_id,
                        receipt_id = %receipt.receipt_id,
                        paid_amount = %receipt.paid_amount,
                        method = receipt.payment.name(),
                        items = receipt.items.len(),
                        attempt,
                        "Payment recorded"
                    );
                    return Ok(receipt);
                }
                Err(FeeError::ConcurrentModification(what)) => {
                    metrics::record_payment_retry();
                    tracing::warn!(
                        school_id = %school_id,
                        student_id = %req.student_id,
                        skipped_receipt_id = %receipt.receipt_id,
                        conflict = %what,
                        attempt,
                        "Payment lost a concurrent update; re-validating"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        metrics::record_payment_rejected("contention");
        Err(FeeError::ConcurrentModification(format!(
            "Payment for student {}",
            req.student_id
        )))
    }

    /// Cancels an active receipt and takes its amounts back off the
    /// installments and the donor.
    pub async fn cancel_receipt(
        &self,
        scope: &Scope,
        receipt_id: &str,
        req: CancelReceiptRequest,
    ) -> Result<FeeReceipt, FeeError> {
        let school_id = scope.school_id.as_str();
        let reason = req.reason.trim().to_string();
        if reason.is_empty() {
            return Err(FeeError::validation("A cancellation reason is required"));
        }

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut receipt = self.get_receipt(school_id, receipt_id).await?;
            if receipt.status == ReceiptStatus::Cancelled {
                return Err(FeeError::Conflict(format!(
                    "Receipt {} is already cancelled",
                    receipt_id
                )));
            }

            let installments = self
                .store
                .find_installments(&InstallmentFilter {
                    installment_ids: Some(
                        receipt.items.iter().map(|i| i.installment_id.clone()).collect(),
                    ),
                    ..InstallmentFilter::for_school(school_id)
                })
                .await?;
            let now = Utc::now();
            let reverted = payment::plan_cancellation(&receipt, installments, today(), now)?;

            let donor = match &receipt.donor_id {
                Some(donor_id) => {
                    let mut donor = self
                        .store
                        .find_donor(school_id, donor_id)
                        .await?
                        .ok_or_else(|| {
                            FeeError::Integrity(format!(
                                "Receipt {} references missing donor {}",
                                receipt_id, donor_id
                            ))
                        })?;
                    if donor.reverse(&receipt.receipt_id).is_none() {
                        tracing::warn!(
                            receipt_id = %receipt_id,
                            donor_id = %donor_id,
                            "Donor has no contribution recorded for receipt"
                        );
                    }
                    Some(donor)
                }
                None => None,
            };

            receipt.status = ReceiptStatus::Cancelled;
            receipt.cancellation = Some(Cancellation {
                reason: reason.clone(),
                cancelled_by: scope.user_id.clone(),
                cancelled_at: now,
            });

            match self
                .store
                .commit_cancellation(CancellationCommit {
                    installments: reverted,
                    receipt: receipt.clone(),
                    donor,
                })
                .await
            {
                Ok(()) => {
                    receipt.revision += 1;
                    metrics::record_receipt_cancelled(receipt.category);
                    tracing::info!(
                        school_id = %school_id,
                        receipt_id = %receipt_id,
                        paid_amount = %receipt.paid_amount,
                        cancelled_by = %scope.user_id,
                        "Receipt cancelled"
                    );
                    return Ok(receipt);
                }
                Err(FeeError::ConcurrentModification(what)) => {
                    tracing::warn!(
                        receipt_id = %receipt_id,
                        conflict = %what,
                        attempt,
                        "Cancellation lost a concurrent update; retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Err(FeeError::ConcurrentModification(format!("Receipt {}", receipt_id)))
    }

    pub async fn get_receipt(
        &self,
        school_id: &str,
        receipt_id: &str,
    ) -> Result<FeeReceipt, FeeError> {
        self.store
            .find_receipt(school_id, receipt_id)
            .await?
            .ok_or_else(|| FeeError::not_found("Receipt", receipt_id))
    }

    pub async fn list_receipts(
        &self,
        school_id: &str,
        params: ReceiptListParams,
    ) -> Result<Vec<FeeReceipt>, FeeError> {
        self.store
            .list_receipts(&ReceiptFilter {
                school_id: school_id.to_string(),
                student_id: params.student_id,
                issued_from: params.from,
                issued_to: params.to,
                include_cancelled: params.include_cancelled,
            })
            .await
    }
}
