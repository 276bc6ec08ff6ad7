use super::fee_service::{today, FeeService, Scope, MAX_COMMIT_ATTEMPTS};
use super::metrics;
use super::store::InstallmentFilter;
use crate::dtos::{InstallmentListParams, UpdateInstallmentRequest};
use crate::error::FeeError;
use crate::models::FeeInstallment;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;

impl FeeService {
    pub async fn list_installments(
        &self,
        scope: &Scope,
        params: InstallmentListParams,
    ) -> Result<Vec<FeeInstallment>, FeeError> {
        self.store
            .find_installments(&InstallmentFilter {
                academic_year_id: Some(scope.academic_year_id().to_string()),
                student_id: params.student_id,
                section_id: params.section_id,
                fee_structure_id: params.fee_structure_id,
                status: params.status,
                due_on_or_before: params.due_on_or_before,
                ..InstallmentFilter::for_school(&scope.school_id)
            })
            .await
    }

    pub async fn get_installment(
        &self,
        school_id: &str,
        installment_id: &str,
    ) -> Result<FeeInstallment, FeeError> {
        self.store
            .find_installment(school_id, installment_id)
            .await?
            .ok_or_else(|| FeeError::not_found("Installment", installment_id))
    }

    /// Administrative correction of an installment's gross amount.
    ///
    /// Discounts stay attached; the net amount is recomputed and must still
    /// cover what has already been paid.
    pub async fn update_installment_amount(
        &self,
        school_id: &str,
        installment_id: &str,
        req: UpdateInstallmentRequest,
    ) -> Result<FeeInstallment, FeeError> {
        if req.total_amount < Decimal::ZERO {
            return Err(FeeError::validation("Total amount cannot be negative"));
        }

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let mut inst = self.get_installment(school_id, installment_id).await?;
            let previous = inst.total_amount;

            inst.total_amount = req.total_amount;
            inst.recompute_net();
            if inst.net_amount < Decimal::ZERO {
                return Err(FeeError::validation(format!(
                    "Total amount {} is below the discounts of {} already applied",
                    req.total_amount, inst.total_discount_amount
                )));
            }
            if inst.paid_amount > inst.net_amount {
                return Err(FeeError::Conflict(format!(
                    "Net amount {} would fall below the {} already paid",
                    inst.net_amount, inst.paid_amount
                )));
            }
            inst.resettle(today());
            inst.updated_at = Utc::now();

            match self.store.replace_installment(&inst).await {
                Ok(()) => {
                    inst.revision += 1;
                    tracing::info!(
                        school_id = %school_id,
                        installment_id = %installment_id,
                        previous = %previous,
                        total_amount = %inst.total_amount,
                        net_amount = %inst.net_amount,
                        status = inst.status.as_str(),
                        "Installment amount updated"
                    );
                    return Ok(inst);
                }
                Err(FeeError::ConcurrentModification(_)) => {
                    tracing::debug!(installment_id = %installment_id, attempt, "Retrying amount update");
                }
                Err(e) => return Err(e),
            }
        }
        Err(FeeError::ConcurrentModification(format!(
            "Installment {}",
            installment_id
        )))
    }

    /// Moves upcoming installments due on or before `as_of` to `Due`.
    /// `None` sweeps every school.
    pub async fn sweep_due_installments(
        &self,
        school_id: Option<&str>,
        as_of: NaiveDate,
    ) -> Result<u64, FeeError> {
        let updated = self.store.sweep_due(school_id, as_of).await?;
        metrics::record_sweep(updated);
        tracing::info!(
            school_id = school_id.unwrap_or("*"),
            as_of = %as_of,
            updated,
            "Due sweep finished"
        );
        Ok(updated)
    }
}
