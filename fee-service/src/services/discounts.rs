use super::fee_service::{today, FeeService, Scope, MAX_COMMIT_ATTEMPTS};
use super::metrics;
use super::store::{DiscountCommit, InstallmentFilter};
use crate::dtos::{ApplyDiscountRequest, ApproveDiscountRequest, CreateDiscountCategoryRequest};
use crate::engine::discount::{self, Assignment, DiscountPlan, DiscountRow, RowBase};
use crate::error::FeeError;
use crate::models::{DiscountCategory, FeeStructure};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;

impl FeeService {
    pub async fn create_discount_category(
        &self,
        school_id: &str,
        req: CreateDiscountCategoryRequest,
    ) -> Result<DiscountCategory, FeeError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(FeeError::validation("Discount name is required"));
        }
        if req.budget_allocated <= Decimal::ZERO {
            return Err(FeeError::validation("Budget must be greater than zero"));
        }
        let category =
            DiscountCategory::new(school_id.to_string(), name, req.description, req.budget_allocated);
        self.store.insert_discount_category(&category).await?;

        tracing::info!(
            school_id = %school_id,
            discount_id = %category.id,
            budget = %category.budget_allocated,
            "Discount category created"
        );
        Ok(category)
    }

    pub async fn get_discount_category(
        &self,
        school_id: &str,
        discount_id: &str,
    ) -> Result<DiscountCategory, FeeError> {
        self.store
            .find_discount_category(school_id, discount_id)
            .await?
            .ok_or_else(|| FeeError::not_found("Discount category", discount_id))
    }

    pub async fn list_discount_categories(
        &self,
        school_id: &str,
    ) -> Result<Vec<DiscountCategory>, FeeError> {
        self.store.list_discount_categories(school_id).await
    }

    /// Adds students and rows to a discount.
    pub async fn apply_discount(
        &self,
        scope: &Scope,
        discount_id: &str,
        req: ApplyDiscountRequest,
    ) -> Result<DiscountCategory, FeeError> {
        self.assign(scope, discount_id, req, Assignment::Append).await
    }

    /// Makes the request the discount's complete assignment: fragments
    /// outside it are removed and the rest recomputed.
    pub async fn update_discount(
        &self,
        scope: &Scope,
        discount_id: &str,
        req: ApplyDiscountRequest,
    ) -> Result<DiscountCategory, FeeError> {
        self.assign(scope, discount_id, req, Assignment::Replace).await
    }

    pub async fn approve_discount(
        &self,
        scope: &Scope,
        discount_id: &str,
        req: ApproveDiscountRequest,
    ) -> Result<DiscountCategory, FeeError> {
        let school_id = scope.school_id.as_str();
        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let category = self.get_discount_category(school_id, discount_id).await?;
            let carriers = self.discount_carriers(school_id, discount_id).await?;
            let plan = discount::approve(&category, carriers, &req.student_ids, Utc::now())?;

            match self.commit_plan(plan, "approve").await {
                Ok(category) => {
                    tracing::info!(
                        school_id = %school_id,
                        discount_id = %discount_id,
                        students = req.student_ids.len(),
                        approved_by = %scope.user_id,
                        "Discount approved"
                    );
                    return Ok(category);
                }
                Err(FeeError::ConcurrentModification(what)) => {
                    tracing::debug!(discount_id = %discount_id, conflict = %what, "Retrying discount approval");
                }
                Err(e) => return Err(e),
            }
        }
        Err(FeeError::ConcurrentModification(format!(
            "Discount category {}",
            discount_id
        )))
    }

    async fn assign(
        &self,
        scope: &Scope,
        discount_id: &str,
        req: ApplyDiscountRequest,
        mode: Assignment,
    ) -> Result<DiscountCategory, FeeError> {
        let school_id = scope.school_id.as_str();
        let rows: Vec<DiscountRow> = req
            .rows
            .into_iter()
            .map(|r| DiscountRow {
                row_id: r.row_id,
                is_percentage: r.is_percentage,
                value: r.value,
                breakdown: r.breakdown,
            })
            .collect();
        // every row is checked before anything is read
        discount::validate_rows(&rows, &req.student_ids)?;

        let bases = self.row_bases(school_id, &rows).await?;
        let row_ids: Vec<String> = rows.iter().map(|r| r.row_id.clone()).collect();
        let operation = match mode {
            Assignment::Append => "apply",
            Assignment::Replace => "update",
        };

        for _ in 0..MAX_COMMIT_ATTEMPTS {
            let category = self.get_discount_category(school_id, discount_id).await?;
            let carriers = self.discount_carriers(school_id, discount_id).await?;
            let targets = self
                .store
                .find_installments(&InstallmentFilter {
                    row_ids: Some(row_ids.clone()),
                    student_ids: Some(req.student_ids.clone()),
                    ..InstallmentFilter::for_school(school_id)
                })
                .await?;

            let plan = discount::plan(
                &category,
                &rows,
                &bases,
                &req.student_ids,
                carriers,
                targets,
                mode,
                today(),
                Utc::now(),
            )?;
            let touched = plan.installments.len();

            match self.commit_plan(plan, operation).await {
                Ok(category) => {
                    tracing::info!(
                        school_id = %school_id,
                        discount_id = %discount_id,
                        operation,
                        installments = touched,
                        students = category.total_students,
                        budget_remaining = %category.budget_remaining,
                        user_id = %scope.user_id,
                        "Discount committed"
                    );
                    return Ok(category);
                }
                Err(FeeError::ConcurrentModification(what)) => {
                    tracing::debug!(discount_id = %discount_id, conflict = %what, "Retrying discount commit");
                }
                Err(e) => return Err(e),
            }
        }
        Err(FeeError::ConcurrentModification(format!(
            "Discount category {}",
            discount_id
        )))
    }

    async fn commit_plan(
        &self,
        plan: DiscountPlan,
        operation: &'static str,
    ) -> Result<DiscountCategory, FeeError> {
        let touched = plan.installments.len();
        let mut category = plan.category.clone();
        self.store
            .commit_discount(DiscountCommit {
                category: plan.category,
                installments: plan.installments,
            })
            .await?;
        category.revision += 1;
        metrics::record_discount_commit(operation, touched);
        Ok(category)
    }

    async fn discount_carriers(
        &self,
        school_id: &str,
        discount_id: &str,
    ) -> Result<Vec<crate::models::FeeInstallment>, FeeError> {
        self.store
            .find_installments(&InstallmentFilter {
                discount_id: Some(discount_id.to_string()),
                ..InstallmentFilter::for_school(school_id)
            })
            .await
    }

    /// Percentage bases come from each row's earliest installment.
    async fn row_bases(
        &self,
        school_id: &str,
        rows: &[DiscountRow],
    ) -> Result<HashMap<String, RowBase>, FeeError> {
        let mut structures: HashMap<String, FeeStructure> = HashMap::new();
        let mut bases = HashMap::with_capacity(rows.len());
        for row in rows {
            let anchor = self
                .store
                .find_row_anchor(school_id, &row.row_id)
                .await?
                .ok_or_else(|| FeeError::not_found("Installments for fee row", &row.row_id))?;

            if !structures.contains_key(&anchor.fee_structure_id) {
                let structure = self
                    .get_fee_structure(school_id, &anchor.fee_structure_id)
                    .await
                    .map_err(|e| match e {
                        FeeError::NotFound { .. } => FeeError::Integrity(format!(
                            "Installment {} references missing fee structure {}",
                            anchor.id, anchor.fee_structure_id
                        )),
                        other => other,
                    })?;
                structures.insert(anchor.fee_structure_id.clone(), structure);
            }
            let breakdown = structures
                .get(&anchor.fee_structure_id)
                .and_then(|s| s.row(&row.row_id))
                .map(|r| r.breakdown)
                .ok_or_else(|| FeeError::not_found("Fee row", &row.row_id))?;

            bases.insert(
                row.row_id.clone(),
                RowBase {
                    total_amount: anchor.total_amount,
                    fee_type_id: anchor.fee_type_id,
                    breakdown,
                },
            );
        }
        Ok(bases)
    }
}
