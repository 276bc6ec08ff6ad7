use axum::{
    extract::{Path, Query, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::{
    InstallmentListParams, InstallmentResponse, SweepRequest, SweepResponse,
    UpdateInstallmentRequest,
};
use crate::middleware::TenantContext;
use crate::services::fee_service::today;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn list_installments(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(params): Query<InstallmentListParams>,
) -> Result<Json<Vec<InstallmentResponse>>, AppError> {
    let scope = state.scope(&tenant).await?;
    let installments = state.fees.list_installments(&scope, params).await?;
    Ok(Json(installments.into_iter().map(Into::into).collect()))
}

pub async fn get_installment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(installment_id): Path<String>,
) -> Result<Json<InstallmentResponse>, AppError> {
    let installment = state
        .fees
        .get_installment(&tenant.school_id, &installment_id)
        .await?;
    Ok(Json(installment.into()))
}

pub async fn update_installment_amount(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(installment_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateInstallmentRequest>,
) -> Result<Json<InstallmentResponse>, AppError> {
    tracing::info!(
        school_id = %tenant.school_id,
        installment_id = %installment_id,
        user_id = %tenant.user_id,
        "Updating installment amount"
    );
    let installment = state
        .fees
        .update_installment_amount(&tenant.school_id, &installment_id, req)
        .await?;
    Ok(Json(installment.into()))
}

/// Manual run of the due sweep for the caller's school.
pub async fn sweep_due_installments(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(req): Json<SweepRequest>,
) -> Result<Json<SweepResponse>, AppError> {
    let as_of = req.as_of.unwrap_or_else(today);
    let updated = state
        .fees
        .sweep_due_installments(Some(&tenant.school_id), as_of)
        .await?;
    Ok(Json(SweepResponse { as_of, updated }))
}
