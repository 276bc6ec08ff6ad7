use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{
    CreateFeeStructureRequest, FeeStructureResponse, StructureAuditResponse,
    UpdateFeeStructureRequest,
};
use crate::middleware::TenantContext;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Responds `202 Accepted`: installments are written in the background and
/// the structure's `materialization` block tracks progress.
pub async fn create_fee_structure(
    State(state): State<AppState>,
    tenant: TenantContext,
    ValidatedJson(req): ValidatedJson<CreateFeeStructureRequest>,
) -> Result<(StatusCode, Json<FeeStructureResponse>), AppError> {
    let scope = state.scope(&tenant).await?;
    let structure = state.fees.create_fee_structure(&scope, req).await?;
    Ok((StatusCode::ACCEPTED, Json(structure.into())))
}

pub async fn update_fee_structure(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(structure_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateFeeStructureRequest>,
) -> Result<(StatusCode, Json<FeeStructureResponse>), AppError> {
    let scope = state.scope(&tenant).await?;
    let structure = state
        .fees
        .update_fee_structure(&scope, &structure_id, req)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(structure.into())))
}

pub async fn get_fee_structure(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(structure_id): Path<String>,
) -> Result<Json<FeeStructureResponse>, AppError> {
    let structure = state
        .fees
        .get_fee_structure(&tenant.school_id, &structure_id)
        .await?;
    Ok(Json(structure.into()))
}

pub async fn list_fee_structures(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<FeeStructureResponse>>, AppError> {
    let scope = state.scope(&tenant).await?;
    let structures = state.fees.list_fee_structures(&scope).await?;
    Ok(Json(structures.into_iter().map(Into::into).collect()))
}

pub async fn retry_materialization(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(structure_id): Path<String>,
) -> Result<(StatusCode, Json<FeeStructureResponse>), AppError> {
    let structure = state
        .fees
        .retry_materialization(&tenant.school_id, &structure_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(structure.into())))
}

pub async fn audit_structure(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(structure_id): Path<String>,
) -> Result<Json<StructureAuditResponse>, AppError> {
    Ok(Json(
        state
            .fees
            .audit_structure(&tenant.school_id, &structure_id)
            .await?,
    ))
}
