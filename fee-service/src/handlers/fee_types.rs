use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::dtos::{CreateFeeTypeRequest, FeeTypeResponse};
use crate::middleware::TenantContext;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn create_fee_type(
    State(state): State<AppState>,
    tenant: TenantContext,
    ValidatedJson(req): ValidatedJson<CreateFeeTypeRequest>,
) -> Result<(StatusCode, Json<FeeTypeResponse>), AppError> {
    let fee_type = state.fees.create_fee_type(&tenant.school_id, req).await?;
    Ok((StatusCode::CREATED, Json(fee_type.into())))
}

pub async fn list_fee_types(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<FeeTypeResponse>>, AppError> {
    let fee_types = state.fees.list_fee_types(&tenant.school_id).await?;
    Ok(Json(fee_types.into_iter().map(Into::into).collect()))
}
