use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Datelike;
use service_core::error::AppError;

use crate::dtos::{CreateFeeScheduleRequest, FeeScheduleResponse, UpdateFeeScheduleRequest};
use crate::middleware::TenantContext;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

/// Schedules without an explicit year are anchored on the year the active
/// academic year starts in.
pub async fn create_fee_schedule(
    State(state): State<AppState>,
    tenant: TenantContext,
    ValidatedJson(req): ValidatedJson<CreateFeeScheduleRequest>,
) -> Result<(StatusCode, Json<FeeScheduleResponse>), AppError> {
    let year = state.academic_years.resolve(&tenant.school_id).await?;
    let schedule = state
        .fees
        .create_fee_schedule(&tenant.school_id, year.starts_on.year(), req)
        .await?;
    Ok((StatusCode::CREATED, Json(schedule.into())))
}

pub async fn update_fee_schedule(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(schedule_id): Path<String>,
    ValidatedJson(req): ValidatedJson<UpdateFeeScheduleRequest>,
) -> Result<Json<FeeScheduleResponse>, AppError> {
    let year = state.academic_years.resolve(&tenant.school_id).await?;
    let schedule = state
        .fees
        .update_fee_schedule(&tenant.school_id, &schedule_id, year.starts_on.year(), req)
        .await?;
    Ok(Json(schedule.into()))
}

pub async fn get_fee_schedule(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(schedule_id): Path<String>,
) -> Result<Json<FeeScheduleResponse>, AppError> {
    let schedule = state
        .fees
        .get_fee_schedule(&tenant.school_id, &schedule_id)
        .await?;
    Ok(Json(schedule.into()))
}

pub async fn list_fee_schedules(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<FeeScheduleResponse>>, AppError> {
    let schedules = state.fees.list_fee_schedules(&tenant.school_id).await?;
    Ok(Json(schedules.into_iter().map(Into::into).collect()))
}
