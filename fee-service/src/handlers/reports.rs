use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::{CollectionParams, CollectionSummary, DuesReport, DuesReportParams};
use crate::middleware::TenantContext;
use crate::startup::AppState;

pub async fn dues_report(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(params): Query<DuesReportParams>,
) -> Result<Json<DuesReport>, AppError> {
    let scope = state.scope(&tenant).await?;
    Ok(Json(state.fees.dues_report(&scope, params).await?))
}

pub async fn collection_summary(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(params): Query<CollectionParams>,
) -> Result<Json<CollectionSummary>, AppError> {
    Ok(Json(
        state
            .fees
            .collection_summary(&tenant.school_id, params)
            .await?,
    ))
}
