//! Payments, receipts and donors.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{
    CancelReceiptRequest, CreateDonorRequest, DonorResponse, ReceiptListParams, ReceiptResponse,
    RecordPaymentRequest,
};
use crate::middleware::TenantContext;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn record_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    ValidatedJson(req): ValidatedJson<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<ReceiptResponse>), AppError> {
    let scope = state.scope(&tenant).await?;
    let receipt = state.fees.record_payment(&scope, req).await?;
    Ok((StatusCode::CREATED, Json(receipt.into())))
}

pub async fn get_receipt(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(receipt_id): Path<String>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let receipt = state
        .fees
        .get_receipt(&tenant.school_id, &receipt_id)
        .await?;
    Ok(Json(receipt.into()))
}

pub async fn list_receipts(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(params): Query<ReceiptListParams>,
) -> Result<Json<Vec<ReceiptResponse>>, AppError> {
    let receipts = state
        .fees
        .list_receipts(&tenant.school_id, params)
        .await?;
    Ok(Json(receipts.into_iter().map(Into::into).collect()))
}

pub async fn cancel_receipt(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(receipt_id): Path<String>,
    ValidatedJson(req): ValidatedJson<CancelReceiptRequest>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let scope = state.scope(&tenant).await?;
    let receipt = state
        .fees
        .cancel_receipt(&scope, &receipt_id, req)
        .await?;
    Ok(Json(receipt.into()))
}

pub async fn create_donor(
    State(state): State<AppState>,
    tenant: TenantContext,
    ValidatedJson(req): ValidatedJson<CreateDonorRequest>,
) -> Result<(StatusCode, Json<DonorResponse>), AppError> {
    let donor = state.fees.create_donor(&tenant.school_id, req).await?;
    Ok((StatusCode::CREATED, Json(donor.into())))
}

pub async fn get_donor(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(donor_id): Path<String>,
) -> Result<Json<DonorResponse>, AppError> {
    let donor = state.fees.get_donor(&tenant.school_id, &donor_id).await?;
    Ok(Json(donor.into()))
}
