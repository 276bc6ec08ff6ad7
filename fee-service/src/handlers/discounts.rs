use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::dtos::{
    ApplyDiscountRequest, ApproveDiscountRequest, CreateDiscountCategoryRequest,
    DiscountCategoryResponse,
};
use crate::middleware::TenantContext;
use crate::startup::AppState;
use crate::utils::ValidatedJson;

pub async fn create_discount_category(
    State(state): State<AppState>,
    tenant: TenantContext,
    ValidatedJson(req): ValidatedJson<CreateDiscountCategoryRequest>,
) -> Result<(StatusCode, Json<DiscountCategoryResponse>), AppError> {
    let category = state
        .fees
        .create_discount_category(&tenant.school_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(category.into())))
}

pub async fn list_discount_categories(
    State(state): State<AppState>,
    tenant: TenantContext,
) -> Result<Json<Vec<DiscountCategoryResponse>>, AppError> {
    let categories = state
        .fees
        .list_discount_categories(&tenant.school_id)
        .await?;
    Ok(Json(categories.into_iter().map(Into::into).collect()))
}

pub async fn get_discount_category(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(discount_id): Path<String>,
) -> Result<Json<DiscountCategoryResponse>, AppError> {
    let category = state
        .fees
        .get_discount_category(&tenant.school_id, &discount_id)
        .await?;
    Ok(Json(category.into()))
}

/// Attaches the category to additional students and rows.
pub async fn apply_discount(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(discount_id): Path<String>,
    ValidatedJson(req): ValidatedJson<ApplyDiscountRequest>,
) -> Result<Json<DiscountCategoryResponse>, AppError> {
    let scope = state.scope(&tenant).await?;
    let category = state.fees.apply_discount(&scope, &discount_id, req).await?;
    Ok(Json(category.into()))
}

/// Replaces the category's assignment wholesale.
pub async fn update_discount(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(discount_id): Path<String>,
    ValidatedJson(req): ValidatedJson<ApplyDiscountRequest>,
) -> Result<Json<DiscountCategoryResponse>, AppError> {
    let scope = state.scope(&tenant).await?;
    let category = state.fees.update_discount(&scope, &discount_id, req).await?;
    Ok(Json(category.into()))
}

pub async fn approve_discount(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(discount_id): Path<String>,
    ValidatedJson(req): ValidatedJson<ApproveDiscountRequest>,
) -> Result<Json<DiscountCategoryResponse>, AppError> {
    let scope = state.scope(&tenant).await?;
    let category = state
        .fees
        .approve_discount(&scope, &discount_id, req)
        .await?;
    Ok(Json(category.into()))
}
