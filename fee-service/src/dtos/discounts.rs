use crate::models::{ClassDiscount, DiscountCategory};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDiscountCategoryRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom(function = "super::positive_amount"))]
    pub budget_allocated: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DiscountRowRequest {
    #[validate(length(min = 1, message = "row_id is required"))]
    pub row_id: String,
    pub is_percentage: bool,
    #[validate(custom(function = "super::positive_amount"))]
    pub value: Decimal,
    pub breakdown: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApplyDiscountRequest {
    #[validate(length(min = 1, message = "At least one fee row is required"), nested)]
    pub rows: Vec<DiscountRowRequest>,
    #[validate(length(min = 1, message = "At least one student is required"))]
    pub student_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApproveDiscountRequest {
    #[validate(length(min = 1, message = "At least one student is required"))]
    pub student_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiscountCategoryResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub budget_allocated: Decimal,
    pub budget_remaining: Decimal,
    pub budget_used: Decimal,
    pub class_list: Vec<ClassDiscount>,
    pub total_students: i64,
    pub total_approved: i64,
    pub total_pending: i64,
    pub updated_at: String,
}

impl From<DiscountCategory> for DiscountCategoryResponse {
    fn from(category: DiscountCategory) -> Self {
        let budget_used = category.budget_used();
        Self {
            id: category.id,
            name: category.name,
            description: category.description,
            budget_allocated: category.budget_allocated,
            budget_remaining: category.budget_remaining,
            budget_used,
            class_list: category.class_list,
            total_students: category.total_students,
            total_approved: category.total_approved,
            total_pending: category.total_pending,
            updated_at: category.updated_at.to_rfc3339(),
        }
    }
}
