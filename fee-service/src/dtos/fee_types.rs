use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFeeTypeRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeeTypeResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
}

impl From<crate::models::FeeType> for FeeTypeResponse {
    fn from(fee_type: crate::models::FeeType) -> Self {
        Self {
            id: fee_type.id,
            name: fee_type.name,
            description: fee_type.description,
            created_at: fee_type.created_at.to_rfc3339(),
        }
    }
}
