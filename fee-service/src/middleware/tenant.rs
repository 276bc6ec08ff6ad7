//! Tenant context for multi-school requests.
//!
//! The upstream gateway authenticates the caller and sets `X-School-ID`
//! and `X-User-ID`; this service trusts them as given.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

pub const SCHOOL_ID_HEADER: &str = "x-school-id";
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct TenantContext {
    pub school_id: String,
    /// Recorded as the actor on receipts, approvals and cancellations.
    pub user_id: String,
}

fn required_header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing {} header", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let school_id = required_header(parts, SCHOOL_ID_HEADER)?;
        let user_id = required_header(parts, USER_ID_HEADER)?;

        let span = tracing::Span::current();
        span.record("school_id", school_id);
        span.record("user_id", user_id);

        Ok(TenantContext {
            school_id: school_id.to_string(),
            user_id: user_id.to_string(),
        })
    }
}
