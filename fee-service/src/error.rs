use rust_decimal::Decimal;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeeError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} named '{name}' already exists")]
    DuplicateName { entity: &'static str, name: String },

    #[error("Overpayment for fee type '{fee_type}': outstanding {outstanding}, submitted {submitted}")]
    Overpayment {
        fee_type: String,
        outstanding: Decimal,
        submitted: Decimal,
    },

    #[error("Insufficient concession budget: remaining {remaining}, required {required}")]
    InsufficientBudget { remaining: Decimal, required: Decimal },

    #[error("Student {student_id} has payments recorded against this fee structure")]
    StudentHasPayments { student_id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0} was modified concurrently; retry the operation")]
    ConcurrentModification(String),

    #[error("Ledger integrity error: {0}")]
    Integrity(String),

    #[error("Store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl FeeError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        FeeError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        FeeError::Validation(message.into())
    }

    /// Failures worth retrying with the same input.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FeeError::Store(_) | FeeError::ConcurrentModification(_)
        )
    }
}

impl From<mongodb::error::Error> for FeeError {
    fn from(err: mongodb::error::Error) -> Self {
        if err.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR) {
            return FeeError::ConcurrentModification(format!("Transaction ({})", err));
        }
        FeeError::Store(anyhow::Error::new(err))
    }
}

impl From<mongodb::bson::ser::Error> for FeeError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        FeeError::Store(anyhow::Error::new(err))
    }
}

impl From<FeeError> for AppError {
    fn from(err: FeeError) -> Self {
        match err {
            FeeError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            e @ FeeError::NotFound { .. } => AppError::NotFound(anyhow::anyhow!(e.to_string())),
            e @ (FeeError::DuplicateName { .. }
            | FeeError::Overpayment { .. }
            | FeeError::InsufficientBudget { .. }
            | FeeError::StudentHasPayments { .. }
            | FeeError::Conflict(_)
            | FeeError::ConcurrentModification(_)) => {
                AppError::Conflict(anyhow::anyhow!(e.to_string()))
            }
            FeeError::Integrity(msg) => AppError::Integrity(anyhow::anyhow!(msg)),
            FeeError::Store(e) => AppError::DatabaseError(e),
        }
    }
}
