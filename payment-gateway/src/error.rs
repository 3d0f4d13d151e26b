//! Errors raised by the payment core.
//!
//! Expected business and provider failures are not errors: strategies report
//! them as `Failed` responses. These variants cover configuration problems,
//! contract misuse and storage faults.

use crate::models::GatewayType;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Payment gateway '{0}' is disabled")]
    Disabled(GatewayType),

    #[error("Payment gateway '{gateway}' is missing {field}")]
    MissingCredentials {
        gateway: GatewayType,
        field: &'static str,
    },

    #[error("Payment gateway '{gateway}' does not support {operation}")]
    UnsupportedOperation {
        gateway: GatewayType,
        operation: &'static str,
    },

    #[error("{0} is not implemented")]
    NotImplemented(String),

    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl GatewayError {
    /// Configuration faults are detected before any network or storage call.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GatewayError::Disabled(_) | GatewayError::MissingCredentials { .. }
        )
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Disabled(_) | GatewayError::MissingCredentials { .. } => {
                AppError::ServiceUnavailable(err.to_string())
            }
            GatewayError::UnsupportedOperation { .. } | GatewayError::InvalidRequest(_) => {
                AppError::BadRequest(anyhow::anyhow!(err.to_string()))
            }
            GatewayError::NotImplemented(what) => AppError::NotImplemented(what),
            GatewayError::NotFound(what) => AppError::NotFound(anyhow::anyhow!(what)),
            GatewayError::Conflict(what) => AppError::Conflict(anyhow::anyhow!(what)),
            GatewayError::Storage(e) => AppError::DatabaseError(e),
        }
    }
}
