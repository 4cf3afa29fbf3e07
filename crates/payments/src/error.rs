//! Payment error types.

use common::ErrorKind;
use domain::DomainError;
use ledger_store::StoreError;
use thiserror::Error;

/// Errors returned by the payment gateway port.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway could not be reached or answered with a server error.
    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    /// The gateway refused the request.
    #[error("gateway rejected the request: {0}")]
    Rejected(String),
}

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Ledger rule or persistence failure.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The gateway failed or did not answer in time.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),
}

impl PaymentError {
    /// Returns the stable classification clients branch on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::Domain(e) => e.kind(),
            PaymentError::GatewayUnavailable(_) => ErrorKind::GatewayUnavailable,
        }
    }
}

impl From<GatewayError> for PaymentError {
    fn from(e: GatewayError) -> Self {
        PaymentError::GatewayUnavailable(e.to_string())
    }
}

impl From<StoreError> for PaymentError {
    fn from(e: StoreError) -> Self {
        PaymentError::Domain(e.into())
    }
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
