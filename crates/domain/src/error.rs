//! Domain error types.

use common::ErrorKind;
use ledger_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

use crate::money::Money;
use crate::order::OrderStatus;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A referenced document does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The document being created already exists.
    #[error("{0}")]
    AlreadyExists(String),

    /// The transition table has no such edge.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The order is not in a status that allows the operation.
    #[error("{0}")]
    InvalidOrderState(String),

    /// The order's payment policy has not been satisfied yet.
    #[error("{0}")]
    PaymentRequired(String),

    /// A payment amount differs from the amount the invoice expects.
    #[error("Amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: Money, actual: Money },

    /// The transaction has already been settled.
    #[error("Transaction {reference} has already been processed")]
    AlreadyProcessed { reference: String },

    /// The caller's role or ownership does not permit the operation.
    #[error("{0}")]
    Unauthorized(String),

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// A concurrent writer changed the document first.
    #[error("{kind} {id} was modified concurrently, retry the request")]
    Conflict { kind: String, id: Uuid },

    /// An error occurred in the ledger store.
    #[error("Ledger store error: {0}")]
    Store(StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        DomainError::Unauthorized(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        DomainError::InvalidOrderState(message.into())
    }

    /// Returns the stable classification clients branch on.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            DomainError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            DomainError::InvalidOrderState(_) => ErrorKind::InvalidOrderState,
            DomainError::PaymentRequired(_) => ErrorKind::PaymentRequired,
            DomainError::AmountMismatch { .. } => ErrorKind::AmountMismatch,
            DomainError::AlreadyProcessed { .. } => ErrorKind::AlreadyProcessed,
            DomainError::Unauthorized(_) => ErrorKind::Unauthorized,
            DomainError::Validation(_) => ErrorKind::ValidationError,
            DomainError::Conflict { .. } => ErrorKind::Conflict,
            DomainError::Store(_) | DomainError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if a concurrent writer caused the failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, DomainError::Conflict { .. })
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ConcurrencyConflict { kind, id, .. } => DomainError::Conflict { kind, id },
            StoreError::AlreadyExists { kind, id } => {
                DomainError::AlreadyExists(format!("{kind} {id} already exists"))
            }
            StoreError::DocumentNotFound { kind, id } => DomainError::NotFound {
                kind: document_kind(&kind),
                id: id.to_string(),
            },
            other => DomainError::Store(other),
        }
    }
}

fn document_kind(kind: &str) -> &'static str {
    match kind {
        "Order" => "Order",
        "Invoice" => "Invoice",
        "Transaction" => "Transaction",
        "Design" => "Design",
        "Shipping" => "Shipping",
        "Brief" => "Brief",
        _ => "Document",
    }
}
