//! Payments for the order ledger.
//!
//! The [`ReconciliationEngine`] turns confirmed payments into one atomic
//! update of the transaction, the order and the invoice. Card payments go
//! through a [`PaymentGateway`]; bank transfers are settled by a
//! super-admin after a receipt upload.

pub mod engine;
pub mod error;
pub mod gateway;
pub mod receipt;

pub use engine::{
    BankTransferDecision, PaymentInitialization, PaymentRequest, ReceiptUpload,
    ReconciliationEngine, ReconciliationReport, Settlement, SettlementConfig,
};
pub use error::{GatewayError, PaymentError, Result};
pub use gateway::{
    GatewayCheckout, GatewayStatus, GatewayVerification, InMemoryPaymentGateway, PaymentGateway,
    UnconfiguredPaymentGateway,
};
pub use receipt::ReceiptClaim;
