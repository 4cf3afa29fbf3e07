//! Card payment and bank-transfer receipt endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use common::TransactionId;
use domain::{InvoiceStatus, Money, Transaction, TransactionStatus, TransactionType};
use ledger_store::LedgerStore;
use payments::{
    BankTransferDecision, PaymentInitialization, PaymentRequest, ReceiptUpload, Settlement,
};
use serde::Serialize;

use crate::error::ApiError;
use crate::extract::{Caller, JsonBody, parse_id};
use crate::response::ApiResponse;
use crate::state::AppState;

/// POST /payments/initialize: open a card checkout for an invoice.
#[tracing::instrument(skip(state, request), fields(user = %actor.user_id, invoice = %request.invoice_id))]
pub async fn initialize<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    JsonBody(request): JsonBody<PaymentRequest>,
) -> Result<ApiResponse<PaymentInitialization>, ApiError> {
    let initialization = state.payments.initialize_payment(&actor, request).await?;
    Ok(ApiResponse::created("Payment initialized", initialization))
}

/// Settlement summary returned to an anonymous caller.
///
/// Carries no order or customer details.
#[derive(Debug, Serialize)]
pub struct PaymentOutcome {
    pub reference: String,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub invoice_status: InvoiceStatus,
}

impl From<&Settlement> for PaymentOutcome {
    fn from(settlement: &Settlement) -> Self {
        Self {
            reference: settlement.transaction.reference.clone(),
            status: settlement.transaction.status,
            transaction_type: settlement.transaction.transaction_type,
            amount: settlement.transaction.amount,
            invoice_status: settlement.invoice.status,
        }
    }
}

/// GET /payments/verify/{reference}
///
/// Reached from the gateway redirect, so no caller identity is required;
/// the outcome comes from the gateway, not the request.
#[tracing::instrument(skip(state))]
pub async fn verify<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(reference): Path<String>,
) -> Result<ApiResponse<PaymentOutcome>, ApiError> {
    let settlement = state.payments.verify_payment(&reference).await?;
    Ok(ApiResponse::ok(
        settlement_message(&settlement),
        PaymentOutcome::from(&settlement),
    ))
}

/// POST /payments/receipts: record a bank transfer for review.
#[tracing::instrument(skip(state, upload), fields(user = %actor.user_id, invoice = %upload.invoice_id))]
pub async fn upload_receipt<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    JsonBody(upload): JsonBody<ReceiptUpload>,
) -> Result<ApiResponse<Transaction>, ApiError> {
    let transaction = state.payments.upload_receipt(&actor, upload).await?;
    Ok(ApiResponse::created(
        "Receipt uploaded and awaiting verification",
        transaction,
    ))
}

/// POST /payments/receipts/{transaction_id}/verify: approve or reject a transfer.
#[tracing::instrument(skip(state, decision), fields(user = %actor.user_id))]
pub async fn verify_receipt<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    JsonBody(decision): JsonBody<BankTransferDecision>,
) -> Result<ApiResponse<Settlement>, ApiError> {
    let transaction_id: TransactionId = parse_id(&id, "transaction")?;
    let settlement = state
        .payments
        .verify_bank_transfer(&actor, transaction_id, decision)
        .await?;
    Ok(ApiResponse::ok(settlement_message(&settlement), settlement))
}

fn settlement_message(settlement: &Settlement) -> &'static str {
    match settlement.transaction.status {
        TransactionStatus::Completed => "Payment settled",
        _ => "Payment failed",
    }
}
