//! Invoice endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use common::{InvoiceId, OrderId};
use domain::{Invoice, NewInvoice, Transaction};
use ledger_store::LedgerStore;
use payments::ReconciliationReport;

use crate::error::ApiError;
use crate::extract::{Caller, JsonBody, parse_id};
use crate::response::ApiResponse;
use crate::state::AppState;

/// POST /orders/{id}/invoice
#[tracing::instrument(skip(state, input), fields(user = %actor.user_id))]
pub async fn create<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<NewInvoice>,
) -> Result<ApiResponse<Invoice>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let invoice = state.invoices.create_invoice(&actor, order_id, input).await?;
    Ok(ApiResponse::created(
        format!("Invoice {} created", invoice.invoice_number),
        invoice,
    ))
}

/// GET /orders/{id}/invoice
#[tracing::instrument(skip(state), fields(user = %actor.user_id))]
pub async fn get_for_order<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<ApiResponse<Invoice>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let invoice = state.invoices.get_invoice_for_order(&actor, order_id).await?;
    Ok(ApiResponse::ok("Invoice retrieved", invoice))
}

/// GET /invoices/{id}
#[tracing::instrument(skip(state), fields(user = %actor.user_id))]
pub async fn get<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<ApiResponse<Invoice>, ApiError> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let invoice = state.invoices.get_invoice(&actor, invoice_id).await?;
    Ok(ApiResponse::ok("Invoice retrieved", invoice))
}

/// DELETE /invoices/{id}: drafts only.
#[tracing::instrument(skip(state), fields(user = %actor.user_id))]
pub async fn delete<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, ApiError> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    state.invoices.delete_invoice(&actor, invoice_id).await?;
    Ok(ApiResponse::message("Invoice deleted"))
}

/// GET /invoices/{id}/transactions
#[tracing::instrument(skip(state), fields(user = %actor.user_id))]
pub async fn transactions<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<Transaction>>, ApiError> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let transactions = state.invoices.list_transactions(&actor, invoice_id).await?;
    Ok(ApiResponse::ok("Transactions retrieved", transactions))
}

/// POST /invoices/{id}/reconcile: replay settled transactions onto the ledger.
#[tracing::instrument(skip(state), fields(user = %actor.user_id))]
pub async fn reconcile<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<ApiResponse<ReconciliationReport>, ApiError> {
    let invoice_id: InvoiceId = parse_id(&id, "invoice")?;
    let report = state.payments.reconcile(&actor, invoice_id).await?;
    let message = if report.drift_detected {
        "Ledger drift repaired"
    } else {
        "Ledger is consistent"
    };
    Ok(ApiResponse::ok(message, report))
}
