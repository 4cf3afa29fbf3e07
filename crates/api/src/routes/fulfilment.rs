//! Shipping, brief and feedback endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use common::OrderId;
use domain::{Brief, NewBrief, NewFeedback, Shipping, ShippingDetails};
use ledger_store::LedgerStore;

use crate::error::ApiError;
use crate::extract::{Caller, JsonBody, parse_id};
use crate::response::ApiResponse;
use crate::state::AppState;

/// POST /orders/{id}/shipping
#[tracing::instrument(skip(state, details), fields(user = %actor.user_id))]
pub async fn create_shipping<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    JsonBody(details): JsonBody<ShippingDetails>,
) -> Result<ApiResponse<Shipping>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let shipping = state.orders.create_shipping(&actor, order_id, details).await?;
    Ok(ApiResponse::created("Shipping created", shipping))
}

/// POST /orders/{id}/briefs
#[tracing::instrument(skip(state, input), fields(user = %actor.user_id))]
pub async fn post_brief<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<NewBrief>,
) -> Result<ApiResponse<Brief>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let brief = state.orders.post_brief(&actor, order_id, input).await?;
    Ok(ApiResponse::created("Brief posted", brief))
}

/// GET /orders/{id}/briefs
#[tracing::instrument(skip(state), fields(user = %actor.user_id))]
pub async fn list_briefs<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<Brief>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let briefs = state.orders.list_briefs(&actor, order_id).await?;
    Ok(ApiResponse::ok("Briefs retrieved", briefs))
}

/// POST /orders/{id}/feedback: the customer's rating once the order is done.
#[tracing::instrument(skip(state, input), fields(user = %actor.user_id, rating = input.rating))]
pub async fn submit_feedback<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<NewFeedback>,
) -> Result<ApiResponse<Brief>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let feedback = state.orders.submit_feedback(&actor, order_id, input).await?;
    Ok(ApiResponse::created("Feedback submitted", feedback))
}
