//! Order placement, listing and status endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use common::{OrderId, UserId};
use domain::{NewOrder, Order, OrderFilter, OrderStatus, Page, PageRequest, PaymentStatus};
use ledger_store::LedgerStore;
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::{Caller, JsonBody, QueryParams, parse_id};
use crate::response::ApiResponse;
use crate::state::AppState;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub user_id: Option<UserId>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl From<ListOrdersQuery> for OrderFilter {
    fn from(query: ListOrdersQuery) -> Self {
        let defaults = PageRequest::default();
        OrderFilter {
            status: query.status,
            payment_status: query.payment_status,
            user_id: query.user_id,
            page: PageRequest::new(
                query.page.unwrap_or(defaults.page),
                query.per_page.unwrap_or(defaults.per_page),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
}

// -- Handlers --

/// POST /orders: place an order.
#[tracing::instrument(skip(state, input), fields(user = %actor.user_id))]
pub async fn create<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    JsonBody(input): JsonBody<NewOrder>,
) -> Result<ApiResponse<Order>, ApiError> {
    let order = state.orders.create_order(&actor, input).await?;
    Ok(ApiResponse::created("Order created", order))
}

/// GET /orders: one page of orders, newest first.
#[tracing::instrument(skip(state, query), fields(user = %actor.user_id))]
pub async fn list<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    QueryParams(query): QueryParams<ListOrdersQuery>,
) -> Result<ApiResponse<Page<Order>>, ApiError> {
    let page = state.orders.list_orders(&actor, query.into()).await?;
    Ok(ApiResponse::ok("Orders retrieved", page))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state), fields(user = %actor.user_id))]
pub async fn get<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<ApiResponse<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state.orders.get_order(&actor, order_id).await?;
    Ok(ApiResponse::ok("Order retrieved", order))
}

/// PATCH /orders/{id}/status: move an order along its lifecycle.
#[tracing::instrument(skip(state, update), fields(user = %actor.user_id, to = %update.status))]
pub async fn update_status<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    JsonBody(update): JsonBody<StatusUpdate>,
) -> Result<ApiResponse<Order>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let order = state
        .orders
        .transition_status(&actor, order_id, update.status)
        .await?;
    Ok(ApiResponse::ok(
        format!("Order status updated to {}", order.status),
        order,
    ))
}
