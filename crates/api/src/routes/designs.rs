//! Design upload and review endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use common::{DesignId, OrderId};
use domain::{Design, DesignDecision, NewDesign};
use ledger_store::LedgerStore;
use serde::Deserialize;

use crate::error::ApiError;
use crate::extract::{Caller, JsonBody, parse_id};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: DesignDecision,
    #[serde(default)]
    pub notes: Option<String>,
}

/// POST /orders/{id}/designs: only once the order is paid for.
#[tracing::instrument(skip(state, input), fields(user = %actor.user_id))]
pub async fn upload<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<NewDesign>,
) -> Result<ApiResponse<Design>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let design = state.orders.upload_design(&actor, order_id, input).await?;
    Ok(ApiResponse::created(
        format!("Design version {} uploaded", design.design_version),
        design,
    ))
}

/// GET /orders/{id}/designs
#[tracing::instrument(skip(state), fields(user = %actor.user_id))]
pub async fn list<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<ApiResponse<Vec<Design>>, ApiError> {
    let order_id: OrderId = parse_id(&id, "order")?;
    let designs = state.orders.list_designs(&actor, order_id).await?;
    Ok(ApiResponse::ok("Designs retrieved", designs))
}

/// POST /designs/{id}/review
#[tracing::instrument(skip(state, review), fields(user = %actor.user_id, decision = ?review.decision))]
pub async fn review<S: LedgerStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    JsonBody(review): JsonBody<ReviewRequest>,
) -> Result<ApiResponse<Design>, ApiError> {
    let design_id: DesignId = parse_id(&id, "design")?;
    let design = state
        .orders
        .review_design(&actor, design_id, review.decision, review.notes)
        .await?;
    let message = match review.decision {
        DesignDecision::Approve => "Design approved",
        DesignDecision::Reject => "Design rejected",
    };
    Ok(ApiResponse::ok(message, design))
}
