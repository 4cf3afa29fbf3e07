//! HTTP API server with observability for the order ledger.
//!
//! Provides REST endpoints for orders, invoices, payments, designs and
//! fulfilment, with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod response;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use ledger_store::LedgerStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::{Config, GatewayMode, LogFormat};
pub use error::ApiError;
pub use state::{AppState, SharedGateway, create_default_state, create_state};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: LedgerStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", patch(routes::orders::update_status::<S>))
        .route(
            "/orders/{id}/invoice",
            post(routes::invoices::create::<S>).get(routes::invoices::get_for_order::<S>),
        )
        .route(
            "/orders/{id}/designs",
            post(routes::designs::upload::<S>).get(routes::designs::list::<S>),
        )
        .route(
            "/orders/{id}/shipping",
            post(routes::fulfilment::create_shipping::<S>),
        )
        .route(
            "/orders/{id}/briefs",
            post(routes::fulfilment::post_brief::<S>).get(routes::fulfilment::list_briefs::<S>),
        )
        .route(
            "/orders/{id}/feedback",
            post(routes::fulfilment::submit_feedback::<S>),
        )
        .route(
            "/invoices/{id}",
            get(routes::invoices::get::<S>).delete(routes::invoices::delete::<S>),
        )
        .route(
            "/invoices/{id}/transactions",
            get(routes::invoices::transactions::<S>),
        )
        .route(
            "/invoices/{id}/reconcile",
            post(routes::invoices::reconcile::<S>),
        )
        .route("/payments/initialize", post(routes::payments::initialize::<S>))
        .route(
            "/payments/verify/{reference}",
            get(routes::payments::verify::<S>),
        )
        .route("/payments/receipts", post(routes::payments::upload_receipt::<S>))
        .route(
            "/payments/receipts/{id}/verify",
            post(routes::payments::verify_receipt::<S>),
        )
        .route("/designs/{id}/review", post(routes::designs::review::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
