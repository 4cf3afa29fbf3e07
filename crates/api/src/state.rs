//! Shared application state.

use std::sync::Arc;

use domain::{InvoiceService, OrderService};
use ledger_store::LedgerStore;
use notifications::NotificationDispatcher;
use payments::{
    InMemoryPaymentGateway, PaymentGateway, ReconciliationEngine, SettlementConfig,
    UnconfiguredPaymentGateway,
};

use crate::config::{Config, GatewayMode};

/// Card gateway shared by every request.
pub type SharedGateway = Arc<dyn PaymentGateway>;

/// Shared application state accessible from all handlers.
pub struct AppState<S: LedgerStore> {
    pub orders: OrderService<S>,
    pub invoices: InvoiceService<S>,
    pub payments: ReconciliationEngine<S, SharedGateway>,
    pub notifier: NotificationDispatcher,
}

/// Creates the application state over `store` with the gateway `config` selects.
pub fn create_default_state<S: LedgerStore + Clone + 'static>(
    store: S,
    config: &Config,
    notifier: NotificationDispatcher,
) -> Arc<AppState<S>> {
    create_state(store, gateway_for(config.payment_gateway), config, notifier)
}

/// Creates the application state with an explicit gateway instance.
pub fn create_state<S: LedgerStore + Clone + 'static>(
    store: S,
    gateway: SharedGateway,
    config: &Config,
    notifier: NotificationDispatcher,
) -> Arc<AppState<S>> {
    let orders = OrderService::new(store.clone(), notifier.clone());
    let invoices = InvoiceService::new(store.clone(), notifier.clone())
        .with_deposit_percent(config.deposit_percent);
    let payments = ReconciliationEngine::new(store, gateway, notifier.clone()).with_config(
        SettlementConfig {
            gateway_timeout: config.gateway_timeout,
            max_retries: config.settlement_max_retries,
        },
    );

    Arc::new(AppState {
        orders,
        invoices,
        payments,
        notifier,
    })
}

fn gateway_for(mode: GatewayMode) -> SharedGateway {
    match mode {
        GatewayMode::Disabled => {
            tracing::info!("No payment gateway configured, card payments are unavailable");
            Arc::new(UnconfiguredPaymentGateway)
        }
        GatewayMode::Sandbox => {
            tracing::warn!("Sandbox payment gateway approves every card payment");
            Arc::new(InMemoryPaymentGateway::new())
        }
    }
}
