//! API server entry point.

use std::sync::Arc;

use api::{Config, LogFormat};
use ledger_store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore};
use metrics_exporter_prometheus::PrometheusHandle;
use notifications::{BroadcastNotificationPort, LoggingEmailSender, NotificationDispatcher};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Builds the notification fan-out.
///
/// No socket transport runs in this process, so real-time messages are
/// relayed to the debug log.
fn notifier(config: &Config) -> NotificationDispatcher {
    let port = BroadcastNotificationPort::default();
    let mut messages = port.subscribe();
    tokio::spawn(async move {
        loop {
            match messages.recv().await {
                Ok(message) => {
                    tracing::debug!(room = %message.room, event = %message.event, "real-time message");
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "real-time relay lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    NotificationDispatcher::new(
        Arc::new(port),
        Arc::new(LoggingEmailSender),
        config.admin_room.clone(),
    )
}

async fn serve<S: LedgerStore + Clone + 'static>(
    store: S,
    config: &Config,
    metrics_handle: PrometheusHandle,
) -> Result<(), BoxError> {
    let notifier = notifier(config);
    let state = api::create_default_state(store, config, notifier.clone());
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let queued notifications drain before exit.
    notifier.wait_idle().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Pick the ledger store and serve
    match &config.database_url {
        Some(url) => {
            let store = PostgresLedgerStore::connect(url).await?;
            store.run_migrations().await?;
            tracing::info!("using PostgreSQL ledger store");
            serve(store, &config, metrics_handle).await?;
        }
        None => {
            tracing::warn!("DATABASE_URL is not set, using the in-memory ledger store");
            serve(InMemoryLedgerStore::new(), &config, metrics_handle).await?;
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
