//! Bus tracker service binary

use std::sync::Arc;

use bus_tracker::api::{self, AppState};
use bus_tracker::config::AppConfig;
use bus_tracker::errors::TrackerError;
use bus_tracker::monitor::StalenessMonitor;
use bus_tracker::realtime::Hub;
use bus_tracker::store::{LocationStore, MemoryLocationStore, PgLocationStore};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), TrackerError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration, preferring environment variables and config files
    let config = AppConfig::load()?;
    config.monitor.validate()?;

    // Select the store once at startup; handlers never branch on it.
    let store: Arc<dyn LocationStore> = match &config.database.url {
        Some(url) => match PgLocationStore::connect(url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                warn!("Location store unreachable ({e}), falling back to in-memory storage");
                Arc::new(MemoryLocationStore::new())
            }
        },
        None => {
            warn!("No database configured, using in-memory storage");
            Arc::new(MemoryLocationStore::new())
        }
    };

    let hub = Arc::new(Hub::new());
    let state = AppState::new(store.clone(), hub.clone());

    let monitor = StalenessMonitor::new(store, hub, config.monitor.clone());
    let monitor_handle = monitor.spawn();

    let listener = tokio::net::TcpListener::bind(config.server.bind).await?;
    info!("Bus tracker listening on {}", config.server.bind);

    let shutdown_signal = async {
        let _ = signal::ctrl_c().await;
        info!("Received shutdown signal");
    };

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    monitor_handle.abort();

    Ok(())
}
