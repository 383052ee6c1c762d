//! Indexer entry-point: wires the chain source, store, dirty flusher, and
//! sync controller.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::watch;
use tracing::{error, info};

use apiary::config::{init_tracing, Config};
use apiary::domain::indexer::{DirtyFlusher, SyncController, SyncSettings};
use apiary::outbound::chain::SteemHttpSource;
use apiary::outbound::persistence::{build_pool, DieselStore, PoolConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            return ExitCode::from(1);
        }
    };
    init_tracing(config.log_level, config.log_format);

    match run(config).await {
        Ok(()) => {
            info!("indexer stopped cleanly");
            ExitCode::SUCCESS
        }
        Err(BootError::Bootstrap(message)) => {
            error!(message = %message, "bootstrap failed");
            ExitCode::from(1)
        }
        Err(BootError::Sync(message)) => {
            error!(message = %message, "sync loop failed");
            ExitCode::from(2)
        }
    }
}

enum BootError {
    Bootstrap(String),
    Sync(String),
}

async fn run(config: Config) -> Result<(), BootError> {
    let endpoint: Url = config
        .steemd_url
        .parse()
        .map_err(|err| BootError::Bootstrap(format!("bad steemd url: {err}")))?;
    let chain = Arc::new(
        SteemHttpSource::new(endpoint, config.max_batch)
            .map_err(|err| BootError::Bootstrap(format!("chain client: {err}")))?,
    );

    let pool = build_pool(&PoolConfig::new(&config.database_url))
        .await
        .map_err(|err| BootError::Bootstrap(format!("database pool: {err}")))?;
    let store = Arc::new(DieselStore::new(pool));

    if config.test_disable_sync {
        info!("sync disabled by configuration");
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    // Dirty-set refreshes run beside the sync loop and never block it.
    let dirty_capacity = 10_000 * config.max_workers as usize;
    let (dirty_handle, mut flusher) =
        DirtyFlusher::spawn(Arc::clone(&store), Arc::clone(&chain), dirty_capacity);

    let controller = SyncController::new(
        store,
        chain,
        SyncSettings {
            max_batch: config.max_batch,
            sync_interval: Duration::from_secs(config.sync_interval_seconds),
            test_max_block: config.test_max_block,
        },
        Some(dirty_handle),
        shutdown_rx,
    );

    // The controller owns the last dirty handle; once it returns, the
    // flusher drains its queue and exits on its own.
    let result = controller.run().await;
    if tokio::time::timeout(Duration::from_secs(5), &mut flusher)
        .await
        .is_err()
    {
        flusher.abort();
    }
    result.map_err(|err| BootError::Sync(err.to_string()))
}
