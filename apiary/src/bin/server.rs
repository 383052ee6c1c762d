//! Read-gateway entry-point: JSON-RPC endpoint plus health probes.

use std::process::ExitCode;
use std::sync::Arc;

use actix_web::web;
use tracing::{error, info};

use apiary::config::{init_tracing, Config};
use apiary::inbound::http::{build_server, ApiContext, HealthState};
use apiary::outbound::cache::RedisCache;
use apiary::outbound::persistence::{build_pool, DieselStore, PoolConfig};

#[actix_web::main]
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
            info!("server stopped cleanly");
            ExitCode::SUCCESS
        }
        Err(message) => {
            error!(message = %message, "server failed");
            ExitCode::from(1)
        }
    }
}

async fn run(config: Config) -> Result<(), String> {
    let pool = build_pool(&PoolConfig::new(&config.database_url))
        .await
        .map_err(|err| format!("database pool: {err}"))?;
    let store = Arc::new(DieselStore::new(pool));

    let cache = match &config.redis_url {
        None => None,
        Some(url) => Some(
            RedisCache::connect(url)
                .await
                .map_err(|err| format!("redis: {err}"))?,
        ),
    };
    if cache.is_none() {
        info!("read cache disabled");
    }

    let health_state = web::Data::new(HealthState::new());
    let server = build_server(
        ApiContext { store, cache },
        health_state.clone(),
        config.http_bind_addr,
    )
    .map_err(|err| format!("bind {}: {err}", config.http_bind_addr))?;

    info!(addr = %config.http_bind_addr, "gateway listening");
    health_state.mark_ready();
    server.await.map_err(|err| format!("server: {err}"))
}
