//! JSON-RPC read gateway over actix-web.
//!
//! `POST /` carries JSON-RPC 2.0 (single calls and batches); `GET /health`
//! and `GET /.well-known/healthcheck.json` report readiness. The gateway
//! performs no writes to indexing tables.

use std::net::SocketAddr;

use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer};
use serde_json::Value;
use tracing::debug;

use crate::domain::ports::IndexStore;

mod health;
pub mod jsonrpc;
pub mod methods;

pub use health::HealthState;
pub use methods::ApiContext;

use jsonrpc::{RpcError, RpcRequest, RpcResponse};

/// Build and bind the gateway server.
///
/// # Errors
///
/// Returns an IO error when the listen address cannot be bound.
pub fn build_server<S: IndexStore + 'static>(
    ctx: ApiContext<S>,
    health_state: web::Data<HealthState>,
    bind_addr: SocketAddr,
) -> std::io::Result<Server> {
    let server = HttpServer::new(move || {
        let app = App::new()
            .app_data(web::Data::new(ctx.clone()))
            .app_data(health_state.clone())
            .route("/", web::post().to(rpc_endpoint::<S>))
            .service(health::health)
            .service(health::healthcheck_json);
        #[cfg(feature = "metrics")]
        let app = app.wrap(make_metrics());
        app
    })
    .bind(bind_addr)?;
    Ok(server.run())
}

#[cfg(feature = "metrics")]
fn make_metrics() -> actix_web_prom::PrometheusMetrics {
    actix_web_prom::PrometheusMetricsBuilder::new("apiary")
        .endpoint("/metrics")
        .build()
        .expect("configure Prometheus metrics")
}

/// `POST /`: single JSON-RPC calls and batches.
async fn rpc_endpoint<S: IndexStore + 'static>(
    ctx: web::Data<ApiContext<S>>,
    body: web::Bytes,
) -> HttpResponse {
    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(error) => {
            return HttpResponse::Ok().json(RpcResponse::error(
                Value::Null,
                RpcError::invalid_request(format!("request is not JSON: {error}")),
            ));
        }
    };

    match parsed {
        Value::Array(calls) if calls.is_empty() => HttpResponse::Ok().json(RpcResponse::error(
            Value::Null,
            RpcError::invalid_request("empty batch"),
        )),
        Value::Array(calls) => {
            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                responses.push(handle_call(ctx.get_ref(), call).await);
            }
            HttpResponse::Ok().json(responses)
        }
        call => HttpResponse::Ok().json(handle_call(ctx.get_ref(), call).await),
    }
}

async fn handle_call<S: IndexStore>(ctx: &ApiContext<S>, call: Value) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_value(call) {
        Ok(request) => request,
        Err(error) => {
            return RpcResponse::error(
                Value::Null,
                RpcError::invalid_request(format!("bad call envelope: {error}")),
            );
        }
    };
    if request.jsonrpc != "2.0" || request.method.is_empty() {
        return RpcResponse::error(
            request.id,
            RpcError::invalid_request("jsonrpc 2.0 envelope required"),
        );
    }

    match methods::dispatch(ctx, &request.method, &request.params).await {
        Ok(result) => RpcResponse::result(request.id, result),
        Err(error) => {
            debug!(method = %request.method, code = error.code, message = %error.message, "rpc error");
            RpcResponse::error(request.id, error)
        }
    }
}
