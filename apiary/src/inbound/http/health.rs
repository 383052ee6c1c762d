//! Health endpoints for orchestration and load balancers.

use actix_web::{get, web, HttpResponse};
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared readiness flag flipped once bootstrap completes.
#[derive(Default)]
pub struct HealthState {
    ready: AtomicBool,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

/// Plain health probe: 200 once ready, 503 before.
#[get("/health")]
pub async fn health(state: web::Data<HealthState>) -> HttpResponse {
    if state.is_ready() {
        HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
    } else {
        HttpResponse::ServiceUnavailable().json(serde_json::json!({ "status": "starting" }))
    }
}

/// Well-known healthcheck document served for legacy monitors.
#[get("/.well-known/healthcheck.json")]
pub async fn healthcheck_json(state: web::Data<HealthState>) -> HttpResponse {
    if state.is_ready() {
        HttpResponse::Ok().json(serde_json::json!({ "state": "ok" }))
    } else {
        HttpResponse::ServiceUnavailable().json(serde_json::json!({ "state": "starting" }))
    }
}
