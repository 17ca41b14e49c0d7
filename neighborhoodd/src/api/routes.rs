use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::watch;
use uuid::Uuid;
use shared::types::{Host, ScanStatus};
use crate::registry::{RegistryHandle, ShareLoad};
use crate::scan::ScanController;
use crate::shares::{self, ShareEnumerator};

#[derive(Clone)]
pub struct AppState {
    pub registry: RegistryHandle,
    pub scan: Arc<ScanController>,
    pub hash_rx: watch::Receiver<String>,
    pub shares: Arc<dyn ShareEnumerator>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/scan", get(get_scan))
        .route("/v1/scan/start", post(start_scan))
        .route("/v1/scan/stop", post(stop_scan))
        .route("/v1/hosts", get(get_hosts))
        .route("/v1/hosts/hash", get(get_hash))
        .route("/v1/hosts/:id", get(get_host))
        .route("/v1/hosts/:id/shares", post(fetch_shares))
        .with_state(state)
}

fn internal_error(what: &str, e: anyhow::Error) -> StatusCode {
    tracing::error!("Failed to {}: {:#}", what, e);
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn get_scan(State(state): State<AppState>) -> Json<ScanStatus> {
    Json(state.scan.status())
}

async fn start_scan(State(state): State<AppState>) -> Result<Json<ScanStatus>, StatusCode> {
    state
        .scan
        .start()
        .await
        .map(Json)
        .map_err(|e| internal_error("start scan", e))
}

async fn stop_scan(State(state): State<AppState>) -> Json<ScanStatus> {
    Json(state.scan.stop().await)
}

async fn get_hosts(State(state): State<AppState>) -> Result<Json<Vec<Host>>, StatusCode> {
    state
        .registry
        .snapshot()
        .await
        .map(Json)
        .map_err(|e| internal_error("list hosts", e))
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.hash_rx.borrow().clone()
}

async fn get_host(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Host>, StatusCode> {
    state
        .registry
        .get(id)
        .await
        .map_err(|e| internal_error("query host", e))?
        .filter(|host| !host.is_localhost)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn fetch_shares(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    match shares::fetch_shares(&state.registry, state.shares.clone(), id).await {
        Ok(ShareLoad::Started | ShareLoad::AlreadyLoading) => StatusCode::ACCEPTED,
        Ok(ShareLoad::NotExpandable) => StatusCode::CONFLICT,
        Ok(ShareLoad::NotFound) => StatusCode::NOT_FOUND,
        Err(e) => internal_error("fetch shares", e),
    }
}
