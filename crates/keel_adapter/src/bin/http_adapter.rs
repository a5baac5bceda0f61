#![forbid(unsafe_code)]

use std::net::SocketAddr;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use keel_adapter::{now_from_system_clock, AdapterConfig, AdapterResponse, AdapterRuntime};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct ListQuery {
    domain: Option<String>,
    entity_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AdapterConfig::default_from_env()?;
    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(keel_adapter::DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let addr: SocketAddr = config.http_bind.parse()?;
    let runtime = AdapterRuntime::from_config(&config, now_from_system_clock())?;
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/actions/execute", post(execute_action))
        .route("/v1/actions/list", get(list_actions))
        .with_state(runtime);

    info!(
        %addr,
        session_ttl_secs = config.session_ttl_secs,
        "keel_adapter_http listening"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("keel_adapter_http stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
    }
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

fn reply(response: AdapterResponse) -> (StatusCode, Json<Value>) {
    let status =
        StatusCode::from_u16(response.http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body))
}

async fn healthz(State(runtime): State<AdapterRuntime>) -> (StatusCode, Json<Value>) {
    reply(runtime.health())
}

async fn execute_action(
    State(runtime): State<AdapterRuntime>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    reply(runtime.execute(authorization(&headers), &body, now_from_system_clock()))
}

async fn list_actions(
    State(runtime): State<AdapterRuntime>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> (StatusCode, Json<Value>) {
    reply(runtime.list_actions(
        authorization(&headers),
        query.domain.as_deref(),
        query.entity_id.as_deref(),
        now_from_system_clock(),
    ))
}
