use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use ina260_monitor::MetricsHub;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

pub fn router(hub: MetricsHub) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(hub)
}

/// Serve until the listener fails. Only reads the registry; never touches the bus.
pub async fn serve(addr: SocketAddr, hub: MetricsHub) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding metrics listener on {addr}"))?;
    info!("Starting Prometheus metrics server on http://{addr}/metrics");
    axum::serve(listener, router(hub))
        .await
        .context("metrics server stopped")
}

async fn root_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>INA260 Exporter</title></head>
<body>
    <h1>INA260 Exporter</h1>
    <ul>
        <li><a href="/metrics">/metrics</a> - Prometheus metrics</li>
        <li><a href="/health">/health</a> - Health check</li>
    </ul>
</body>
</html>"#,
    )
}

async fn metrics_handler(State(hub): State<MetricsHub>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
        hub.encode_text(),
    )
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
