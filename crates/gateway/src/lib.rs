//! HTTP gateway for toolweave.
//!
//! Serves the v1 chat API over axum. Turns are streamed to clients as
//! server-sent events; everything else is plain JSON.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use toolweave_config::{AppConfig, GatewayConfig};
use toolweave_engine::ChatService;

/// Request bodies above this size are rejected.
const BODY_LIMIT: usize = 1024 * 1024;

/// Build the full router: `/health` plus the v1 API under `/v1`.
///
/// Layers: CORS for the local origin, a 1 MB body limit and HTTP trace logging.
pub fn build_router(api_state: api_v1::SharedApiState, gateway: &GatewayConfig) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(api_state))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors_layer(gateway))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(gateway: &GatewayConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://localhost:{}", gateway.port),
        format!("http://127.0.0.1:{}", gateway.port),
    ]
    .iter()
    .filter_map(|origin| HeaderValue::from_str(origin).ok())
    .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let router = toolweave_providers::build_from_config(&config);
    let provider = router
        .default()
        .ok_or_else(|| format!("Provider '{}' is not configured", config.default_provider))?;
    let tools = Arc::new(toolweave_tools::default_registry());
    let store = toolweave_store::build_from_config(&config.storage);
    let service = ChatService::from_config(&config, provider, tools, store);

    let app = build_router(Arc::new(api_v1::ApiV1State::new(service)), &config.gateway);

    info!(addr = %addr, provider = %config.default_provider, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
