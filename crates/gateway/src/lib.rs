//! HTTP surface for turnrelay.
//!
//! Three routes:
//!
//! - `POST /chat` runs one invocation of the chat pipeline
//! - `GET /health` reports liveness and the active policy
//! - `GET /` describes the service
//!
//! Built on Axum; requests are traced with `tower-http`.

pub mod chat;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    response::Json,
    routing::{get, post},
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use turnrelay_agent::ChatPipeline;
use turnrelay_config::{AppConfig, ServiceConfig};
use turnrelay_providers::AnthropicInvoker;

pub use chat::{ChatRequest, ChatResponse, ErrorResponse, status_for};

/// Shared application state for the gateway.
pub struct AppState {
    pub pipeline: ChatPipeline,
    pub service: ServiceConfig,
    /// Used when a request names no model.
    pub default_model: String,
}

impl AppState {
    pub fn new(config: &AppConfig, pipeline: ChatPipeline) -> Self {
        Self {
            pipeline,
            service: config.service.clone(),
            default_model: config.model.default_model.clone(),
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/chat", post(chat::chat_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Wire every collaborator from configuration and serve until the
/// listener fails.
///
/// The policy file and (for SQLite) the database must be usable; a missing
/// model key or store URL only fails the requests that need them.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let policy = config.load_policy()?;
    let stores = turnrelay_memory::build_from_config(&config.store).await?;
    let invoker = Arc::new(AnthropicInvoker::from_config(&config.model));

    if !config.has_api_key() {
        warn!("ANTHROPIC_API_KEY is not set; /chat will fail until it is");
    }
    if config.store.backend == "rest" && !config.has_store_credentials() {
        warn!("Store URL or key missing; conversation memory is unavailable");
    }

    let pipeline = ChatPipeline::from_config(&config, invoker, stores, policy);
    info!(
        addr = %addr,
        policy = %pipeline.policy().label(),
        invoker = %pipeline.invoker_name(),
        store = %pipeline.store_name(),
        "Gateway starting"
    );
    let state = Arc::new(AppState::new(&config, pipeline));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    agent: String,
    version: &'static str,
    policy: String,
    timestamp: String,
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        agent: state.service.agent.clone(),
        version: env!("CARGO_PKG_VERSION"),
        policy: state.pipeline.policy().label(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
struct RootResponse {
    agent: String,
    version: &'static str,
    architecture: String,
    endpoints: BTreeMap<&'static str, &'static str>,
}

async fn root_handler(State(state): State<SharedState>) -> Json<RootResponse> {
    Json(RootResponse {
        agent: state.service.display_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        architecture: state.pipeline.policy().name.clone(),
        endpoints: BTreeMap::from([("chat", "POST /chat"), ("health", "GET /health")]),
    })
}
