//! Status Sentinel Admin API
//!
//! Wires the monitoring pipeline together from [`Settings`] and exposes the
//! admin surface used by the command layer: health, status, target
//! registration, manual diagnostics, and Prometheus metrics.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tower::ServiceBuilder;
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod config;
pub mod rate_limit;
mod routes;

pub use crate::config::{ConfigError, Settings};

use alerting::OutageStateMachine;
use analysis::{Analyzer, GeminiReasoner};
use evidence::HttpEvidenceProvider;
use investigation::Investigator;
use notifier::{Dispatcher, DiscordSink, PresenceBoard};
use scheduler::{Pipeline, PipelineError};
use storage::{JsonTargetStore, StorageError, TargetRegistry};

/// Application state shared across handlers
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<dyn TargetRegistry>,
    pub presence: Arc<PresenceBoard>,
    pub metrics: Option<PrometheusHandle>,
    pub service_name: String,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        store: Arc<dyn TargetRegistry>,
        presence: Arc<PresenceBoard>,
        metrics: Option<PrometheusHandle>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            store,
            presence,
            metrics,
            service_name: service_name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }
}

/// Handler errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Pipeline(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        warn!("Request failed: {}", self);
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Long-lived pipeline components built from settings
pub struct Services {
    pub pipeline: Arc<Pipeline>,
    pub store: Arc<JsonTargetStore>,
    pub presence: Arc<PresenceBoard>,
}

/// Construct the production pipeline: HTTP evidence, Gemini reasoning,
/// Discord delivery, and the JSON target store.
pub fn build_services(settings: &Settings) -> Result<Services, ConfigError> {
    let provider = HttpEvidenceProvider::new(settings.evidence.clone()).map_err(|e| ConfigError::Component {
        component: "evidence provider",
        message: e.to_string(),
    })?;
    let reasoner = GeminiReasoner::new(settings.gemini.clone()).map_err(|e| ConfigError::Component {
        component: "reasoning service",
        message: e.to_string(),
    })?;
    let sink = Arc::new(DiscordSink::new(settings.discord.clone()).map_err(|e| ConfigError::Component {
        component: "message sink",
        message: e.to_string(),
    })?);

    // Legacy bare channel entries get their guild from the bot API
    let store = Arc::new(JsonTargetStore::new(settings.targets_path.clone()).with_resolver(sink.clone()));
    let presence = Arc::new(PresenceBoard::new());

    let pipeline = Pipeline::new(
        Investigator::new(Arc::new(provider), settings.investigation.clone()),
        Analyzer::new(Arc::new(reasoner), settings.analysis.clone()),
        OutageStateMachine::new(settings.state_machine.clone()),
        Dispatcher::new(sink, presence.clone(), settings.dispatcher()),
        store.clone(),
        settings.service_name.clone(),
    );

    Ok(Services {
        pipeline: Arc::new(pipeline),
        store,
        presence,
    })
}

/// Create the application router
pub fn create_router(state: Arc<AppState>, governor: Arc<rate_limit::DefaultGovernorConfig>) -> Router {
    let diagnose = Router::new()
        .route("/api/v1/diagnose", post(routes::diagnose::run_diagnose))
        .layer(GovernorLayer { config: governor });

    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/status", get(routes::status::get_status))
        .route(
            "/api/v1/targets",
            get(routes::targets::get_targets).post(routes::targets::add_channel),
        )
        .route("/api/v1/targets/:channel_id", delete(routes::targets::remove_channel))
        .route(
            "/api/v1/guilds/:guild_id/roles/:role_id",
            post(routes::targets::add_role).delete(routes::targets::remove_role),
        )
        .route(
            "/api/v1/guilds/:guild_id/users/:user_id",
            post(routes::targets::subscribe_user).delete(routes::targets::unsubscribe_user),
        )
        .route("/metrics", get(routes::metrics::render_metrics))
        .merge(diagnose)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub monitor_status: String,
}

/// Health check handler
async fn health_handler(axum::extract::State(state): axum::extract::State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        monitor_status: state.pipeline.snapshot().state.current_status.to_string(),
    })
}

/// Initialize logging
pub fn init_logging(settings: &Settings) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_new(&settings.log_level)
        .map_err(|e| ConfigError::Invalid(format!("log_level {:?}: {}", settings.log_level, e)))?;
    let builder = FmtSubscriber::builder().with_env_filter(filter).with_target(true);

    let installed = if settings.log_json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.map_err(|e| ConfigError::Component {
        component: "logging",
        message: e.to_string(),
    })
}

/// Install the global Prometheus recorder
pub fn install_metrics() -> Result<PrometheusHandle, ConfigError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ConfigError::Component {
            component: "metrics",
            message: e.to_string(),
        })?;
    info!("Prometheus recorder installed");
    Ok(handle)
}
