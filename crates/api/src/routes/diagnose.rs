//! Manual diagnostic route

use axum::{extract::State, Json};
use scheduler::CycleOutcome;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::{ApiError, AppState};

/// Request body for a manual run
#[derive(Debug, Default, Deserialize)]
pub struct DiagnoseRequest {
    /// Run a drill on fabricated outage evidence
    #[serde(default)]
    pub synthetic: bool,
    /// Send a drill's notice to this channel only. Ignored for genuine runs.
    #[serde(default)]
    pub channel_id: Option<u64>,
}

/// Run one cycle now, serialized against the scheduled cadence
pub async fn run_diagnose(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DiagnoseRequest>,
) -> Result<Json<CycleOutcome>, ApiError> {
    info!(
        "Manual diagnostic requested (synthetic={}, channel={:?})",
        request.synthetic, request.channel_id
    );
    let outcome = match (request.synthetic, request.channel_id) {
        (true, Some(channel_id)) => state.pipeline.run_drill_in(channel_id).await?,
        (synthetic, _) => state.pipeline.run_cycle(synthetic).await?,
    };
    Ok(Json(outcome))
}
