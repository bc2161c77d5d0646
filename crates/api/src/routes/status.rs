//! Status route

use axum::{extract::State, Json};
use scheduler::StatusSnapshot;
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Response for the status endpoint
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub presence: String,
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
}

/// Current outage state, last verdict, and cycle counters
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        service: state.service_name.clone(),
        presence: state.presence.label(),
        snapshot: state.pipeline.snapshot(),
    })
}
