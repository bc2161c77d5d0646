//! Target registration routes
//!
//! Channels are registered individually; role mentions and personal
//! subscriptions are kept per guild and apply to all of its channels.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::{NotificationTarget, StorageError, TargetRegistry, TargetStore};
use tracing::info;

use crate::{ApiError, AppState};

/// Response for the targets endpoint
#[derive(Debug, Serialize)]
pub struct TargetsResponse {
    pub data: Vec<NotificationTarget>,
    pub count: usize,
}

/// Channel registration request
#[derive(Debug, Deserialize)]
pub struct RegisterChannel {
    pub channel_id: u64,
    #[serde(default)]
    pub guild_id: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ChangeResponse {
    pub changed: bool,
}

/// 201 when something was added, 200 when it was already there
fn added(changed: bool) -> (StatusCode, Json<ChangeResponse>) {
    let status = if changed { StatusCode::CREATED } else { StatusCode::OK };
    (status, Json(ChangeResponse { changed }))
}

fn removed(changed: bool, what: String) -> Result<Json<ChangeResponse>, ApiError> {
    if changed {
        Ok(Json(ChangeResponse { changed }))
    } else {
        Err(StorageError::NotFound(what).into())
    }
}

/// Registered notification targets
pub async fn get_targets(State(state): State<Arc<AppState>>) -> Result<Json<TargetsResponse>, ApiError> {
    let data = state.store.list_targets().await?;
    let count = data.len();
    Ok(Json(TargetsResponse { data, count }))
}

pub async fn add_channel(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterChannel>,
) -> Result<(StatusCode, Json<ChangeResponse>), ApiError> {
    info!("Registering channel {} (guild {:?})", request.channel_id, request.guild_id);
    let changed = state.store.add_channel(request.channel_id, request.guild_id).await?;
    Ok(added(changed))
}

pub async fn remove_channel(
    State(state): State<Arc<AppState>>,
    Path(channel_id): Path<u64>,
) -> Result<Json<ChangeResponse>, ApiError> {
    let changed = state.store.remove_channel(channel_id).await?;
    removed(changed, format!("channel {}", channel_id))
}

pub async fn add_role(
    State(state): State<Arc<AppState>>,
    Path((guild_id, role_id)): Path<(u64, u64)>,
) -> Result<(StatusCode, Json<ChangeResponse>), ApiError> {
    let changed = state.store.add_role(guild_id, role_id).await?;
    Ok(added(changed))
}

pub async fn remove_role(
    State(state): State<Arc<AppState>>,
    Path((guild_id, role_id)): Path<(u64, u64)>,
) -> Result<Json<ChangeResponse>, ApiError> {
    let changed = state.store.remove_role(guild_id, role_id).await?;
    removed(changed, format!("role {} in guild {}", role_id, guild_id))
}

pub async fn subscribe_user(
    State(state): State<Arc<AppState>>,
    Path((guild_id, user_id)): Path<(u64, u64)>,
) -> Result<(StatusCode, Json<ChangeResponse>), ApiError> {
    let changed = state.store.subscribe_user(guild_id, user_id).await?;
    Ok(added(changed))
}

pub async fn unsubscribe_user(
    State(state): State<Arc<AppState>>,
    Path((guild_id, user_id)): Path<(u64, u64)>,
) -> Result<Json<ChangeResponse>, ApiError> {
    let changed = state.store.unsubscribe_user(guild_id, user_id).await?;
    removed(changed, format!("user {} in guild {}", user_id, guild_id))
}
