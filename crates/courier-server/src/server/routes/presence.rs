//! Presence reporting route.

use std::sync::Arc;

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;

use courier_relay::UserId;

use crate::server::AppState;

/// Create the presence router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/v1/presence/active", get(active_users_handler))
}

/// Snapshot of identities with a live relay connection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUsersResponse {
    /// Users currently connected to the relay
    pub active_users: Vec<UserId>,
}

async fn active_users_handler(State(state): State<Arc<AppState>>) -> Json<ActiveUsersResponse> {
    Json(ActiveUsersResponse {
        active_users: state.registry.active_users(),
    })
}
