use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::error;

use crate::rooms::RoomCode;
use crate::server::state::ServerState;

pub(crate) async fn create_room(State(state): State<ServerState>) -> impl IntoResponse {
  match state.registry.create_room() {
    Ok(code) => (StatusCode::OK, Json(json!({ "roomCode": code }))),
    Err(e) => {
      error!("{e}");
      (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))
    }
  }
}

pub(crate) async fn room_info(
  Path(code): Path<String>,
  State(state): State<ServerState>,
) -> impl IntoResponse {
  match state.registry.room_info(&RoomCode::from(code)) {
    Some(info) => (StatusCode::OK, Json(json!(info))),
    None => (StatusCode::NOT_FOUND, Json(json!({ "error": "Room not found" }))),
  }
}
