//! Models listing handler.

use axum::{Json, extract::State};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::AppState;

/// Handles `GET /v1/models`.
///
/// Returns the configured model catalogue in the OpenAI list shape. The
/// gateway does not interrogate the upstream for this; the list is purely
/// configuration.
pub async fn list_models(State(state): State<Arc<AppState>>) -> Json<Value> {
    let data: Vec<Value> = state
        .config
        .models
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "owned_by": "anthropic",
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": data,
    }))
}
