use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::auth::require_user;
use crate::error::AppResult;
use crate::state::AppState;

/// Echo the authenticated staff user, so the front-end can resolve who is
/// signed in and which actions to surface.
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    let user = require_user(&state, &headers).await?;
    Ok(Json(json!({
        "id": user.id,
        "role": user.role,
    })))
}
