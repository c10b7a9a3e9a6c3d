use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde_json::json;
use tracing::info;

use tonechat_types::api::{AliasRequest, UserResponse};

use crate::{AppState, ChatError, ChatResult, blocking};

/// Sign in by alias: returns the user with that alias, creating it on first
/// use. Aliases are trimmed and case-sensitive.
pub async fn alias_login(
    State(state): State<AppState>,
    Json(req): Json<AliasRequest>,
) -> ChatResult<Json<UserResponse>> {
    let alias = req.alias.trim().to_string();
    if alias.is_empty() {
        return Err(ChatError::validation("Alias required"));
    }

    let row = blocking(&state.db, move |db| db.get_or_create_user(&alias, Utc::now())).await?;
    info!("Alias login: {} ({})", row.alias, row.id);

    Ok(Json(UserResponse {
        id: row.id,
        alias: row.alias,
    }))
}

/// Everyone, ordered by id.
pub async fn list_users(State(state): State<AppState>) -> ChatResult<Json<Vec<UserResponse>>> {
    let rows = blocking(&state.db, |db| db.list_users()).await?;
    Ok(Json(
        rows.into_iter()
            .map(|row| UserResponse {
                id: row.id,
                alias: row.alias,
            })
            .collect(),
    ))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "time": Utc::now() }))
}
