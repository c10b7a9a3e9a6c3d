use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use tonechat_types::UserId;
use tonechat_types::api::UnreadEntry;

use crate::{AppState, ChatError, ChatResult};

#[derive(Debug, Deserialize)]
pub struct UnreadQuery {
    pub me: UserId,
}

/// Unread counts for `me`, one entry per sender with anything unread.
pub async fn get_unread(
    State(state): State<AppState>,
    Query(query): Query<UnreadQuery>,
) -> ChatResult<Json<Vec<UnreadEntry>>> {
    if query.me <= 0 {
        return Err(ChatError::validation("me required"));
    }
    Ok(Json(state.unread.snapshot(query.me).await?))
}
