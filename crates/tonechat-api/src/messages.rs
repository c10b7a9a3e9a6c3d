use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tonechat_db::models::MessageRow;
use tonechat_types::UserId;
use tonechat_types::api::{MarkReadResponse, MessagePayload, SendMessageRequest};

use crate::{AppState, ChatError, ChatResult, blocking};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub alias: Option<String>,
    pub user_id: Option<UserId>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadQuery {
    pub user_a: UserId,
    pub user_b: UserId,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MarkReadQuery {
    pub me: UserId,
    pub peer: UserId,
}

pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> ChatResult<impl IntoResponse> {
    // If the client goes away this handler is dropped, the guard fires and
    // classification stops. A send already past classification keeps running
    // in its own task so storage and fan-out are never half done.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let task_state = state.clone();
    let payload = tokio::spawn(async move {
        task_state
            .pipeline
            .send(req.sender_id, req.receiver_id, &req.text, &cancel)
            .await
    })
    .await
    .map_err(|e| {
        error!("send task join error: {}", e);
        ChatError::Persistence(anyhow::anyhow!("send task failed: {}", e))
    })??;

    Ok((StatusCode::CREATED, Json(payload)))
}

/// Messages sent or received by one user (by id or alias), newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ChatResult<Json<Vec<MessagePayload>>> {
    let limit = query.limit.unwrap_or(50).clamp(1, 200) as u32;
    let alias = query
        .alias
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty());

    let rows = blocking(&state.db, move |db| {
        let user_id = match (query.user_id, alias) {
            (Some(id), _) => Some(id),
            (None, Some(alias)) => match db.get_user_by_alias(&alias)? {
                Some(user) => Some(user.id),
                // Unknown alias: nothing to show
                None => return Ok(Vec::new()),
            },
            (None, None) => None,
        };
        db.get_messages_for_participant(user_id, limit)
    })
    .await?;

    Ok(Json(to_payloads(rows)?))
}

/// Both directions of one conversation, oldest first.
pub async fn get_thread(
    State(state): State<AppState>,
    Query(query): Query<ThreadQuery>,
) -> ChatResult<Json<Vec<MessagePayload>>> {
    if query.user_a <= 0 || query.user_b <= 0 {
        return Err(ChatError::validation("userA,userB required"));
    }
    let limit = query.limit.unwrap_or(200).clamp(1, 500) as u32;

    let rows = blocking(&state.db, move |db| db.get_thread(query.user_a, query.user_b, limit)).await?;
    Ok(Json(to_payloads(rows)?))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Query(query): Query<MarkReadQuery>,
) -> ChatResult<Json<MarkReadResponse>> {
    let updated = state.unread.mark_read(query.me, query.peer).await?;
    Ok(Json(MarkReadResponse { updated }))
}

/// Administrative reset: drop every message.
pub async fn delete_all_messages(State(state): State<AppState>) -> ChatResult<impl IntoResponse> {
    let removed = blocking(&state.db, |db| db.delete_all_messages()).await?;
    info!("Deleted all {} messages", removed);
    Ok(Json(json!({ "ok": true })))
}

fn to_payloads(rows: Vec<MessageRow>) -> ChatResult<Vec<MessagePayload>> {
    rows.into_iter()
        .map(|row| -> ChatResult<MessagePayload> {
            let message = row.to_message()?;
            let sender_alias = row
                .sender_alias
                .unwrap_or_else(|| format!("#{}", row.sender_id));
            let receiver_alias = row
                .receiver_alias
                .unwrap_or_else(|| format!("#{}", row.receiver_id));
            Ok(MessagePayload::new(&message, sender_alias, receiver_alias))
        })
        .collect()
}
