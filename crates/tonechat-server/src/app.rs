use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderValue, request::Parts},
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use tonechat_api::{AppState, inbox, messages, users};
use tonechat_gateway::connection;

/// The full HTTP surface: REST endpoints plus the real-time hub.
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(users::health))
        .route("/auth/alias", post(users::alias_login))
        .route("/users", get(users::list_users))
        .route("/messages", get(messages::get_messages).post(messages::send_message))
        .route("/messages/thread", get(messages::get_thread))
        .route("/messages/mark-read", post(messages::mark_read))
        .route("/inbox/unread", get(inbox::get_unread))
        .route("/admin/messages", delete(messages::delete_all_messages))
        .route("/hubs/chat", get(ws_upgrade))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Explicit origins if configured; otherwise any localhost origin or a
/// `*.vercel.app` deployment.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::predicate(|origin: &HeaderValue, _parts: &Parts| {
            origin.to_str().map(default_origin_allowed).unwrap_or(false)
        })
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect::<Vec<_>>(),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

fn default_origin_allowed(origin: &str) -> bool {
    origin.starts_with("http://localhost")
        || origin.starts_with("https://localhost")
        || origin.ends_with(".vercel.app")
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, registry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_origins() {
        assert!(default_origin_allowed("http://localhost:3000"));
        assert!(default_origin_allowed("https://localhost"));
        assert!(default_origin_allowed("https://chat-git-main.vercel.app"));
        assert!(!default_origin_allowed("https://evil.example"));
        assert!(!default_origin_allowed("http://127.0.0.1:3000"));
    }
}
