pub mod error;
pub mod inbox;
pub mod messages;
pub mod pipeline;
pub mod state;
mod turns;
pub mod unread;
pub mod users;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tonechat_db::Database;

pub use error::{ChatError, ChatResult};
pub use pipeline::MessagePipeline;
pub use state::{AppState, AppStateInner};
pub use unread::UnreadReconciler;

/// Run blocking DB work off the async runtime.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> ChatResult<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    let result = tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?;
    Ok(result?)
}
