use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use tonechat_db::Database;
use tonechat_gateway::{Broadcaster, GroupKey};
use tonechat_types::UserId;
use tonechat_types::api::UnreadEntry;
use tonechat_types::events::GatewayEvent;

use crate::turns::KeyedTurns;
use crate::{ChatError, ChatResult, blocking};

/// Keeps receivers' inboxes informed about unread counts.
///
/// Counts are never cached: the message table is the only source of truth and
/// every mutation of it is a single atomic statement or transaction. Inserts
/// and mark-read sweeps are not serialized against each other. Counting and
/// publishing are, per receiver, so the last `inbox:unread` a receiver gets
/// reflects every commit made before it was counted. A message committed
/// after that count publishes its own, later total.
///
/// Each `inbox:unread` is still a notification, not state: a client that
/// missed events (reconnect, lagging socket) should re-fetch `/inbox/unread`.
#[derive(Clone)]
pub struct UnreadReconciler {
    db: Arc<Database>,
    broadcaster: Arc<dyn Broadcaster>,
    inboxes: Arc<KeyedTurns<UserId>>,
}

impl UnreadReconciler {
    pub fn new(db: Arc<Database>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            db,
            broadcaster,
            inboxes: Arc::new(KeyedTurns::default()),
        }
    }

    /// A message from `sender_id` to `receiver_id` was just persisted.
    /// Publishes the receiver's new total unread count to their inbox.
    pub async fn record_delivery(&self, receiver_id: UserId, sender_id: UserId) -> ChatResult<i64> {
        let _turn = self.inboxes.acquire(receiver_id).await;
        let total = blocking(&self.db, move |db| db.count_unread_total(receiver_id)).await?;
        debug!("User {} now has {} unread", receiver_id, total);
        self.publish_total(receiver_id, sender_id, total);
        Ok(total)
    }

    /// Mark everything `sender_id` sent to `receiver_id` as read and publish
    /// the receiver's remaining total. Re-marking is a no-op that still
    /// publishes. Returns the number of messages that changed state.
    pub async fn mark_read(&self, receiver_id: UserId, sender_id: UserId) -> ChatResult<usize> {
        if receiver_id <= 0 || sender_id <= 0 {
            return Err(ChatError::validation("me and peer must be positive ids"));
        }

        let _turn = self.inboxes.acquire(receiver_id).await;
        let now = Utc::now();
        let (updated, total) =
            blocking(&self.db, move |db| db.mark_thread_read(receiver_id, sender_id, now)).await?;

        info!(
            "User {} read {} messages from {} ({} unread left)",
            receiver_id, updated, sender_id, total
        );
        self.publish_total(receiver_id, sender_id, total);
        Ok(updated)
    }

    pub async fn count_unread(&self, receiver_id: UserId, sender_id: UserId) -> ChatResult<i64> {
        blocking(&self.db, move |db| db.count_unread(receiver_id, sender_id)).await
    }

    /// Current unread counts for `receiver_id`, one entry per sender.
    pub async fn snapshot(&self, receiver_id: UserId) -> ChatResult<Vec<UnreadEntry>> {
        let rows = blocking(&self.db, move |db| db.unread_by_sender(receiver_id)).await?;
        Ok(rows
            .into_iter()
            .map(|(peer_id, count)| UnreadEntry { peer_id, count })
            .collect())
    }

    fn publish_total(&self, receiver_id: UserId, from: UserId, total: i64) {
        self.broadcaster.publish(
            &GroupKey::inbox(receiver_id),
            &GatewayEvent::InboxUnread { total, from },
        );
    }
}
