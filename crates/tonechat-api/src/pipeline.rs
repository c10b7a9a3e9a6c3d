use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tonechat_db::Database;
use tonechat_gateway::{Broadcaster, ConversationKey, GroupKey};
use tonechat_sentiment::Classifier;
use tonechat_types::UserId;
use tonechat_types::api::MessagePayload;
use tonechat_types::events::GatewayEvent;
use tonechat_types::models::{Message, User};

use crate::turns::KeyedTurns;
use crate::unread::UnreadReconciler;
use crate::{ChatError, ChatResult, blocking};

/// Validates, classifies, persists and fans out direct messages.
pub struct MessagePipeline {
    db: Arc<Database>,
    classifier: Arc<dyn Classifier>,
    broadcaster: Arc<dyn Broadcaster>,
    unread: UnreadReconciler,
    turns: KeyedTurns<ConversationKey>,
}

impl MessagePipeline {
    pub fn new(
        db: Arc<Database>,
        classifier: Arc<dyn Classifier>,
        broadcaster: Arc<dyn Broadcaster>,
        unread: UnreadReconciler,
    ) -> Self {
        Self {
            db,
            classifier,
            broadcaster,
            unread,
            turns: KeyedTurns::default(),
        }
    }

    /// Send `text` from `sender_id` to `receiver_id`.
    ///
    /// Nothing is stored unless classification succeeds. Once stored, the
    /// message goes to the conversation group and both inboxes, and the
    /// receiver's inbox gets an updated unread total. Publishing is best
    /// effort and never fails the send.
    ///
    /// `cancel` only interrupts classification. A send that got past it runs
    /// to completion.
    pub async fn send(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        text: &str,
        cancel: &CancellationToken,
    ) -> ChatResult<MessagePayload> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::validation("text required"));
        }
        if sender_id <= 0 || receiver_id <= 0 {
            return Err(ChatError::validation("senderId and receiverId must be positive"));
        }

        let (sender, receiver) = self.resolve_participants(sender_id, receiver_id).await?;

        // No locks held while the scoring service thinks
        let sentiment = self.classifier.classify(text, cancel).await?;

        let mut message = Message::pending(sender.id, receiver.id, text.to_string(), Utc::now())
            .classified(sentiment);

        let payload = {
            // Commit and publish under the conversation's turn so listeners
            // see its messages in id order
            let _turn = self.turns.acquire(ConversationKey::new(sender_id, receiver_id)).await;

            let row = message.clone();
            message.id = blocking(&self.db, move |db| db.insert_message(&row)).await?;

            let payload = MessagePayload::new(&message, sender.alias, receiver.alias);
            self.fan_out(&payload);
            payload
        };

        info!(
            "Message {} {} -> {} classified {} ({:.3})",
            payload.id, sender_id, receiver_id, payload.sentiment_label, payload.sentiment_score
        );

        if let Err(e) = self.unread.record_delivery(receiver_id, sender_id).await {
            warn!("Unread update for message {} failed: {}", payload.id, e);
        }

        Ok(payload)
    }

    async fn resolve_participants(&self, sender_id: UserId, receiver_id: UserId) -> ChatResult<(User, User)> {
        let (sender, receiver) = blocking(&self.db, move |db| {
            let sender = db.get_user_by_id(sender_id)?.map(|row| row.to_user()).transpose()?;
            let receiver = db.get_user_by_id(receiver_id)?.map(|row| row.to_user()).transpose()?;
            Ok((sender, receiver))
        })
        .await?;

        let sender = sender.ok_or_else(|| ChatError::not_found("sender not found"))?;
        let receiver = receiver.ok_or_else(|| ChatError::not_found("receiver not found"))?;
        Ok((sender, receiver))
    }

    fn fan_out(&self, payload: &MessagePayload) {
        let conversation = GroupKey::conversation(payload.sender_id, payload.receiver_id);
        let delivered = self
            .broadcaster
            .publish(&conversation, &GatewayEvent::Message(payload.clone()));

        let inbox_event = GatewayEvent::InboxNew {
            message: payload.clone(),
        };
        self.broadcaster
            .publish(&GroupKey::inbox(payload.receiver_id), &inbox_event);
        // A note to self shares one inbox
        if payload.sender_id != payload.receiver_id {
            self.broadcaster
                .publish(&GroupKey::inbox(payload.sender_id), &inbox_event);
        }

        debug!("Message {} reached {} conversation listeners", payload.id, delivered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Behavior, FakeClassifier, RecordingBroadcaster, seeded_db};
    use tonechat_types::models::{Sentiment, SentimentLabel};

    struct Harness {
        db: Arc<Database>,
        recorder: Arc<RecordingBroadcaster>,
        classifier: Arc<FakeClassifier>,
        pipeline: Arc<MessagePipeline>,
        ann: UserId,
        bob: UserId,
    }

    fn harness(classifier: Arc<FakeClassifier>) -> Harness {
        let (db, ann, bob) = seeded_db();
        let recorder = Arc::new(RecordingBroadcaster::default());
        let unread = UnreadReconciler::new(db.clone(), recorder.clone());
        let pipeline = Arc::new(MessagePipeline::new(
            db.clone(),
            classifier.clone(),
            recorder.clone(),
            unread,
        ));
        Harness {
            db,
            recorder,
            classifier,
            pipeline,
            ann,
            bob,
        }
    }

    fn message_ids(events: &[GatewayEvent]) -> Vec<i64> {
        events
            .iter()
            .filter_map(|e| match e {
                GatewayEvent::Message(p) => Some(p.id),
                GatewayEvent::InboxNew { message } => Some(message.id),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn send_persists_and_fans_out_once_per_group() {
        let h = harness(FakeClassifier::positive());

        let payload = h
            .pipeline
            .send(h.ann, h.bob, "  hi  ", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(payload.text, "hi");
        assert_eq!(payload.sentiment_label, SentimentLabel::Positive);
        assert_eq!(payload.sentiment_score, 0.87);
        assert_eq!(payload.sender_alias, "ann");
        assert_eq!(payload.receiver_alias, "bob");
        assert_eq!(h.db.count_messages().unwrap(), 1);

        let conversation = h.recorder.to_group(GroupKey::conversation(h.bob, h.ann));
        assert_eq!(conversation, vec![GatewayEvent::Message(payload.clone())]);

        let sender_inbox = h.recorder.to_group(GroupKey::inbox(h.ann));
        assert_eq!(sender_inbox, vec![GatewayEvent::InboxNew { message: payload.clone() }]);

        let receiver_inbox = h.recorder.to_group(GroupKey::inbox(h.bob));
        assert_eq!(
            receiver_inbox,
            vec![
                GatewayEvent::InboxNew { message: payload.clone() },
                GatewayEvent::InboxUnread { total: 1, from: h.ann },
            ]
        );
    }

    #[tokio::test]
    async fn stored_message_is_ready_and_unread() {
        let h = harness(FakeClassifier::positive());
        let payload = h
            .pipeline
            .send(h.ann, h.bob, "hello", &CancellationToken::new())
            .await
            .unwrap();

        let stored = h.db.get_message(payload.id).unwrap().unwrap().to_message().unwrap();
        assert_eq!(stored.status, tonechat_types::models::MessageStatus::Ready);
        assert_eq!(stored.sentiment_label, Some(SentimentLabel::Positive));
        assert!(!stored.is_read);
        assert_eq!(stored.created_at, stored.updated_at);
        assert_eq!(h.db.count_unread(h.bob, h.ann).unwrap(), 1);
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_side_effects() {
        let h = harness(FakeClassifier::positive());

        let err = h
            .pipeline
            .send(h.ann, h.bob, " \t\n ", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Validation(_)));
        assert_eq!(h.classifier.calls(), 0);
        assert_eq!(h.db.count_messages().unwrap(), 0);
        assert!(h.recorder.published().is_empty());
    }

    #[tokio::test]
    async fn unknown_participants_are_not_found() {
        let h = harness(FakeClassifier::positive());
        let cancel = CancellationToken::new();

        let err = h.pipeline.send(h.ann, 999, "hi", &cancel).await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(ref m) if m.contains("receiver")));

        let err = h.pipeline.send(999, h.bob, "hi", &cancel).await.unwrap_err();
        assert!(matches!(err, ChatError::NotFound(ref m) if m.contains("sender")));

        let err = h.pipeline.send(-1, h.bob, "hi", &cancel).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));

        assert_eq!(h.classifier.calls(), 0);
        assert_eq!(h.db.count_messages().unwrap(), 0);
        assert!(h.recorder.published().is_empty());
    }

    #[tokio::test]
    async fn classification_failure_stores_nothing() {
        let h = harness(FakeClassifier::new(Behavior::Fail));

        let err = h
            .pipeline
            .send(h.ann, h.bob, "hi", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::ClassificationUnavailable(_)));
        assert_eq!(h.db.count_messages().unwrap(), 0);
        assert!(h.recorder.published().is_empty());
    }

    #[tokio::test]
    async fn cancellation_aborts_classification() {
        let h = harness(FakeClassifier::new(Behavior::Hang));
        let cancel = CancellationToken::new();

        let pipeline = h.pipeline.clone();
        let token = cancel.clone();
        let (ann, bob) = (h.ann, h.bob);
        let task = tokio::spawn(async move { pipeline.send(ann, bob, "hi", &token).await });

        tokio::task::yield_now().await;
        cancel.cancel();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, ChatError::ClassificationUnavailable(_)));
        assert_eq!(h.db.count_messages().unwrap(), 0);
        assert!(h.recorder.published().is_empty());
    }

    #[tokio::test]
    async fn note_to_self_reaches_inbox_once() {
        let h = harness(FakeClassifier::positive());

        let payload = h
            .pipeline
            .send(h.ann, h.ann, "remember the milk", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(payload.sender_id, payload.receiver_id);
        let inbox = h.recorder.to_group(GroupKey::inbox(h.ann));
        assert_eq!(message_ids(&inbox), vec![payload.id]);
        assert_eq!(message_ids(&h.recorder.to_group(GroupKey::conversation(h.ann, h.ann))), vec![payload.id]);
    }

    #[tokio::test]
    async fn mark_read_then_send_counts_again() {
        let h = harness(FakeClassifier::positive());
        let cancel = CancellationToken::new();
        let unread = UnreadReconciler::new(h.db.clone(), h.recorder.clone());

        h.pipeline.send(h.ann, h.bob, "one", &cancel).await.unwrap();
        h.pipeline.send(h.ann, h.bob, "two", &cancel).await.unwrap();
        assert_eq!(unread.mark_read(h.bob, h.ann).await.unwrap(), 2);
        assert_eq!(unread.count_unread(h.bob, h.ann).await.unwrap(), 0);

        h.pipeline.send(h.ann, h.bob, "x", &cancel).await.unwrap();
        assert_eq!(unread.count_unread(h.bob, h.ann).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_sends_are_published_in_commit_order() {
        let h = harness(FakeClassifier::new(Behavior::Slow(Sentiment::neutral())));

        let mut handles = Vec::new();
        for i in 0..30 {
            let pipeline = h.pipeline.clone();
            let (from, to) = if i % 2 == 0 { (h.ann, h.bob) } else { (h.bob, h.ann) };
            handles.push(tokio::spawn(async move {
                let text = "m".repeat(i + 1);
                pipeline.send(from, to, &text, &CancellationToken::new()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let ids = message_ids(&h.recorder.to_group(GroupKey::conversation(h.ann, h.bob)));
        assert_eq!(ids.len(), 30);
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert_eq!(h.pipeline.turns.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn finished_conversations_release_their_turn_locks() {
        let (db, _, _) = seeded_db();
        let users: Vec<UserId> = (0..12)
            .map(|i| db.create_user(&format!("user{}", i), Utc::now()).unwrap().id)
            .collect();
        let recorder = Arc::new(RecordingBroadcaster::default());
        let unread = UnreadReconciler::new(db.clone(), recorder.clone());
        let pipeline = Arc::new(MessagePipeline::new(
            db.clone(),
            FakeClassifier::new(Behavior::Slow(Sentiment::neutral())),
            recorder,
            unread,
        ));

        let mut handles = Vec::new();
        for (i, &a) in users.iter().enumerate() {
            for &b in &users[i + 1..] {
                let pipeline = pipeline.clone();
                handles.push(tokio::spawn(async move {
                    pipeline.send(a, b, "hey", &CancellationToken::new()).await
                }));
            }
        }
        let sends = handles.len();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(db.count_messages().unwrap(), sends as i64);
        assert_eq!(pipeline.turns.len(), 0);
    }
}
