//! Fakes for the pipeline's collaborators.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use tonechat_db::Database;
use tonechat_gateway::{Broadcaster, GroupKey};
use tonechat_sentiment::{ClassifyError, Classifier};
use tonechat_types::UserId;
use tonechat_types::events::GatewayEvent;
use tonechat_types::models::{Sentiment, SentimentLabel};

/// Records every publish instead of delivering it.
#[derive(Default)]
pub struct RecordingBroadcaster {
    published: Mutex<Vec<(GroupKey, GatewayEvent)>>,
}

impl RecordingBroadcaster {
    pub fn published(&self) -> Vec<(GroupKey, GatewayEvent)> {
        self.published.lock().unwrap().clone()
    }

    pub fn to_group(&self, group: GroupKey) -> Vec<GatewayEvent> {
        self.published()
            .into_iter()
            .filter(|(g, _)| *g == group)
            .map(|(_, e)| e)
            .collect()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn publish(&self, group: &GroupKey, event: &GatewayEvent) -> usize {
        self.published.lock().unwrap().push((*group, event.clone()));
        1
    }
}

pub enum Behavior {
    Answer(Sentiment),
    Fail,
    /// Never answers until cancelled
    Hang,
    /// Answers after a delay derived from the text length
    Slow(Sentiment),
}

pub struct FakeClassifier {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl FakeClassifier {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn positive() -> Arc<Self> {
        Self::new(Behavior::Answer(Sentiment {
            label: SentimentLabel::Positive,
            score: 0.87,
        }))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for FakeClassifier {
    async fn classify(&self, text: &str, cancel: &CancellationToken) -> Result<Sentiment, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Answer(s) => Ok(*s),
            Behavior::Fail => Err(ClassifyError::Unavailable("all endpoints down".into())),
            Behavior::Hang => {
                cancel.cancelled().await;
                Err(ClassifyError::Cancelled)
            }
            Behavior::Slow(s) => {
                let delay = Duration::from_millis((text.len() % 7) as u64 * 3);
                tokio::time::sleep(delay).await;
                Ok(*s)
            }
        }
    }
}

/// In-memory database seeded with users "ann" and "bob".
pub fn seeded_db() -> (Arc<Database>, UserId, UserId) {
    let db = Database::open_in_memory().unwrap();
    let ann = db.create_user("ann", Utc::now()).unwrap().id;
    let bob = db.create_user("bob", Utc::now()).unwrap().id;
    (Arc::new(db), ann, bob)
}
