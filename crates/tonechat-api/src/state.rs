use std::sync::Arc;

use tonechat_db::Database;
use tonechat_gateway::GroupRegistry;
use tonechat_sentiment::Classifier;

use crate::pipeline::MessagePipeline;
use crate::unread::UnreadReconciler;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub registry: GroupRegistry,
    pub pipeline: MessagePipeline,
    pub unread: UnreadReconciler,
}

impl AppStateInner {
    /// Wire the pipeline and reconciler to publish through `registry`.
    pub fn new(db: Arc<Database>, registry: GroupRegistry, classifier: Arc<dyn Classifier>) -> AppState {
        let broadcaster = Arc::new(registry.clone());
        let unread = UnreadReconciler::new(db.clone(), broadcaster.clone());
        let pipeline = MessagePipeline::new(db.clone(), classifier, broadcaster, unread.clone());

        Arc::new(Self {
            db,
            registry,
            pipeline,
            unread,
        })
    }
}
