//! Client for the external sentiment scoring service.
//!
//! The service's wire contract is not stable: it may live under one of several
//! paths and answer in one of several JSON shapes. [`SentimentClient`] tries
//! each candidate path in order and accepts the first answer it can read.

pub mod client;
pub mod shapes;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use tonechat_types::models::Sentiment;

pub use client::SentimentClient;

#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Every candidate endpoint failed; carries the last failure seen
    #[error("sentiment service not reachable or returned unexpected schema: {0}")]
    Unavailable(String),

    #[error("classification cancelled")]
    Cancelled,
}

/// Anything that can score a piece of text.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str, cancel: &CancellationToken) -> Result<Sentiment, ClassifyError>;
}
