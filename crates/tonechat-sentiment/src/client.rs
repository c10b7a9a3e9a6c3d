use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tonechat_types::models::Sentiment;

use crate::shapes::parse_response;
use crate::{ClassifyError, Classifier};

/// Longest text submitted for scoring, in characters. Longer input is cut.
pub const MAX_INPUT_CHARS: usize = 1000;

/// Floor for the per-attempt timeout. The hosted model can take a while to
/// wake up.
pub const MIN_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(25);

/// Candidate paths under the base URL, in the order they are tried.
const ENDPOINT_PATHS: [&str; 3] = ["run/predict", "predict", "api/predict"];

pub struct SentimentClient {
    http: reqwest::Client,
    base_url: String,
}

impl SentimentClient {
    /// `timeout` applies to each endpoint attempt and is raised to
    /// [`MIN_ATTEMPT_TIMEOUT`] if shorter.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_attempt_timeout(base_url, timeout.max(MIN_ATTEMPT_TIMEOUT))
    }

    /// Like [`SentimentClient::new`] but without the floor.
    #[cfg(test)]
    fn unclamped(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_attempt_timeout(base_url, timeout)
    }

    fn with_attempt_timeout(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoints(&self) -> Vec<String> {
        ENDPOINT_PATHS
            .iter()
            .map(|path| format!("{}/{}", self.base_url, path))
            .collect()
    }

    /// One POST against one endpoint. Any failure comes back as a
    /// human-readable reason so the caller can move on to the next candidate.
    async fn attempt(&self, url: &str, payload: &Value) -> Result<Sentiment, String> {
        let resp = self
            .http
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| format!("reading body failed: {}", e))?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| format!("invalid JSON: {}", e))?;

        let (shape, sentiment) =
            parse_response(&value).ok_or_else(|| "unrecognized response shape".to_string())?;
        debug!("{} answered with {:?} shape", url, shape);
        Ok(sentiment)
    }
}

#[async_trait]
impl Classifier for SentimentClient {
    async fn classify(&self, text: &str, cancel: &CancellationToken) -> Result<Sentiment, ClassifyError> {
        if text.trim().is_empty() {
            return Ok(Sentiment::neutral());
        }

        let truncated: String = text.chars().take(MAX_INPUT_CHARS).collect();
        let payload = json!({ "data": [truncated] });

        let mut last_error = String::from("no endpoint attempted");
        for url in self.endpoints() {
            if cancel.is_cancelled() {
                return Err(ClassifyError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ClassifyError::Cancelled),
                outcome = self.attempt(&url, &payload) => outcome,
            };

            match outcome {
                Ok(sentiment) => {
                    debug!("Classified via {}: {} {:.3}", url, sentiment.label, sentiment.score);
                    return Ok(sentiment);
                }
                Err(reason) => {
                    warn!("Sentiment endpoint {} failed: {}", url, reason);
                    last_error = format!("{}: {}", url, reason);
                }
            }
        }

        Err(ClassifyError::Unavailable(last_error))
    }
}
