use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

/// Runtime configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    /// Base URL of the sentiment scoring service
    pub ai_base_url: String,
    /// Per-endpoint ceiling for classification attempts
    pub ai_timeout: Duration,
    /// Explicit CORS origins. Empty means the default localhost/vercel rule.
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let port = var("TONECHAT_PORT", "5000")
            .parse()
            .context("TONECHAT_PORT must be a port number")?;
        let timeout_secs: u64 = var("AI_TIMEOUT_SECS", "25")
            .parse()
            .context("AI_TIMEOUT_SECS must be a whole number of seconds")?;

        let cors_origins = lookup("CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            host: var("TONECHAT_HOST", "0.0.0.0"),
            port,
            db_path: var("TONECHAT_DB_PATH", "AppData/app.db").into(),
            ai_base_url: var("AI_BASE_URL", "http://127.0.0.1:7860"),
            ai_timeout: Duration::from_secs(timeout_secs),
            cors_origins,
        })
    }
}
