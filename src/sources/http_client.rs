use crate::config::SourceConfig;
use crate::models::SourceError;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    retry_delay_ms: u64,
    max_retries: usize,
}

impl HttpClient {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Yahoo hands out a session cookie on first contact
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            retry_delay_ms: config.retry_delay_ms,
            max_retries: config.max_retries,
        })
    }

    /// Fetch a URL as text. Rate limiting, server errors and transport failures
    /// are retried with jittered exponential backoff; other statuses fail at once.
    pub async fn get_text(&self, url: &str) -> Result<String, SourceError> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor((self.retry_delay_ms / 2).max(1))
            .max_delay(MAX_BACKOFF)
            .map(jitter)
            .take(self.max_retries);

        RetryIf::spawn(
            strategy,
            || self.fetch_once(url),
            |e: &SourceError| {
                let retry = e.is_transient();
                if retry {
                    warn!("GET {} failed ({}), retrying", url, e);
                }
                retry
            },
        )
        .await
    }

    async fn fetch_once(&self, url: &str) -> Result<String, SourceError> {
        debug!("GET {}", url);

        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|source| SourceError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        resp.text().await.map_err(|source| SourceError::Transport {
            url: url.to_string(),
            source,
        })
    }
}
