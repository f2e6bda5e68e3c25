//! HTTP Fetcher: conditional GETs with per-host throttling, retry
//! with exponential backoff, and a hard size cap.

use crate::ratelimit::HostLimiterRegistry;
use crate::registry::Source;
use rand::Rng;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Why a fetch failed to produce a usable body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    Transport(String),
    Status(u16),
    TooLarge,
}

impl FetchFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchFailure::Transport(_) => "fetch_transport",
            FetchFailure::Status(_) => "fetch_status",
            FetchFailure::TooLarge => "fetch_too_large",
        }
    }
}

/// Successful fetch outcome. An empty `body` with `not_modified = true`
/// means the parser stage should be skipped entirely.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub body: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub not_modified: bool,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

/// Fetcher configuration (subset of [`crate::config::PipelineConfig`]
/// relevant to this stage).
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub max_retries: u32,
    pub max_compressed_bytes: u64,
    pub max_decoded_bytes: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            max_retries: 3,
            max_compressed_bytes: 5 * 1024 * 1024,
            max_decoded_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Issues conditional GETs against registered sources, honouring per-host
/// throttling and retry-with-backoff. Owns its connection pool; safe to
/// share via `Arc` across fetch workers.
pub struct Fetcher {
    client: Client,
    config: FetcherConfig,
    hosts: HostLimiterRegistry,
}

impl Fetcher {
    pub fn new(config: FetcherConfig, global_concurrency: usize, hosts: HostLimiterRegistry) -> Self {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("proxyforge/0.1")
            .build()
            .unwrap_or_else(|_| Client::new());
        let _ = global_concurrency; // bounded externally by the orchestrator's task fan-out

        Self { client, config, hosts }
    }

    /// Fetch one source, applying conditional headers from its prior
    /// validator state, honouring per-host admission, and retrying
    /// transient failures with exponential backoff + jitter.
    pub async fn fetch(&self, source: &Source) -> Result<FetchedBody, FetchFailure> {
        let _permit = self.hosts.acquire(&source.host).await;

        let mut backoff = Duration::from_millis(500);
        let mut attempt = 0u32;

        loop {
            match self.try_once(source).await {
                Ok(outcome) => return Ok(outcome),
                Err(Attempt::Retryable(reason, retry_after)) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(reason);
                    }
                    let wait = retry_after.unwrap_or_else(|| jittered(backoff));
                    tokio::time::sleep(wait).await;
                    backoff *= 2;
                }
                Err(Attempt::Terminal(reason)) => return Err(reason),
            }
        }
    }

    async fn try_once(&self, source: &Source) -> Result<FetchedBody, Attempt> {
        let mut request = self.client.get(&source.url);
        if let Some(etag) = &source.etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(lm) = &source.last_modified {
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, lm);
        }

        let response = request.send().await.map_err(|e| {
            Attempt::Retryable(FetchFailure::Transport(e.to_string()), None)
        })?;

        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            return Ok(FetchedBody {
                body: String::new(),
                etag: source.etag.clone(),
                last_modified: source.last_modified.clone(),
                not_modified: true,
                fetched_at: chrono::Utc::now(),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(Attempt::Retryable(
                FetchFailure::Status(status.as_u16()),
                retry_after,
            ));
        }

        if status.is_server_error() {
            return Err(Attempt::Retryable(FetchFailure::Status(status.as_u16()), None));
        }

        if !status.is_success() {
            return Err(Attempt::Terminal(FetchFailure::Status(status.as_u16())));
        }

        if let Some(len) = response.content_length() {
            if len > self.config.max_compressed_bytes {
                return Err(Attempt::Terminal(FetchFailure::TooLarge));
            }
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let last_modified = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Attempt::Retryable(FetchFailure::Transport(e.to_string()), None))?;

        if bytes.len() as u64 > self.config.max_decoded_bytes {
            return Err(Attempt::Terminal(FetchFailure::TooLarge));
        }

        let body = String::from_utf8_lossy(&bytes).into_owned();

        Ok(FetchedBody {
            body,
            etag,
            last_modified,
            not_modified: false,
            fetched_at: chrono::Utc::now(),
        })
    }
}

enum Attempt {
    Retryable(FetchFailure, Option<Duration>),
    Terminal(FetchFailure),
}

/// Exponential backoff with ±25% jitter.
fn jittered(base: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let factor = rng.gen_range(0.75..=1.25);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failure_kind_mapping() {
        assert_eq!(FetchFailure::TooLarge.kind(), "fetch_too_large");
        assert_eq!(FetchFailure::Status(503).kind(), "fetch_status");
    }

    #[test]
    fn jittered_backoff_stays_within_bounds() {
        let base = Duration::from_millis(500);
        for _ in 0..50 {
            let d = jittered(base);
            assert!(d.as_millis() >= 374 && d.as_millis() <= 626);
        }
    }
}
