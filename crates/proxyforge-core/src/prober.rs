//! Prober: the concurrency-bounded worker pool that actually tests
//! each candidate's connectivity, consulting and updating the multi-level
//! [`TestCache`] along the way.

use crate::cache::TestCache;
use crate::helper::{HelperCommandTemplate, HelperProcess};
use crate::types::{CacheEntry, Candidate, FailureKind, ProbeResult, ProbeStrategy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Ordered list of generic liveness URLs probed in sequence; the first
/// success short-circuits the rest. Kept tiny and
/// cache-control: no-store by convention upstream.
const LIVENESS_URLS: &[&str] = &[
    "http://cp.cloudflare.com/generate_204",
    "http://www.gstatic.com/generate_204",
    "http://connectivity-check.ubuntu.com",
];

#[derive(Debug, Clone)]
pub struct ProberConfig {
    pub workers: usize,
    pub timeout: Duration,
    pub retry_via_helper: bool,
    pub helper_template: Option<HelperCommandTemplate>,
    pub helper_startup_timeout: Duration,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            workers: 32,
            timeout: Duration::from_secs(6),
            retry_via_helper: true,
            helper_template: None,
            helper_startup_timeout: Duration::from_secs(2),
        }
    }
}

/// Owns the worker-pool semaphore and shared cache handle; a single
/// instance is shared (via `Arc`) across all probe tasks for a run.
pub struct Prober {
    config: ProberConfig,
    semaphore: Arc<Semaphore>,
    cache: Arc<TestCache>,
}

impl Prober {
    pub fn new(config: ProberConfig, cache: Arc<TestCache>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
        Self { config, semaphore, cache }
    }

    /// Probe one candidate end-to-end: cache check, strategy selection,
    /// liveness chain, optional helper fallback, cache write-back. Bounded
    /// by the worker-pool semaphore's fixed degree. Returns the fresh
    /// [`CacheEntry`] alongside the result so callers can read the rolling
    /// success rate without a redundant cache write.
    pub async fn probe(&self, candidate: &Candidate) -> (ProbeResult, CacheEntry) {
        let _permit = self.semaphore.acquire().await.expect("semaphore never closed");

        if let Some(entry) = self.cache.get(candidate.fingerprint).await {
            return (entry.last_result.clone(), entry);
        }

        let result = if candidate.protocol.is_direct_dialable() {
            self.probe_direct(candidate).await
        } else {
            self.probe_via_helper(candidate).await
        };

        let result = if !result.is_working && self.config.retry_via_helper && candidate.protocol.is_direct_dialable() {
            // Direct strategy failed; some direct protocols (plain HTTP/SOCKS
            // proxies that actually gate on TLS SNI, etc.) can still succeed
            // through a helper if one's configured.
            if self.config.helper_template.is_some() {
                self.probe_via_helper(candidate).await
            } else {
                result
            }
        } else {
            result
        };

        let entry = self.cache.put(result.clone()).await;
        (result, entry)
    }

    async fn probe_direct(&self, candidate: &Candidate) -> ProbeResult {
        let proxy_url = format!(
            "{}://{}:{}",
            candidate.protocol.as_str(),
            candidate.host,
            candidate.port
        );
        self.run_liveness_chain(candidate, &proxy_url, ProbeStrategy::Direct).await
    }

    async fn probe_via_helper(&self, candidate: &Candidate) -> ProbeResult {
        let Some(template) = &self.config.helper_template else {
            return ProbeResult {
                fingerprint: candidate.fingerprint,
                is_working: false,
                latency_ms: None,
                tested_at: chrono::Utc::now(),
                strategy: ProbeStrategy::Helper,
                failure_kind: Some(FailureKind::HelperStartupFailed),
            };
        };

        let helper = match HelperProcess::spawn(template, &candidate.raw_uri, self.config.helper_startup_timeout).await {
            Ok(h) => h,
            Err(_) => {
                return ProbeResult {
                    fingerprint: candidate.fingerprint,
                    is_working: false,
                    latency_ms: None,
                    tested_at: chrono::Utc::now(),
                    strategy: ProbeStrategy::Helper,
                    failure_kind: Some(FailureKind::HelperStartupFailed),
                };
            }
        };

        let (host, port) = helper.proxy_addr();
        let proxy_url = format!("http://{host}:{port}");
        let result = self.run_liveness_chain(candidate, &proxy_url, ProbeStrategy::Helper).await;
        helper.shutdown().await;
        result
    }

    /// Try each liveness URL in order with a shrinking per-attempt timeout
    /// (T, T-1s, ..., floor 3s), stopping at the first success.
    async fn run_liveness_chain(&self, candidate: &Candidate, proxy_url: &str, strategy: ProbeStrategy) -> ProbeResult {
        let proxy = match reqwest::Proxy::all(proxy_url) {
            Ok(p) => p,
            Err(_) => {
                return ProbeResult {
                    fingerprint: candidate.fingerprint,
                    is_working: false,
                    latency_ms: None,
                    tested_at: chrono::Utc::now(),
                    strategy,
                    failure_kind: Some(FailureKind::InvalidResponse),
                };
            }
        };

        let mut last_failure = FailureKind::Timeout;
        let base_timeout = self.config.timeout;

        for (i, url) in LIVENESS_URLS.iter().enumerate() {
            let attempt_timeout = base_timeout
                .saturating_sub(Duration::from_secs(i as u64))
                .max(Duration::from_secs(3));

            // Each candidate dials through its own proxy URL, so a
            // per-attempt client is unavoidable; `self.config.timeout` still
            // governs the shrinking per-attempt bound below.
            let client = match reqwest::Client::builder().proxy(proxy.clone()).timeout(attempt_timeout).build() {
                Ok(c) => c,
                Err(_) => continue,
            };

            let started = std::time::Instant::now();
            match client.get(*url).send().await {
                Ok(response) if response.status().is_success() || response.status().as_u16() == 204 => {
                    return ProbeResult {
                        fingerprint: candidate.fingerprint,
                        is_working: true,
                        latency_ms: Some(started.elapsed().as_millis() as u64),
                        tested_at: chrono::Utc::now(),
                        strategy,
                        failure_kind: None,
                    };
                }
                Ok(response) => {
                    last_failure = FailureKind::BadStatus;
                    let _ = response.status();
                }
                Err(e) if e.is_timeout() => last_failure = FailureKind::Timeout,
                Err(e) if e.is_connect() => last_failure = FailureKind::TcpRefused,
                Err(e) if e.to_string().to_ascii_lowercase().contains("tls") => last_failure = FailureKind::TlsError,
                Err(_) => last_failure = FailureKind::InvalidResponse,
            }
        }

        ProbeResult {
            fingerprint: candidate.fingerprint,
            is_working: false,
            latency_ms: None,
            tested_at: chrono::Utc::now(),
            strategy,
            failure_kind: Some(last_failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Protocol;
    use std::collections::HashMap;

    fn candidate(protocol: Protocol) -> Candidate {
        let fields = crate::parsers::ParsedFields {
            protocol,
            host: "203.0.113.1".to_string(),
            port: 1,
            auth: Vec::new(),
            transport_params: HashMap::new(),
            tls_params: HashMap::new(),
            remarks: None,
            details: HashMap::new(),
        };
        fields.into_candidate("raw".into(), "src".into())
    }

    #[tokio::test]
    async fn unreachable_direct_candidate_fails_with_a_kind() {
        let cache = Arc::new(TestCache::open(None, 100, Duration::from_secs(60), Duration::from_secs(60)));
        let config = ProberConfig {
            timeout: Duration::from_millis(300),
            ..ProberConfig::default()
        };
        let prober = Prober::new(config, cache);
        let (result, _entry) = prober.probe(&candidate(Protocol::Http)).await;
        assert!(!result.is_working);
        assert!(result.failure_kind.is_some());
    }

    #[tokio::test]
    async fn helper_protocol_without_template_reports_helper_startup_failed() {
        let cache = Arc::new(TestCache::open(None, 100, Duration::from_secs(60), Duration::from_secs(60)));
        let prober = Prober::new(ProberConfig::default(), cache);
        let (result, _entry) = prober.probe(&candidate(Protocol::Trojan)).await;
        assert_eq!(result.failure_kind, Some(FailureKind::HelperStartupFailed));
        assert_eq!(result.strategy, ProbeStrategy::Helper);
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_the_liveness_chain() {
        let cache = Arc::new(TestCache::open(None, 100, Duration::from_secs(3600), Duration::from_secs(3600)));
        let c = candidate(Protocol::Http);
        cache
            .put(ProbeResult {
                fingerprint: c.fingerprint,
                is_working: true,
                latency_ms: Some(42),
                tested_at: chrono::Utc::now(),
                strategy: ProbeStrategy::Direct,
                failure_kind: None,
            })
            .await;

        let prober = Prober::new(ProberConfig::default(), cache);
        let (result, entry) = prober.probe(&c).await;
        assert!(result.is_working);
        assert_eq!(result.latency_ms, Some(42));
        assert_eq!(entry.last_result.latency_ms, Some(42));
    }
}
