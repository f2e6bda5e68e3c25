//! Layered run configuration: built-in defaults, overridden by a config
//! file, overridden by environment variables, overridden by CLI flags.

use serde::{Deserialize, Serialize};

/// Strict mode discards security-tagged candidates; lenient mode keeps them
/// tagged. Retest defaults to lenient, a full `merge` run defaults to strict
/// — this asymmetry is intentional (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityPolicy {
    Strict,
    Lenient,
}

impl SecurityPolicy {
    pub fn is_strict(&self) -> bool {
        matches!(self, SecurityPolicy::Strict)
    }
}

/// Full pipeline configuration, constructed by the CLI and consumed by the
/// [`crate::orchestrator::Orchestrator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub output_dir: std::path::PathBuf,

    // Fetcher
    pub fetch_global_concurrency: usize,
    pub fetch_host_concurrency: usize,
    pub fetch_host_rate_per_sec: u32,
    pub fetch_host_burst: u32,
    pub fetch_connect_timeout_secs: u64,
    pub fetch_read_timeout_secs: u64,
    pub fetch_max_retries: u32,
    pub fetch_max_compressed_bytes: u64,
    pub fetch_max_decoded_bytes: u64,
    pub fetch_demote_after_failures: u32,

    // Parser
    pub parser_max_line_bytes: usize,
    pub parser_max_lines: usize,

    // Security
    pub security_policy: SecurityPolicy,

    // Cache
    pub cache_l1_capacity: usize,
    pub cache_ttl_working_secs: u64,
    pub cache_ttl_failing_secs: u64,
    pub cache_db_path: Option<std::path::PathBuf>,
    pub queue_db_path: Option<std::path::PathBuf>,

    // Prober
    pub probe_workers: usize,
    pub probe_timeout_secs: u64,
    pub probe_retry_via_helper: bool,

    // GeoIP
    pub geoip_db_path: Option<std::path::PathBuf>,

    // Scorer / selector
    pub score_weight_success_rate: f64,
    pub score_weight_latency: f64,
    pub score_weight_security: f64,
    pub score_weight_currently_working: f64,
    pub score_latency_soft_cap_ms: f64,
    pub select_top_k_per_protocol: usize,
    pub select_total_target: usize,
    pub select_max_latency_ms: Option<u64>,
    pub select_country_filter: Option<String>,

    // Orchestrator
    pub global_deadline_secs: u64,
    pub mask_sensitive_data: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: std::path::PathBuf::from("output"),

            fetch_global_concurrency: 100,
            fetch_host_concurrency: 4,
            fetch_host_rate_per_sec: 2,
            fetch_host_burst: 4,
            fetch_connect_timeout_secs: 5,
            fetch_read_timeout_secs: 30,
            fetch_max_retries: 3,
            fetch_max_compressed_bytes: 5 * 1024 * 1024,
            fetch_max_decoded_bytes: 10 * 1024 * 1024,
            fetch_demote_after_failures: 5,

            parser_max_line_bytes: 8 * 1024,
            parser_max_lines: 50_000,

            security_policy: SecurityPolicy::Strict,

            cache_l1_capacity: 10_000,
            cache_ttl_working_secs: 2 * 3600,
            cache_ttl_failing_secs: 3600,
            cache_db_path: Some(std::path::PathBuf::from("data/test_cache.db")),
            queue_db_path: Some(std::path::PathBuf::from("data/queue.db")),

            probe_workers: 32,
            probe_timeout_secs: 6,
            probe_retry_via_helper: true,

            geoip_db_path: Some(std::path::PathBuf::from("data/GeoLite2-City.mmdb")),

            score_weight_success_rate: 0.40,
            score_weight_latency: 0.30,
            score_weight_security: 0.20,
            score_weight_currently_working: 0.10,
            score_latency_soft_cap_ms: 5000.0,
            select_top_k_per_protocol: 40,
            select_total_target: 1000,
            select_max_latency_ms: None,
            select_country_filter: None,

            global_deadline_secs: 3600,
            mask_sensitive_data: true,
        }
    }
}

impl PipelineConfig {
    /// Adaptive worker pool degree, bounded to `[8, 32]`, sampled once at
    /// startup and never changed mid-run.
    pub fn adaptive_worker_count() -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cpus * 4).clamp(8, 32)
    }

    /// Apply recognised environment variables on top of an existing
    /// configuration. CLI flags are applied by the caller afterwards
    /// so they win over both file and environment.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("TEST_TIMEOUT") {
            if let Ok(secs) = v.parse() {
                self.probe_timeout_secs = secs;
            }
        }

        if let Ok(v) = std::env::var("MAX_WORKERS") {
            if let Ok(n) = v.parse() {
                self.probe_workers = n;
            }
        }

        if let Ok(v) = std::env::var("CACHE_TTL_SECONDS") {
            if let Ok(secs) = v.parse() {
                self.cache_ttl_working_secs = secs;
            }
        }

        if let Ok(v) = std::env::var("MASK_SENSITIVE_DATA") {
            self.mask_sensitive_data = v.eq_ignore_ascii_case("true");
        }

        self
    }

    pub fn with_worker_default(mut self) -> Self {
        self.probe_workers = Self::adaptive_worker_count();
        self
    }
}
