//! The canonical data model shared by every pipeline stage: [`Candidate`],
//! [`ProbeResult`], [`CacheEntry`], [`EnrichedProxy`] and the aggregated
//! [`RunReport`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Every protocol the parser set understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Vmess,
    Vless,
    Shadowsocks,
    Shadowsocks2022,
    ShadowsocksR,
    Trojan,
    TrojanGo,
    Hysteria,
    Hysteria2,
    Tuic,
    WireGuard,
    Naive,
    Snell,
    Brook,
    Juicity,
    Http,
    Https,
    Socks4,
    Socks5,
    Ssh,
}

impl Protocol {
    /// Stable lowercase identifier used in fingerprints, file names and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Shadowsocks => "ss",
            Protocol::Shadowsocks2022 => "ss2022",
            Protocol::ShadowsocksR => "ssr",
            Protocol::Trojan => "trojan",
            Protocol::TrojanGo => "trojan-go",
            Protocol::Hysteria => "hysteria",
            Protocol::Hysteria2 => "hysteria2",
            Protocol::Tuic => "tuic",
            Protocol::WireGuard => "wireguard",
            Protocol::Naive => "naive",
            Protocol::Snell => "snell",
            Protocol::Brook => "brook",
            Protocol::Juicity => "juicity",
            Protocol::Http => "http",
            Protocol::Https => "https",
            Protocol::Socks4 => "socks4",
            Protocol::Socks5 => "socks5",
            Protocol::Ssh => "ssh",
        }
    }

    /// Protocols the [`Prober`](crate::prober) can dial directly without a helper process.
    pub fn is_direct_dialable(&self) -> bool {
        matches!(
            self,
            Protocol::Http | Protocol::Https | Protocol::Socks4 | Protocol::Socks5
        )
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stable 128-bit digest identifying a [`Candidate`] for dedup, the disk
/// queue, and cache keys. See [`crate::canonical::fingerprint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub [u8; 16]);

impl Fingerprint {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 16 {
            return None;
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Some(Self(arr))
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Security-issue categories a [`Candidate`] can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityCategory {
    WeakEncryption,
    InsecureTransport,
    DangerousPort,
    SuspiciousDomain,
    InvalidCertificate,
    MissingAuth,
    ConfigurationError,
    DeprecatedProtocol,
}

/// The canonical, pre-probe proxy record produced by a parser. Immutable
/// after construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub fingerprint: Fingerprint,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// Opaque authentication material (password, UUID, PSK...), never logged
    /// verbatim when `MASK_SENSITIVE_DATA` is on.
    pub auth: Vec<u8>,
    pub transport_params: HashMap<String, String>,
    pub tls_params: HashMap<String, String>,
    pub remarks: Option<String>,
    pub raw_uri: String,
    pub source_url: String,
    pub security_issues: HashMap<SecurityCategory, Vec<String>>,
    pub details: HashMap<String, String>,
}

impl Candidate {
    pub fn has_security_issues(&self) -> bool {
        self.security_issues.values().any(|tags| !tags.is_empty())
    }
}

/// Why a probe failed to establish a working connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    TcpRefused,
    TlsError,
    BadStatus,
    HelperStartupFailed,
    InvalidResponse,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "probe_timeout",
            FailureKind::TcpRefused => "probe_refused",
            FailureKind::TlsError => "probe_tls",
            FailureKind::BadStatus => "probe_bad_status",
            FailureKind::HelperStartupFailed => "probe_helper",
            FailureKind::InvalidResponse => "invalid_response",
        }
    }
}

/// Strategy used to dial through a candidate during probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStrategy {
    Direct,
    Helper,
}

/// Outcome of testing a single [`Candidate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub fingerprint: Fingerprint,
    pub is_working: bool,
    pub latency_ms: Option<u64>,
    pub tested_at: chrono::DateTime<chrono::Utc>,
    pub strategy: ProbeStrategy,
    pub failure_kind: Option<FailureKind>,
}

/// A bounded ring of recent [`ProbeResult`]s for one fingerprint, used for
/// health scoring and the `proxy_history*.json` visualisation exports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub entries: std::collections::VecDeque<ProbeResult>,
}

pub const HISTORY_CAP: usize = 100;

impl HistoryEntry {
    pub fn push(&mut self, result: ProbeResult) {
        if self.entries.len() >= HISTORY_CAP {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    pub fn success_count(&self) -> usize {
        self.entries.iter().filter(|r| r.is_working).count()
    }

    pub fn total_count(&self) -> usize {
        self.entries.len()
    }
}

/// The last verdict for a fingerprint plus rolling success statistics,
/// mirrored between the in-memory L1 cache and the on-disk L2 SQLite cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub last_result: ProbeResult,
    pub tested_at: chrono::DateTime<chrono::Utc>,
    pub ttl_secs: u64,
    pub success_count: u64,
    pub total_count: u64,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        let age = (now - self.tested_at).num_seconds().max(0) as u64;
        age < self.ttl_secs
    }

    pub fn rolling_success_rate(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        self.success_count as f64 / self.total_count as f64
    }
}

/// A [`Candidate`] enriched with geolocation and live health data — the
/// shape emitted in `proxies.json`/`chosen.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedProxy {
    #[serde(flatten)]
    pub candidate: CandidateView,
    pub country_code: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub asn: Option<u32>,
    pub is_working: bool,
    pub latency_ms: Option<u64>,
    pub health_score: f64,
}

/// JSON-serialisable projection of [`Candidate`] (fingerprint rendered as
/// hex, auth bytes base64-encoded rather than raw). Carries
/// `security_issues` through so a lenient-mode-kept, tagged proxy stays
/// distinguishable from a clean one in `proxies.json`/`chosen.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateView {
    pub fingerprint: String,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    pub auth_b64: String,
    pub transport_params: HashMap<String, String>,
    pub tls_params: HashMap<String, String>,
    pub remarks: Option<String>,
    pub raw_uri: String,
    pub source_url: String,
    pub security_issues: HashMap<SecurityCategory, Vec<String>>,
}

impl From<&Candidate> for CandidateView {
    fn from(c: &Candidate) -> Self {
        use base64::Engine;
        Self {
            fingerprint: c.fingerprint.to_hex(),
            protocol: c.protocol,
            host: c.host.clone(),
            port: c.port,
            auth_b64: base64::engine::general_purpose::STANDARD.encode(&c.auth),
            transport_params: c.transport_params.clone(),
            tls_params: c.tls_params.clone(),
            remarks: c.remarks.clone(),
            raw_uri: c.raw_uri.clone(),
            source_url: c.source_url.clone(),
            security_issues: c.security_issues.clone(),
        }
    }
}

/// Per-phase wall-clock duration, recorded by the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseDurations {
    pub fetch_ms: u64,
    pub parse_ms: u64,
    pub probe_ms: u64,
    pub geoip_ms: u64,
    pub score_ms: u64,
    pub emit_ms: u64,
}

/// The aggregated, once-per-run counters emitted as `statistics.json` /
/// `metrics.json` and surfaced to the CLI summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub sources_total: usize,
    pub sources_fetched_ok: usize,
    pub sources_not_modified: usize,
    pub sources_failed: usize,
    pub lines_parsed: usize,
    pub candidates_parsed: usize,
    pub candidates_unique: usize,
    pub duplicates_dropped: usize,
    pub security_rejected: usize,
    pub candidates_tested: usize,
    pub candidates_working: usize,
    pub candidates_selected: usize,
    pub by_protocol: HashMap<String, usize>,
    pub by_country: HashMap<String, usize>,
    pub top_errors: Vec<(String, usize)>,
    pub durations: PhaseDurations,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: chrono::Utc::now(),
            ..Default::default()
        }
    }

    /// Invariant (i): `fetched ≥ parsed ≥ unique ≥ tested ≥ working ≥ selected`.
    pub fn reconciles(&self) -> bool {
        self.sources_fetched_ok + self.sources_not_modified >= self.candidates_parsed.min(self.sources_fetched_ok + self.sources_not_modified)
            && self.candidates_parsed >= self.candidates_unique
            && self.candidates_unique >= self.candidates_tested
            && self.candidates_tested >= self.candidates_working
            && self.candidates_working >= self.candidates_selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_hex_roundtrip() {
        let fp = Fingerprint([7u8; 16]);
        let hex = fp.to_hex();
        assert_eq!(Fingerprint::from_hex(&hex), Some(fp));
    }

    #[test]
    fn history_ring_is_bounded() {
        let mut h = HistoryEntry::default();
        for i in 0..150 {
            h.push(ProbeResult {
                fingerprint: Fingerprint([0; 16]),
                is_working: i % 2 == 0,
                latency_ms: Some(10),
                tested_at: chrono::Utc::now(),
                strategy: ProbeStrategy::Direct,
                failure_kind: None,
            });
        }
        assert_eq!(h.total_count(), HISTORY_CAP);
    }

    #[test]
    fn run_report_reconciliation_holds_for_monotone_counts() {
        let mut r = RunReport::new();
        r.candidates_parsed = 100;
        r.candidates_unique = 80;
        r.candidates_tested = 80;
        r.candidates_working = 30;
        r.candidates_selected = 10;
        r.sources_fetched_ok = 100;
        assert!(r.reconciles());
    }
}
