//! Scorer & Selector: ranks enriched proxies by a weighted health
//! score, then selects a deterministic, protocol-balanced subset.

use crate::types::{EnrichedProxy, Protocol};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ScoreWeights {
    pub success_rate: f64,
    pub latency: f64,
    pub security: f64,
    pub currently_working: f64,
    pub latency_soft_cap_ms: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            success_rate: 0.40,
            latency: 0.30,
            security: 0.20,
            currently_working: 0.10,
            latency_soft_cap_ms: 5000.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectionConfig {
    pub top_k_per_protocol: usize,
    pub total_target: usize,
    pub max_latency_ms: Option<u64>,
    pub country_filter: Option<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_k_per_protocol: 40,
            total_target: 1000,
            max_latency_ms: None,
            country_filter: None,
        }
    }
}

/// A monotonically decreasing sigmoid centred near 60% of the soft-cap
/// latency: proxies well under the cap score near 1.0, proxies near or
/// past it fall off smoothly rather than cliff-edging at the cap.
fn latency_curve(latency_ms: u64, soft_cap_ms: f64) -> f64 {
    let midpoint = soft_cap_ms * 0.6;
    let steepness = 8.0 / soft_cap_ms.max(1.0);
    1.0 / (1.0 + ((latency_ms as f64 - midpoint) * steepness).exp())
}

/// `health_score = 100 * (w1*success_rate + w2*latency_curve + w3*security_bonus + w4*currently_working)`,
/// scaled to the documented 0-100 range. A proxy with no security issues
/// gets the full security bonus; one carrying a lenient-mode tag gets none.
/// Proxies with no latency sample (never successfully probed) get a
/// latency term of 0.
pub fn score(
    proxy: &EnrichedProxy,
    rolling_success_rate: f64,
    has_security_issues: bool,
    weights: &ScoreWeights,
) -> f64 {
    let latency_term = proxy
        .latency_ms
        .map(|ms| latency_curve(ms, weights.latency_soft_cap_ms))
        .unwrap_or(0.0);
    let security_bonus = if has_security_issues { 0.0 } else { 1.0 };
    let working_term = if proxy.is_working { 1.0 } else { 0.0 };

    100.0
        * (weights.success_rate * rolling_success_rate
            + weights.latency * latency_term
            + weights.security * security_bonus
            + weights.currently_working * working_term)
}

/// Filter to working + no security issues + has latency, sort ascending by
/// latency, take top K per protocol, then fill to `total_target` from the
/// remaining best by latency. Ties break on fingerprint for determinism
/// across runs with identical inputs.
pub fn select(mut candidates: Vec<EnrichedProxy>, config: &SelectionConfig) -> Vec<EnrichedProxy> {
    candidates.retain(|p| {
        p.is_working
            && p.latency_ms.is_some()
            && config.max_latency_ms.map(|cap| p.latency_ms.unwrap() <= cap).unwrap_or(true)
            && config
                .country_filter
                .as_ref()
                .map(|cc| p.country_code.as_deref() == Some(cc.as_str()))
                .unwrap_or(true)
    });

    candidates.sort_by(|a, b| {
        a.latency_ms
            .cmp(&b.latency_ms)
            .then_with(|| a.candidate.fingerprint.cmp(&b.candidate.fingerprint))
    });

    let mut per_protocol: HashMap<String, usize> = HashMap::new();
    let mut head = Vec::new();
    let mut remainder = Vec::new();

    for proxy in candidates {
        let protocol_key = proxy.candidate.protocol.as_str().to_string();
        let count = per_protocol.entry(protocol_key).or_insert(0);
        if *count < config.top_k_per_protocol {
            *count += 1;
            head.push(proxy);
        } else {
            remainder.push(proxy);
        }
    }

    let mut selected = head;
    for proxy in remainder {
        if selected.len() >= config.total_target {
            break;
        }
        selected.push(proxy);
    }
    selected.truncate(config.total_target);
    selected
}

/// Convenience used by the orchestrator to know which protocol bucket an
/// `EnrichedProxy` belongs to.
pub fn protocol_of(proxy: &EnrichedProxy) -> Protocol {
    proxy.candidate.protocol
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateView, Fingerprint};

    fn proxy(fingerprint: [u8; 16], latency_ms: Option<u64>, working: bool) -> EnrichedProxy {
        EnrichedProxy {
            candidate: CandidateView {
                fingerprint: Fingerprint(fingerprint).to_hex(),
                protocol: Protocol::Http,
                host: "203.0.113.1".to_string(),
                port: 8080,
                auth_b64: String::new(),
                transport_params: HashMap::new(),
                tls_params: HashMap::new(),
                remarks: None,
                raw_uri: String::new(),
                source_url: "src".to_string(),
                security_issues: HashMap::new(),
            },
            country_code: None,
            country: None,
            city: None,
            asn: None,
            is_working: working,
            latency_ms,
            health_score: 0.0,
        }
    }

    #[test]
    fn latency_curve_is_monotonically_decreasing() {
        let a = latency_curve(100, 5000.0);
        let b = latency_curve(3000, 5000.0);
        let c = latency_curve(8000, 5000.0);
        assert!(a > b);
        assert!(b > c);
    }

    #[test]
    fn select_drops_non_working_and_no_latency() {
        let candidates = vec![
            proxy([1; 16], Some(50), true),
            proxy([2; 16], None, true),
            proxy([3; 16], Some(10), false),
        ];
        let selected = select(candidates, &SelectionConfig::default());
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].latency_ms, Some(50));
    }

    #[test]
    fn select_sorts_ascending_by_latency_with_fingerprint_tiebreak() {
        let candidates = vec![
            proxy([2; 16], Some(50), true),
            proxy([1; 16], Some(50), true),
            proxy([3; 16], Some(10), true),
        ];
        let selected = select(candidates, &SelectionConfig::default());
        assert_eq!(selected[0].latency_ms, Some(10));
        // equal latency: fingerprint [1;16] < [2;16]
        assert!(selected[1].candidate.fingerprint < selected[2].candidate.fingerprint);
    }

    #[test]
    fn select_respects_max_latency_filter() {
        let candidates = vec![proxy([1; 16], Some(9000), true)];
        let config = SelectionConfig { max_latency_ms: Some(5000), ..SelectionConfig::default() };
        assert!(select(candidates, &config).is_empty());
    }
}
