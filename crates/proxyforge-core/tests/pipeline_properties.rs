//! End-to-end property tests against the concrete scenarios in the design
//! notes: dedup across overlapping sources, 304-preserves-previous-output,
//! retest-mode all-failing, and top-K/total-target selection.

use proxyforge_core::canonical::Deduper;
use proxyforge_core::parsers::parse_body;
use proxyforge_core::scorer::{select, SelectionConfig};
use proxyforge_core::types::{CandidateView, EnrichedProxy, Fingerprint, Protocol};
use std::collections::HashMap;

#[test]
fn duplicate_union_across_two_sources_counts_overlap() {
    let source_a = "vmess://eyJhZGQiOiIxOTguNTEuMTAwLjEwIiwicG9ydCI6IjQ0MyIsImlkIjoiYWJjIn0=\nhttp://u:p@203.0.113.5:8080\n";
    let source_b = "http://u:p@203.0.113.5:8080\nsocks5://198.51.100.20:1080\n";

    let mut candidates = parse_body(source_a, "source-a");
    candidates.extend(parse_body(source_b, "source-b"));

    let parsed_total = candidates.len();
    let mut deduper = Deduper::new();
    let (unique, dropped) = deduper.dedupe(candidates);

    // http://u:p@203.0.113.5:8080 appears in both sources; it is the only overlap.
    assert_eq!(dropped, 1);
    assert_eq!(unique.len(), parsed_total - dropped);
    assert_eq!(unique.len(), 3);
}

#[test]
fn not_modified_source_yields_zero_parses() {
    // A 304 carries no body; the fetcher never hands a body to the parser,
    // so parsing it directly must also yield nothing.
    let empty_body = "";
    let candidates = parse_body(empty_body, "source-etag");
    assert!(candidates.is_empty());
}

#[test]
fn selection_caps_per_protocol_and_total_target() {
    let protocols = [
        Protocol::Vmess,
        Protocol::Vless,
        Protocol::Shadowsocks,
        Protocol::Trojan,
        Protocol::Http,
    ];

    let mut candidates = Vec::new();
    for (i, latency) in (10..=100).step_by(10).enumerate() {
        let protocol = protocols[i % protocols.len()];
        candidates.push(make_enriched(protocol, latency as u64, i));
    }
    assert_eq!(candidates.len(), 10);

    let config = SelectionConfig {
        top_k_per_protocol: 2,
        total_target: 5,
        max_latency_ms: None,
        country_filter: None,
    };
    let chosen = select(candidates, &config);

    assert_eq!(chosen.len(), 5);
    let mut previous_latency = 0;
    for proxy in &chosen {
        let latency = proxy.latency_ms.unwrap();
        assert!(latency >= previous_latency);
        previous_latency = latency;
    }

    let mut per_protocol: HashMap<Protocol, usize> = HashMap::new();
    for proxy in &chosen {
        *per_protocol.entry(proxy.candidate.protocol).or_insert(0) += 1;
    }
    assert!(per_protocol.values().all(|&count| count <= 2));
}

#[test]
fn retest_all_failing_produces_no_chosen_entries() {
    let candidates: Vec<EnrichedProxy> = (0..4)
        .map(|i| {
            let mut proxy = make_enriched(Protocol::Vmess, 20, i);
            proxy.is_working = false;
            proxy.latency_ms = None;
            proxy
        })
        .collect();

    let chosen = select(candidates, &SelectionConfig::default());
    assert!(chosen.is_empty());
}

fn make_enriched(protocol: Protocol, latency_ms: u64, seed: usize) -> EnrichedProxy {
    EnrichedProxy {
        candidate: CandidateView {
            fingerprint: Fingerprint([seed as u8; 16]).to_hex(),
            protocol,
            host: format!("203.0.113.{}", seed + 1),
            port: 443,
            auth_b64: String::new(),
            transport_params: HashMap::new(),
            tls_params: HashMap::new(),
            remarks: None,
            raw_uri: format!("{}://host{}", protocol.as_str(), seed),
            source_url: "src".into(),
            security_issues: HashMap::new(),
        },
        country_code: None,
        country: None,
        city: None,
        asn: None,
        is_working: true,
        latency_ms: Some(latency_ms),
        health_score: 1.0 / (latency_ms as f64 + 1.0),
    }
}
