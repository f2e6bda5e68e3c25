//! Output Emitters: render the selected/working proxy sets into every
//! format listed under "Outputs" — the canonical JSON dataset, per-client
//! configs, partitioned slices, and the audit/statistics trail.
//!
//! Each emitter is a pure function over already-computed data (no network,
//! no pipeline state) so they can be tested without spinning up the rest of
//! the crate. [`write_all`] is the orchestrator's single entry point.

mod clash;
mod singbox;
mod text_formats;

use crate::error::Result;
use crate::types::{Candidate, EnrichedProxy, HistoryEntry, RunReport, SecurityCategory};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Everything the orchestrator has accumulated by the time it's ready to
/// emit, gathered in one place so emitters don't each need their own
/// argument list.
pub struct EmitInput<'a> {
    pub working: &'a [EnrichedProxy],
    pub chosen: &'a [EnrichedProxy],
    pub rejected: &'a [Candidate],
    pub probe_rejected: &'a HashMap<String, Vec<Candidate>>,
    pub report: &'a RunReport,
    pub history: &'a HashMap<String, HistoryEntry>,
}

pub fn write_all(output_dir: &Path, input: &EmitInput<'_>) -> Result<()> {
    fs::create_dir_all(output_dir)?;
    fs::create_dir_all(output_dir.join("by_protocol"))?;
    fs::create_dir_all(output_dir.join("by_country"))?;
    fs::create_dir_all(output_dir.join("rejected"))?;

    write_json(&output_dir.join("proxies.json"), input.working)?;
    write_json(&output_dir.join("chosen.json"), input.chosen)?;
    write_json(&output_dir.join("statistics.json"), input.report)?;
    write_json(&output_dir.join("metrics.json"), &input.report.durations)?;
    write_json(&output_dir.join("proxy_history.json"), input.history)?;
    write_json(&output_dir.join("proxy_history_viz.json"), &visualise_history(input.history))?;

    write_metadata(output_dir, input.report)?;
    write_summary(output_dir, input)?;

    text_formats::write_base64(output_dir, input.working)?;
    text_formats::write_surge(output_dir, input.chosen)?;
    text_formats::write_quantumult(output_dir, input.chosen)?;
    text_formats::write_shadowrocket(output_dir, input.chosen)?;
    clash::write(output_dir, input.chosen)?;
    singbox::write(output_dir, input.chosen)?;

    write_by_protocol(output_dir, input.working)?;
    write_by_country(output_dir, input.working)?;
    write_rejected(output_dir, input.rejected)?;
    write_probe_rejected(output_dir, input.probe_rejected)?;

    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

fn write_metadata(output_dir: &Path, report: &RunReport) -> Result<()> {
    #[derive(serde::Serialize)]
    struct Metadata<'a> {
        started_at: &'a chrono::DateTime<chrono::Utc>,
        finished_at: Option<&'a chrono::DateTime<chrono::Utc>>,
        generator: &'static str,
    }
    write_json(
        &output_dir.join("metadata.json"),
        &Metadata {
            started_at: &report.started_at,
            finished_at: report.finished_at.as_ref(),
            generator: "proxyforge",
        },
    )
}

fn write_summary(output_dir: &Path, input: &EmitInput<'_>) -> Result<()> {
    #[derive(serde::Serialize)]
    struct Summary {
        working: usize,
        chosen: usize,
        rejected: usize,
        reconciles: bool,
    }
    write_json(
        &output_dir.join("summary.json"),
        &Summary {
            working: input.working.len(),
            chosen: input.chosen.len(),
            rejected: input.rejected.len(),
            reconciles: input.report.reconciles(),
        },
    )
}

fn write_by_protocol(output_dir: &Path, proxies: &[EnrichedProxy]) -> Result<()> {
    let mut buckets: HashMap<&str, Vec<&EnrichedProxy>> = HashMap::new();
    for proxy in proxies {
        buckets.entry(proxy.candidate.protocol.as_str()).or_default().push(proxy);
    }
    for (protocol, group) in buckets {
        write_json(&output_dir.join("by_protocol").join(format!("{protocol}.json")), &group)?;
    }
    Ok(())
}

fn write_by_country(output_dir: &Path, proxies: &[EnrichedProxy]) -> Result<()> {
    let mut buckets: HashMap<String, Vec<&EnrichedProxy>> = HashMap::new();
    for proxy in proxies {
        let cc = proxy.country_code.clone().unwrap_or_else(|| "unknown".to_string());
        buckets.entry(cc).or_default().push(proxy);
    }
    for (cc, group) in buckets {
        write_json(&output_dir.join("by_country").join(format!("{cc}.json")), &group)?;
    }
    Ok(())
}

fn write_rejected(output_dir: &Path, rejected: &[Candidate]) -> Result<()> {
    let mut by_category: HashMap<SecurityCategory, Vec<&Candidate>> = HashMap::new();
    for candidate in rejected {
        for category in candidate.security_issues.keys() {
            by_category.entry(*category).or_default().push(candidate);
        }
    }
    for (category, group) in &by_category {
        let name = category_file_name(*category);
        write_json(&output_dir.join("rejected").join(format!("{name}.json")), group)?;
    }
    write_json(&output_dir.join("rejected").join("all_security_issues.json"), &rejected)?;
    Ok(())
}

/// Mirrors [`write_rejected`]'s per-category split, but keyed by the probe's
/// [`crate::types::FailureKind`] instead of a security category — e.g. a
/// timed-out candidate lands in `rejected/probe_timeout.json`.
fn write_probe_rejected(output_dir: &Path, probe_rejected: &HashMap<String, Vec<Candidate>>) -> Result<()> {
    for (kind, group) in probe_rejected {
        write_json(&output_dir.join("rejected").join(format!("{kind}.json")), group)?;
    }
    Ok(())
}

fn category_file_name(category: SecurityCategory) -> &'static str {
    match category {
        SecurityCategory::WeakEncryption => "weak_encryption",
        SecurityCategory::InsecureTransport => "insecure_transport",
        SecurityCategory::DangerousPort => "dangerous_port",
        SecurityCategory::SuspiciousDomain => "suspicious_domain",
        SecurityCategory::InvalidCertificate => "invalid_certificate",
        SecurityCategory::MissingAuth => "missing_auth",
        SecurityCategory::ConfigurationError => "configuration_error",
        SecurityCategory::DeprecatedProtocol => "deprecated_protocol",
    }
}

#[derive(serde::Serialize)]
struct HistoryPoint {
    tested_at: chrono::DateTime<chrono::Utc>,
    is_working: bool,
    latency_ms: Option<u64>,
}

fn visualise_history(history: &HashMap<String, HistoryEntry>) -> HashMap<String, Vec<HistoryPoint>> {
    history
        .iter()
        .map(|(fingerprint, entry)| {
            let points = entry
                .entries
                .iter()
                .map(|r| HistoryPoint {
                    tested_at: r.tested_at,
                    is_working: r.is_working,
                    latency_ms: r.latency_ms,
                })
                .collect();
            (fingerprint.clone(), points)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CandidateView, Fingerprint, Protocol};

    fn proxy(protocol: Protocol, country: Option<&str>) -> EnrichedProxy {
        EnrichedProxy {
            candidate: CandidateView {
                fingerprint: Fingerprint([1; 16]).to_hex(),
                protocol,
                host: "203.0.113.1".into(),
                port: 8080,
                auth_b64: String::new(),
                transport_params: HashMap::new(),
                tls_params: HashMap::new(),
                remarks: None,
                raw_uri: format!("{}://203.0.113.1:8080", protocol.as_str()),
                source_url: "src".into(),
                security_issues: HashMap::new(),
            },
            country_code: country.map(String::from),
            country: None,
            city: None,
            asn: None,
            is_working: true,
            latency_ms: Some(50),
            health_score: 0.9,
        }
    }

    #[test]
    fn write_all_produces_the_full_file_tree() {
        let dir = tempfile::tempdir().unwrap();
        let proxies = vec![proxy(Protocol::Http, Some("US")), proxy(Protocol::Socks5, None)];
        let report = RunReport::new();
        let history = HashMap::new();
        let rejected = Vec::new();
        let probe_rejected = HashMap::new();
        let input = EmitInput {
            working: &proxies,
            chosen: &proxies,
            rejected: &rejected,
            probe_rejected: &probe_rejected,
            report: &report,
            history: &history,
        };
        write_all(dir.path(), &input).unwrap();

        for name in [
            "proxies.json",
            "chosen.json",
            "base64.txt",
            "clash.yaml",
            "singbox.json",
            "surge.conf",
            "quantumult.conf",
            "shadowrocket.txt",
            "statistics.json",
            "metadata.json",
            "summary.json",
            "metrics.json",
            "proxy_history.json",
            "proxy_history_viz.json",
        ] {
            assert!(dir.path().join(name).exists(), "missing {name}");
        }
        assert!(dir.path().join("by_protocol/http.json").exists());
        assert!(dir.path().join("by_country/US.json").exists());
        assert!(dir.path().join("by_country/unknown.json").exists());
    }
}
