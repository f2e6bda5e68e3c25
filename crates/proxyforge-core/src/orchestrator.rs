//! Orchestrator: wires every stage together, enforces the global
//! deadline, and emits the [`RunReport`] plus the full output tree. This is
//! the one module allowed to hold every other stage's handle at once —
//! everything downstream borrows from it for the lifetime of a single run.

use crate::cache::TestCache;
use crate::canonical::Deduper;
use crate::config::{PipelineConfig, SecurityPolicy};
use crate::emitters::{self, EmitInput};
use crate::error::Result;
use crate::etag_store::{EtagRecord, EtagStore};
use crate::fetcher::{Fetcher, FetcherConfig};
use crate::geoip::GeoIpEnricher;
use crate::parsers;
use crate::prober::{Prober, ProberConfig};
use crate::queue::DiskQueue;
use crate::ratelimit::HostLimiterRegistry;
use crate::registry::SourceRegistry;
use crate::scorer::{self, ScoreWeights, SelectionConfig};
use crate::types::{Candidate, CandidateView, EnrichedProxy, HistoryEntry, RunReport};
use crate::validator;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct Orchestrator {
    config: PipelineConfig,
}

/// Either a full `merge` run (driven by a source list) or a `retest` run
/// fed an existing proxy list, skipping Fetcher/Parser/Canonicaliser per
/// see module docs above.
pub enum RunMode {
    Merge { sources_path: PathBuf },
    Retest { candidates: Vec<Candidate> },
}

impl Orchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub async fn run(&self, mode: RunMode) -> Result<(RunReport, Vec<EnrichedProxy>, Vec<EnrichedProxy>)> {
        let deadline = tokio::time::Duration::from_secs(self.config.global_deadline_secs);
        match tokio::time::timeout(deadline, self.run_inner(mode)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("global deadline exceeded; returning partial results");
                Ok((RunReport::new(), Vec::new(), Vec::new()))
            }
        }
    }

    async fn run_inner(&self, mode: RunMode) -> Result<(RunReport, Vec<EnrichedProxy>, Vec<EnrichedProxy>)> {
        let mut report = RunReport::new();

        let candidates = match mode {
            RunMode::Merge { sources_path } => self.fetch_and_parse(&sources_path, &mut report).await?,
            RunMode::Retest { candidates } => {
                report.sources_total = 0;
                report.candidates_parsed = candidates.len();
                candidates
            }
        };

        let mut deduper = Deduper::new();
        let (unique, dropped) = deduper.dedupe(candidates);
        report.candidates_unique = unique.len();
        report.duplicates_dropped = dropped;

        let policy = self.config.security_policy;
        let (surviving, rejected) = self.apply_security_policy(unique, policy);
        report.security_rejected = rejected.len();

        let queue = match &self.config.queue_db_path {
            Some(path) => DiskQueue::open(path)?,
            None => DiskQueue::in_memory()?,
        };
        queue.enqueue(&surviving)?;

        let probe_started = std::time::Instant::now();
        let (scored, history, probe_rejected) = self.probe_and_enrich(&queue, &mut report).await?;
        report.durations.probe_ms = probe_started.elapsed().as_millis() as u64;

        report.candidates_tested = scored.len();
        report.candidates_working = scored.iter().filter(|p| p.is_working).count();

        let selection = SelectionConfig {
            top_k_per_protocol: self.config.select_top_k_per_protocol,
            total_target: self.config.select_total_target,
            max_latency_ms: self.config.select_max_latency_ms,
            country_filter: self.config.select_country_filter.clone(),
        };
        let chosen = scorer::select(scored.clone(), &selection);
        report.candidates_selected = chosen.len();

        for proxy in &scored {
            *report.by_protocol.entry(proxy.candidate.protocol.as_str().to_string()).or_insert(0) += 1;
        }
        for proxy in &scored {
            if let Some(cc) = &proxy.country_code {
                *report.by_country.entry(cc.clone()).or_insert(0) += 1;
            }
        }

        report.finished_at = Some(chrono::Utc::now());

        // Every EnrichedProxy in the output tree must have `is_working == true`;
        // `scored` (returned to the caller below) still carries the full tested set.
        let working: Vec<EnrichedProxy> = scored.iter().filter(|p| p.is_working).cloned().collect();

        let emit_input = EmitInput {
            working: &working,
            chosen: &chosen,
            rejected: &rejected,
            probe_rejected: &probe_rejected,
            report: &report,
            history: &history,
        };
        emitters::write_all(&self.config.output_dir, &emit_input)?;

        Ok((report, scored, chosen))
    }

    async fn fetch_and_parse(&self, sources_path: &std::path::Path, report: &mut RunReport) -> Result<Vec<Candidate>> {
        let text = std::fs::read_to_string(sources_path)?;
        let mut registry = SourceRegistry::from_text(&text);
        report.sources_total = registry.len();

        let etag_path = self.config.output_dir.join("etags.json");
        let mut etags = EtagStore::load(&etag_path);

        let hosts = HostLimiterRegistry::new(
            self.config.fetch_host_rate_per_sec,
            self.config.fetch_host_burst,
            self.config.fetch_host_concurrency,
        );
        let fetcher_config = FetcherConfig {
            connect_timeout: tokio::time::Duration::from_secs(self.config.fetch_connect_timeout_secs),
            read_timeout: tokio::time::Duration::from_secs(self.config.fetch_read_timeout_secs),
            max_retries: self.config.fetch_max_retries,
            max_compressed_bytes: self.config.fetch_max_compressed_bytes,
            max_decoded_bytes: self.config.fetch_max_decoded_bytes,
        };
        let fetcher = Arc::new(Fetcher::new(fetcher_config, self.config.fetch_global_concurrency, hosts));

        let global_permits = Arc::new(Semaphore::new(self.config.fetch_global_concurrency.max(1)));
        let order = registry.scheduling_order(self.config.fetch_demote_after_failures);

        let mut tasks = Vec::with_capacity(order.len());
        for index in order {
            let Some(source) = registry.get(index).cloned() else { continue };
            let fetcher = Arc::clone(&fetcher);
            let permits = Arc::clone(&global_permits);
            tasks.push(tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.expect("semaphore never closed");
                let outcome = fetcher.fetch(&source).await;
                (index, source.url.clone(), outcome)
            }));
        }

        let mut candidates = Vec::new();
        for task in tasks {
            let (index, url, outcome) = task.await.map_err(|e| crate::error::Error::fetch(e.to_string()))?;
            match outcome {
                Ok(body) => {
                    if body.not_modified {
                        report.sources_not_modified += 1;
                        registry.update(index, |s| s.record_success());
                        continue;
                    }
                    report.sources_fetched_ok += 1;
                    registry.update(index, |s| s.record_success());
                    etags.update(
                        &url,
                        EtagRecord {
                            etag: body.etag.clone(),
                            last_modified: body.last_modified.clone(),
                            body_digest: Some(blake3::hash(body.body.as_bytes()).to_hex().to_string()),
                        },
                    );
                    let parsed = parsers::parse_body(&body.body, &url);
                    report.lines_parsed += body.body.lines().count();
                    report.candidates_parsed += parsed.len();
                    candidates.extend(parsed);
                }
                Err(failure) => {
                    report.sources_failed += 1;
                    registry.update(index, |s| s.record_failure());
                    bump_error(&mut report.top_errors, failure.kind());
                }
            }
        }

        etags.save();
        Ok(candidates)
    }

    fn apply_security_policy(&self, candidates: Vec<Candidate>, policy: SecurityPolicy) -> (Vec<Candidate>, Vec<Candidate>) {
        let mut surviving = Vec::with_capacity(candidates.len());
        let mut rejected = Vec::new();
        for mut candidate in candidates {
            let issues = validator::classify(&candidate);
            if issues.is_empty() {
                surviving.push(candidate);
                continue;
            }
            candidate.security_issues = issues;
            match policy {
                SecurityPolicy::Strict => rejected.push(candidate),
                SecurityPolicy::Lenient => surviving.push(candidate),
            }
        }
        (surviving, rejected)
    }

    #[allow(clippy::type_complexity)]
    async fn probe_and_enrich(
        &self,
        queue: &DiskQueue,
        report: &mut RunReport,
    ) -> Result<(Vec<EnrichedProxy>, HashMap<String, HistoryEntry>, HashMap<String, Vec<Candidate>>)> {
        let cache = Arc::new(TestCache::open(
            self.config.cache_db_path.as_deref(),
            self.config.cache_l1_capacity,
            tokio::time::Duration::from_secs(self.config.cache_ttl_working_secs),
            tokio::time::Duration::from_secs(self.config.cache_ttl_failing_secs),
        ));
        let prober_config = ProberConfig {
            workers: self.config.probe_workers,
            timeout: tokio::time::Duration::from_secs(self.config.probe_timeout_secs),
            retry_via_helper: self.config.probe_retry_via_helper,
            ..ProberConfig::default()
        };
        let prober = Arc::new(Prober::new(prober_config, Arc::clone(&cache)));

        let dns = crate::dns::DnsCache::new();
        let geoip = match &self.config.geoip_db_path {
            Some(path) => GeoIpEnricher::open(path, dns),
            None => GeoIpEnricher::disabled(dns),
        };

        let weights = ScoreWeights {
            success_rate: self.config.score_weight_success_rate,
            latency: self.config.score_weight_latency,
            security: self.config.score_weight_security,
            currently_working: self.config.score_weight_currently_working,
            latency_soft_cap_ms: self.config.score_latency_soft_cap_ms,
        };

        let mut history: HashMap<String, HistoryEntry> = HashMap::new();
        let mut enriched = Vec::new();
        let mut probe_rejected: HashMap<String, Vec<Candidate>> = HashMap::new();

        loop {
            let batch = queue.dequeue(self.config.probe_workers)?;
            if batch.is_empty() {
                break;
            }

            let mut handles = Vec::with_capacity(batch.len());
            for candidate in &batch {
                let prober = Arc::clone(&prober);
                let candidate = candidate.clone();
                handles.push(tokio::spawn(async move {
                    let (result, cache_entry) = prober.probe(&candidate).await;
                    (candidate, result, cache_entry)
                }));
            }

            for handle in handles {
                let (candidate, result, cache_entry) =
                    handle.await.map_err(|e| crate::error::Error::probe(e.to_string()))?;
                queue.ack(candidate.fingerprint)?;

                let entry = history.entry(candidate.fingerprint.to_hex()).or_default();
                entry.push(result.clone());

                if !result.is_working {
                    if let Some(kind) = result.failure_kind {
                        probe_rejected.entry(kind.as_str().to_string()).or_default().push(candidate.clone());
                    }
                }

                let geo = geoip.lookup(&candidate.host).await;
                let view = CandidateView::from(&candidate);

                let mut proxy = EnrichedProxy {
                    candidate: view,
                    country_code: geo.country_code,
                    country: geo.country,
                    city: geo.city,
                    asn: geo.asn,
                    is_working: result.is_working,
                    latency_ms: result.latency_ms,
                    health_score: 0.0,
                };
                proxy.health_score = scorer::score(
                    &proxy,
                    cache_entry.rolling_success_rate(),
                    candidate.has_security_issues(),
                    &weights,
                );
                enriched.push(proxy);
            }
        }

        Ok((enriched, history, probe_rejected))
    }
}

fn bump_error(top_errors: &mut Vec<(String, usize)>, kind: &str) {
    if let Some(entry) = top_errors.iter_mut().find(|(k, _)| k == kind) {
        entry.1 += 1;
    } else {
        top_errors.push((kind.to_string(), 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;

    #[tokio::test]
    async fn retest_mode_skips_fetch_and_reports_input_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.output_dir = dir.path().join("out");
        config.queue_db_path = Some(dir.path().join("queue.db"));
        config.cache_db_path = Some(dir.path().join("cache.db"));
        config.geoip_db_path = Some(dir.path().join("missing.mmdb"));
        config.probe_timeout_secs = 1;
        config.global_deadline_secs = 5;

        let fields = crate::parsers::ParsedFields {
            protocol: crate::types::Protocol::Http,
            host: "203.0.113.1".to_string(),
            port: 1,
            auth: Vec::new(),
            transport_params: HashMap::new(),
            tls_params: HashMap::new(),
            remarks: None,
            details: HashMap::new(),
        };
        let candidate = fields.into_candidate("http://203.0.113.1:1".into(), "src".into());

        let orchestrator = Orchestrator::new(config);
        let (report, scored, _chosen) = orchestrator
            .run(RunMode::Retest { candidates: vec![candidate] })
            .await
            .unwrap();

        assert_eq!(report.candidates_parsed, 1);
        assert_eq!(scored.len(), 1);
        assert!(report.reconciles());
    }
}
