//! In-process metrics for one pipeline run: counters and histograms for
//! fetch/parse/probe outcomes and phase durations. Read back at the end of
//! a run and flattened into `metrics.json` — there is no scrape endpoint.

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tracing::debug;

/// Registry of every counter/gauge/histogram this run exposes.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,

    pub sources_total: IntCounterVec,
    pub candidates_parsed_total: IntCounterVec,
    pub candidates_rejected_total: IntCounterVec,
    pub probe_outcomes_total: IntCounterVec,
    pub probe_latency_seconds: Histogram,
    pub phase_duration_seconds: HistogramVec,
    pub queue_depth: IntGauge,
}

impl MetricsRegistry {
    /// Create a fresh registry with every metric registered.
    pub fn new() -> Self {
        let registry = Registry::new();

        let sources_total = IntCounterVec::new(
            Opts::new("proxyforge_sources_total", "Source fetch outcomes"),
            &["outcome"],
        )
        .expect("failed to create sources_total metric");

        let candidates_parsed_total = IntCounterVec::new(
            Opts::new(
                "proxyforge_candidates_parsed_total",
                "Candidates parsed, by protocol",
            ),
            &["protocol"],
        )
        .expect("failed to create candidates_parsed_total metric");

        let candidates_rejected_total = IntCounterVec::new(
            Opts::new(
                "proxyforge_candidates_rejected_total",
                "Candidates rejected, by security category",
            ),
            &["category"],
        )
        .expect("failed to create candidates_rejected_total metric");

        let probe_outcomes_total = IntCounterVec::new(
            Opts::new(
                "proxyforge_probe_outcomes_total",
                "Probe outcomes, by result kind",
            ),
            &["kind"],
        )
        .expect("failed to create probe_outcomes_total metric");

        let probe_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "proxyforge_probe_latency_seconds",
                "Observed probe round-trip latency",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )
        .expect("failed to create probe_latency_seconds metric");

        let phase_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "proxyforge_phase_duration_seconds",
                "Wall-clock duration of each pipeline phase",
            )
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
            &["phase"],
        )
        .expect("failed to create phase_duration_seconds metric");

        let queue_depth = IntGauge::new(
            "proxyforge_queue_depth",
            "Number of un-acked candidates currently in the disk queue",
        )
        .expect("failed to create queue_depth metric");

        registry
            .register(Box::new(sources_total.clone()))
            .expect("failed to register sources_total");
        registry
            .register(Box::new(candidates_parsed_total.clone()))
            .expect("failed to register candidates_parsed_total");
        registry
            .register(Box::new(candidates_rejected_total.clone()))
            .expect("failed to register candidates_rejected_total");
        registry
            .register(Box::new(probe_outcomes_total.clone()))
            .expect("failed to register probe_outcomes_total");
        registry
            .register(Box::new(probe_latency_seconds.clone()))
            .expect("failed to register probe_latency_seconds");
        registry
            .register(Box::new(phase_duration_seconds.clone()))
            .expect("failed to register phase_duration_seconds");
        registry
            .register(Box::new(queue_depth.clone()))
            .expect("failed to register queue_depth");

        debug!("initialised proxyforge metrics registry");

        Self {
            registry: Arc::new(registry),
            sources_total,
            candidates_parsed_total,
            candidates_rejected_total,
            probe_outcomes_total,
            probe_latency_seconds,
            phase_duration_seconds,
            queue_depth,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_source_outcome(&self, outcome: &str) {
        self.sources_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_candidate_parsed(&self, protocol: &str) {
        self.candidates_parsed_total
            .with_label_values(&[protocol])
            .inc();
    }

    pub fn record_candidate_rejected(&self, category: &str) {
        self.candidates_rejected_total
            .with_label_values(&[category])
            .inc();
    }

    pub fn record_probe_outcome(&self, kind: &str, latency_secs: Option<f64>) {
        self.probe_outcomes_total.with_label_values(&[kind]).inc();
        if let Some(secs) = latency_secs {
            self.probe_latency_seconds.observe(secs);
        }
    }

    pub fn record_phase_duration(&self, phase: &str, seconds: f64) {
        self.phase_duration_seconds
            .with_label_values(&[phase])
            .observe(seconds);
    }

    pub fn set_queue_depth(&self, depth: i64) {
        self.queue_depth.set(depth);
    }

    /// Flatten every counter/gauge/histogram into a JSON value suitable for
    /// `metrics.json`, via the Prometheus text exposition families rather
    /// than a bespoke serialisation.
    pub fn to_json(&self) -> serde_json::Value {
        let families = self.registry.gather();
        let mut out = serde_json::Map::new();
        for family in families {
            let samples: Vec<serde_json::Value> = family
                .get_metric()
                .iter()
                .map(|m| {
                    let labels: serde_json::Map<String, serde_json::Value> = m
                        .get_label()
                        .iter()
                        .map(|l| (l.name().to_string(), serde_json::json!(l.value())))
                        .collect();
                    let value = if m.has_counter() {
                        serde_json::json!(m.get_counter().value())
                    } else if m.has_gauge() {
                        serde_json::json!(m.get_gauge().value())
                    } else if m.has_histogram() {
                        let h = m.get_histogram();
                        serde_json::json!({
                            "sample_count": h.get_sample_count(),
                            "sample_sum": h.get_sample_sum(),
                        })
                    } else {
                        serde_json::Value::Null
                    };
                    serde_json::json!({ "labels": labels, "value": value })
                })
                .collect();
            out.insert(family.name().to_string(), serde_json::json!(samples));
        }
        serde_json::Value::Object(out)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide registry, used when a caller doesn't thread its own handle
/// through (e.g. library consumers of `proxyforge-core` embedding the
/// pipeline rather than going through the CLI).
static GLOBAL_REGISTRY: Lazy<MetricsRegistry> = Lazy::new(MetricsRegistry::new);

pub fn get_global_registry() -> &'static MetricsRegistry {
    &GLOBAL_REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_reports_initialised_counters_at_zero() {
        let registry = MetricsRegistry::new();
        let json = registry.to_json();
        assert!(json.get("proxyforge_sources_total").is_some());
    }

    #[test]
    fn recording_outcomes_increments_the_right_label() {
        let registry = MetricsRegistry::new();
        registry.record_source_outcome("fetched_ok");
        registry.record_source_outcome("fetched_ok");
        registry.record_source_outcome("not_modified");

        let families = registry.registry().gather();
        let sources = families
            .iter()
            .find(|f| f.name() == "proxyforge_sources_total")
            .unwrap();
        let fetched_ok = sources
            .get_metric()
            .iter()
            .find(|m| m.get_label().iter().any(|l| l.value() == "fetched_ok"))
            .unwrap();
        assert_eq!(fetched_ok.get_counter().value(), 2.0);
    }

    #[test]
    fn probe_outcome_records_latency_histogram() {
        let registry = MetricsRegistry::new();
        registry.record_probe_outcome("working", Some(0.042));
        assert_eq!(registry.probe_latency_seconds.get_sample_count(), 1);
    }

    #[test]
    fn global_registry_is_reachable() {
        let registry = get_global_registry();
        registry.set_queue_depth(7);
        assert_eq!(registry.queue_depth.get(), 7);
    }
}
