//! Observability features for ProxyForge: structured logging and an
//! in-process Prometheus-style metrics registry.
//!
//! No HTTP `/metrics` endpoint is exposed — metrics are read back by the
//! CLI at the end of a run and written to `metrics.json`.

pub mod logging;
pub mod metrics;

pub use metrics::MetricsRegistry;
