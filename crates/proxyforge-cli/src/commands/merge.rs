//! `proxyforge merge`: fetch sources, parse, validate, dedupe, queue, probe,
//! enrich, score, select and emit the full output tree.

use crate::progress::{ExitCode, LogLevel, ProgressManager};
use anyhow::{Context, Result};
use clap::Args;
use proxyforge_core::config::{PipelineConfig, SecurityPolicy};
use proxyforge_core::orchestrator::{Orchestrator, RunMode};
use std::path::PathBuf;

#[derive(Args)]
pub struct MergeArgs {
    /// Path to the `sources.txt` file (one URL per line)
    #[arg(long)]
    pub sources: PathBuf,

    /// Output directory for the generated file tree
    #[arg(long)]
    pub output: PathBuf,

    /// Probe worker pool size (defaults to an adaptive value)
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Global run deadline, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Drop candidates slower than this latency, in milliseconds
    #[arg(long)]
    pub max_latency: Option<u64>,

    /// Restrict selection to a single country code (e.g. `US`)
    #[arg(long)]
    pub country: Option<String>,

    /// Cap the total number of selected proxies
    #[arg(long)]
    pub max_proxies: Option<usize>,

    /// Keep security-flagged candidates, tagged rather than discarded
    #[arg(long, conflicts_with = "strict")]
    pub lenient: bool,

    /// Discard security-flagged candidates (default for `merge`)
    #[arg(long, conflicts_with = "lenient")]
    pub strict: bool,

    /// Print the run's metrics summary to stdout after completion
    #[arg(long)]
    pub show_metrics: bool,
}

pub async fn run(args: MergeArgs) -> Result<ExitCode> {
    if !args.sources.exists() {
        eprintln!("sources file not found: {}", args.sources.display());
        return Ok(ExitCode::MissingInput);
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating output directory {}", args.output.display()))?;

    let mut config = PipelineConfig {
        output_dir: args.output.clone(),
        security_policy: if args.lenient {
            SecurityPolicy::Lenient
        } else {
            SecurityPolicy::Strict
        },
        ..PipelineConfig::default().with_worker_default()
    }
    .apply_env_overrides();

    if let Some(workers) = args.max_workers {
        config.probe_workers = workers;
    }
    if let Some(timeout) = args.timeout {
        config.global_deadline_secs = timeout;
    }
    config.select_max_latency_ms = args.max_latency;
    config.select_country_filter = args.country.clone();
    if let Some(max_proxies) = args.max_proxies {
        config.select_total_target = max_proxies;
    }

    let progress = ProgressManager::new(true);
    let spinner = progress.create_spinner("Running merge pipeline...");

    let orchestrator = Orchestrator::new(config);
    let result = orchestrator.run(RunMode::Merge {
        sources_path: args.sources,
    }).await;
    spinner.finish_and_clear();

    match result {
        Ok((report, scored, chosen)) => {
            progress.log(
                LogLevel::Success,
                &format!(
                    "{} candidates parsed, {} unique, {} working, {} chosen",
                    report.candidates_parsed,
                    report.candidates_unique,
                    report.candidates_working,
                    chosen.len()
                ),
            );
            if args.show_metrics {
                print_metrics_summary(&report);
            }
            if scored.is_empty() && chosen.is_empty() {
                progress.log(
                    LogLevel::Warning,
                    "run completed with no working proxies (non-fatal)",
                );
            }
            Ok(ExitCode::Success)
        }
        Err(e) => {
            progress.log(LogLevel::Error, &format!("merge failed: {e}"));
            Ok(ExitCode::IoError)
        }
    }
}

fn print_metrics_summary(report: &proxyforge_core::types::RunReport) {
    println!("--- run summary ---");
    println!("sources:    fetched_ok={} not_modified={} failed={}",
        report.sources_fetched_ok, report.sources_not_modified, report.sources_failed);
    println!("candidates: parsed={} unique={} tested={} working={} selected={}",
        report.candidates_parsed, report.candidates_unique,
        report.candidates_tested, report.candidates_working, report.candidates_selected);
    println!("security_rejected={} duplicates_dropped={}",
        report.security_rejected, report.duplicates_dropped);
}
