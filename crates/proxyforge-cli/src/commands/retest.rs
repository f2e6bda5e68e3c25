//! `proxyforge retest`: re-probe an existing candidate set (typically a
//! prior run's `proxies.json`) without re-fetching or re-parsing sources.

use crate::progress::{ExitCode, LogLevel, ProgressManager};
use anyhow::{Context, Result};
use clap::Args;
use proxyforge_core::config::{PipelineConfig, SecurityPolicy};
use proxyforge_core::orchestrator::{Orchestrator, RunMode};
use proxyforge_core::parsers::parse_line;
use proxyforge_core::types::Candidate;
use std::path::PathBuf;

#[derive(Args)]
pub struct RetestArgs {
    /// Path to a prior `proxies.json` (or a plain list of raw proxy URIs)
    #[arg(long)]
    pub input: PathBuf,

    /// Output directory for the generated file tree
    #[arg(long)]
    pub output: PathBuf,

    /// Global run deadline, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Discard security-flagged candidates
    #[arg(long, conflicts_with = "lenient")]
    pub strict: bool,

    /// Keep security-flagged candidates, tagged rather than discarded
    /// (default for `retest`; see DESIGN.md on the merge/retest asymmetry)
    #[arg(long, conflicts_with = "strict")]
    pub lenient: bool,
}

pub async fn run(args: RetestArgs) -> Result<ExitCode> {
    let body = match std::fs::read_to_string(&args.input) {
        Ok(body) => body,
        Err(e) => {
            eprintln!("failed to read {}: {e}", args.input.display());
            return Ok(ExitCode::MissingInput);
        }
    };

    let candidates = load_candidates(&body);
    if candidates.is_empty() {
        eprintln!("no re-testable candidates found in {}", args.input.display());
        return Ok(ExitCode::MissingInput);
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("creating output directory {}", args.output.display()))?;

    let mut config = PipelineConfig {
        output_dir: args.output.clone(),
        security_policy: if args.strict {
            SecurityPolicy::Strict
        } else {
            SecurityPolicy::Lenient
        },
        ..PipelineConfig::default().with_worker_default()
    }
    .apply_env_overrides();
    if let Some(timeout) = args.timeout {
        config.global_deadline_secs = timeout;
    }

    let progress = ProgressManager::new(true);
    let spinner = progress.create_spinner(&format!("Retesting {} candidates...", candidates.len()));

    let orchestrator = Orchestrator::new(config);
    let result = orchestrator.run(RunMode::Retest { candidates }).await;
    spinner.finish_and_clear();

    match result {
        Ok((report, _scored, chosen)) => {
            progress.log(
                LogLevel::Success,
                &format!(
                    "{} tested, {} still working, {} chosen",
                    report.candidates_tested, report.candidates_working, chosen.len()
                ),
            );
            Ok(ExitCode::Success)
        }
        Err(e) => {
            progress.log(LogLevel::Error, &format!("retest failed: {e}"));
            Ok(ExitCode::IoError)
        }
    }
}

/// Accept either a JSON array of `EnrichedProxy`/`CandidateView`-shaped
/// objects (a prior `proxies.json`) or a newline-delimited list of raw
/// proxy URIs, falling back to re-parsing each `raw_uri` through the
/// ordinary parser set.
fn load_candidates(body: &str) -> Vec<Candidate> {
    if let Ok(values) = serde_json::from_str::<Vec<serde_json::Value>>(body) {
        return values
            .iter()
            .filter_map(|v| v.get("raw_uri").and_then(|u| u.as_str()))
            .filter_map(|uri| parse_line(uri, "retest"))
            .collect();
    }

    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|line| parse_line(line, "retest"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_candidates_from_a_plain_uri_list() {
        let body = "http://u:p@203.0.113.9:8080\n# comment\nsocks5://203.0.113.10:1080\n";
        let candidates = load_candidates(body);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn loads_candidates_from_a_prior_proxies_json() {
        let body = serde_json::json!([
            { "raw_uri": "http://u:p@203.0.113.9:8080", "other_field": 1 },
            { "raw_uri": "not-a-uri" }
        ])
        .to_string();
        let candidates = load_candidates(&body);
        assert_eq!(candidates.len(), 1);
    }
}
