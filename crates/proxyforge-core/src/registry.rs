//! The source registry: the ordered list of URLs supplied by the caller,
//! plus the per-source state (`etag`, failure streaks, rolling success
//! rate) that the fetcher updates after every request.

use serde::{Deserialize, Serialize};
use url::Url;

/// One source URL and its fetch history. Created on first registration,
/// updated after every fetch, never destroyed within a single run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub host: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub body_digest: Option<String>,
    pub last_fetch_at: Option<chrono::DateTime<chrono::Utc>>,
    pub consecutive_failures: u32,
    pub total_fetches: u64,
    pub total_successes: u64,
}

impl Source {
    fn new(url: String) -> Option<Self> {
        let parsed = Url::parse(&url).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        Some(Self {
            url,
            host,
            etag: None,
            last_modified: None,
            body_digest: None,
            last_fetch_at: None,
            consecutive_failures: 0,
            total_fetches: 0,
            total_successes: 0,
        })
    }

    pub fn rolling_success_rate(&self) -> f64 {
        if self.total_fetches == 0 {
            return 1.0;
        }
        self.total_successes as f64 / self.total_fetches as f64
    }

    /// A source demoted after too many consecutive failures is still kept
    /// (never dropped mid-run) but is scheduled last.
    pub fn is_demoted(&self, threshold: u32) -> bool {
        self.consecutive_failures >= threshold
    }

    pub fn record_success(&mut self) {
        self.total_fetches += 1;
        self.total_successes += 1;
        self.consecutive_failures = 0;
        self.last_fetch_at = Some(chrono::Utc::now());
    }

    pub fn record_failure(&mut self) {
        self.total_fetches += 1;
        self.consecutive_failures += 1;
        self.last_fetch_at = Some(chrono::Utc::now());
    }
}

/// Ordered collection of [`Source`]s parsed from `sources.txt`
/// (`#`-comments and blank lines ignored).
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `sources.txt`-shaped body: UTF-8, one URL per line, `#` and
    /// blank lines ignored. Lines that fail to parse as a URL are skipped
    /// silently — registry loading never fails the whole run over one bad
    /// line.
    pub fn from_text(text: &str) -> Self {
        let mut registry = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(source) = Source::new(line.to_string()) {
                registry.sources.push(source);
            }
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    /// Sources ordered for fetch dispatch: demoted sources last, otherwise
    /// input order is preserved (no cross-source ordering guarantee is
    /// otherwise promised).
    pub fn scheduling_order(&self, demote_threshold: u32) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.sources.len()).collect();
        indices.sort_by_key(|&i| self.sources[i].is_demoted(demote_threshold));
        indices
    }

    pub fn get(&self, index: usize) -> Option<&Source> {
        self.sources.get(index)
    }

    pub fn update<F: FnOnce(&mut Source)>(&mut self, index: usize, f: F) {
        if let Some(source) = self.sources.get_mut(index) {
            f(source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_and_blanks_are_ignored() {
        let text = "# comment\n\nhttps://example.com/a.txt\n   \nhttps://example.org/b.txt\n";
        let registry = SourceRegistry::from_text(text);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn demoted_sources_schedule_last() {
        let mut registry = SourceRegistry::from_text("https://a.example/x\nhttps://b.example/y\n");
        registry.update(0, |s| s.consecutive_failures = 10);
        let order = registry.scheduling_order(5);
        assert_eq!(order, vec![1, 0]);
    }
}
