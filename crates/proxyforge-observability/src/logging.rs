//! Structured logging initialisation: console output, plain or JSON, driven
//! by `LOG_LEVEL` and a `RUST_LOG`-compatible `EnvFilter`.

use tracing::Level;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Logging configuration resolved from CLI flags and environment.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn`, `error`.
    pub level: String,
    /// Structured JSON output instead of the human-readable format.
    pub json_format: bool,
    /// Mask UUIDs, passwords, and other auth material in emitted fields.
    pub mask_sensitive_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            mask_sensitive_data: true,
        }
    }
}

impl LoggingConfig {
    /// Apply the `LOG_LEVEL` and `MASK_SENSITIVE_DATA` environment
    /// variables on top of an existing configuration.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            self.level = v;
        }
        if let Ok(v) = std::env::var("MASK_SENSITIVE_DATA") {
            self.mask_sensitive_data = v.eq_ignore_ascii_case("true");
        }
        self
    }
}

/// Initialise the global `tracing` subscriber. Safe to call once per
/// process; a second call returns an error rather than panicking.
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    parse_log_level(&config.level)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .with_env_filter(env_filter)
            .try_init()?;
    } else {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_env_filter(env_filter)
            .try_init()?;
    }

    tracing::info!(
        level = %config.level,
        format = if config.json_format { "json" } else { "text" },
        "logging initialised"
    );
    Ok(())
}

/// Mask a sensitive value for logging (UUIDs, passwords, PSKs) when
/// `mask_sensitive_data` is on, keeping only a short prefix.
pub fn mask_if_sensitive(value: &str, mask: bool) -> String {
    if !mask || value.is_empty() {
        return value.to_string();
    }
    let prefix: String = value.chars().take(4).collect();
    format!("{prefix}***")
}

fn parse_log_level(level: &str) -> Result<Level, Box<dyn std::error::Error>> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(format!("invalid log level: {level}").into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_plain_info() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "info");
        assert!(!config.json_format);
        assert!(config.mask_sensitive_data);
    }

    #[test]
    fn parse_log_level_accepts_any_case() {
        assert!(parse_log_level("DEBUG").is_ok());
        assert!(parse_log_level("Warn").is_ok());
        assert!(parse_log_level("not-a-level").is_err());
    }

    #[test]
    fn env_override_replaces_level() {
        std::env::set_var("LOG_LEVEL", "debug");
        let config = LoggingConfig::default().apply_env_overrides();
        assert_eq!(config.level, "debug");
        std::env::remove_var("LOG_LEVEL");
    }

    #[test]
    fn masking_keeps_only_a_short_prefix() {
        assert_eq!(mask_if_sensitive("sensitive-uuid-1234", true), "sens***");
        assert_eq!(mask_if_sensitive("sensitive-uuid-1234", false), "sensitive-uuid-1234");
    }
}
