//! Progress indicators and exit-code plumbing for the CLI.

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

/// Exit codes per the CLI surface: `0` success (possibly with warnings),
/// `1` configuration error, `2` missing input, `3` unrecoverable I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    ConfigurationError = 1,
    MissingInput = 2,
    IoError = 3,
}

impl ExitCode {
    pub fn exit(self) -> ! {
        std::process::exit(self as i32);
    }
}

/// One progress bar per pipeline phase (fetch/parse/probe), multiplexed
/// through a single terminal region.
pub struct ProgressManager {
    multi_progress: Arc<MultiProgress>,
    verbose: bool,
}

impl ProgressManager {
    pub fn new(verbose: bool) -> Self {
        Self {
            multi_progress: Arc::new(MultiProgress::new()),
            verbose,
        }
    }

    pub fn create_bar(&self, total: u64, message: &str) -> ProgressBar {
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        let bar = self.multi_progress.add(ProgressBar::new(total));
        bar.set_style(style);
        bar.set_message(message.to_string());
        bar
    }

    pub fn create_spinner(&self, message: &str) -> ProgressBar {
        let spinner = self.multi_progress.add(ProgressBar::new_spinner());
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if !self.verbose && level == LogLevel::Debug {
            return;
        }
        let styled = match level {
            LogLevel::Info => style(message).cyan(),
            LogLevel::Success => style(message).green().bold(),
            LogLevel::Warning => style(message).yellow(),
            LogLevel::Error => style(message).red().bold(),
            LogLevel::Debug => style(message).dim(),
        };
        println!("{styled}");
    }

    pub fn finish(&self) {
        let _ = self.multi_progress.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_values_match_the_documented_mapping() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::ConfigurationError as i32, 1);
        assert_eq!(ExitCode::MissingInput as i32, 2);
        assert_eq!(ExitCode::IoError as i32, 3);
    }

    #[test]
    fn debug_logs_are_suppressed_when_not_verbose() {
        // Smoke test only: log() prints to stdout and returning without
        // panicking is the observable behaviour worth asserting here.
        let manager = ProgressManager::new(false);
        manager.log(LogLevel::Debug, "should be suppressed");
        manager.log(LogLevel::Info, "should print");
    }
}
