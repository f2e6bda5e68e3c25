use clap::{Parser, Subcommand};
use clap_complete::{generate, Shell};
use proxyforge_observability::logging::{init_logging, LoggingConfig};

mod commands;
mod progress;

use progress::ExitCode;

#[derive(Parser)]
#[command(name = "proxyforge")]
#[command(about = "Aggregates, validates, probes and scores proxy subscriptions")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Set log level (error, warn, info, debug, trace)
    #[arg(short = 'v', long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch sources, parse, validate, probe, score and emit a full output tree
    Merge(commands::merge::MergeArgs),

    /// Re-probe an existing candidate set without re-fetching sources
    Retest(commands::retest::RetestArgs),

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging_config = LoggingConfig {
        level: cli.log_level.clone(),
        ..LoggingConfig::default()
    }
    .apply_env_overrides();
    if init_logging(&logging_config).is_err() {
        eprintln!("warning: logging already initialised");
    }

    let result = match cli.command {
        Commands::Merge(args) => commands::merge::run(args).await,
        Commands::Retest(args) => commands::retest::run(args).await,
        Commands::Completions { shell } => {
            handle_completions(shell);
            Ok(ExitCode::Success)
        }
    };

    match result {
        Ok(exit_code) => exit_code.exit(),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::ConfigurationError.exit();
        }
    }
}

fn handle_completions(shell: Shell) {
    let mut cmd = <Cli as clap::CommandFactory>::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
}
