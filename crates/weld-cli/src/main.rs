#![forbid(unsafe_code)]

mod cmd;
mod config;
mod mail;
mod output;
mod redmine;

use clap::{Parser, Subcommand};
use output::{CliError, OutputMode};
use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use weld_core::WeldError;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "weld: issue-tracker field reconciliation and admin batches",
    long_about = None
)]
struct Cli {
    /// Path to the YAML config file with tracker url and api key.
    #[arg(short, long, global = true, default_value = "weld.yaml")]
    config: PathBuf,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags.
    fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Reconcile one issue field into another across a project",
        long_about = "Read a field from every matching issue, merge its values into a \
target custom field, and write back only where something was missing.",
        after_help = "EXAMPLES:\n    # Pull the current assignee into the 'All assignees' list field\n    weld copy -p \"Long-term Support\" -u\n\n    # Preview without writing\n    weld copy -p \"Long-term Support\" -u --dry-run\n\n    # Copy between two comma-delimited fields, re-joining with semicolons\n    weld copy -p Support -f \"Reviewers\" -t \"All reviewers\" -s , -n ;"
    )]
    Copy(cmd::copy::CopyArgs),

    #[command(
        about = "Bulk-close stale issues missing their gating field",
        long_about = "Transition open issues whose gating custom field was never filled \
in, suppressing notification mail.",
        after_help = "EXAMPLES:\n    # See what would be closed\n    weld sweep -p \"Long-term Support\" --dry-run\n\n    # Sweep, leaving two sub-projects alone\n    weld sweep -p \"Long-term Support\" -e \"Pilot projects,Internal\""
    )]
    Sweep(cmd::sweep::SweepArgs),

    #[command(
        about = "Queue feedback-survey mail for recently finished issues",
        long_about = "Select issues resolved or closed inside a date window (or listed \
explicitly), write the survey message to the outbox, and mark each issue as surveyed.",
        after_help = "EXAMPLES:\n    # Survey everything finished in February\n    weld survey -p Support -s 2026-02-01 -e 2026-02-28 -f https://example.org/f/1\n\n    # Survey two specific issues\n    weld survey -i 7321,7335 -f https://example.org/f/1"
    )]
    Survey(cmd::survey::SurveyArgs),

    #[command(
        about = "Issue-lifespan statistics from logged time",
        long_about = "Bucket issues by the span from first to last logged time entry \
inside a date window.",
        after_help = "EXAMPLES:\n    # Lifespans for last year's support work\n    weld spent -p Support -f 2025-01-01 -t 2025-12-31 -a Support\n\n    # Include the issue ids per bucket\n    weld spent -p Support -f 2025-01-01 -t 2025-12-31 --long-output"
    )]
    Spent(cmd::spent::SpentArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("WELD_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "weld_cli=debug,weld_core=debug,info"
        } else {
            "weld_cli=info,weld_core=info,warn"
        })
    });

    let format = env::var("WELD_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let output = cli.output_mode();
    let config = config::load(&cli.config)?;

    let command_result = match cli.command {
        Commands::Copy(ref args) => cmd::copy::run_copy(args, &config, output),
        Commands::Sweep(ref args) => cmd::sweep::run_sweep(args, &config, output),
        Commands::Survey(ref args) => cmd::survey::run_survey(args, &config, output),
        Commands::Spent(ref args) => cmd::spent::run_spent(args, &config, output),
    };

    if let Err(err) = command_result {
        let cli_error = err
            .downcast_ref::<WeldError>()
            .map_or_else(|| CliError::new(err.to_string()), CliError::from);
        output::render_error(output, &cli_error)?;
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_selects_json_output() {
        let cli = Cli::parse_from(["weld", "--json", "copy", "-p", "Support"]);
        assert!(cli.output_mode().is_json());
        let cli = Cli::parse_from(["weld", "copy", "-p", "Support"]);
        assert!(!cli.output_mode().is_json());
    }

    #[test]
    fn config_path_defaults_and_overrides() {
        let cli = Cli::parse_from(["weld", "copy", "-p", "Support"]);
        assert_eq!(cli.config, PathBuf::from("weld.yaml"));
        let cli = Cli::parse_from(["weld", "--config", "/etc/weld.yaml", "copy", "-p", "Support"]);
        assert_eq!(cli.config, PathBuf::from("/etc/weld.yaml"));
    }
}
