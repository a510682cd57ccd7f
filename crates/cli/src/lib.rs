pub mod commands;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "basketry",
    about = "Basketry operator CLI",
    long_about = "Operate the behavioral pattern engine: migrations, demo data, one-shot refreshes, continuous mode, and snapshot status.",
    after_help = "Examples:\n  basketry migrate\n  basketry refresh --pattern preference\n  basketry run"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic demo events into an empty database")]
    Seed,
    #[command(about = "Recompute pattern tables once, for every pattern or a single one")]
    Refresh {
        #[arg(
            long,
            help = "Pattern to refresh (preference, association, reorder, behavior, session_context); all when omitted"
        )]
        pattern: Option<String>,
    },
    #[command(about = "Run the continuous refresh orchestrator until interrupted")]
    Run,
    #[command(about = "Report row counts and freshness for every pattern table")]
    Status,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Refresh { pattern } => commands::refresh::run(pattern.as_deref()),
        Command::Run => commands::run::run(),
        Command::Status => commands::status::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
