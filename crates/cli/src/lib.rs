pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "optiquote",
    about = "Optiquote operator CLI",
    long_about = "Operate the Optiquote quote lifecycle engine: preflight checks, migrations, demo data, config inspection, and the transition rule table.",
    after_help = "Examples:\n  optiquote start\n  optiquote config\n  optiquote rules --from presented"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run startup preflight checks and return structured status output")]
    Start,
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo quotes (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Print the quote transition rule table and approval gates")]
    Rules {
        #[arg(long, help = "Only show transitions out of this status")]
        from: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start => commands::start::run(),
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Rules { from } => commands::rules::run(from.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
