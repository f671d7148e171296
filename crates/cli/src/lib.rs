pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "countersign",
    about = "Countersign operator CLI",
    long_about = "Operate the Countersign approval engine: migrations, rule seeding, \
                  escalation sweeps, config inspection, and readiness checks.",
    after_help = "Examples:\n  countersign doctor --json\n  countersign seed\n  countersign sweep"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo rule catalog (idempotent)")]
    Seed,
    #[command(about = "Run one escalation sweep over open approval workflows")]
    Sweep,
    #[command(
        about = "Inspect effective configuration values with source layering and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity, and rule catalog readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Sweep => commands::sweep::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
