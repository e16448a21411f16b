pub mod commands;
pub mod effects;
pub mod logging;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::decide::DecideArgs;
use commands::quota::QuotaCommand;
use commands::seed::SeedCommand;
use commands::submit::SubmitArgs;
use leaveflow_core::config::{AppConfig, LoadOptions};

#[derive(Debug, Parser)]
#[command(
    name = "leaveflow",
    about = "Leaveflow operator CLI",
    long_about = "Run the leave approval workflow: migrations, directory seeding, submissions, \
                  decisions, quota adjustments and request inspection.",
    after_help = "Examples:\n  leaveflow doctor --json\n  leaveflow submit --employee E-1 \
                  --name Sari --role-id R-STAFF --role-name Staff --division FIN --kind cuti \
                  --start 2026-03-02 --end 2026-03-04\n  leaveflow decide --request LV-... \
                  --actor E-MGR --action approve"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, document rendering, DB connectivity and schema")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    /// Upsert directory rows and yearly allotments
    #[command(subcommand)]
    Seed(SeedCommand),
    #[command(about = "File a new leave request")]
    Submit(SubmitArgs),
    #[command(about = "Approve or reject a leave request as its current approver")]
    Decide(DecideArgs),
    /// Inspect or adjust leave quota
    #[command(subcommand)]
    Quota(QuotaCommand),
    #[command(about = "Show a leave request with its approvals and effect failures")]
    Show {
        #[arg(long)]
        request: String,
    },
    #[command(about = "List requests waiting on an approver")]
    Inbox {
        #[arg(long)]
        approver: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Ok(config) = AppConfig::load(LoadOptions::default()) {
        logging::init_logging(&config);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Seed(target) => commands::seed::run(target),
        Command::Submit(args) => commands::submit::run(args),
        Command::Decide(args) => commands::decide::run(args),
        Command::Quota(command) => commands::quota::run(command),
        Command::Show { request } => commands::show::run(request),
        Command::Inbox { approver } => commands::show::run_inbox(approver),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
