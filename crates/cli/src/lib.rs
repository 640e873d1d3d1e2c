pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "relay",
    about = "CRM-to-WhatsApp relay operator CLI",
    long_about = "Inspect relay configuration, check readiness, and dry-run template rendering.",
    after_help = "Examples:\n  relay doctor --json\n  relay config\n  relay render rate_alert \"sar/gbp\""
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and the trigger/template catalog")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Render a raw field value with a catalog template, without sending")]
    Render {
        #[arg(help = "Template name as configured in the catalog")]
        template: String,
        #[arg(help = "Raw custom-field value")]
        raw: String,
        #[arg(long, help = "Render with this rule instead of the template's configured one")]
        rule: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::CommandResult::text(commands::config::run()),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Render { template, raw, rule } => {
            commands::render::run(&template, &raw, rule.as_deref())
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
