use acctmon::cli::setup::setup;
use acctmon::core::log::init_logging;
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for acctmon::AppCommand {
    fn from(cmd: Commands) -> acctmon::AppCommand {
        match cmd {
            Commands::Sample => acctmon::AppCommand::Sample,
            Commands::Monitor { interval_minutes } => {
                acctmon::AppCommand::Monitor { interval_minutes }
            }
            Commands::Report { account } => acctmon::AppCommand::Report { account },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Value every account once and append the sample
    Sample,
    /// Sample periodically until interrupted
    Monitor {
        /// Minutes between samples, overriding the configured interval
        #[arg(short, long)]
        interval_minutes: Option<u64>,
    },
    /// Display returns computed from the sample history
    Report {
        /// Show the full history of one account
        #[arg(short, long)]
        account: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => acctmon::cli::setup::setup_at_path(path),
            None => setup(),
        },
        Some(cmd) => acctmon::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
