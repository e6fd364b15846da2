mod cli;
mod commands;
mod ui;

use anyhow::Result;
use clap::Parser;
use dealboard::{config, telemetry};

fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let mut config = config::load(args.config.as_deref())?;
    if let Some(path) = args.crm_file {
        config.crm_file = Some(path);
    }
    if args.offline {
        config.offline = true;
    }
    telemetry::init(&config.log_path()?, &config.log.level, args.verbose)?;
    tracing::debug!(offline = config.offline, "starting");

    let command = args.command.unwrap_or(cli::Command::Tui { owner: None });
    match command {
        cli::Command::Init { owner, sample } => commands::init(config, owner, sample),
        cli::Command::List { month, owner } => commands::list(config, month, owner),
        cli::Command::Users => commands::users(config),
        cli::Command::Move {
            deal_id,
            month,
            day,
            owner,
        } => commands::move_deal(config, deal_id, month, day, owner),
        cli::Command::Tui { owner } => commands::tui(config, owner),
    }
}
