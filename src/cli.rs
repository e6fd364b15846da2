use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dealboard", version, about = "Four-month deal pipeline board")]
pub struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// CRM document to read and update
    #[arg(long, global = true)]
    pub crm_file: Option<PathBuf>,
    /// Never send close-date updates; moves succeed locally
    #[arg(long, global = true)]
    pub offline: bool,
    /// Raise log verbosity (repeatable)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a CRM document with sample deals
    Init {
        /// Name of the signed-in user
        #[arg(long, default_value = "Demo User")]
        owner: String,
        /// Number of sample deals for the owner
        #[arg(long, default_value_t = 12)]
        sample: usize,
    },
    /// Print the board, month by month
    List {
        /// Only show this month, e.g. "August 2025"
        #[arg(long)]
        month: Option<String>,
        /// Show another user's pipeline (admin only)
        #[arg(long)]
        owner: Option<String>,
    },
    /// List active users (admin only)
    Users,
    /// Move a deal to another month and update its close date
    Move {
        /// Deal id to move
        deal_id: String,
        /// Destination month, e.g. "September 2025"
        month: String,
        /// Day of month (defaults to the proposed day)
        #[arg(long)]
        day: Option<u32>,
        /// Pipeline owner id (admin only)
        #[arg(long)]
        owner: Option<String>,
    },
    /// Launch the interactive board
    Tui {
        /// Pipeline owner id (admin only)
        #[arg(long)]
        owner: Option<String>,
    },
}
