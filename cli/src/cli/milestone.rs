use std::path::PathBuf;

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum MilestoneCommands {
    Confirm {
        #[arg(short, long)]
        index: u32,

        /// Unix seconds, defaults to now
        #[arg(short, long)]
        timestamp: Option<u32>,

        /// TOML file with the protocol parameters to announce
        #[arg(long, requires = "target")]
        announce: Option<PathBuf>,

        /// Milestone index at which the announced parameters take effect
        #[arg(long, requires = "announce")]
        target: Option<u32>,
    },
}
