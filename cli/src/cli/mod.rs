mod milestone;
mod node;
mod protocol;

pub use milestone::MilestoneCommands;
pub use node::NodeCommands;
pub use protocol::ProtocolCommands;

use clap::{Parser, Subcommand};

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start, stop or inspect the node
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },

    /// Show protocol parameters known to the running node
    #[command(alias = "params")]
    Protocol {
        #[command(subcommand)]
        command: ProtocolCommands,
    },

    /// Feed confirmed milestones to the running node
    #[command(alias = "ms")]
    Milestone {
        #[command(subcommand)]
        command: MilestoneCommands,
    },

    /// Stream node events as JSON lines
    Watch {
        /// Stop after this many events (0 = unlimited)
        #[arg(short = 'n', long, default_value_t = 0)]
        count: u32,

        #[arg(short, long)]
        compact: bool,
    },

    Config {
        #[arg(long)]
        path: bool,

        #[arg(long)]
        reset: bool,

        #[arg(short, long)]
        edit: bool,
    },

    Logs {
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,

        #[arg(short, long)]
        follow: bool,
    },
}

/// Tangle node with protocol parameter tracking.
#[derive(Debug, Parser)]
#[command(name = "tangle", version, verbatim_doc_comment)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true)]
    pub log_level: Option<String>,
}
