use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum ProtocolCommands {
    /// Parameters in force at the current ledger index
    Current {
        #[arg(long)]
        json: bool,
    },

    /// Announced changes that have not taken effect yet
    Pending {
        #[arg(long)]
        json: bool,
    },

    /// Protocol versions this build can execute
    Supported {
        #[arg(long)]
        json: bool,
    },
}
