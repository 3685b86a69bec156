use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum NodeCommands {
    Start {
        #[arg(short, long)]
        foreground: bool,
    },

    Stop,

    Status {
        #[arg(long)]
        json: bool,
    },
}
