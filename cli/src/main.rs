mod cli;
mod commands;
mod config;
mod daemon;
mod data;
mod logging;
mod params;

use clap::Parser;
use color_eyre::eyre::Result;

use cli::{Cli, Commands};
use config::{ensure_dirs, LogLevel, NodeConfig};
use logging::LogMode;

fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = ensure_dirs();

    let cli = Cli::parse();
    let config = NodeConfig::load();
    let log_level_override = cli.log_level.as_deref().map(LogLevel::parse_lossy);

    match cli.command {
        // the node sets up its own logging once it knows whether it detaches
        Commands::Node { command } => commands::node::run(command, config, log_level_override),
        Commands::Protocol { command } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::protocol::run(command)
        }
        Commands::Milestone { command } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::milestone::run(command)
        }
        Commands::Watch { count, compact } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::watch::run(count, compact)
        }
        Commands::Config { path, reset, edit } => {
            let _guard = logging::init(config.log_level, LogMode::Stderr, log_level_override);
            commands::config::run(path, reset, edit)
        }
        Commands::Logs { lines, follow } => commands::logs::run(lines, follow),
    }
}
