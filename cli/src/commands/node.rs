use std::time::Duration;

use color_eyre::eyre::{eyre, Result};
use tangle_protocol::NodeStatus;

use crate::cli::NodeCommands;
use crate::config::{LogLevel, NodeConfig};
use crate::daemon::{is_node_running, run_node, socket_path, NodeClient};

pub fn run(
    command: NodeCommands,
    config: NodeConfig,
    log_level_override: Option<LogLevel>,
) -> Result<()> {
    match command {
        NodeCommands::Start { foreground } => start(foreground, config, log_level_override),
        NodeCommands::Stop => stop(),
        NodeCommands::Status { json } => status(json),
    }
}

fn start(foreground: bool, config: NodeConfig, log_level_override: Option<LogLevel>) -> Result<()> {
    if is_node_running() {
        println!("Node is already running.");
        return Ok(());
    }

    config.validate()?;

    if foreground {
        println!("Starting node in foreground...");
        println!("Press Ctrl+C to stop.");
        return run_node(true, config, log_level_override).map_err(|e| eyre!("{}", e));
    }

    println!("Starting node...");
    run_node(false, config, log_level_override).map_err(|e| eyre!("{}", e))?;
    std::thread::sleep(Duration::from_millis(500));

    let mut started = false;
    for _ in 0..3 {
        if is_node_running() {
            started = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    if started {
        println!("Node started successfully.");
        println!("Socket: {:?}", socket_path());
    } else {
        println!("Node may have failed to start. Check logs:");
        println!("  tangle logs");
    }
    Ok(())
}

fn stop() -> Result<()> {
    if !is_node_running() {
        println!("Node is not running.");
        return Ok(());
    }

    let mut client = NodeClient::connect().map_err(|e| eyre!("Failed to connect to node: {}", e))?;
    client.shutdown().map_err(|e| eyre!("{}", e))?;
    println!("Node stopped.");
    Ok(())
}

fn status(json: bool) -> Result<()> {
    if !is_node_running() {
        if json {
            println!("{}", serde_json::to_string_pretty(&NodeStatus::default())?);
        } else {
            println!("Node Status");
            println!("{}", "-".repeat(40));
            println!("Running:      no");
        }
        return Ok(());
    }

    let status = super::connect()?
        .get_status()
        .map_err(|e| eyre!("{}", e))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Node Status");
    println!("{}", "-".repeat(40));
    println!("Running:      yes");
    println!("Version:      {}", status.version);
    println!(
        "Uptime:       {}",
        humantime::format_duration(Duration::from_secs(status.uptime_secs))
    );
    println!("Ledger index: {}", status.ledger_index);
    if let Some(dt) = status
        .last_confirmed_at
        .and_then(|at| chrono::DateTime::from_timestamp(at, 0))
    {
        println!("Confirmed at: {}", dt.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!("Network:      {}", status.network_name);
    println!("Protocol:     v{}", status.protocol_version);
    println!("Pending:      {}", status.pending_changes);
    if !status.next_pending_supported {
        println!("Warning:      next pending change uses an unsupported protocol version");
    }
    println!(
        "Database:     {}",
        bytesize::ByteSize(status.database_size_bytes)
    );
    println!("Subscribers:  {}", status.subscriber_count);
    println!(
        "IPC:          v{} (accepts v{}+)",
        status.ipc_protocol_version, status.min_supported_ipc_version
    );
    Ok(())
}
