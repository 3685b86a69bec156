pub mod config;
pub mod logs;
pub mod milestone;
pub mod node;
pub mod protocol;
pub mod watch;

use color_eyre::eyre::{eyre, Result};

use crate::daemon::{is_node_running, NodeClient};

/// Connects to the running node, checking IPC compatibility.
fn connect() -> Result<NodeClient> {
    if !is_node_running() {
        return Err(eyre!("Node is not running. Start it with: tangle node start"));
    }
    NodeClient::connect_with_version_check().map_err(|e| eyre!("{}", e))
}
