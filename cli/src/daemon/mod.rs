mod client;
mod pipeline;
mod server;

pub use client::NodeClient;
pub use server::run_node;

use std::path::PathBuf;

use crate::config::runtime_dir;

const SOCKET_NAME: &str = "tangle.sock";

pub fn socket_path() -> PathBuf {
    runtime_dir().join(SOCKET_NAME)
}

pub fn is_node_running() -> bool {
    NodeClient::connect().is_ok()
}
