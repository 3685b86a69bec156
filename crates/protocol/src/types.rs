use serde::{Deserialize, Serialize};

use crate::milestone::{MilestoneIndex, ProtocolParamsMilestoneOpt};
use crate::params::ProtocolVersion;
use crate::version::{MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};

pub const MAX_SUBSCRIBERS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub version: String,
    pub ledger_index: MilestoneIndex,
    pub last_confirmed_at: Option<i64>,
    pub protocol_version: ProtocolVersion,
    pub network_name: String,
    pub pending_changes: usize,
    pub next_pending_supported: bool,
    pub database_size_bytes: u64,
    pub subscriber_count: usize,
    pub ipc_protocol_version: u32,
    pub min_supported_ipc_version: u32,
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self {
            running: false,
            uptime_secs: 0,
            version: String::new(),
            ledger_index: 0,
            last_confirmed_at: None,
            protocol_version: 0,
            network_name: String::new(),
            pending_changes: 0,
            next_pending_supported: true,
            database_size_bytes: 0,
            subscriber_count: 0,
            ipc_protocol_version: PROTOCOL_VERSION,
            min_supported_ipc_version: MIN_SUPPORTED_VERSION,
        }
    }
}

/// Notifications pushed to subscribed clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeEvent {
    MilestoneConfirmed {
        index: MilestoneIndex,
        protocol_version: ProtocolVersion,
    },
    ProtocolParametersActivated {
        index: MilestoneIndex,
        protocol_version: ProtocolVersion,
    },
    NextMilestoneUnsupported {
        change: ProtocolParamsMilestoneOpt,
    },
    CriticalError {
        message: String,
    },
}

impl NodeEvent {
    pub fn is_critical(&self) -> bool {
        matches!(self, NodeEvent::CriticalError { .. })
    }
}
