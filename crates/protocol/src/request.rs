use serde::{Deserialize, Serialize};

use crate::milestone::Milestone;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeRequest {
    GetStatus,
    GetProtocolParameters,
    GetPendingChanges,
    GetSupportedVersions,
    ConfirmMilestone(Milestone),
    Subscribe,
    Unsubscribe,
    Shutdown,
}

impl NodeRequest {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Whether the request mutates node state and must go through the writer.
    pub fn is_write(&self) -> bool {
        matches!(self, NodeRequest::ConfirmMilestone(_) | NodeRequest::Shutdown)
    }
}
