use serde::{Deserialize, Serialize};

use crate::milestone::{MilestoneIndex, ProtocolParamsMilestoneOpt};
use crate::params::ProtocolParameters;
use crate::support::Versions;
use crate::types::{NodeEvent, NodeStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeResponse {
    Status(NodeStatus),
    ProtocolParameters(ProtocolParameters),
    PendingChanges(Vec<ProtocolParamsMilestoneOpt>),
    SupportedVersions(Versions),
    MilestoneConfirmed { index: MilestoneIndex },
    Ok,
    Error(String),
    Subscribed,
    Unsubscribed,
    SubscriptionRejected { reason: String },
    Event(NodeEvent),
}

impl NodeResponse {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
