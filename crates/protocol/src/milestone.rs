use serde::{Deserialize, Serialize};

use crate::params::{self, ProtocolParameters, ProtocolVersion};

/// Index of a milestone, and of the ledger state it confirms.
pub type MilestoneIndex = u32;

/// Announcement of a protocol parameter change carried by a milestone.
///
/// `params` holds the encoded [`ProtocolParameters`] and is not decoded until
/// the change becomes active at `target_milestone_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParamsMilestoneOpt {
    pub target_milestone_index: MilestoneIndex,
    pub protocol_version: ProtocolVersion,
    pub params: Vec<u8>,
}

impl ProtocolParamsMilestoneOpt {
    /// Builds an announcement that activates `params` at `target`.
    pub fn new(target: MilestoneIndex, parameters: &ProtocolParameters) -> params::Result<Self> {
        Ok(Self {
            target_milestone_index: target,
            protocol_version: parameters.version,
            params: parameters.to_bytes()?,
        })
    }
}

/// A confirmed checkpoint of the tangle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub index: MilestoneIndex,
    pub timestamp: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_params: Option<ProtocolParamsMilestoneOpt>,
}

impl Milestone {
    pub fn new(index: MilestoneIndex, timestamp: u32) -> Self {
        Self {
            index,
            timestamp,
            protocol_params: None,
        }
    }

    pub fn with_protocol_params(mut self, opt: ProtocolParamsMilestoneOpt) -> Self {
        self.protocol_params = Some(opt);
        self
    }

    pub fn protocol_params(&self) -> Option<&ProtocolParamsMilestoneOpt> {
        self.protocol_params.as_ref()
    }
}
