use std::ops::ControlFlow;

use tangle_protocol::{Milestone, MilestoneIndex, ProtocolParamsMilestoneOpt};

use crate::data::node_store::Result;

/// Persistence the parameters manager relies on.
pub trait ParamsStore: Send + Sync {
    /// Encoded parameters of the latest change whose target is at or before
    /// `ledger_index`.
    fn load_effective_parameters(&self, ledger_index: MilestoneIndex) -> Result<Option<Vec<u8>>>;

    fn append_change(&self, change: &ProtocolParamsMilestoneOpt) -> Result<()>;

    /// Visits every stored change in insertion order until the visitor breaks.
    fn for_each_change(
        &self,
        visitor: &mut dyn FnMut(ProtocolParamsMilestoneOpt) -> ControlFlow<()>,
    ) -> Result<()>;
}

/// Lookup of confirmed milestones by index.
pub trait MilestoneSource {
    fn milestone_by_index(&self, index: MilestoneIndex) -> Result<Option<Milestone>>;
}

/// Resolves the parameter change announced by the milestone at `index`, if
/// that milestone is known and carries one.
pub fn read_announcement<S: MilestoneSource + ?Sized>(
    source: &S,
    index: MilestoneIndex,
) -> Result<Option<ProtocolParamsMilestoneOpt>> {
    Ok(source
        .milestone_by_index(index)?
        .and_then(|milestone| milestone.protocol_params))
}
