use std::sync::Arc;

use tangle_protocol::{Milestone, MilestoneIndex, ProtocolVersion};
use tracing::{debug, info, warn};

use crate::data::{NodeStore, StoreError};
use crate::params::{read_announcement, Manager};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("milestone {got} out of order, expected {expected}")]
    OutOfOrder {
        expected: MilestoneIndex,
        got: MilestoneIndex,
    },

    #[error("protocol parameters due at milestone {index} were not applied, ledger index not advanced")]
    NotApplied { index: MilestoneIndex },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Outcome of confirming one milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub index: MilestoneIndex,
    pub protocol_version: ProtocolVersion,
    /// New parameters took effect at this milestone.
    pub activated: bool,
}

/// Feeds confirmed milestones to the parameters manager, one at a time and in
/// order. Owns the ledger index.
pub struct ConfirmationPipeline {
    store: Arc<NodeStore>,
    manager: Arc<Manager<NodeStore>>,
    ledger_index: MilestoneIndex,
}

impl ConfirmationPipeline {
    pub fn new(
        store: Arc<NodeStore>,
        manager: Arc<Manager<NodeStore>>,
        ledger_index: MilestoneIndex,
    ) -> Self {
        Self {
            store,
            manager,
            ledger_index,
        }
    }

    pub fn ledger_index(&self) -> MilestoneIndex {
        self.ledger_index
    }

    pub fn confirm(&mut self, milestone: &Milestone) -> Result<Confirmation> {
        let expected = self.ledger_index.saturating_add(1);
        if milestone.index != expected {
            return Err(PipelineError::OutOfOrder {
                expected,
                got: milestone.index,
            });
        }

        self.store.insert_milestone(milestone)?;

        // the announcement is resolved from what was just stored
        let mut stored = Milestone::new(milestone.index, milestone.timestamp);
        if let Some(opt) = read_announcement(self.store.as_ref(), milestone.index)? {
            stored = stored.with_protocol_params(opt);
        }

        let before = self.manager.current();
        self.manager.handle_confirmed_milestone(&stored);
        let after = self.manager.current();

        // an unpersisted or still-due change holds the ledger index
        if !self.fully_applied(&stored)? {
            warn!(
                index = milestone.index,
                "Protocol parameters not applied, holding ledger index"
            );
            return Err(PipelineError::NotApplied {
                index: milestone.index,
            });
        }

        self.store
            .set_ledger_index(milestone.index, chrono::Utc::now().timestamp())?;
        self.ledger_index = milestone.index;

        let activated = !Arc::ptr_eq(&before, &after);
        if activated {
            info!(
                index = milestone.index,
                from = before.version,
                to = after.version,
                "Protocol version switched"
            );
        } else {
            debug!(index = milestone.index, "Milestone confirmed");
        }

        Ok(Confirmation {
            index: milestone.index,
            protocol_version: after.version,
            activated,
        })
    }

    fn fully_applied(&self, milestone: &Milestone) -> Result<bool> {
        if let Some(opt) = milestone.protocol_params() {
            if !self.store.has_change(opt)? {
                return Ok(false);
            }
        }

        let due = self
            .manager
            .pending()
            .first()
            .is_some_and(|head| head.target_milestone_index <= milestone.index);
        Ok(!due)
    }
}
