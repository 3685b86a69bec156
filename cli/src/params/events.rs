use tangle_protocol::{NodeEvent, ProtocolParamsMilestoneOpt};
use tokio::sync::mpsc;
use tracing::trace;

use super::ManagerError;

/// Notifications raised while handling confirmed milestones.
#[derive(Debug)]
pub enum ProtocolEvent {
    /// The change taking effect at the next milestone uses a protocol version
    /// this build cannot execute.
    NextMilestoneUnsupported(ProtocolParamsMilestoneOpt),
    /// The manager could not persist or activate a change.
    CriticalError(ManagerError),
}

impl ProtocolEvent {
    pub fn to_node_event(&self) -> NodeEvent {
        match self {
            ProtocolEvent::NextMilestoneUnsupported(change) => NodeEvent::NextMilestoneUnsupported {
                change: change.clone(),
            },
            ProtocolEvent::CriticalError(e) => NodeEvent::CriticalError {
                message: e.to_string(),
            },
        }
    }
}

/// Receiver of [`ProtocolEvent`]s. Must not block the caller.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProtocolEvent);
}

impl EventSink for mpsc::UnboundedSender<ProtocolEvent> {
    fn emit(&self, event: ProtocolEvent) {
        if let Err(e) = self.send(event) {
            trace!(event = ?e.0, "Event receiver closed, dropping event");
        }
    }
}
