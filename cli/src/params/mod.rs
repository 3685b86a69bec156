//! Tracks the protocol parameters in force and the announced changes that
//! will replace them.

mod events;
mod manager;
mod store;

pub use events::{EventSink, ProtocolEvent};
pub use manager::{Manager, ManagerError};
pub use store::{read_announcement, MilestoneSource, ParamsStore};
