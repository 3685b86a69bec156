mod milestone;
mod params;
mod request;
mod response;
pub mod support;
mod types;
mod version;

pub use milestone::{Milestone, MilestoneIndex, ProtocolParamsMilestoneOpt};
pub use params::{
    CodecError, DeserializationMode, ProtocolParameters, ProtocolVersion, RentStructure,
};
pub use request::NodeRequest;
pub use response::NodeResponse;
pub use support::{Versions, SUPPORTED_PROTOCOL_VERSIONS};
pub use types::{NodeEvent, NodeStatus, MAX_SUBSCRIBERS};
pub use version::{MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};
