//! IPC protocol versioning between the node daemon and its clients.
//!
//! This is unrelated to the ledger protocol version carried by
//! [`ProtocolParameters`](crate::ProtocolParameters); see [`crate::support`]
//! for that.
//!
//! # Version History
//!
//! | Version | Changes |
//! |---------|---------|
//! | 1 | Initial protocol version |
//! | 2 | Added `NodeEvent` subscriptions and `next_pending_supported` |
//!
//! # Breaking Changes (require PROTOCOL_VERSION bump)
//!
//! - Removing fields from request/response types
//! - Changing field types
//! - Renaming fields without `#[serde(alias)]`
//! - Removing enum variants
//!
//! # Support Policy
//!
//! N-1 backwards compatibility: keep `MIN_SUPPORTED_VERSION` one behind
//! `PROTOCOL_VERSION` and only bump it when dropping support for old clients.

/// Current IPC protocol version. Bump when making breaking changes.
pub const PROTOCOL_VERSION: u32 = 2;

/// Minimum IPC protocol version this build can communicate with.
pub const MIN_SUPPORTED_VERSION: u32 = 1;
