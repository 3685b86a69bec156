//! Protocol versions this build is able to execute.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::params::ProtocolVersion;

/// Ledger protocol versions supported by this build.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[ProtocolVersion] = &[2];

/// A fixed set of protocol versions.
///
/// Built either from a list or from a contiguous range; both answer
/// [`Versions::supports`] the same way for the same members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Versions(Vec<ProtocolVersion>);

impl Versions {
    pub fn new(versions: impl IntoIterator<Item = ProtocolVersion>) -> Self {
        let mut versions: Vec<_> = versions.into_iter().collect();
        versions.sort_unstable();
        versions.dedup();
        Self(versions)
    }

    pub fn range(range: RangeInclusive<ProtocolVersion>) -> Self {
        Self::new(range)
    }

    /// The table compiled into this build.
    pub fn supported() -> Self {
        Self::new(SUPPORTED_PROTOCOL_VERSIONS.iter().copied())
    }

    pub fn supports(&self, version: ProtocolVersion) -> bool {
        self.0.binary_search(&version).is_ok()
    }

    pub fn lowest(&self) -> Option<ProtocolVersion> {
        self.0.first().copied()
    }

    pub fn highest(&self) -> Option<ProtocolVersion> {
        self.0.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = ProtocolVersion> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Versions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let list: Vec<String> = self.0.iter().map(|v| v.to_string()).collect();
        write!(f, "[{}]", list.join(", "))
    }
}
