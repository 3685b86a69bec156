use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use tangle_protocol::{
    Milestone, MilestoneIndex, NodeEvent, NodeRequest, NodeResponse, NodeStatus,
    ProtocolParameters, ProtocolParamsMilestoneOpt, Versions, MIN_SUPPORTED_VERSION,
    PROTOCOL_VERSION,
};

use crate::daemon::socket_path;

#[derive(Debug, Clone)]
pub struct VersionMismatchError {
    pub client_protocol_version: u32,
    pub client_min_supported: u32,
    pub node_protocol_version: u32,
    pub node_min_supported: u32,
    pub node_binary_version: String,
    pub kind: VersionMismatchKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionMismatchKind {
    ClientTooOld,
    NodeTooOld,
}

impl std::fmt::Display for VersionMismatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            VersionMismatchKind::ClientTooOld => {
                write!(
                    f,
                    "IPC version mismatch: this client speaks v{}, but the node (v{}) requires v{}+.\n\n\
                    Please update the tangle binary.",
                    self.client_protocol_version,
                    self.node_binary_version,
                    self.node_min_supported
                )
            }
            VersionMismatchKind::NodeTooOld => {
                write!(
                    f,
                    "IPC version mismatch: node (v{}) speaks v{}, but this client requires v{}+.\n\n\
                    Please restart the node:\n  \
                    tangle node stop && tangle node start",
                    self.node_binary_version,
                    self.node_protocol_version,
                    self.client_min_supported
                )
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Node error: {0}")]
    Node(String),

    #[error("Subscription rejected: {0}")]
    SubscriptionRejected(String),

    #[error("{0}")]
    VersionMismatch(VersionMismatchError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Checks that this client and the node can understand each other.
pub fn check_version_compatibility(status: &NodeStatus) -> Result<()> {
    let mismatch = |kind| {
        ClientError::VersionMismatch(VersionMismatchError {
            client_protocol_version: PROTOCOL_VERSION,
            client_min_supported: MIN_SUPPORTED_VERSION,
            node_protocol_version: status.ipc_protocol_version,
            node_min_supported: status.min_supported_ipc_version,
            node_binary_version: status.version.clone(),
            kind,
        })
    };

    // Can the node understand our requests?
    if PROTOCOL_VERSION < status.min_supported_ipc_version {
        return Err(mismatch(VersionMismatchKind::ClientTooOld));
    }

    // Can we understand the node's responses?
    if status.ipc_protocol_version < MIN_SUPPORTED_VERSION {
        return Err(mismatch(VersionMismatchKind::NodeTooOld));
    }

    Ok(())
}

fn unexpected(response: NodeResponse) -> ClientError {
    match response {
        NodeResponse::Error(e) => ClientError::Node(e),
        other => ClientError::Protocol(format!("Unexpected response: {other:?}")),
    }
}

pub struct NodeClient {
    stream: UnixStream,
    read_buffer: Vec<u8>,
}

impl NodeClient {
    pub fn connect() -> Result<Self> {
        let stream = UnixStream::connect(socket_path())?;
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        stream.set_write_timeout(Some(Duration::from_secs(5)))?;
        Ok(Self {
            stream,
            read_buffer: Vec::with_capacity(8 * 1024),
        })
    }

    /// Connects and refuses to continue if the IPC versions are incompatible.
    pub fn connect_with_version_check() -> Result<Self> {
        let mut client = Self::connect()?;
        let status = client.get_status()?;
        check_version_compatibility(&status)?;
        Ok(client)
    }

    fn read_line_blocking(&mut self) -> Result<String> {
        let mut temp_buf = [0u8; 8192];
        loop {
            if let Some(pos) = self.read_buffer.iter().position(|&b| b == b'\n') {
                let line_bytes: Vec<u8> = self.read_buffer.drain(..=pos).collect();
                return Ok(String::from_utf8_lossy(&line_bytes).to_string());
            }
            let n = self.stream.read(&mut temp_buf)?;
            if n == 0 {
                return Err(ClientError::Protocol("Connection closed".into()));
            }
            self.read_buffer.extend_from_slice(&temp_buf[..n]);
        }
    }

    fn read_response(&mut self) -> Result<NodeResponse> {
        let line = self.read_line_blocking()?;
        NodeResponse::from_json(&line).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    fn send_request(&mut self, request: NodeRequest) -> Result<NodeResponse> {
        let json = request
            .to_json()
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        writeln!(self.stream, "{}", json)?;
        self.stream.flush()?;

        // events may already be queued ahead of the reply on a subscribed connection
        loop {
            match self.read_response()? {
                NodeResponse::Event(event) => {
                    tracing::trace!(?event, "Skipping event while awaiting reply");
                }
                response => return Ok(response),
            }
        }
    }

    pub fn get_status(&mut self) -> Result<NodeStatus> {
        match self.send_request(NodeRequest::GetStatus)? {
            NodeResponse::Status(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }

    pub fn get_protocol_parameters(&mut self) -> Result<ProtocolParameters> {
        match self.send_request(NodeRequest::GetProtocolParameters)? {
            NodeResponse::ProtocolParameters(params) => Ok(params),
            other => Err(unexpected(other)),
        }
    }

    pub fn get_pending_changes(&mut self) -> Result<Vec<ProtocolParamsMilestoneOpt>> {
        match self.send_request(NodeRequest::GetPendingChanges)? {
            NodeResponse::PendingChanges(changes) => Ok(changes),
            other => Err(unexpected(other)),
        }
    }

    pub fn get_supported_versions(&mut self) -> Result<Versions> {
        match self.send_request(NodeRequest::GetSupportedVersions)? {
            NodeResponse::SupportedVersions(versions) => Ok(versions),
            other => Err(unexpected(other)),
        }
    }

    pub fn confirm_milestone(&mut self, milestone: Milestone) -> Result<MilestoneIndex> {
        match self.send_request(NodeRequest::ConfirmMilestone(milestone))? {
            NodeResponse::MilestoneConfirmed { index } => Ok(index),
            other => Err(unexpected(other)),
        }
    }

    pub fn shutdown(&mut self) -> Result<()> {
        match self.send_request(NodeRequest::Shutdown)? {
            NodeResponse::Ok => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub fn subscribe(&mut self) -> Result<()> {
        match self.send_request(NodeRequest::Subscribe)? {
            NodeResponse::Subscribed => Ok(()),
            NodeResponse::SubscriptionRejected { reason } => {
                Err(ClientError::SubscriptionRejected(reason))
            }
            other => Err(unexpected(other)),
        }
    }

    /// Blocks until the node pushes the next event.
    pub fn next_event(&mut self) -> Result<NodeEvent> {
        self.stream.set_read_timeout(None)?;
        loop {
            match self.read_response()? {
                NodeResponse::Event(event) => return Ok(event),
                NodeResponse::Error(e) => return Err(ClientError::Node(e)),
                other => tracing::debug!(response = ?other, "Ignoring non-event response"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_status(ipc_protocol_version: u32, min_supported_ipc_version: u32, version: &str) -> NodeStatus {
        NodeStatus {
            running: true,
            version: version.to_string(),
            ipc_protocol_version,
            min_supported_ipc_version,
            ..NodeStatus::default()
        }
    }

    #[test]
    fn test_version_compatible_same_version() {
        let status = make_status(PROTOCOL_VERSION, MIN_SUPPORTED_VERSION, "1.0.0");
        assert!(check_version_compatibility(&status).is_ok());
    }

    #[test]
    fn test_version_compatible_node_newer() {
        let status = make_status(PROTOCOL_VERSION + 1, MIN_SUPPORTED_VERSION, "2.0.0");
        assert!(check_version_compatibility(&status).is_ok());
    }

    #[test]
    fn test_version_compatible_at_min_boundary() {
        let status = make_status(MIN_SUPPORTED_VERSION, MIN_SUPPORTED_VERSION, "0.5.0");
        assert!(check_version_compatibility(&status).is_ok());
    }

    #[test]
    fn test_version_client_too_old() {
        let status = make_status(10, PROTOCOL_VERSION + 1, "3.0.0");
        match check_version_compatibility(&status) {
            Err(ClientError::VersionMismatch(e)) => {
                assert_eq!(e.kind, VersionMismatchKind::ClientTooOld);
                assert_eq!(e.client_protocol_version, PROTOCOL_VERSION);
                assert_eq!(e.node_min_supported, PROTOCOL_VERSION + 1);
                assert!(e.to_string().contains("update the tangle binary"));
            }
            other => panic!("Expected VersionMismatch error, got {other:?}"),
        }
    }

    #[test]
    fn test_version_node_too_old() {
        let status = make_status(0, 0, "0.1.0");
        match check_version_compatibility(&status) {
            Err(ClientError::VersionMismatch(e)) => {
                assert_eq!(e.kind, VersionMismatchKind::NodeTooOld);
                assert_eq!(e.node_protocol_version, 0);
                assert_eq!(e.client_min_supported, MIN_SUPPORTED_VERSION);
                assert!(e.to_string().contains("restart the node"));
            }
            other => panic!("Expected VersionMismatch error, got {other:?}"),
        }
    }

    #[test]
    fn test_unexpected_response_maps_node_errors() {
        assert!(matches!(
            unexpected(NodeResponse::Error("boom".into())),
            ClientError::Node(msg) if msg == "boom"
        ));
        assert!(matches!(
            unexpected(NodeResponse::Subscribed),
            ClientError::Protocol(_)
        ));
    }
}
