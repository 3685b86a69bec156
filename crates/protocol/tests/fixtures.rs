use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use serde_json::json;
use tangle_protocol::*;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("fixtures")
}

fn requests_dir() -> PathBuf {
    fixtures_dir().join("requests")
}

fn responses_dir() -> PathBuf {
    fixtures_dir().join("responses")
}

fn write_fixture(dir: &Path, name: &str, json: &str) {
    let path = dir.join(format!("{}.json", name));
    // written aside and renamed so the verify tests never read a partial file
    let tmp = dir.join(format!("{}.json.tmp", name));
    fs::write(&tmp, json).unwrap_or_else(|_| panic!("Failed to write fixture: {:?}", tmp));
    fs::rename(&tmp, &path).unwrap_or_else(|_| panic!("Failed to move fixture: {:?}", path));
}

fn sample_parameters() -> ProtocolParameters {
    ProtocolParameters {
        version: 3,
        network_name: "testnet".to_string(),
        bech32_hrp: "rms".to_string(),
        min_pow_score: 1500,
        below_max_depth: 15,
        rent_structure: RentStructure::default(),
        token_supply: 1_813_620_509_061_365,
    }
}

fn sample_change() -> ProtocolParamsMilestoneOpt {
    ProtocolParamsMilestoneOpt::new(105, &sample_parameters()).unwrap()
}

fn sample_milestone() -> Milestone {
    Milestone::new(101, 1704067200).with_protocol_params(sample_change())
}

fn sample_node_status() -> NodeStatus {
    NodeStatus {
        running: true,
        uptime_secs: 3600,
        version: "0.3.0".to_string(),
        ledger_index: 104,
        last_confirmed_at: Some(1704067200),
        protocol_version: 2,
        network_name: "testnet".to_string(),
        pending_changes: 1,
        next_pending_supported: false,
        database_size_bytes: 1024000,
        subscriber_count: 2,
        ipc_protocol_version: PROTOCOL_VERSION,
        min_supported_ipc_version: MIN_SUPPORTED_VERSION,
    }
}

#[test]
fn generate_request_fixtures() {
    let dir = requests_dir();
    fs::create_dir_all(&dir).unwrap();

    let requests: Vec<(&str, NodeRequest)> = vec![
        ("get_status", NodeRequest::GetStatus),
        ("get_protocol_parameters", NodeRequest::GetProtocolParameters),
        ("get_pending_changes", NodeRequest::GetPendingChanges),
        ("get_supported_versions", NodeRequest::GetSupportedVersions),
        (
            "confirm_milestone",
            NodeRequest::ConfirmMilestone(sample_milestone()),
        ),
        (
            "confirm_plain_milestone",
            NodeRequest::ConfirmMilestone(Milestone::new(102, 1704067210)),
        ),
        ("subscribe", NodeRequest::Subscribe),
        ("unsubscribe", NodeRequest::Unsubscribe),
        ("shutdown", NodeRequest::Shutdown),
    ];

    for (name, request) in requests {
        let json = serde_json::to_string_pretty(&request).unwrap();
        write_fixture(&dir, name, &json);
    }
}

#[test]
fn generate_response_fixtures() {
    let dir = responses_dir();
    fs::create_dir_all(&dir).unwrap();

    let responses: Vec<(&str, NodeResponse)> = vec![
        ("status", NodeResponse::Status(sample_node_status())),
        (
            "protocol_parameters",
            NodeResponse::ProtocolParameters(sample_parameters()),
        ),
        (
            "pending_changes",
            NodeResponse::PendingChanges(vec![sample_change()]),
        ),
        (
            "supported_versions",
            NodeResponse::SupportedVersions(Versions::supported()),
        ),
        (
            "milestone_confirmed",
            NodeResponse::MilestoneConfirmed { index: 101 },
        ),
        ("ok", NodeResponse::Ok),
        (
            "error",
            NodeResponse::Error("milestone 99 is out of order".to_string()),
        ),
        ("subscribed", NodeResponse::Subscribed),
        ("unsubscribed", NodeResponse::Unsubscribed),
        (
            "subscription_rejected",
            NodeResponse::SubscriptionRejected {
                reason: "Maximum subscribers (10) reached".to_string(),
            },
        ),
        (
            "event_unsupported",
            NodeResponse::Event(NodeEvent::NextMilestoneUnsupported {
                change: sample_change(),
            }),
        ),
        (
            "event_critical",
            NodeResponse::Event(NodeEvent::CriticalError {
                message: "unable to persist new protocol parameters".to_string(),
            }),
        ),
    ];

    for (name, response) in responses {
        let json = serde_json::to_string_pretty(&response).unwrap();
        write_fixture(&dir, name, &json);
    }
}

#[test]
fn verify_request_fixtures_deserialize() {
    let dir = requests_dir();
    fs::create_dir_all(&dir).unwrap();

    for entry in fs::read_dir(&dir).expect("Failed to read requests directory") {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            let content = fs::read_to_string(&path).unwrap();
            let result: Result<NodeRequest, _> = serde_json::from_str(&content);
            assert!(
                result.is_ok(),
                "Failed to deserialize {:?}: {:?}",
                path,
                result.err()
            );
        }
    }
}

#[test]
fn verify_response_fixtures_deserialize() {
    let dir = responses_dir();
    fs::create_dir_all(&dir).unwrap();

    for entry in fs::read_dir(&dir).expect("Failed to read responses directory") {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            let content = fs::read_to_string(&path).unwrap();
            let result: Result<NodeResponse, _> = serde_json::from_str(&content);
            assert!(
                result.is_ok(),
                "Failed to deserialize {:?}: {:?}",
                path,
                result.err()
            );
        }
    }
}

#[test]
fn plain_milestone_omits_protocol_params() {
    let value = serde_json::to_value(Milestone::new(7, 1700000000)).unwrap();
    assert_eq!(value, json!({ "index": 7, "timestamp": 1700000000 }));

    let parsed: Milestone = serde_json::from_value(value).unwrap();
    assert_eq!(parsed.protocol_params(), None);
}

#[test]
fn node_event_is_internally_tagged() {
    let value = serde_json::to_value(NodeEvent::CriticalError {
        message: "boom".to_string(),
    })
    .unwrap();
    assert_eq!(value, json!({ "kind": "critical_error", "message": "boom" }));
}

#[test]
fn supported_versions_serialize_as_list() {
    let value = serde_json::to_value(Versions::new([3, 2])).unwrap();
    assert_eq!(value, json!([2, 3]));
}

#[test]
fn announcement_carries_encoded_parameters() {
    let change = sample_change();
    assert_eq!(change.target_milestone_index, 105);
    assert_eq!(change.protocol_version, 3);

    let decoded =
        ProtocolParameters::from_bytes(&change.params, DeserializationMode::PerformValidation)
            .unwrap();
    assert_eq!(decoded, sample_parameters());
}

#[test]
fn only_mutating_requests_are_writes() {
    assert!(NodeRequest::ConfirmMilestone(Milestone::new(1, 0)).is_write());
    assert!(NodeRequest::Shutdown.is_write());
    assert!(!NodeRequest::GetStatus.is_write());
    assert!(!NodeRequest::GetPendingChanges.is_write());
}
