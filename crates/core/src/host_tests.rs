// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn host_id_display_and_serde() {
    let id = HostId::new("h-1");
    assert_eq!(id.to_string(), "h-1");

    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"h-1\"");
    let parsed: HostId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn host_type_serde_is_lowercase() {
    assert_eq!(serde_json::to_string(&HostType::Nixos).unwrap(), "\"nixos\"");
    assert_eq!(serde_json::to_string(&HostType::Macos).unwrap(), "\"macos\"");
}

#[test]
fn agent_reported_defaults_to_unknown() {
    #[derive(serde::Deserialize)]
    struct Row {
        #[serde(default)]
        lock: AgentReported,
    }
    let row: Row = serde_json::from_str("{}").unwrap();
    assert_eq!(row.lock, AgentReported::Unknown);
}

#[test]
fn freshness_is_empty() {
    assert!(Freshness::default().is_empty());
    let f = Freshness { binary_hash: Some("x".into()), ..Default::default() };
    assert!(!f.is_empty());
}

#[test]
fn host_round_trips_through_json() {
    let host = crate::test_support::host("h-1");
    let json = serde_json::to_string(&host).unwrap();
    let parsed: Host = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, host);
}

#[test]
fn host_deserializes_with_missing_optional_fields() {
    // Old rows written before new columns were added must still parse.
    let json = r#"{
        "id": "h-1",
        "hostname": "h-1.fleet.local",
        "host_type": "nixos",
        "status": "offline"
    }"#;
    let host: Host = serde_json::from_str(json).unwrap();
    assert_eq!(host.status, HostStatus::Offline);
    assert_eq!(host.heartbeat_interval_secs, 30);
    assert_eq!(host.lock_status, AgentReported::Unknown);
    assert!(host.pending_command.is_none());
}
