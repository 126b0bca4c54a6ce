// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::hub::HubCmd;
use crate::test_app::{add_host, test_app};
use fleet_core::CommandStatus;
use fleet_wire::DispatchRequest;
use tokio::sync::mpsc;

fn req(op: &str, hosts: &[&str]) -> DispatchRequest {
    DispatchRequest {
        op: op.to_string(),
        hosts: hosts.iter().map(|h| (*h).into()).collect(),
        force: false,
        totp: None,
        args: serde_json::Map::new(),
    }
}

/// Attach a fake agent connection so sends succeed.
async fn connect_agent(app: &crate::app::App, host: &str) -> mpsc::Receiver<fleet_wire::ServerToAgent> {
    let (tx, rx) = mpsc::channel(32);
    app.hub
        .send(HubCmd::RegisterAgent { host_id: host.into(), conn_id: 7, tx })
        .await;
    rx
}

#[tokio::test]
async fn pipeline_names_route_to_the_executor() {
    let app = test_app();
    add_host(&app, "h-1");
    let _rx = connect_agent(&app, "h-1").await;

    let response = handle(&app, req("verify", &["h-1"]), "admin").await.unwrap();
    let DispatchResponse::Pipeline { pipeline_id } = response else {
        panic!("expected a pipeline response");
    };
    assert!(app.state.lock().pipelines.contains_key(&pipeline_id));
}

#[tokio::test]
async fn plain_ops_route_per_host() {
    let app = test_app();
    add_host(&app, "h-1");
    add_host(&app, "h-2");
    let _rx1 = connect_agent(&app, "h-1").await;
    let _rx2 = connect_agent(&app, "h-2").await;

    let response = handle(&app, req("test", &["h-1", "h-2"]), "admin").await.unwrap();
    let DispatchResponse::Commands { command_ids } = response else {
        panic!("expected command ids");
    };
    assert_eq!(command_ids.len(), 2);
    assert!(app.lifecycle.has_active(&"h-1".into()));
    assert!(app.lifecycle.has_active(&"h-2".into()));
}

#[tokio::test]
async fn all_hosts_blocked_surfaces_the_verdict() {
    let app = test_app();
    add_host(&app, "h-1");
    let _rx = connect_agent(&app, "h-1").await;

    // Fixture host is current: pull blocks with already_current
    let err = handle(&app, req("pull", &["h-1"]), "admin").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AlreadyCurrent);
}

#[tokio::test]
async fn unknown_op_is_a_structured_error() {
    let app = test_app();
    add_host(&app, "h-1");
    let err = handle(&app, req("frobnicate", &["h-1"]), "admin").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::UnknownOp);
}

#[tokio::test]
async fn kill_routes_to_the_lifecycle_contract() {
    let app = test_app();
    add_host(&app, "h-1");
    let _rx = connect_agent(&app, "h-1").await;

    // Nothing to kill yet
    let err = handle(&app, req("kill", &["h-1"]), "admin").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NoPending);

    handle(&app, req("test", &["h-1"]), "admin").await.unwrap();
    let response = handle(&app, req("kill", &["h-1"]), "admin").await.unwrap();
    let DispatchResponse::Commands { command_ids } = response else {
        panic!("expected command ids");
    };
    assert_eq!(command_ids.len(), 1);
    assert_eq!(
        app.lifecycle.active_status(&"h-1".into()),
        Some(CommandStatus::Killing)
    );
}

#[tokio::test]
async fn extend_and_cancel_pseudo_ops() {
    let app = test_app();
    add_host(&app, "h-1");
    let _rx = connect_agent(&app, "h-1").await;

    let err = handle(&app, req("extend-timeout", &["h-1"]), "admin").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NoPending);

    handle(&app, req("test", &["h-1"]), "admin").await.unwrap();
    handle(&app, req("extend-timeout", &["h-1"]), "admin").await.unwrap();

    let response = handle(&app, req("cancel", &["h-1"]), "admin").await.unwrap();
    let DispatchResponse::Commands { command_ids } = response else {
        panic!("expected command ids");
    };
    assert_eq!(command_ids.len(), 1);
    assert!(!app.lifecycle.has_active(&"h-1".into()));
}

#[tokio::test]
async fn totp_gated_op_requires_a_code() {
    let app = test_app();
    add_host(&app, "h-1");
    let _rx = connect_agent(&app, "h-1").await;

    // No TOTP secret configured: the op is refused outright
    let err = handle(&app, req("reboot", &["h-1"]), "admin").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TotpRequired);
}
