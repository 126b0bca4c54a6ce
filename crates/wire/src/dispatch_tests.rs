// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn minimal_request_parses() {
    let req: DispatchRequest =
        serde_json::from_str(r#"{"op":"pull","hosts":["h-1","h-2"]}"#).unwrap();
    assert_eq!(req.op, "pull");
    assert_eq!(req.hosts.len(), 2);
    assert!(!req.force);
    assert!(req.totp.is_none());
    assert!(req.args.is_empty());
}

#[test]
fn args_carry_op_parameters() {
    let req: DispatchRequest = serde_json::from_str(
        r##"{"op":"set-color","hosts":["h-1"],"args":{"color":"#ff8800"}}"##,
    )
    .unwrap();
    assert_eq!(req.args.get("color").and_then(|v| v.as_str()), Some("#ff8800"));
}

#[test]
fn pipeline_response_shape() {
    let resp = DispatchResponse::Pipeline { pipeline_id: PipelineId::new("p-1") };
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json, serde_json::json!({"pipeline_id": "p-1"}));
}

#[test]
fn commands_response_shape() {
    let resp = DispatchResponse::Commands {
        command_ids: vec![CommandId::new("c-1"), CommandId::new("c-2")],
    };
    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json, serde_json::json!({"command_ids": ["c-1", "c-2"]}));
}
