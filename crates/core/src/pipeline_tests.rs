// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn pipeline() -> Pipeline {
    Pipeline {
        id: PipelineId::new("p-1"),
        name: "deploy".to_string(),
        ops: vec!["pull".into(), "switch".into(), "test".into()],
        hosts: vec![HostId::new("a"), HostId::new("b"), HostId::new("c")],
        current_stage: 0,
        status: PipelineStatus::Running,
        created_at_ms: 1,
        finished_at_ms: None,
        dropped: HashMap::new(),
    }
}

#[test]
fn active_hosts_excludes_dropped() {
    let mut p = pipeline();
    p.dropped.insert(HostId::new("b"), 0);

    let active: Vec<_> = p.active_hosts().map(|h| h.as_str().to_string()).collect();
    assert_eq!(active, vec!["a", "c"]);
}

#[test]
fn status_serde_is_uppercase() {
    assert_eq!(serde_json::to_string(&PipelineStatus::Partial).unwrap(), "\"PARTIAL\"");
    assert_eq!(
        serde_json::from_str::<PipelineStatus>("\"CANCELLED\"").unwrap(),
        PipelineStatus::Cancelled
    );
}

#[test]
fn only_running_is_non_terminal() {
    assert!(!PipelineStatus::Running.is_terminal());
    for s in [
        PipelineStatus::Complete,
        PipelineStatus::Partial,
        PipelineStatus::Failed,
        PipelineStatus::Cancelled,
    ] {
        assert!(s.is_terminal());
    }
}

#[test]
fn pipeline_round_trips_through_json() {
    let mut p = pipeline();
    p.dropped.insert(HostId::new("c"), 1);
    let json = serde_json::to_string(&p).unwrap();
    let parsed: Pipeline = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, p);
}
