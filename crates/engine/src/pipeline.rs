// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pipeline Executor: ordered multi-op stages across a host set with `&&`
//! semantics per host.
//!
//! The executor keeps no private run state: every decision is derived from
//! the pipeline and command rows, so advancement resumes naturally after a
//! restart. It advances when the engine loop hands it a finished command.

use crate::lifecycle::LifecycleManager;
use crate::pipelines::PipelineRegistry;
use crate::transport::AgentTransport;
use fleet_core::{
    new_id, Clock, Command, ErrorCode, Event, HostId, LogEntry, LogLevel, Pipeline, PipelineId,
    PipelineStatus, ValidationError,
};
use fleet_storage::{EventBus, MaterializedState};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct PipelineExecutor<C: Clock> {
    registry: Arc<PipelineRegistry>,
    state: Arc<Mutex<MaterializedState>>,
    bus: EventBus,
    clock: C,
}

impl<C: Clock> PipelineExecutor<C> {
    pub fn new(
        registry: Arc<PipelineRegistry>,
        state: Arc<Mutex<MaterializedState>>,
        bus: EventBus,
        clock: C,
    ) -> Self {
        Self { registry, state, bus, clock }
    }

    pub fn registry(&self) -> &PipelineRegistry {
        &self.registry
    }

    /// Create a pipeline run and start its first stage.
    ///
    /// `force` applies to the first stage only; later stages revalidate
    /// against the state the earlier stages produced.
    pub async fn dispatch<T: AgentTransport, LC: Clock>(
        &self,
        name: &str,
        hosts: &[HostId],
        force: bool,
        actor: &str,
        lifecycle: &LifecycleManager<T, LC>,
    ) -> Result<Pipeline, ValidationError> {
        let ops = self.registry.get(name).ok_or_else(|| {
            ValidationError::new(ErrorCode::UnknownOp, format!("unknown pipeline: {name}"))
        })?;
        if hosts.is_empty() {
            return Err(ValidationError::new(ErrorCode::UnknownHost, "no hosts given"));
        }

        let mut unique_hosts: Vec<HostId> = Vec::with_capacity(hosts.len());
        for host in hosts {
            if !unique_hosts.contains(host) {
                unique_hosts.push(host.clone());
            }
        }

        let pipeline = Pipeline {
            id: PipelineId::new(new_id()),
            name: name.to_string(),
            ops: ops.iter().map(|op| op.to_string()).collect(),
            hosts: unique_hosts,
            current_stage: 0,
            status: PipelineStatus::Running,
            created_at_ms: self.clock.epoch_ms(),
            finished_at_ms: None,
            dropped: Default::default(),
        };
        self.record(Event::PipelineCreated { pipeline: pipeline.clone() });
        self.audit(
            LogLevel::Info,
            format!(
                "pipeline {} started on {} host(s)",
                pipeline.name,
                pipeline.hosts.len()
            ),
            actor,
        );

        self.run_stage(&pipeline.id, 0, force, lifecycle).await;

        Ok(self.row(&pipeline.id).unwrap_or(pipeline))
    }

    /// The engine loop observed a finished command; advance its pipeline.
    pub async fn on_command_finished<T: AgentTransport, LC: Clock>(
        &self,
        command: &Command,
        lifecycle: &LifecycleManager<T, LC>,
    ) {
        let Some(pipeline_id) = command.pipeline_id.clone() else { return };
        let Some(pipeline) = self.row(&pipeline_id) else { return };
        if pipeline.is_terminal() {
            return;
        }

        // Non-success removes the host from the active set at the current
        // stage; it is skipped for everything after.
        if !command.status.is_success() && !pipeline.dropped.contains_key(&command.host_id) {
            self.record(Event::PipelineHostDropped {
                id: pipeline_id.clone(),
                host_id: command.host_id.clone(),
                stage: pipeline.current_stage,
            });
            self.audit(
                LogLevel::Warn,
                format!(
                    "pipeline {}: {} dropped at stage {} ({} ended {})",
                    pipeline.name,
                    command.host_id,
                    pipeline.current_stage,
                    command.op_id,
                    command.status,
                ),
                "system",
            );
        }

        self.advance(&pipeline_id, lifecycle).await;
    }

    /// Cancel a running pipeline and its in-flight per-host commands.
    pub fn cancel<T: AgentTransport, LC: Clock>(
        &self,
        pipeline_id: &PipelineId,
        actor: &str,
        lifecycle: &LifecycleManager<T, LC>,
    ) -> Result<(), ValidationError> {
        let pipeline = self
            .row(pipeline_id)
            .filter(|p| !p.is_terminal())
            .ok_or_else(|| ValidationError::new(ErrorCode::NoPending, "no running pipeline"))?;

        for host in pipeline.active_hosts() {
            let belongs = lifecycle
                .get_active(host)
                .map(|c| c.pipeline_id.as_ref() == Some(pipeline_id))
                .unwrap_or(false);
            if belongs {
                if let Err(e) = lifecycle.cancel_command(host) {
                    debug!(%host, error = %e, "cancel raced command completion");
                }
            }
        }

        self.record(Event::PipelineFinished {
            id: pipeline_id.clone(),
            status: PipelineStatus::Cancelled,
            at_ms: self.clock.epoch_ms(),
        });
        self.audit(LogLevel::Warn, format!("pipeline {} cancelled", pipeline.name), actor);
        Ok(())
    }

    /// Re-drive every running pipeline after a restart: the current stage is
    /// re-dispatched for hosts whose commands were lost, and stages that
    /// were already fully resolved advance.
    pub async fn resume<T: AgentTransport, LC: Clock>(
        &self,
        lifecycle: &LifecycleManager<T, LC>,
    ) {
        let running: Vec<(PipelineId, usize)> = {
            let state = self.state.lock();
            state
                .active_pipelines()
                .iter()
                .map(|p| (p.id.clone(), p.current_stage))
                .collect()
        };
        for (id, stage) in running {
            self.run_stage(&id, stage, false, lifecycle).await;
        }
    }

    // ── Internals ──────────────────────────────────────────────────────

    /// Dispatch the stage op to every active host. Validation failures drop
    /// the host immediately; transport failures surface later as finished
    /// error commands.
    async fn run_stage<T: AgentTransport, LC: Clock>(
        &self,
        pipeline_id: &PipelineId,
        stage: usize,
        force: bool,
        lifecycle: &LifecycleManager<T, LC>,
    ) {
        let Some(pipeline) = self.row(pipeline_id) else { return };
        let Some(op_id) = pipeline.ops.get(stage).cloned() else { return };
        let hosts: Vec<HostId> = pipeline.active_hosts().cloned().collect();
        let no_args = serde_json::Map::new();

        for host in hosts {
            // Idempotent: a host that already has its stage command (resume
            // after restart, or a repeated advance) is not re-dispatched.
            let already_dispatched = {
                let state = self.state.lock();
                state.commands.values().any(|c| {
                    c.pipeline_id.as_ref() == Some(pipeline_id)
                        && c.host_id == host
                        && c.op_id == op_id
                })
            };
            if already_dispatched {
                continue;
            }

            let result = lifecycle
                .execute_op(&op_id, &host, force, Some(pipeline_id.clone()), "pipeline", &no_args)
                .await;
            if let Err(e) = result {
                warn!(%host, op = %op_id, error = %e, "pipeline stage dispatch blocked");
                self.record(Event::PipelineHostDropped {
                    id: pipeline_id.clone(),
                    host_id: host.clone(),
                    stage,
                });
                self.audit(
                    LogLevel::Warn,
                    format!(
                        "pipeline {}: {} dropped at stage {stage} ({op_id} blocked: {})",
                        pipeline.name, host, e.message
                    ),
                    "system",
                );
            }
        }

        // Every host may have been dropped or completed synchronously.
        self.advance(pipeline_id, lifecycle).await;
    }

    /// Advance the pipeline if its current stage is fully resolved. Boxed to
    /// break the run_stage → advance → run_stage recursion for dashboard
    /// stages that complete synchronously.
    fn advance<'a, T: AgentTransport, LC: Clock>(
        &'a self,
        pipeline_id: &'a PipelineId,
        lifecycle: &'a LifecycleManager<T, LC>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Some(pipeline) = self.row(pipeline_id) else { return };
            if pipeline.is_terminal() {
                return;
            }

            let active: Vec<HostId> = pipeline.active_hosts().cloned().collect();
            if active.is_empty() {
                self.finalize(&pipeline);
                return;
            }

            let Some(stage_op) = pipeline.ops.get(pipeline.current_stage) else { return };

            // The stage is resolved when every active host has a successful
            // terminal command for the stage op. Failed hosts were already
            // dropped by on_command_finished.
            let resolved = {
                let state = self.state.lock();
                active.iter().all(|host| {
                    state
                        .commands
                        .values()
                        .filter(|c| {
                            c.pipeline_id.as_ref() == Some(pipeline_id)
                                && &c.host_id == host
                                && &c.op_id == stage_op
                        })
                        .any(|c| c.status.is_success())
                })
            };
            if !resolved {
                return;
            }

            let next = pipeline.current_stage + 1;
            if next < pipeline.ops.len() {
                self.record(Event::PipelineStageStarted { id: pipeline_id.clone(), stage: next });
                self.run_stage(pipeline_id, next, false, lifecycle).await;
            } else {
                self.finalize(&pipeline);
            }
        })
    }

    fn finalize(&self, pipeline: &Pipeline) {
        let survivors = pipeline.active_hosts().count();
        let status = if survivors == 0 {
            PipelineStatus::Failed
        } else if pipeline.dropped.is_empty() {
            PipelineStatus::Complete
        } else {
            PipelineStatus::Partial
        };

        self.record(Event::PipelineFinished {
            id: pipeline.id.clone(),
            status,
            at_ms: self.clock.epoch_ms(),
        });
        let level = match status {
            PipelineStatus::Complete => LogLevel::Success,
            PipelineStatus::Partial => LogLevel::Warn,
            _ => LogLevel::Error,
        };
        self.audit(level, format!("pipeline {} finished {status}", pipeline.name), "system");
    }

    fn record(&self, event: Event) {
        self.state.lock().apply_event(&event);
        if let Err(e) = self.bus.send(event) {
            warn!(error = %e, "failed to persist pipeline event");
        }
    }

    fn audit(&self, level: LogLevel, message: String, actor: &str) {
        self.record(Event::Logged {
            entry: LogEntry {
                id: new_id(),
                at_ms: self.clock.epoch_ms(),
                category: "pipeline".to_string(),
                level,
                actor: actor.to_string(),
                host_id: None,
                action: None,
                message,
                details: None,
            },
        });
    }

    fn row(&self, id: &PipelineId) -> Option<Pipeline> {
        self.state.lock().pipelines.get(id).cloned()
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
