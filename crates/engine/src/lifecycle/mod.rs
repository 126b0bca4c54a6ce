// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle Manager: single-flight command execution per host.
//!
//! Owns the in-memory active-command map and every mutation of the durable
//! `pending_command` column (via the events it emits). No other component
//! writes either. Heartbeats and registrations feed in as read-only signals
//! that advance deferred post-checks and reconnect verification.
//!
//! Locking: the active map is only ever mutated in place or removed under
//! its mutex; entries never leave the map while a command is still live, so
//! the single-flight check cannot race a completion handler.

pub mod active;
pub mod freshness;
pub mod postcheck;

use crate::compartments::Evaluator;
use crate::registry::OpRegistry;
use crate::scheduler::Scheduler;
use crate::transport::AgentTransport;
use active::{hard_key, parse_key, reconnect_key, warn_key, TimerKind};
pub use active::ActiveCommand;
use async_trait::async_trait;
use fleet_core::op::{ops, OpExecutor};
use fleet_core::{
    new_id, AgentReported, Clock, Command, CommandError, CommandId, CommandStatus, Compartments,
    ErrorCode, Event, Host, HostId, LogEntry, LogLevel, PipelineId, ValidationError,
};
use fleet_storage::{EventBus, MaterializedState};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Attempts before a failed event append downgrades the command.
const PERSIST_RETRIES: usize = 3;

/// Fallback when an op carries no reconnect timeout of its own.
const DEFAULT_RECONNECT: Duration = Duration::from_secs(120);

/// Dashboard-executed capabilities that reach outside the process. GitHub
/// interactions are an external collaborator; the daemon wires the real
/// backend at startup.
#[async_trait]
pub trait DashboardExec: Send + Sync {
    async fn merge_pr(&self, host: &Host) -> Result<(), String>;
}

/// Backend used when no merge integration is configured.
pub struct UnconfiguredMergeBackend;

#[async_trait]
impl DashboardExec for UnconfiguredMergeBackend {
    async fn merge_pr(&self, _host: &Host) -> Result<(), String> {
        Err("no merge backend configured".to_string())
    }
}

pub struct LifecycleManager<T: AgentTransport, C: Clock> {
    state: Arc<Mutex<MaterializedState>>,
    bus: EventBus,
    registry: Arc<OpRegistry>,
    evaluator: Arc<Evaluator>,
    transport: T,
    scheduler: Arc<Mutex<Scheduler>>,
    clock: C,
    dashboard: Arc<dyn DashboardExec>,
    output_dir: Option<std::path::PathBuf>,
    active: Mutex<HashMap<HostId, ActiveCommand>>,
}

/// What a completion handler decided while holding the active-map lock.
enum Resolution {
    Ignore,
    Finish {
        entry: Box<ActiveCommand>,
        status: CommandStatus,
        exit_code: Option<i32>,
        error: Option<CommandError>,
    },
    AwaitReconnect {
        id: CommandId,
        reconnect: Duration,
        deadline_ms: u64,
    },
    Deferred,
}

impl<T: AgentTransport, C: Clock> LifecycleManager<T, C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<Mutex<MaterializedState>>,
        bus: EventBus,
        registry: Arc<OpRegistry>,
        evaluator: Arc<Evaluator>,
        transport: T,
        scheduler: Arc<Mutex<Scheduler>>,
        clock: C,
        dashboard: Arc<dyn DashboardExec>,
    ) -> Self {
        Self {
            state,
            bus,
            registry,
            evaluator,
            transport,
            scheduler,
            clock,
            dashboard,
            output_dir: None,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Directory for per-command output files. When set, every agent
    /// command row is stamped with its output path at creation.
    pub fn with_output_dir(mut self, dir: std::path::PathBuf) -> Self {
        self.output_dir = Some(dir);
        self
    }

    fn output_path(&self, id: &CommandId) -> Option<std::path::PathBuf> {
        self.output_dir.as_ref().map(|dir| dir.join(format!("{id}.log")))
    }

    // ── Contracts ──────────────────────────────────────────────────────

    /// Validate and start an op on a host.
    ///
    /// `force` bypasses the validator verdict but never the single-flight
    /// check. Returns the command row, which may already be terminal for
    /// dashboard ops and send failures.
    pub async fn execute_op(
        &self,
        op_id: &str,
        host_id: &HostId,
        force: bool,
        pipeline_id: Option<PipelineId>,
        actor: &str,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Command, ValidationError> {
        let op = self.registry.get(op_id).ok_or_else(|| {
            ValidationError::new(ErrorCode::UnknownOp, format!("unknown op: {op_id}"))
        })?;

        let host = self.host_row(host_id).ok_or_else(|| {
            ValidationError::new(ErrorCode::UnknownHost, format!("unknown host: {host_id}"))
        })?;

        let now_ms = self.clock.epoch_ms();
        let id = CommandId::new(new_id());
        let command = Command {
            output_file: (op.executor == OpExecutor::Agent)
                .then(|| self.output_path(&id))
                .flatten(),
            id,
            host_id: host_id.clone(),
            op_id: op.id.to_string(),
            pipeline_id,
            status: CommandStatus::Validating,
            created_at_ms: now_ms,
            started_at_ms: None,
            finished_at_ms: None,
            exit_code: None,
            error: None,
        };

        // Single-flight, checked while inserting so dispatch cannot race
        // itself. Never bypassed, not even by force. Control ops are the
        // exception: delivered around the active command, no row reserved.
        let running = {
            let mut active = self.active.lock();
            let running = active.get(host_id).cloned();
            if running.is_none() {
                let pre_freshness =
                    ops::replaces_agent(op.id).then(|| host.freshness.clone()).flatten();
                active.insert(
                    host_id.clone(),
                    ActiveCommand::new(command.clone(), host.clone(), pre_freshness),
                );
            }
            running
        };
        if let Some(running) = running {
            if op.control && op.id != ops::KILL {
                return self.control_send(op.id, &host, actor).await;
            }
            return Err(ValidationError::new(
                ErrorCode::Busy,
                format!("{} is already running on {}", running.command.op_id, host.hostname),
            ));
        }

        self.record(Event::CommandCreated { command: command.clone() });

        // Validate against a snapshot view
        let compartments = self.compartments_for(&host);
        let view =
            crate::registry::HostView { host: &host, compartments: &compartments, busy: false };
        if let Err(verdict) = (op.validate)(&view) {
            if !force {
                self.active.lock().remove(host_id);
                self.record(Event::CommandBlocked {
                    id: command.id.clone(),
                    code: verdict.code,
                    message: verdict.message.clone(),
                    at_ms: self.clock.epoch_ms(),
                });
                self.audit(
                    LogLevel::Warn,
                    "validation",
                    Some(host_id.clone()),
                    Some(op.id.to_string()),
                    format!("{} blocked: {}", op.id, verdict.message),
                    actor,
                );
                return Err(verdict);
            }
            self.audit(
                LogLevel::Warn,
                "validation",
                Some(host_id.clone()),
                Some(op.id.to_string()),
                format!("{} forced past validation: {}", op.id, verdict.message),
                actor,
            );
        }

        let started = self.record(Event::CommandStarted {
            id: command.id.clone(),
            host_id: host_id.clone(),
            op_id: op.id.to_string(),
            at_ms: self.clock.epoch_ms(),
        });
        if !started {
            return Ok(self.finish_host(
                host_id,
                CommandStatus::Error,
                None,
                Some(CommandError::new(
                    ErrorCode::PersistFailed,
                    "state store rejected the transition",
                )),
            ));
        }
        self.audit(
            LogLevel::Info,
            "command",
            Some(host_id.clone()),
            Some(op.id.to_string()),
            format!("{} dispatched to {}", op.id, host.hostname),
            actor,
        );

        match op.executor {
            OpExecutor::Agent => {
                if let Err(e) = self.transport.send_command(host_id, op.id).await {
                    return Ok(self.finish_host(
                        host_id,
                        CommandStatus::Error,
                        None,
                        Some(CommandError::new(ErrorCode::SendFailed, e.to_string())),
                    ));
                }
                let now = self.clock.now();
                let mut scheduler = self.scheduler.lock();
                scheduler.set(warn_key(&command.id), op.warning_timeout, now);
                scheduler.set(hard_key(&command.id), op.timeout, now);
            }
            OpExecutor::Dashboard => {
                return Ok(self.run_dashboard_op(op.id, &host, args).await);
            }
        }

        Ok(self.row(&command.id).unwrap_or(command))
    }

    /// Agent reported the command finished with an exit code.
    pub fn handle_command_complete(
        &self,
        host_id: &HostId,
        op_id: &str,
        exit_code: i32,
        fresh_lock_system: Option<(AgentReported, AgentReported)>,
    ) {
        let now_ms = self.clock.epoch_ms();

        let resolution = {
            let mut active = self.active.lock();
            let Some(entry) = active.get_mut(host_id) else {
                drop(active);
                debug!(%host_id, op_id, "completion for no active command, ignoring");
                return;
            };
            if entry.command.op_id != op_id {
                debug!(%host_id, op_id, active = %entry.command.op_id, "completion op mismatch, ignoring");
                return;
            }

            if entry.kill_initiated_at_ms.is_some() {
                let entry = active.remove(host_id);
                match entry {
                    Some(entry) => Resolution::Finish {
                        entry: Box::new(entry),
                        status: CommandStatus::Killed,
                        exit_code: Some(exit_code),
                        error: None,
                    },
                    None => Resolution::Ignore,
                }
            } else if exit_code != 0 {
                match active.remove(host_id) {
                    Some(entry) => Resolution::Finish {
                        entry: Box::new(entry),
                        status: CommandStatus::Error,
                        exit_code: Some(exit_code),
                        error: Some(CommandError::new(
                            ErrorCode::ExitNonzero,
                            format!("{op_id} exited with code {exit_code}"),
                        )),
                    },
                    None => Resolution::Ignore,
                }
            } else {
                entry.completed_at_ms = Some(now_ms);
                entry.deferred_exit_code = Some(exit_code);
                if ops::replaces_agent(op_id) {
                    let reconnect = self
                        .registry
                        .get(op_id)
                        .and_then(|op| op.reconnect_timeout)
                        .unwrap_or(DEFAULT_RECONNECT);
                    let deadline_ms = now_ms + reconnect.as_millis() as u64;
                    entry.reconnect_deadline_ms = Some(deadline_ms);
                    Resolution::AwaitReconnect { id: entry.id().clone(), reconnect, deadline_ms }
                } else {
                    // Exit 0 alone proves nothing; judge on the next heartbeat.
                    entry.post_check_deferred = true;
                    Resolution::Deferred
                }
            }
        };

        // Fold the completion-time lock/system report into the host row so
        // the post-check sees it.
        if !matches!(resolution, Resolution::Ignore) {
            if let Some((lock, system)) = fresh_lock_system {
                self.record(Event::HostSeen {
                    id: host_id.clone(),
                    at_ms: now_ms,
                    generation: None,
                    metrics: None,
                    lock_status: Some(lock),
                    system_status: Some(system),
                    tests_status: None,
                    tests_generation: None,
                    freshness: None,
                });
            }
        }

        match resolution {
            Resolution::Ignore => {}
            Resolution::Finish { entry, status, exit_code, error } => {
                self.finish(*entry, status, exit_code, error);
            }
            Resolution::AwaitReconnect { id, reconnect, deadline_ms } => {
                self.record(Event::CommandAwaitingReconnect { id: id.clone(), deadline_ms });
                let now = self.clock.now();
                let mut scheduler = self.scheduler.lock();
                scheduler.cancel(&warn_key(&id));
                scheduler.cancel(&hard_key(&id));
                scheduler.set(reconnect_key(&id), reconnect, now);
            }
            Resolution::Deferred => {
                // Post-check may already be decidable from the fresh status
                // carried on the completion.
                self.try_post_check(host_id);
            }
        }
    }

    /// A heartbeat for this host was just applied to the store. Runs any
    /// deferred post-check; the heartbeat is by construction no older than
    /// the completion it judges.
    pub fn handle_heartbeat(&self, host_id: &HostId) {
        let deferred = self
            .active
            .lock()
            .get(host_id)
            .map(|e| e.post_check_deferred)
            .unwrap_or(false);
        if deferred {
            self.try_post_check(host_id);
        }
    }

    /// The agent re-registered. Verifies binary freshness for a pending
    /// switch, then falls through to the post-check.
    pub fn handle_agent_reconnect(&self, host_id: &HostId) {
        let post = self.host_row(host_id).and_then(|h| h.freshness);

        enum ReconnectStep {
            None,
            Verify { pre: Option<fleet_core::Freshness>, id: CommandId, op_id: String },
            PostCheck,
        }

        let step = {
            let active = self.active.lock();
            match active.get(host_id) {
                Some(e) if e.reconnect_deadline_ms.is_some() => ReconnectStep::Verify {
                    pre: e.pre_freshness.clone(),
                    id: e.id().clone(),
                    op_id: e.command.op_id.clone(),
                },
                Some(e) if e.post_check_deferred => ReconnectStep::PostCheck,
                _ => ReconnectStep::None,
            }
        };

        match step {
            ReconnectStep::None => {}
            ReconnectStep::PostCheck => self.try_post_check(host_id),
            ReconnectStep::Verify { pre, id, op_id } => {
                self.scheduler.lock().cancel(&reconnect_key(&id));

                let verdict = freshness::verify(pre.as_ref(), post.as_ref());
                let failure = match verdict {
                    freshness::Verdict::StaleBinary => Some((
                        CommandStatus::StaleBinary,
                        CommandError::new(
                            ErrorCode::StaleBinary,
                            "agent reconnected with the old binary",
                        ),
                    )),
                    freshness::Verdict::Suspicious => Some((
                        CommandStatus::Suspicious,
                        CommandError::new(
                            ErrorCode::Suspicious,
                            "source commit changed but the binary is identical (build cache?)",
                        ),
                    )),
                    freshness::Verdict::Unknown => {
                        warn!(%host_id, "freshness signals missing after reconnect, assuming success");
                        None
                    }
                    freshness::Verdict::Fresh => None,
                };

                if let Some((status, command_error)) = failure {
                    if let Some(entry) = self.take_if(host_id, |e| e.id() == &id) {
                        self.finish(entry, status, None, Some(command_error));
                    }
                    return;
                }

                // Binary is fresh (or unverifiable): the goal check still has
                // to pass. Re-arm the hard watcher in case no heartbeat comes.
                {
                    let mut active = self.active.lock();
                    if let Some(entry) = active.get_mut(host_id) {
                        if entry.id() == &id {
                            entry.reconnect_deadline_ms = None;
                            entry.post_check_deferred = true;
                        }
                    }
                }
                if let Some(op) = self.registry.get(&op_id) {
                    let now = self.clock.now();
                    self.scheduler.lock().set(hard_key(&id), op.timeout, now);
                }
                self.try_post_check(host_id);
            }
        }
    }

    /// Agent refused the command (it is running something else).
    pub fn handle_command_rejected(&self, host_id: &HostId, reason: &str) {
        let Some(entry) = self.take_if(host_id, |_| true) else { return };
        self.finish(
            entry,
            CommandStatus::Error,
            None,
            Some(CommandError::new(
                ErrorCode::Rejected,
                format!("agent rejected command: {reason}"),
            )),
        );
    }

    /// Agent acknowledged the kill outside of command_complete.
    pub fn handle_kill_confirmed(&self, host_id: &HostId, exit_code: Option<i32>) {
        let Some(entry) = self.take_if(host_id, |e| e.kill_initiated_at_ms.is_some()) else {
            return;
        };
        self.finish(entry, CommandStatus::Killed, exit_code, None);
    }

    /// A watcher fired.
    pub fn handle_timer(&self, key: &str) {
        let Some((kind, command_id)) = parse_key(key) else { return };
        let Some(host_id) = self.host_of(&command_id) else { return };

        match kind {
            TimerKind::Warning => {
                let matched = {
                    let mut active = self.active.lock();
                    match active.get_mut(&host_id) {
                        Some(entry) if entry.id() == &command_id => {
                            entry.warning_at_ms = Some(self.clock.epoch_ms());
                            true
                        }
                        _ => false,
                    }
                };
                if matched {
                    self.record(Event::CommandWarning {
                        id: command_id,
                        at_ms: self.clock.epoch_ms(),
                    });
                }
            }
            TimerKind::Hard => {
                let matched = {
                    let active = self.active.lock();
                    matches!(active.get(&host_id), Some(entry) if entry.id() == &command_id)
                };
                if !matched {
                    return;
                }
                // Stop the watchers; the user decides: extend, cancel, kill.
                {
                    let mut scheduler = self.scheduler.lock();
                    scheduler.cancel(&warn_key(&command_id));
                    scheduler.cancel(&hard_key(&command_id));
                }
                self.record(Event::CommandTimeoutPending {
                    id: command_id,
                    at_ms: self.clock.epoch_ms(),
                });
                self.audit(
                    LogLevel::Warn,
                    "command",
                    Some(host_id.clone()),
                    None,
                    "command hit its hard timeout, awaiting resolution".to_string(),
                    "system",
                );
            }
            TimerKind::Reconnect => {
                let Some(entry) = self.take_if(&host_id, |e| e.id() == &command_id) else {
                    return;
                };
                self.finish(
                    entry,
                    CommandStatus::Timeout,
                    None,
                    Some(CommandError::new(ErrorCode::ReconnectTimeout, "agent did not reconnect")),
                );
            }
        }
    }

    /// Add minutes to a timed-out command and resume execution.
    pub fn extend_timeout(&self, host_id: &HostId, minutes: u64) -> Result<(), ValidationError> {
        let id = {
            let mut active = self.active.lock();
            let entry = active
                .get_mut(host_id)
                .ok_or_else(|| ValidationError::new(ErrorCode::NoPending, "no active command"))?;
            entry.timeout_extended_mins += minutes;
            entry.id().clone()
        };

        self.scheduler.lock().set(
            hard_key(&id),
            Duration::from_secs(minutes * 60),
            self.clock.now(),
        );
        self.record(Event::CommandExtended { id, minutes, at_ms: self.clock.epoch_ms() });
        Ok(())
    }

    /// Resolve a timed-out (or cancelled) command as skipped.
    pub fn cancel_command(&self, host_id: &HostId) -> Result<(), ValidationError> {
        let entry = self
            .take_if(host_id, |_| true)
            .ok_or_else(|| ValidationError::new(ErrorCode::NoPending, "no active command"))?;
        self.finish(entry, CommandStatus::Skipped, None, None);
        Ok(())
    }

    /// Forward a kill to the agent and mark the command as dying.
    pub async fn kill_command(
        &self,
        host_id: &HostId,
        signal: &str,
        pid: Option<u32>,
    ) -> Result<CommandId, ValidationError> {
        let id = {
            let mut active = self.active.lock();
            let entry = active
                .get_mut(host_id)
                .ok_or_else(|| ValidationError::new(ErrorCode::NoPending, "no command to kill"))?;
            entry.kill_initiated_at_ms = Some(self.clock.epoch_ms());
            entry.kill_signal = Some(signal.to_string());
            entry.id().clone()
        };

        self.record(Event::CommandKilling {
            id: id.clone(),
            signal: signal.to_string(),
            at_ms: self.clock.epoch_ms(),
        });

        if let Err(e) = self.transport.send_kill(host_id, signal, pid).await {
            if let Some(entry) = self.take_if(host_id, |e| e.id() == &id) {
                self.finish(
                    entry,
                    CommandStatus::Error,
                    None,
                    Some(CommandError::new(ErrorCode::SendFailed, e.to_string())),
                );
            }
        }
        Ok(id)
    }

    pub fn get_active(&self, host_id: &HostId) -> Option<Command> {
        let id = {
            let active = self.active.lock();
            active.get(host_id).map(|e| e.id().clone())
        }?;
        self.row(&id)
    }

    pub fn has_active(&self, host_id: &HostId) -> bool {
        self.active.lock().contains_key(host_id)
    }

    pub fn active_status(&self, host_id: &HostId) -> Option<CommandStatus> {
        self.get_active(host_id).map(|c| c.status)
    }

    /// Stale-cleanup reconciliation: clear an orphaned pending marker.
    /// No-op while a command is genuinely active.
    pub fn clear_stale_pending(&self, host_id: &HostId) {
        if self.has_active(host_id) {
            return;
        }
        let has_pending =
            self.host_row(host_id).map(|h| h.pending_command.is_some()).unwrap_or(false);
        if has_pending {
            self.record(Event::PendingCleared { id: host_id.clone() });
            self.audit(
                LogLevel::Warn,
                "cleanup",
                Some(host_id.clone()),
                None,
                "cleared orphaned pending command".to_string(),
                "system",
            );
        }
    }

    /// Rebuild the active map from non-terminal rows after a restart.
    ///
    /// Rows that already ran past their hard-timeout bound resurface as
    /// TIMEOUT_PENDING for user resolution instead of silently continuing.
    pub fn recover(&self) {
        let rows: Vec<Command> = {
            let state = self.state.lock();
            state.active_commands().into_iter().cloned().collect()
        };
        let now_ms = self.clock.epoch_ms();
        let now = self.clock.now();

        for row in rows {
            let Some(op) = self.registry.get(&row.op_id) else {
                // Op vanished across an upgrade; fail the row.
                self.record(Event::CommandFinished {
                    id: row.id.clone(),
                    host_id: row.host_id.clone(),
                    status: CommandStatus::Error,
                    exit_code: None,
                    error: Some(CommandError::new(ErrorCode::UnknownOp, "op no longer exists")),
                    at_ms: now_ms,
                });
                continue;
            };

            let Some(host) = self.host_row(&row.host_id) else { continue };
            let pre_freshness =
                ops::replaces_agent(&row.op_id).then(|| host.freshness.clone()).flatten();
            let mut entry = ActiveCommand::new(row.clone(), host, pre_freshness);

            let anchor_ms = row.started_at_ms.unwrap_or(row.created_at_ms);
            let deadline_ms = anchor_ms + op.timeout.as_millis() as u64;

            match row.status {
                CommandStatus::AwaitingReconnect => {
                    let reconnect = op.reconnect_timeout.unwrap_or(DEFAULT_RECONNECT);
                    entry.reconnect_deadline_ms = Some(now_ms + reconnect.as_millis() as u64);
                    entry.completed_at_ms = Some(anchor_ms);
                    self.scheduler.lock().set(reconnect_key(&row.id), reconnect, now);
                    self.active.lock().insert(row.host_id.clone(), entry);
                }
                CommandStatus::TimeoutPending => {
                    self.active.lock().insert(row.host_id.clone(), entry);
                }
                _ if now_ms >= deadline_ms => {
                    self.active.lock().insert(row.host_id.clone(), entry);
                    self.record(Event::CommandTimeoutPending { id: row.id.clone(), at_ms: now_ms });
                    self.audit(
                        LogLevel::Warn,
                        "recovery",
                        Some(row.host_id.clone()),
                        Some(row.op_id.clone()),
                        "command outlived its timeout across a restart".to_string(),
                        "system",
                    );
                }
                _ => {
                    let remaining_ms = deadline_ms - now_ms;
                    {
                        let mut scheduler = self.scheduler.lock();
                        scheduler.set(hard_key(&row.id), Duration::from_millis(remaining_ms), now);
                        let warn_deadline = anchor_ms + op.warning_timeout.as_millis() as u64;
                        if warn_deadline > now_ms {
                            scheduler.set(
                                warn_key(&row.id),
                                Duration::from_millis(warn_deadline - now_ms),
                                now,
                            );
                        }
                    }
                    self.active.lock().insert(row.host_id.clone(), entry);
                }
            }
        }
    }

    // ── Internals ──────────────────────────────────────────────────────

    /// Deliver a control op (restart/stop) around the running command. The
    /// row exists for the audit trail and is terminal as soon as the send
    /// resolves; it never touches `pending_command`.
    async fn control_send(
        &self,
        op_id: &str,
        host: &Host,
        actor: &str,
    ) -> Result<Command, ValidationError> {
        if !host.is_online() {
            return Err(ValidationError::new(ErrorCode::Offline, "host is offline"));
        }

        let now_ms = self.clock.epoch_ms();
        let id = CommandId::new(new_id());
        let command = Command {
            output_file: self.output_path(&id),
            id,
            host_id: host.id.clone(),
            op_id: op_id.to_string(),
            pipeline_id: None,
            status: CommandStatus::Validating,
            created_at_ms: now_ms,
            started_at_ms: Some(now_ms),
            finished_at_ms: None,
            exit_code: None,
            error: None,
        };
        self.record(Event::CommandCreated { command: command.clone() });

        let (status, command_error) = match self.transport.send_command(&host.id, op_id).await {
            Ok(()) => (CommandStatus::Success, None),
            Err(e) => {
                (CommandStatus::Error, Some(CommandError::new(ErrorCode::SendFailed, e.to_string())))
            }
        };
        self.record(Event::CommandFinished {
            id: command.id.clone(),
            host_id: host.id.clone(),
            status,
            exit_code: None,
            error: command_error,
            at_ms: self.clock.epoch_ms(),
        });
        self.audit(
            LogLevel::Info,
            "command",
            Some(host.id.clone()),
            Some(op_id.to_string()),
            format!("{op_id} delivered mid-command to {}", host.hostname),
            actor,
        );
        Ok(self.row(&command.id).unwrap_or(command))
    }

    /// Execute a dashboard op inline. These complete synchronously.
    async fn run_dashboard_op(
        &self,
        op_id: &str,
        host: &Host,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Command {
        let outcome: Result<(), CommandError> = match op_id {
            ops::SET_COLOR => match args.get("color").and_then(|v| v.as_str()) {
                Some(color) => {
                    self.record(Event::HostColorSet { id: host.id.clone(), color: color.to_string() });
                    Ok(())
                }
                None => {
                    Err(CommandError::new(ErrorCode::GoalNotAchieved, "missing color argument"))
                }
            },
            ops::REMOVE => {
                self.record(Event::HostRemoved { id: host.id.clone() });
                Ok(())
            }
            ops::MERGE_PR => self
                .dashboard
                .merge_pr(host)
                .await
                .map_err(|e| CommandError::new(ErrorCode::RemoteUnavailable, e)),
            other => Err(CommandError::new(
                ErrorCode::UnknownOp,
                format!("dashboard op {other} has no executor"),
            )),
        };

        let (status, command_error) = match outcome {
            Ok(()) => (CommandStatus::Success, None),
            Err(e) => (CommandStatus::Error, Some(e)),
        };
        self.finish_host(&host.id, status, None, command_error)
    }

    /// Run the deferred post-check if the signals allow a verdict. The entry
    /// stays in the map until the verdict is conclusive.
    fn try_post_check(&self, host_id: &HostId) {
        let Some(host) = self.host_row(host_id) else { return };

        let check = {
            let active = self.active.lock();
            match active.get(host_id) {
                Some(e) if e.post_check_deferred => Some((
                    e.id().clone(),
                    e.command.op_id.clone(),
                    e.pre_snapshot.clone(),
                    e.deferred_exit_code,
                )),
                _ => None,
            }
        };
        let Some((id, op_id, pre, exit_code)) = check else { return };
        let Some(op) = self.registry.get(&op_id) else { return };

        let compartments = self.compartments_for(&host);
        let ctx = postcheck::PostCheckCtx { pre: &pre, host: &host, compartments: &compartments };

        let verdict = match postcheck::run(op.post_check, &ctx) {
            postcheck::Outcome::Inconclusive => return,
            postcheck::Outcome::Success => (CommandStatus::Success, None),
            postcheck::Outcome::Partial { code, message } => {
                (CommandStatus::Partial, Some(CommandError::new(code, message)))
            }
            postcheck::Outcome::Failed { code, message } => {
                (CommandStatus::Error, Some(CommandError::new(code, message)))
            }
        };

        if let Some(entry) = self.take_if(host_id, |e| e.id() == &id) {
            self.finish(entry, verdict.0, exit_code, verdict.1);
        }
    }

    /// Terminal transition: clears the entry's timers and `pending_command`,
    /// records the row, and writes the audit entry. The entry must already
    /// be out of the active map.
    fn finish(
        &self,
        entry: ActiveCommand,
        status: CommandStatus,
        exit_code: Option<i32>,
        command_error: Option<CommandError>,
    ) -> Command {
        let id = entry.id().clone();
        let host_id = entry.command.host_id.clone();
        {
            let mut scheduler = self.scheduler.lock();
            scheduler.cancel(&warn_key(&id));
            scheduler.cancel(&hard_key(&id));
            scheduler.cancel(&reconnect_key(&id));
        }

        self.record(Event::CommandFinished {
            id: id.clone(),
            host_id: host_id.clone(),
            status,
            exit_code,
            error: command_error.clone(),
            at_ms: self.clock.epoch_ms(),
        });

        let (level, text) = match status {
            CommandStatus::Success => {
                (LogLevel::Success, format!("{} succeeded", entry.command.op_id))
            }
            CommandStatus::Partial => (
                LogLevel::Warn,
                format!(
                    "{} partially succeeded: {}",
                    entry.command.op_id,
                    command_error.as_ref().map(|e| e.message.as_str()).unwrap_or("")
                ),
            ),
            CommandStatus::Skipped => (LogLevel::Info, format!("{} skipped", entry.command.op_id)),
            _ => (
                LogLevel::Error,
                format!(
                    "{} ended {}: {}",
                    entry.command.op_id,
                    status,
                    command_error.as_ref().map(|e| e.message.as_str()).unwrap_or("no detail")
                ),
            ),
        };
        self.audit(
            level,
            "command",
            Some(host_id),
            Some(entry.command.op_id.clone()),
            text,
            "system",
        );

        self.row(&id).unwrap_or(entry.command)
    }

    /// Finish by host id; removes whatever entry is active.
    fn finish_host(
        &self,
        host_id: &HostId,
        status: CommandStatus,
        exit_code: Option<i32>,
        command_error: Option<CommandError>,
    ) -> Command {
        match self.take_if(host_id, |_| true) {
            Some(entry) => self.finish(entry, status, exit_code, command_error),
            None => {
                warn!(%host_id, "finish requested for host without active command");
                Command {
                    id: CommandId::new(new_id()),
                    host_id: host_id.clone(),
                    op_id: String::new(),
                    pipeline_id: None,
                    status,
                    created_at_ms: self.clock.epoch_ms(),
                    started_at_ms: None,
                    finished_at_ms: None,
                    exit_code,
                    error: command_error,
                    output_file: None,
                }
            }
        }
    }

    /// Apply an event immediately for read-your-writes, then append it to
    /// the WAL with a small retry bound. Returns false on persistent
    /// failure; the caller decides whether that downgrades the command.
    fn record(&self, event: Event) -> bool {
        self.state.lock().apply_event(&event);
        for attempt in 1..=PERSIST_RETRIES {
            match self.bus.send(event.clone()) {
                Ok(_) => return true,
                Err(e) if attempt == PERSIST_RETRIES => {
                    error!(error = %e, event = event.name(), "event append failed, giving up");
                }
                Err(e) => {
                    warn!(error = %e, event = event.name(), attempt, "event append failed, retrying");
                }
            }
        }
        false
    }

    fn audit(
        &self,
        level: LogLevel,
        category: &str,
        host_id: Option<HostId>,
        action: Option<String>,
        message: String,
        actor: &str,
    ) {
        self.record(Event::Logged {
            entry: LogEntry {
                id: new_id(),
                at_ms: self.clock.epoch_ms(),
                category: category.to_string(),
                level,
                actor: actor.to_string(),
                host_id,
                action,
                message,
                details: None,
            },
        });
    }

    fn host_row(&self, host_id: &HostId) -> Option<Host> {
        self.state.lock().host(host_id).cloned()
    }

    fn row(&self, id: &CommandId) -> Option<Command> {
        self.state.lock().command(id).cloned()
    }

    fn compartments_for(&self, host: &Host) -> Compartments {
        let remote = self.state.lock().remote.clone();
        self.evaluator.evaluate(host, &remote, self.clock.epoch_ms())
    }

    /// Remove the active entry for a host when the predicate holds.
    fn take_if(
        &self,
        host_id: &HostId,
        predicate: impl FnOnce(&ActiveCommand) -> bool,
    ) -> Option<ActiveCommand> {
        let mut active = self.active.lock();
        if active.get(host_id).map(predicate).unwrap_or(false) {
            active.remove(host_id)
        } else {
            None
        }
    }

    fn host_of(&self, command_id: &CommandId) -> Option<HostId> {
        let active = self.active.lock();
        active.iter().find(|(_, e)| e.id() == command_id).map(|(host, _)| host.clone())
    }
}

#[cfg(test)]
#[path = "lifecycle_tests/mod.rs"]
mod tests;
