// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command row event handlers.
//!
//! These are the only handlers that touch `hosts.pending_command`; all of
//! the events they consume are emitted by the Lifecycle Manager.

use super::MaterializedState;
use fleet_core::{CommandError, CommandStatus, Event};

pub(super) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::CommandCreated { command } => {
            if !state.commands.contains_key(&command.id) {
                state.commands.insert(command.id.clone(), command.clone());
            }
        }
        Event::CommandBlocked { id, code, message, at_ms } => {
            let Some(cmd) = state.commands.get_mut(id) else { return };
            if cmd.is_terminal() {
                return;
            }
            cmd.status = CommandStatus::Blocked;
            cmd.error = Some(CommandError::new(*code, message.clone()));
            cmd.finished_at_ms = Some(*at_ms);
        }
        Event::CommandStarted { id, host_id, op_id, at_ms } => {
            if let Some(cmd) = state.commands.get_mut(id) {
                if cmd.is_terminal() {
                    return;
                }
                cmd.status = CommandStatus::Executing;
                cmd.started_at_ms = Some(*at_ms);
            }
            if let Some(host) = state.hosts.get_mut(host_id) {
                host.pending_command = Some(op_id.clone());
            }
        }
        Event::CommandWarning { id, .. } => {
            set_running_status(state, id, CommandStatus::RunningWarning);
        }
        Event::CommandTimeoutPending { id, .. } => {
            set_running_status(state, id, CommandStatus::TimeoutPending);
        }
        Event::CommandExtended { id, .. } => {
            // Extension re-enters normal execution.
            set_running_status(state, id, CommandStatus::Executing);
        }
        Event::CommandAwaitingReconnect { id, .. } => {
            set_running_status(state, id, CommandStatus::AwaitingReconnect);
        }
        Event::CommandKilling { id, .. } => {
            set_running_status(state, id, CommandStatus::Killing);
        }
        Event::CommandFinished { id, host_id, status, exit_code, error, at_ms } => {
            let mut finished_op = None;
            if let Some(cmd) = state.commands.get_mut(id) {
                // Terminal status is write-once; duplicate completions no-op.
                if cmd.is_terminal() {
                    return;
                }
                cmd.status = *status;
                cmd.exit_code = *exit_code;
                cmd.error = error.clone();
                cmd.finished_at_ms = Some(*at_ms);
                finished_op = Some(cmd.op_id.clone());
            }
            if let Some(host) = state.hosts.get_mut(host_id) {
                // Control ops finish while another command owns the pending
                // marker; only the owning command may clear it.
                if finished_op.is_none() || host.pending_command == finished_op {
                    host.pending_command = None;
                }
            }
        }
        _ => {}
    }
}

fn set_running_status(
    state: &mut MaterializedState,
    id: &fleet_core::CommandId,
    status: CommandStatus,
) {
    let Some(cmd) = state.commands.get_mut(id) else { return };
    if cmd.is_terminal() {
        return;
    }
    cmd.status = status;
}
