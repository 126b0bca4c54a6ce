// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch routing: the single mutation entry point for browsers.
//!
//! `op` may name a pipeline (→ Pipeline Executor), a timeout-resolution
//! pseudo-op (→ Lifecycle Manager directly), or a registry op (→ Lifecycle
//! Manager per host).

use crate::app::App;
use crate::session;
use fleet_core::op::ops;
use fleet_core::{CommandId, ErrorCode, ValidationError};
use fleet_wire::{DispatchRequest, DispatchResponse};

pub async fn handle(
    app: &App,
    req: DispatchRequest,
    actor: &str,
) -> Result<DispatchResponse, ValidationError> {
    check_totp(app, &req)?;

    if app.pipelines.registry().is_pipeline(&req.op) {
        let pipeline = app
            .pipelines
            .dispatch(&req.op, &req.hosts, req.force, actor, &app.lifecycle)
            .await?;
        return Ok(DispatchResponse::Pipeline { pipeline_id: pipeline.id });
    }

    match req.op.as_str() {
        ops::EXTEND_TIMEOUT => {
            let minutes = req
                .args
                .get("minutes")
                .and_then(|v| v.as_u64())
                .unwrap_or(10);
            let mut ids = Vec::new();
            for host in &req.hosts {
                app.lifecycle.extend_timeout(host, minutes)?;
                ids.extend(app.lifecycle.get_active(host).map(|c| c.id));
            }
            Ok(DispatchResponse::Commands { command_ids: ids })
        }
        ops::CANCEL => {
            let mut ids = Vec::new();
            for host in &req.hosts {
                ids.extend(app.lifecycle.get_active(host).map(|c| c.id));
                app.lifecycle.cancel_command(host)?;
            }
            Ok(DispatchResponse::Commands { command_ids: ids })
        }
        ops::KILL => {
            let signal = req
                .args
                .get("signal")
                .and_then(|v| v.as_str())
                .unwrap_or("SIGTERM")
                .to_string();
            let pid = req.args.get("pid").and_then(|v| v.as_u64()).map(|p| p as u32);
            let mut ids = Vec::new();
            for host in &req.hosts {
                ids.push(app.lifecycle.kill_command(host, &signal, pid).await?);
            }
            Ok(DispatchResponse::Commands { command_ids: ids })
        }
        _ => {
            let mut ids: Vec<CommandId> = Vec::new();
            let mut first_error: Option<ValidationError> = None;
            for host in &req.hosts {
                match app
                    .lifecycle
                    .execute_op(&req.op, host, req.force, None, actor, &req.args)
                    .await
                {
                    Ok(command) => ids.push(command.id),
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }
            // All hosts rejected: surface the verdict synchronously.
            // Partial acceptance returns the dispatched ids; the blocked
            // hosts' rows carry their own verdicts.
            if ids.is_empty() {
                if let Some(e) = first_error {
                    return Err(e);
                }
                return Err(ValidationError::new(ErrorCode::UnknownHost, "no hosts given"));
            }
            Ok(DispatchResponse::Commands { command_ids: ids })
        }
    }
}

/// TOTP gate, enforced at the handler boundary.
fn check_totp(app: &App, req: &DispatchRequest) -> Result<(), ValidationError> {
    let needs_totp = match app.view.registry.get(&req.op) {
        Some(op) => op.requires_totp,
        None => match app.pipelines.registry().get(&req.op) {
            Some(ops_seq) => ops_seq
                .iter()
                .any(|op| app.view.registry.get(op).map(|o| o.requires_totp).unwrap_or(false)),
            None => false,
        },
    };
    if !needs_totp {
        return Ok(());
    }

    let Some(secret) = app.config.totp_secret.as_deref() else {
        return Err(ValidationError::new(
            ErrorCode::TotpRequired,
            "op requires TOTP but no TOTP secret is configured",
        ));
    };
    let Some(code) = req.totp.as_deref() else {
        return Err(ValidationError::new(ErrorCode::TotpRequired, "TOTP code required"));
    };
    if !session::verify_totp(secret, code) {
        return Err(ValidationError::new(ErrorCode::TotpRequired, "TOTP code invalid"));
    }
    Ok(())
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
