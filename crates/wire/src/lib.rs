// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fleet-wire: Message types for the agent and browser channels.
//!
//! Both channels speak JSON text frames with a `{type, payload}` envelope;
//! browser frames additionally carry the state-sync `version`.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod agent;
mod codec;
mod dispatch;
mod sync;

pub use agent::{
    AgentToServer, CommandCompletePayload, CommandRejectedPayload, HeartbeatPayload,
    OperationProgressPayload, OutputPayload, OutputStream, RegisterPayload, ServerToAgent,
    StatusPayload, TestProgressPayload, UpdateStatusPayload,
};
pub use codec::{decode, encode, ProtocolError, MAX_FRAME_SIZE};
pub use dispatch::{DispatchRequest, DispatchResponse};
pub use sync::{BrowserToServer, Change, FullState, HostView, Progress, SyncBody, SyncMessage};
