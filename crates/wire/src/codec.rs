// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSON codec for websocket text frames.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Maximum frame size accepted on either channel (1 MB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Connection closed")]
    ConnectionClosed,
}

/// Encode a message as a JSON text frame.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    let json = serde_json::to_string(msg)?;
    if json.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: json.len(), max: MAX_FRAME_SIZE });
    }
    Ok(json)
}

/// Decode a JSON text frame.
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<T, ProtocolError> {
    if frame.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge { size: frame.len(), max: MAX_FRAME_SIZE });
    }
    Ok(serde_json::from_str(frame)?)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
