// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Browser sessions, CSRF, dispatch rate limiting, TOTP.
//!
//! Sessions live in memory only: a daemon restart logs everyone out, which
//! is fine for a single-operator dashboard.

use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Session lifetime without activity.
const SESSION_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Dispatch rate limit: burst then steady refill.
const BUCKET_BURST: f64 = 5.0;
const BUCKET_REFILL_PER_SEC: f64 = 1.0;

pub const SESSION_COOKIE: &str = "fleet_session";
pub const CSRF_HEADER: &str = "x-csrf-token";

struct Session {
    csrf: String,
    last_seen: Instant,
    bucket_tokens: f64,
    bucket_refilled: Instant,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session; returns `(session_token, csrf_token)`.
    pub fn create(&self) -> (String, String) {
        let token = random_token();
        let csrf = random_token();
        let now = Instant::now();
        self.sessions.lock().insert(
            token.clone(),
            Session {
                csrf: csrf.clone(),
                last_seen: now,
                bucket_tokens: BUCKET_BURST,
                bucket_refilled: now,
            },
        );
        (token, csrf)
    }

    /// Validate a session token, refreshing its activity window.
    pub fn validate(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock();
        let now = Instant::now();
        sessions.retain(|_, s| now.duration_since(s.last_seen) < SESSION_TTL);
        match sessions.get_mut(token) {
            Some(session) => {
                session.last_seen = now;
                true
            }
            None => false,
        }
    }

    pub fn csrf_matches(&self, token: &str, csrf: &str) -> bool {
        self.sessions.lock().get(token).map(|s| s.csrf == csrf).unwrap_or(false)
    }

    /// Token-bucket rate limit for dispatch requests.
    pub fn allow_dispatch(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(token) else { return false };

        let now = Instant::now();
        let elapsed = now.duration_since(session.bucket_refilled).as_secs_f64();
        session.bucket_tokens =
            (session.bucket_tokens + elapsed * BUCKET_REFILL_PER_SEC).min(BUCKET_BURST);
        session.bucket_refilled = now;

        if session.bucket_tokens >= 1.0 {
            session.bucket_tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Verify a TOTP code against the configured base32 secret.
pub fn verify_totp(secret: &str, code: &str) -> bool {
    let Ok(secret_bytes) = totp_rs::Secret::Encoded(secret.to_string()).to_bytes() else {
        return false;
    };
    let Ok(totp) = totp_rs::TOTP::new(totp_rs::Algorithm::SHA1, 6, 1, 30, secret_bytes) else {
        return false;
    };
    totp.check_current(code).unwrap_or(false)
}

/// Pull the session token out of a Cookie header value.
pub fn session_from_cookies(cookie_header: &str) -> Option<&str> {
    cookie_header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then_some(value)
    })
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
