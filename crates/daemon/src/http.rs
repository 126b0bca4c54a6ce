// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: healthz, login, dispatch, and the two websocket upgrades.

use crate::app::App;
use crate::session::{self, CSRF_HEADER, SESSION_COOKIE};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fleet_wire::DispatchRequest;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

pub fn router(app: Arc<App>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route("/dispatch", post(dispatch))
        .route("/ws", get(browser_ws))
        .route("/agent", get(agent_ws))
        .with_state(app)
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Deserialize)]
struct LoginRequest {
    password: String,
}

async fn login(State(app): State<Arc<App>>, Json(req): Json<LoginRequest>) -> Response {
    let Some(expected) = app.config.session_secret.as_deref() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "login not configured").into_response();
    };
    if req.password != expected {
        warn!("failed login attempt");
        return (StatusCode::UNAUTHORIZED, "invalid password").into_response();
    }

    let (token, csrf) = app.sessions.create();
    let cookie = format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/");
    (
        [(header::SET_COOKIE, cookie)],
        Json(serde_json::json!({ "csrf_token": csrf })),
    )
        .into_response()
}

/// Session token from the request cookies, validated against the store.
fn authenticated_session(app: &App, headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    let token = session::session_from_cookies(cookies)?;
    app.sessions.validate(token).then(|| token.to_string())
}

async fn dispatch(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    Json(req): Json<DispatchRequest>,
) -> Response {
    let Some(token) = authenticated_session(&app, &headers) else {
        return (StatusCode::UNAUTHORIZED, "not logged in").into_response();
    };

    let csrf_ok = headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|csrf| app.sessions.csrf_matches(&token, csrf))
        .unwrap_or(false);
    if !csrf_ok {
        return (StatusCode::FORBIDDEN, "missing or invalid CSRF token").into_response();
    }

    if !app.sessions.allow_dispatch(&token) {
        return (StatusCode::TOO_MANY_REQUESTS, "dispatch rate limit exceeded").into_response();
    }

    match crate::dispatch::handle(&app, req, "dashboard").await {
        Ok(response) => Json(response).into_response(),
        Err(verdict) => (StatusCode::CONFLICT, Json(verdict)).into_response(),
    }
}

async fn browser_ws(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if authenticated_session(&app, &headers).is_none() {
        return (StatusCode::UNAUTHORIZED, "not logged in").into_response();
    }
    ws.on_upgrade(move |socket| crate::hub::browser::run(app, socket))
}

async fn agent_ws(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(expected) = app.config.agent_token.as_deref() else {
        return (StatusCode::UNAUTHORIZED, "agent auth not configured").into_response();
    };
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if presented != Some(expected) {
        warn!("agent connection with bad or missing token");
        return (StatusCode::UNAUTHORIZED, "invalid agent token").into_response();
    }
    ws.on_upgrade(move |socket| crate::hub::agent::run(app, socket))
}
