// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Merge backend wiring for the `merge-pr` dashboard op.
//!
//! The forge interaction itself is an external collaborator; the daemon
//! only knows how to POST a merge request to a configured endpoint.

use async_trait::async_trait;
use fleet_core::Host;
use fleet_engine::lifecycle::DashboardExec;
use std::time::Duration;
use tracing::info;

pub struct HttpMergeBackend {
    url: String,
    client: reqwest::Client,
}

impl HttpMergeBackend {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { url, client }
    }
}

#[async_trait]
impl DashboardExec for HttpMergeBackend {
    async fn merge_pr(&self, host: &Host) -> Result<(), String> {
        let body = serde_json::json!({
            "hostname": host.hostname,
            "repo_url": host.repo_url,
        });
        self.client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;
        info!(hostname = %host.hostname, "merge request accepted");
        Ok(())
    }
}
