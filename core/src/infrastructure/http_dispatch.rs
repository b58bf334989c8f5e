// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Outbound trigger delivery to agent endpoints.
//!
//! Delivery is best-effort: a failed or timed-out POST is logged and the
//! scent's cooldown acts as the retry spacing.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::domain::ops::TriggerPayload;

/// Delivers a fired trigger to an external endpoint.
#[async_trait]
pub trait TriggerDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        endpoint: &str,
        payload: &TriggerPayload,
        timeout: Duration,
    ) -> anyhow::Result<()>;
}

/// POSTs the `sbp/trigger` JSON-RPC notification to the scent's
/// `agent_endpoint`, bounded by the scent's `max_execution_ms`.
pub struct HttpTriggerDispatcher {
    client: reqwest::Client,
}

impl HttpTriggerDispatcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTriggerDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TriggerDispatcher for HttpTriggerDispatcher {
    async fn dispatch(
        &self,
        endpoint: &str,
        payload: &TriggerPayload,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "sbp/trigger",
            "params": payload,
        });

        let response = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .json(&notification)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(scent_id = %payload.scent_id, endpoint, "trigger delivered");
        } else {
            warn!(scent_id = %payload.scent_id, endpoint, %status, "trigger rejected by endpoint");
        }
        Ok(())
    }
}
