// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scent registrations: dormant triggers owned by the blackboard core.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::condition::ScentCondition;

/// Whether the condition's truth value or its transition drives firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    #[default]
    Level,
    EdgeRising,
    EdgeFalling,
}

impl TriggerMode {
    pub fn is_edge(&self) -> bool {
        matches!(self, Self::EdgeRising | Self::EdgeFalling)
    }
}

pub const DEFAULT_MAX_EXECUTION_MS: i64 = 30_000;

/// A registered trigger condition plus its runtime state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scent {
    pub scent_id: String,
    /// Delivery endpoint for HTTP dispatch. SSE subscribers use the
    /// in-process handler slot instead, so this may be absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_endpoint: Option<String>,
    pub condition: ScentCondition,
    pub cooldown_ms: i64,
    #[serde(default)]
    pub activation_payload: serde_json::Map<String, Value>,
    pub trigger_mode: TriggerMode,
    /// Carried for protocol compatibility; the evaluator does not apply
    /// hysteresis (the behavior is reserved).
    pub hysteresis: f64,
    pub max_execution_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_trails: Option<Vec<String>>,

    // Runtime fields, maintained by the evaluation loop.
    pub last_triggered_at: Option<i64>,
    pub last_condition_met: bool,
}

impl Scent {
    pub fn in_cooldown(&self, now: i64) -> bool {
        match self.last_triggered_at {
            Some(at) => now - at < self.cooldown_ms,
            None => false,
        }
    }
}
