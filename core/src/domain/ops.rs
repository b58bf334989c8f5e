// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Operation parameter and result types for the six blackboard
//! operations plus the trigger notification payload. These are the
//! JSON-RPC `params`/`result` shapes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::condition::ScentCondition;
use crate::domain::decay::DecayModel;
use crate::domain::pheromone::{PheromoneId, PheromoneSnapshot, TagFilter};
use crate::domain::scent::{TriggerMode, DEFAULT_MAX_EXECUTION_MS};

// ============================================================================
// EMIT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    Reinforce,
    Replace,
    Max,
    Add,
    /// Always create a fresh pheromone, bypassing merge matching.
    New,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitParams {
    pub trail: String,
    #[serde(rename = "type")]
    pub signal_type: String,
    pub intensity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decay: Option<DecayModel>,
    #[serde(default)]
    pub payload: serde_json::Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitAction {
    Created,
    Reinforced,
    Replaced,
    Merged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitResult {
    pub pheromone_id: PheromoneId,
    pub action: EmitAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_intensity: Option<f64>,
    pub new_intensity: f64,
}

// ============================================================================
// SNIFF
// ============================================================================

fn default_limit() -> usize {
    100
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SniffParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trails: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    #[serde(default)]
    pub min_intensity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagFilter>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub include_evaporated: bool,
}

/// Aggregates over the filtered, pre-truncation match set of one
/// `trail/type` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub count: usize,
    pub sum_intensity: f64,
    pub max_intensity: f64,
    pub avg_intensity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SniffResult {
    pub timestamp: i64,
    pub pheromones: Vec<PheromoneSnapshot>,
    pub aggregates: HashMap<String, AggregateStats>,
}

// ============================================================================
// REGISTER / DEREGISTER SCENT
// ============================================================================

fn default_max_execution_ms() -> i64 {
    DEFAULT_MAX_EXECUTION_MS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterScentParams {
    pub scent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_endpoint: Option<String>,
    pub condition: ScentCondition,
    #[serde(default)]
    pub cooldown_ms: i64,
    #[serde(default)]
    pub activation_payload: serde_json::Map<String, Value>,
    #[serde(default)]
    pub trigger_mode: TriggerMode,
    #[serde(default)]
    pub hysteresis: f64,
    #[serde(default = "default_max_execution_ms")]
    pub max_execution_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_trails: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterStatus {
    Registered,
    Updated,
}

/// Immediate evaluation of the condition at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionState {
    pub met: bool,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterScentResult {
    pub scent_id: String,
    pub status: RegisterStatus,
    pub current_condition_state: ConditionState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeregisterScentParams {
    pub scent_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeregisterStatus {
    Deregistered,
    NotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeregisterScentResult {
    pub scent_id: String,
    pub status: DeregisterStatus,
}

// ============================================================================
// EVAPORATE
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaporateParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub older_than_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub below_intensity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<TagFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaporateResult {
    pub evaporated_count: usize,
    pub trails_affected: Vec<String>,
}

// ============================================================================
// INSPECT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectSection {
    Trails,
    Scents,
    Stats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InspectParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<InspectSection>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailInfo {
    pub trail: String,
    /// Count of non-evaporated pheromones in the trail.
    pub count: usize,
    pub total_intensity: f64,
    pub avg_intensity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScentInfo {
    pub scent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_endpoint: Option<String>,
    pub last_condition_met: bool,
    pub in_cooldown: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_triggered_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackboardStats {
    pub total_pheromones: usize,
    pub active_pheromones: usize,
    pub scent_count: usize,
    pub uptime_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectResult {
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trails: Option<Vec<TrailInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scents: Option<Vec<ScentInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<BlackboardStats>,
}

// ============================================================================
// TRIGGER
// ============================================================================

/// Per-scent slice of the evaluation that caused a trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSnapshot {
    pub value: f64,
    pub pheromone_ids: Vec<PheromoneId>,
}

/// Payload delivered to a scent's subscriber when it fires, either via
/// the in-process handler slot or as the `sbp/trigger` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub scent_id: String,
    pub triggered_at: i64,
    pub condition_snapshot: HashMap<String, ConditionSnapshot>,
    pub context_pheromones: Vec<PheromoneSnapshot>,
    #[serde(default)]
    pub activation_payload: serde_json::Map<String, Value>,
}
