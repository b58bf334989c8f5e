// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pheromones: decaying, intensity-bearing signals grouped into trails.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::domain::decay::{DecayModel, TimeToEvaporation};

/// Intensity below this floor counts as evaporated unless a pheromone
/// overrides it.
pub const DEFAULT_TTL_FLOOR: f64 = 0.01;

/// Trail prefixes reserved for the node itself. Client emits into these
/// are rejected.
pub const RESERVED_TRAIL_PREFIXES: [&str; 3] = ["system.", "sbp.", "_"];

/// Returns true when `trail` falls under a reserved namespace.
pub fn is_reserved_trail(trail: &str) -> bool {
    RESERVED_TRAIL_PREFIXES
        .iter()
        .any(|p| trail.starts_with(p))
        || trail == "system"
        || trail == "sbp"
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PheromoneId(pub Uuid);

impl PheromoneId {
    /// Time-sortable id so iteration order loosely follows emission order.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PheromoneId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PheromoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decaying signal deposited into a trail.
///
/// Storage holds only `initial_intensity` and `last_reinforced_at`; the
/// current intensity is always computed on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pheromone {
    pub id: PheromoneId,
    pub trail: String,
    #[serde(rename = "type")]
    pub signal_type: String,
    pub emitted_at: i64,
    pub last_reinforced_at: i64,
    pub initial_intensity: f64,
    pub decay_model: DecayModel,
    #[serde(default)]
    pub payload: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_agent: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub ttl_floor: f64,
}

impl Pheromone {
    pub fn current_intensity(&self, now: i64) -> f64 {
        self.decay_model
            .intensity_at(self.initial_intensity, now - self.last_reinforced_at)
    }

    pub fn is_evaporated(&self, now: i64) -> bool {
        self.current_intensity(now) < self.ttl_floor
    }

    /// Milliseconds until this pheromone evaporates. Diagnostics only.
    pub fn time_to_evaporation(&self, now: i64) -> TimeToEvaporation {
        self.decay_model.time_to_floor(
            self.initial_intensity,
            self.ttl_floor,
            now - self.last_reinforced_at,
        )
    }

    /// Identity digest used for merge matching: 8 bytes of SHA-256 over
    /// the payload with keys sorted at every structural level.
    pub fn payload_hash(&self) -> String {
        hash_payload(&self.payload)
    }

    pub fn snapshot(&self, now: i64) -> PheromoneSnapshot {
        PheromoneSnapshot {
            id: self.id,
            trail: self.trail.clone(),
            signal_type: self.signal_type.clone(),
            current_intensity: self.current_intensity(now),
            payload: self.payload.clone(),
            age_ms: now - self.emitted_at,
            tags: self.tags.clone(),
        }
    }
}

/// Stable digest of a payload, independent of key insertion order.
pub fn hash_payload(payload: &serde_json::Map<String, Value>) -> String {
    let mut canonical = String::new();
    write_canonical(&Value::Object(payload.clone()), &mut canonical);
    let digest = Sha256::digest(canonical.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// A pheromone observed at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PheromoneSnapshot {
    pub id: PheromoneId,
    pub trail: String,
    #[serde(rename = "type")]
    pub signal_type: String,
    pub current_intensity: f64,
    pub payload: serde_json::Map<String, Value>,
    pub age_ms: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Tag filter with any/all/none clauses. An empty or missing clause is
/// satisfied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub none: Option<Vec<String>>,
}

impl TagFilter {
    pub fn matches(&self, tags: &[String]) -> bool {
        if let Some(any) = &self.any {
            if !any.is_empty() && !any.iter().any(|t| tags.contains(t)) {
                return false;
            }
        }
        if let Some(all) = &self.all {
            if !all.iter().all(|t| tags.contains(t)) {
                return false;
            }
        }
        if let Some(none) = &self.none {
            if none.iter().any(|t| tags.contains(t)) {
                return false;
            }
        }
        true
    }
}
