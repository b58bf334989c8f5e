// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The scent condition language: threshold, composite, rate and pattern
//! nodes forming a tree. Evaluation lives in `application::evaluator`;
//! this module holds the wire types and structural validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::pheromone::TagFilter;

/// Aggregation applied to the intensities of matching pheromones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    #[default]
    Max,
    Avg,
    Count,
    Any,
}

/// Comparison operator between the aggregate and the condition value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CompareOp {
    #[default]
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    pub fn compare(&self, a: f64, b: f64) -> bool {
        match self {
            Self::Gte => a >= b,
            Self::Gt => a > b,
            Self::Lte => a <= b,
            Self::Lt => a < b,
            Self::Eq => a == b,
            Self::Ne => a != b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateMetric {
    EmissionsPerSecond,
    /// Sum of the intensities recorded with each emission in the window.
    /// The emission history tracks per-emission intensity to support this.
    IntensityDelta,
}

fn default_true() -> bool {
    true
}

/// A node in the scent condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScentCondition {
    Threshold {
        trail: String,
        signal_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tags: Option<TagFilter>,
        #[serde(default)]
        aggregation: Aggregation,
        #[serde(default)]
        operator: CompareOp,
        value: f64,
    },
    Composite {
        operator: CompositeOp,
        conditions: Vec<ScentCondition>,
    },
    Rate {
        trail: String,
        signal_type: String,
        metric: RateMetric,
        window_ms: i64,
        #[serde(default)]
        operator: CompareOp,
        value: f64,
    },
    Pattern {
        trail: String,
        /// Signal types that must appear, in order when `ordered`.
        sequence: Vec<String>,
        window_ms: i64,
        #[serde(default = "default_true")]
        ordered: bool,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("condition trail must be non-empty")]
    EmptyTrail,
    #[error("condition signal_type must be non-empty")]
    EmptySignalType,
    #[error("composite condition requires at least one child")]
    EmptyComposite,
    #[error("'not' takes exactly one child, got {0}")]
    NotArity(usize),
    #[error("window_ms must be positive, got {0}")]
    NonPositiveWindow(i64),
    #[error("pattern sequence must be non-empty")]
    EmptySequence,
}

impl ScentCondition {
    /// Structural validation, applied on scent registration.
    pub fn validate(&self) -> Result<(), ConditionError> {
        match self {
            Self::Threshold { trail, signal_type, .. } => {
                if trail.is_empty() {
                    return Err(ConditionError::EmptyTrail);
                }
                if signal_type.is_empty() {
                    return Err(ConditionError::EmptySignalType);
                }
                Ok(())
            }
            Self::Composite { operator, conditions } => {
                if conditions.is_empty() {
                    return Err(ConditionError::EmptyComposite);
                }
                if *operator == CompositeOp::Not && conditions.len() != 1 {
                    return Err(ConditionError::NotArity(conditions.len()));
                }
                conditions.iter().try_for_each(|c| c.validate())
            }
            Self::Rate { trail, signal_type, window_ms, .. } => {
                if trail.is_empty() {
                    return Err(ConditionError::EmptyTrail);
                }
                if signal_type.is_empty() {
                    return Err(ConditionError::EmptySignalType);
                }
                if *window_ms <= 0 {
                    return Err(ConditionError::NonPositiveWindow(*window_ms));
                }
                Ok(())
            }
            Self::Pattern { trail, sequence, window_ms, .. } => {
                if trail.is_empty() {
                    return Err(ConditionError::EmptyTrail);
                }
                if sequence.is_empty() {
                    return Err(ConditionError::EmptySequence);
                }
                if *window_ms <= 0 {
                    return Err(ConditionError::NonPositiveWindow(*window_ms));
                }
                Ok(())
            }
        }
    }
}
