// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scent condition evaluation against a snapshot of the environment.

use std::collections::HashMap;

use crate::domain::condition::{Aggregation, CompareOp, CompositeOp, RateMetric, ScentCondition};
use crate::domain::history::EmissionHistory;
use crate::domain::pheromone::{Pheromone, PheromoneId, TagFilter};

/// A consistent view of the environment at one instant: live pheromones
/// plus the bounded emission history.
pub struct EvaluationContext<'a> {
    pub pheromones: &'a [&'a Pheromone],
    pub now: i64,
    pub history: &'a EmissionHistory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub met: bool,
    pub value: f64,
    pub matching_pheromone_ids: Vec<PheromoneId>,
}

impl EvaluationResult {
    fn unmet() -> Self {
        Self {
            met: false,
            value: 0.0,
            matching_pheromone_ids: vec![],
        }
    }
}

pub fn evaluate_condition(condition: &ScentCondition, ctx: &EvaluationContext<'_>) -> EvaluationResult {
    match condition {
        ScentCondition::Threshold {
            trail,
            signal_type,
            tags,
            aggregation,
            operator,
            value,
        } => evaluate_threshold(ctx, trail, signal_type, tags.as_ref(), *aggregation, operator, *value),
        ScentCondition::Composite { operator, conditions } => {
            evaluate_composite(ctx, *operator, conditions)
        }
        ScentCondition::Rate {
            trail,
            signal_type,
            metric,
            window_ms,
            operator,
            value,
        } => evaluate_rate(ctx, trail, signal_type, *metric, *window_ms, operator, *value),
        ScentCondition::Pattern {
            trail,
            sequence,
            window_ms,
            ordered,
        } => evaluate_pattern(ctx, trail, sequence, *window_ms, *ordered),
    }
}

fn evaluate_threshold(
    ctx: &EvaluationContext<'_>,
    trail: &str,
    signal_type: &str,
    tags: Option<&TagFilter>,
    aggregation: Aggregation,
    operator: &CompareOp,
    value: f64,
) -> EvaluationResult {
    let matching: Vec<&Pheromone> = ctx
        .pheromones
        .iter()
        .copied()
        .filter(|p| p.trail == trail)
        .filter(|p| signal_type == "*" || p.signal_type == signal_type)
        .filter(|p| !p.is_evaporated(ctx.now))
        .filter(|p| tags.map_or(true, |f| f.matches(&p.tags)))
        .collect();

    let intensities: Vec<f64> = matching.iter().map(|p| p.current_intensity(ctx.now)).collect();

    let agg_value = match aggregation {
        Aggregation::Sum => intensities.iter().sum(),
        Aggregation::Max => intensities.iter().copied().fold(0.0, f64::max),
        Aggregation::Avg => {
            if intensities.is_empty() {
                0.0
            } else {
                intensities.iter().sum::<f64>() / intensities.len() as f64
            }
        }
        Aggregation::Count => matching.len() as f64,
        Aggregation::Any => {
            if matching.is_empty() {
                0.0
            } else {
                1.0
            }
        }
    };

    EvaluationResult {
        met: operator.compare(agg_value, value),
        value: agg_value,
        matching_pheromone_ids: matching.iter().map(|p| p.id).collect(),
    }
}

fn evaluate_composite(
    ctx: &EvaluationContext<'_>,
    operator: CompositeOp,
    conditions: &[ScentCondition],
) -> EvaluationResult {
    if conditions.is_empty() {
        return EvaluationResult::unmet();
    }

    let results: Vec<EvaluationResult> =
        conditions.iter().map(|c| evaluate_condition(c, ctx)).collect();

    let met = match operator {
        CompositeOp::And => results.iter().all(|r| r.met),
        CompositeOp::Or => results.iter().any(|r| r.met),
        CompositeOp::Not => !results[0].met,
    };

    // Distinct union of the children's matches, first occurrence wins.
    let mut seen = HashMap::new();
    let mut ids = Vec::new();
    for r in &results {
        for id in &r.matching_pheromone_ids {
            if seen.insert(*id, ()).is_none() {
                ids.push(*id);
            }
        }
    }

    EvaluationResult {
        met,
        value: results.iter().filter(|r| r.met).count() as f64,
        matching_pheromone_ids: ids,
    }
}

fn evaluate_rate(
    ctx: &EvaluationContext<'_>,
    trail: &str,
    signal_type: &str,
    metric: RateMetric,
    window_ms: i64,
    operator: &CompareOp,
    value: f64,
) -> EvaluationResult {
    let window_start = ctx.now - window_ms;
    let relevant = ctx
        .history
        .records()
        .filter(|r| r.trail == trail)
        .filter(|r| signal_type == "*" || r.signal_type == signal_type)
        .filter(|r| r.timestamp >= window_start);

    let metric_value = match metric {
        RateMetric::EmissionsPerSecond => {
            let window_seconds = window_ms as f64 / 1000.0;
            relevant.count() as f64 / window_seconds
        }
        RateMetric::IntensityDelta => relevant.map(|r| r.intensity).sum(),
    };

    EvaluationResult {
        met: operator.compare(metric_value, value),
        value: metric_value,
        matching_pheromone_ids: vec![],
    }
}

fn evaluate_pattern(
    ctx: &EvaluationContext<'_>,
    trail: &str,
    sequence: &[String],
    window_ms: i64,
    ordered: bool,
) -> EvaluationResult {
    if sequence.is_empty() {
        return EvaluationResult::unmet();
    }

    let window_start = ctx.now - window_ms;
    let records: Vec<&str> = ctx
        .history
        .records()
        .filter(|r| r.trail == trail && r.timestamp >= window_start)
        .map(|r| r.signal_type.as_str())
        .collect();

    let matched = if ordered {
        // Greedy forward scan: each step consumes a distinct record
        // strictly after the previous match.
        let mut next_step = 0;
        for record in &records {
            if next_step < sequence.len() && *record == sequence[next_step] {
                next_step += 1;
            }
        }
        next_step
    } else {
        let mut available: HashMap<&str, usize> = HashMap::new();
        for record in &records {
            *available.entry(record).or_insert(0) += 1;
        }
        let mut matched = 0;
        for step in sequence {
            if let Some(count) = available.get_mut(step.as_str()) {
                if *count > 0 {
                    *count -= 1;
                    matched += 1;
                }
            }
        }
        matched
    };

    EvaluationResult {
        met: matched == sequence.len(),
        value: matched as f64 / sequence.len() as f64,
        matching_pheromone_ids: vec![],
    }
}
