// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The blackboard engine.
//!
//! Owns the pheromone store, scent table and emission history behind a
//! single mutex. Operations are synchronous state transitions; nothing
//! here performs network I/O, so no lock is ever held across a
//! suspension point. The evaluation loop drains due triggers through
//! [`Blackboard::collect_due_triggers`] and dispatches them outside the
//! lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::application::evaluator::{evaluate_condition, EvaluationContext};
use crate::domain::decay::DecayModel;
use crate::domain::error::BlackboardError;
use crate::domain::history::{EmissionHistory, EmissionRecord};
use crate::domain::ops::*;
use crate::domain::pheromone::{
    hash_payload, is_reserved_trail, Pheromone, PheromoneId, DEFAULT_TTL_FLOOR,
};
use crate::domain::scent::{Scent, TriggerMode};
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::store::{InMemoryPheromoneStore, PheromoneStore};

/// In-process recipient for fired triggers. The transport installs one
/// per subscribed scent; a present handler preempts HTTP dispatch.
#[async_trait]
pub trait TriggerHandler: Send + Sync {
    async fn handle(&self, payload: TriggerPayload) -> anyhow::Result<()>;
}

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct BlackboardConfig {
    /// Cadence of the scent evaluation loop.
    pub evaluation_interval_ms: u64,
    /// How far back rate and pattern conditions can see.
    pub emission_history_window_ms: i64,
    /// Emission history tracking can be disabled for write-heavy nodes
    /// that register no rate or pattern scents.
    pub track_emissions: bool,
    /// Soft capacity; exceeding it runs garbage collection.
    pub max_pheromones: usize,
    pub default_ttl_floor: f64,
    pub default_decay: DecayModel,
    /// Per-trail decay defaults, consulted before `default_decay`.
    pub trail_defaults: HashMap<String, DecayModel>,
    pub max_payload_bytes: usize,
}

impl Default for BlackboardConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_ms: 100,
            emission_history_window_ms: 60_000,
            track_emissions: true,
            max_pheromones: 10_000,
            default_ttl_floor: DEFAULT_TTL_FLOOR,
            default_decay: DecayModel::default(),
            trail_defaults: HashMap::new(),
            max_payload_bytes: 64 * 1024,
        }
    }
}

impl BlackboardConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.evaluation_interval_ms > 0, "evaluation_interval_ms must be positive");
        anyhow::ensure!(
            self.emission_history_window_ms > 0,
            "emission_history_window_ms must be positive"
        );
        anyhow::ensure!(self.max_pheromones > 0, "max_pheromones must be positive");
        anyhow::ensure!(
            (0.0..1.0).contains(&self.default_ttl_floor),
            "default_ttl_floor must be in [0, 1)"
        );
        self.default_decay
            .validate()
            .map_err(|e| anyhow::anyhow!("default_decay: {e}"))?;
        for (trail, decay) in &self.trail_defaults {
            decay
                .validate()
                .map_err(|e| anyhow::anyhow!("trail default for {trail}: {e}"))?;
        }
        Ok(())
    }
}

/// A trigger the evaluation loop decided to fire, carried out of the
/// state lock for dispatch.
#[derive(Debug, Clone)]
pub struct DueTrigger {
    pub scent_id: String,
    pub endpoint: Option<String>,
    pub max_execution_ms: i64,
    pub payload: TriggerPayload,
}

struct State {
    store: Box<dyn PheromoneStore>,
    scents: HashMap<String, Scent>,
    history: EmissionHistory,
}

pub struct Blackboard {
    config: BlackboardConfig,
    clock: Arc<dyn Clock>,
    started_at_ms: i64,
    state: Mutex<State>,
    handlers: Mutex<HashMap<String, Arc<dyn TriggerHandler>>>,
}

impl Blackboard {
    pub fn new(config: BlackboardConfig) -> Self {
        Self::with_parts(config, Box::new(InMemoryPheromoneStore::new()), Arc::new(SystemClock))
    }

    /// Build with an alternate store backend or clock.
    pub fn with_parts(
        config: BlackboardConfig,
        store: Box<dyn PheromoneStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let started_at_ms = clock.now_ms();
        let history = EmissionHistory::new(config.emission_history_window_ms);
        Self {
            config,
            clock,
            started_at_ms,
            state: Mutex::new(State {
                store,
                scents: HashMap::new(),
                history,
            }),
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &BlackboardConfig {
        &self.config
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, BlackboardError> {
        self.state
            .lock()
            .map_err(|_| BlackboardError::Internal("state mutex poisoned".into()))
    }

    // ========================================================================
    // EMIT
    // ========================================================================

    pub fn emit(&self, params: EmitParams) -> Result<EmitResult, BlackboardError> {
        if params.trail.is_empty() {
            return Err(BlackboardError::InvalidParams("trail must be non-empty".into()));
        }
        if params.signal_type.is_empty() {
            return Err(BlackboardError::InvalidParams("type must be non-empty".into()));
        }
        if is_reserved_trail(&params.trail) {
            return Err(BlackboardError::InvalidParams(format!(
                "trail '{}' is reserved",
                params.trail
            )));
        }
        if let Some(decay) = &params.decay {
            decay
                .validate()
                .map_err(|e| BlackboardError::InvalidParams(format!("decay: {e}")))?;
        }
        let payload_bytes = serde_json::to_vec(&params.payload)
            .map_err(|e| BlackboardError::Internal(e.to_string()))?;
        if payload_bytes.len() > self.config.max_payload_bytes {
            return Err(BlackboardError::PayloadValidation(format!(
                "payload is {} bytes, limit is {}",
                payload_bytes.len(),
                self.config.max_payload_bytes
            )));
        }

        let clamped = params.intensity.clamp(0.0, 1.0);
        let now = self.clock.now_ms();
        let mut state = self.state()?;

        if self.config.track_emissions {
            state.history.record(EmissionRecord {
                trail: params.trail.clone(),
                signal_type: params.signal_type.clone(),
                timestamp: now,
                intensity: clamped,
            });
        }

        if params.merge_strategy != MergeStrategy::New {
            let payload_hash = hash_payload(&params.payload);
            let existing_id = state
                .store
                .values()
                .into_iter()
                .find(|p| {
                    p.trail == params.trail
                        && p.signal_type == params.signal_type
                        && !p.is_evaporated(now)
                        && p.payload_hash() == payload_hash
                })
                .map(|p| p.id);

            if let Some(id) = existing_id {
                return Ok(Self::apply_merge(&mut state, &id, &params, clamped, now));
            }
        }

        let decay = params
            .decay
            .clone()
            .or_else(|| self.config.trail_defaults.get(&params.trail).cloned())
            .unwrap_or_else(|| self.config.default_decay.clone());

        let pheromone = Pheromone {
            id: PheromoneId::new(),
            trail: params.trail,
            signal_type: params.signal_type,
            emitted_at: now,
            last_reinforced_at: now,
            initial_intensity: clamped,
            decay_model: decay,
            payload: params.payload,
            source_agent: params.source_agent,
            tags: params.tags,
            ttl_floor: self.config.default_ttl_floor,
        };
        let id = pheromone.id;
        state.store.set(pheromone);

        if state.store.len() > self.config.max_pheromones {
            let removed = Self::gc_locked(&mut state, now);
            debug!(removed, "capacity gc");
            if state.store.len() > self.config.max_pheromones {
                // Accept the emit anyway; natural decay will catch up.
                warn!(
                    size = state.store.len(),
                    max = self.config.max_pheromones,
                    "pheromone store over capacity after gc"
                );
            }
        }

        Ok(EmitResult {
            pheromone_id: id,
            action: EmitAction::Created,
            previous_intensity: None,
            new_intensity: clamped,
        })
    }

    fn apply_merge(
        state: &mut State,
        id: &PheromoneId,
        params: &EmitParams,
        clamped: f64,
        now: i64,
    ) -> EmitResult {
        let p = state
            .store
            .get_mut(id)
            .unwrap_or_else(|| unreachable!("merge target vanished under the state lock"));
        let previous = p.current_intensity(now);

        let action = match params.merge_strategy {
            MergeStrategy::Reinforce => {
                p.initial_intensity = clamped;
                EmitAction::Reinforced
            }
            MergeStrategy::Replace => {
                p.initial_intensity = clamped;
                p.payload = params.payload.clone();
                p.tags = params.tags.clone();
                if params.source_agent.is_some() {
                    p.source_agent = params.source_agent.clone();
                }
                EmitAction::Replaced
            }
            MergeStrategy::Max => {
                p.initial_intensity = previous.max(clamped);
                EmitAction::Merged
            }
            MergeStrategy::Add => {
                p.initial_intensity = (previous + clamped).min(1.0);
                EmitAction::Merged
            }
            MergeStrategy::New => unreachable!("new strategy never merges"),
        };
        p.last_reinforced_at = now;

        EmitResult {
            pheromone_id: *id,
            action,
            previous_intensity: Some(previous),
            new_intensity: p.current_intensity(now),
        }
    }

    // ========================================================================
    // SNIFF
    // ========================================================================

    pub fn sniff(&self, params: SniffParams) -> Result<SniffResult, BlackboardError> {
        let now = self.clock.now_ms();
        let state = self.state()?;

        let mut snapshots = Vec::new();
        let mut aggregates: HashMap<String, AggregateStats> = HashMap::new();

        for p in state.store.values() {
            if let Some(trails) = &params.trails {
                if !trails.contains(&p.trail) {
                    continue;
                }
            }
            if let Some(types) = &params.types {
                if !types.contains(&p.signal_type) {
                    continue;
                }
            }

            let intensity = p.current_intensity(now);
            if !params.include_evaporated && intensity < p.ttl_floor {
                continue;
            }
            if intensity < params.min_intensity {
                continue;
            }
            if let Some(max_age) = params.max_age_ms {
                if now - p.emitted_at > max_age {
                    continue;
                }
            }
            if let Some(tags) = &params.tags {
                if !tags.matches(&p.tags) {
                    continue;
                }
            }

            let entry = aggregates
                .entry(format!("{}/{}", p.trail, p.signal_type))
                .or_insert(AggregateStats {
                    count: 0,
                    sum_intensity: 0.0,
                    max_intensity: 0.0,
                    avg_intensity: 0.0,
                });
            entry.count += 1;
            entry.sum_intensity += intensity;
            entry.max_intensity = entry.max_intensity.max(intensity);

            snapshots.push(p.snapshot(now));
        }

        for stats in aggregates.values_mut() {
            stats.avg_intensity = stats.sum_intensity / stats.count as f64;
        }

        snapshots.sort_by(|a, b| b.current_intensity.total_cmp(&a.current_intensity));
        snapshots.truncate(params.limit);

        Ok(SniffResult {
            timestamp: now,
            pheromones: snapshots,
            aggregates,
        })
    }

    // ========================================================================
    // SCENTS
    // ========================================================================

    pub fn register_scent(
        &self,
        params: RegisterScentParams,
    ) -> Result<RegisterScentResult, BlackboardError> {
        if params.scent_id.is_empty() {
            return Err(BlackboardError::InvalidParams("scent_id must be non-empty".into()));
        }
        params.condition.validate()?;

        let now = self.clock.now_ms();
        let mut state = self.state()?;

        // Runtime fields: preserved across updates in level mode so a
        // held-true condition does not refire, reset for edge modes so a
        // transition straddling the update is not missed.
        let (status, last_triggered_at, last_condition_met) =
            match state.scents.get(&params.scent_id) {
                Some(existing) if !params.trigger_mode.is_edge() => (
                    RegisterStatus::Updated,
                    existing.last_triggered_at,
                    existing.last_condition_met,
                ),
                Some(_) => (RegisterStatus::Updated, None, false),
                None => (RegisterStatus::Registered, None, false),
            };

        let scent = Scent {
            scent_id: params.scent_id.clone(),
            agent_endpoint: params.agent_endpoint,
            condition: params.condition,
            cooldown_ms: params.cooldown_ms,
            activation_payload: params.activation_payload,
            trigger_mode: params.trigger_mode,
            hysteresis: params.hysteresis,
            max_execution_ms: params.max_execution_ms,
            context_trails: params.context_trails,
            last_triggered_at,
            last_condition_met,
        };

        let result = {
            let snapshot = state.store.values();
            let ctx = EvaluationContext {
                pheromones: &snapshot,
                now,
                history: &state.history,
            };
            evaluate_condition(&scent.condition, &ctx)
        };

        state.scents.insert(params.scent_id.clone(), scent);

        Ok(RegisterScentResult {
            scent_id: params.scent_id,
            status,
            current_condition_state: ConditionState {
                met: result.met,
                value: result.value,
            },
        })
    }

    pub fn deregister_scent(
        &self,
        scent_id: &str,
    ) -> Result<DeregisterScentResult, BlackboardError> {
        let mut state = self.state()?;
        let status = if state.scents.remove(scent_id).is_some() {
            drop(state);
            self.off_trigger(scent_id)?;
            DeregisterStatus::Deregistered
        } else {
            DeregisterStatus::NotFound
        };
        Ok(DeregisterScentResult {
            scent_id: scent_id.to_string(),
            status,
        })
    }

    pub fn has_scent(&self, scent_id: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.scents.contains_key(scent_id))
            .unwrap_or(false)
    }

    // ========================================================================
    // EVAPORATE
    // ========================================================================

    pub fn evaporate(&self, params: EvaporateParams) -> Result<EvaporateResult, BlackboardError> {
        let now = self.clock.now_ms();
        let mut state = self.state()?;

        let mut to_remove = Vec::new();
        let mut trails_affected = Vec::new();

        for p in state.store.values() {
            if let Some(trail) = &params.trail {
                if &p.trail != trail {
                    continue;
                }
            }
            if let Some(types) = &params.types {
                if !types.contains(&p.signal_type) {
                    continue;
                }
            }
            if let Some(older_than) = params.older_than_ms {
                if now - p.emitted_at < older_than {
                    continue;
                }
            }
            if let Some(below) = params.below_intensity {
                if p.current_intensity(now) >= below {
                    continue;
                }
            }
            if let Some(tags) = &params.tags {
                if !tags.matches(&p.tags) {
                    continue;
                }
            }

            to_remove.push(p.id);
            if !trails_affected.contains(&p.trail) {
                trails_affected.push(p.trail.clone());
            }
        }

        for id in &to_remove {
            state.store.delete(id);
        }

        Ok(EvaporateResult {
            evaporated_count: to_remove.len(),
            trails_affected,
        })
    }

    // ========================================================================
    // INSPECT
    // ========================================================================

    pub fn inspect(&self, params: InspectParams) -> Result<InspectResult, BlackboardError> {
        let now = self.clock.now_ms();
        let state = self.state()?;

        let include = params.include.unwrap_or_else(|| {
            vec![InspectSection::Trails, InspectSection::Scents, InspectSection::Stats]
        });

        let trails = include.contains(&InspectSection::Trails).then(|| {
            let mut by_trail: HashMap<&str, (usize, f64)> = HashMap::new();
            for p in state.store.values() {
                if p.is_evaporated(now) {
                    continue;
                }
                let entry = by_trail.entry(p.trail.as_str()).or_insert((0, 0.0));
                entry.0 += 1;
                entry.1 += p.current_intensity(now);
            }
            let mut infos: Vec<TrailInfo> = by_trail
                .into_iter()
                .map(|(trail, (count, total))| TrailInfo {
                    trail: trail.to_string(),
                    count,
                    total_intensity: total,
                    avg_intensity: total / count as f64,
                })
                .collect();
            infos.sort_by(|a, b| a.trail.cmp(&b.trail));
            infos
        });

        let scents = include.contains(&InspectSection::Scents).then(|| {
            let mut infos: Vec<ScentInfo> = state
                .scents
                .values()
                .map(|s| ScentInfo {
                    scent_id: s.scent_id.clone(),
                    agent_endpoint: s.agent_endpoint.clone(),
                    last_condition_met: s.last_condition_met,
                    in_cooldown: s.in_cooldown(now),
                    last_triggered_at: s.last_triggered_at,
                })
                .collect();
            infos.sort_by(|a, b| a.scent_id.cmp(&b.scent_id));
            infos
        });

        let stats = include
            .contains(&InspectSection::Stats)
            .then(|| Self::stats_locked(&state, now, self.started_at_ms));

        Ok(InspectResult {
            timestamp: now,
            trails,
            scents,
            stats,
        })
    }

    pub fn stats(&self) -> Result<BlackboardStats, BlackboardError> {
        let now = self.clock.now_ms();
        let state = self.state()?;
        Ok(Self::stats_locked(&state, now, self.started_at_ms))
    }

    fn stats_locked(state: &State, now: i64, started_at_ms: i64) -> BlackboardStats {
        let active = state
            .store
            .values()
            .into_iter()
            .filter(|p| !p.is_evaporated(now))
            .count();
        BlackboardStats {
            total_pheromones: state.store.len(),
            active_pheromones: active,
            scent_count: state.scents.len(),
            uptime_ms: now - started_at_ms,
        }
    }

    // ========================================================================
    // TRIGGER HANDLERS
    // ========================================================================

    pub fn on_trigger(
        &self,
        scent_id: &str,
        handler: Arc<dyn TriggerHandler>,
    ) -> Result<(), BlackboardError> {
        self.handlers
            .lock()
            .map_err(|_| BlackboardError::Internal("handler mutex poisoned".into()))?
            .insert(scent_id.to_string(), handler);
        Ok(())
    }

    pub fn off_trigger(&self, scent_id: &str) -> Result<(), BlackboardError> {
        self.handlers
            .lock()
            .map_err(|_| BlackboardError::Internal("handler mutex poisoned".into()))?
            .remove(scent_id);
        Ok(())
    }

    pub fn handler(&self, scent_id: &str) -> Option<Arc<dyn TriggerHandler>> {
        self.handlers.lock().ok()?.get(scent_id).cloned()
    }

    // ========================================================================
    // EVALUATION TICK
    // ========================================================================

    /// One evaluation pass over the scent table. Returns the triggers
    /// that fired so the caller can dispatch them without holding the
    /// state lock.
    pub fn collect_due_triggers(&self) -> Vec<DueTrigger> {
        let now = self.clock.now_ms();
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("state mutex poisoned, skipping evaluation tick");
                return vec![];
            }
        };
        let State { store, scents, history } = &mut *guard;
        let snapshot = store.values();
        let mut by_id: HashMap<PheromoneId, &Pheromone> = HashMap::with_capacity(snapshot.len());
        for p in &snapshot {
            by_id.insert(p.id, *p);
        }

        let mut due = Vec::new();

        for scent in scents.values_mut() {
            if scent.in_cooldown(now) {
                continue;
            }

            let ctx = EvaluationContext {
                pheromones: &snapshot,
                now,
                history,
            };
            let result = evaluate_condition(&scent.condition, &ctx);

            let fire = match scent.trigger_mode {
                TriggerMode::Level => result.met,
                TriggerMode::EdgeRising => result.met && !scent.last_condition_met,
                TriggerMode::EdgeFalling => !result.met && scent.last_condition_met,
            };
            scent.last_condition_met = result.met;

            if !fire {
                continue;
            }
            scent.last_triggered_at = Some(now);

            let context_pheromones = match &scent.context_trails {
                Some(trails) => snapshot
                    .iter()
                    .filter(|p| trails.contains(&p.trail) && !p.is_evaporated(now))
                    .map(|p| p.snapshot(now))
                    .collect(),
                None => result
                    .matching_pheromone_ids
                    .iter()
                    .filter_map(|id| by_id.get(id))
                    .map(|p| p.snapshot(now))
                    .collect(),
            };

            let mut condition_snapshot = HashMap::new();
            condition_snapshot.insert(
                scent.scent_id.clone(),
                ConditionSnapshot {
                    value: result.value,
                    pheromone_ids: result.matching_pheromone_ids.clone(),
                },
            );

            due.push(DueTrigger {
                scent_id: scent.scent_id.clone(),
                endpoint: scent.agent_endpoint.clone(),
                max_execution_ms: scent.max_execution_ms,
                payload: TriggerPayload {
                    scent_id: scent.scent_id.clone(),
                    triggered_at: now,
                    condition_snapshot,
                    context_pheromones,
                    activation_payload: scent.activation_payload.clone(),
                },
            });
        }

        due
    }

    // ========================================================================
    // GARBAGE COLLECTION
    // ========================================================================

    /// Drop every evaporated pheromone. Runs on demand and under
    /// capacity pressure.
    pub fn gc(&self) -> Result<usize, BlackboardError> {
        let now = self.clock.now_ms();
        let mut state = self.state()?;
        Ok(Self::gc_locked(&mut state, now))
    }

    fn gc_locked(state: &mut State, now: i64) -> usize {
        let expired: Vec<PheromoneId> = state
            .store
            .values()
            .into_iter()
            .filter(|p| p.is_evaporated(now))
            .map(|p| p.id)
            .collect();
        for id in &expired {
            state.store.delete(id);
        }
        expired.len()
    }
}

impl std::fmt::Debug for Blackboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Blackboard")
            .field("config", &self.config)
            .field("started_at_ms", &self.started_at_ms)
            .finish_non_exhaustive()
    }
}
