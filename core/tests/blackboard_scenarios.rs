// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end engine scenarios driven through the public operations with
//! a manual clock.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use sbp_core::application::blackboard::{Blackboard, BlackboardConfig, TriggerHandler};
use sbp_core::application::evaluation_loop::ScentEvaluator;
use sbp_core::domain::condition::{Aggregation, CompareOp, CompositeOp, ScentCondition};
use sbp_core::domain::decay::DecayModel;
use sbp_core::domain::ops::{
    DeregisterStatus, EmitParams, EvaporateParams, InspectParams, MergeStrategy,
    RegisterScentParams, RegisterStatus, SniffParams, TriggerPayload,
};
use sbp_core::domain::scent::TriggerMode;
use sbp_core::infrastructure::clock::ManualClock;
use sbp_core::infrastructure::http_dispatch::TriggerDispatcher;
use sbp_core::infrastructure::store::InMemoryPheromoneStore;

fn board() -> (Arc<ManualClock>, Arc<Blackboard>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let blackboard = Arc::new(Blackboard::with_parts(
        BlackboardConfig::default(),
        Box::new(InMemoryPheromoneStore::new()),
        clock.clone(),
    ));
    (clock, blackboard)
}

fn emit(trail: &str, signal_type: &str, intensity: f64, decay: DecayModel) -> EmitParams {
    EmitParams {
        trail: trail.into(),
        signal_type: signal_type.into(),
        intensity,
        decay: Some(decay),
        payload: serde_json::Map::new(),
        tags: vec![],
        merge_strategy: MergeStrategy::Reinforce,
        source_agent: None,
    }
}

fn threshold(trail: &str, signal_type: &str, aggregation: Aggregation, op: CompareOp, value: f64) -> ScentCondition {
    ScentCondition::Threshold {
        trail: trail.into(),
        signal_type: signal_type.into(),
        tags: None,
        aggregation,
        operator: op,
        value,
    }
}

fn register(scent_id: &str, condition: ScentCondition, mode: TriggerMode, cooldown_ms: i64) -> RegisterScentParams {
    RegisterScentParams {
        scent_id: scent_id.into(),
        agent_endpoint: None,
        condition,
        cooldown_ms,
        activation_payload: serde_json::Map::new(),
        trigger_mode: mode,
        hysteresis: 0.0,
        max_execution_ms: 1_000,
        context_trails: None,
    }
}

#[test]
fn exponential_half_life_decays_through_sniff() {
    let (clock, bb) = board();
    bb.emit(emit("decay.test", "sig", 1.0, DecayModel::Exponential { half_life_ms: 10_000 }))
        .unwrap();

    let at_zero = bb.sniff(SniffParams::default()).unwrap();
    assert!((at_zero.pheromones[0].current_intensity - 1.0).abs() < 0.01);

    clock.advance(10_000);
    let at_half_life = bb.sniff(SniffParams::default()).unwrap();
    assert!(
        (at_half_life.pheromones[0].current_intensity - 0.5).abs() < 0.005,
        "one half-life should halve intensity"
    );

    clock.advance(10_000);
    let at_two = bb.sniff(SniffParams::default()).unwrap();
    assert!((at_two.pheromones[0].current_intensity - 0.25).abs() < 0.0025);
}

#[test]
fn reinforce_resets_the_decay_clock() {
    let (clock, bb) = board();
    let decay = DecayModel::Exponential { half_life_ms: 10_000 };
    bb.emit(emit("a", "sig", 0.5, decay.clone())).unwrap();

    clock.advance(5_000);
    let result = bb.emit(emit("a", "sig", 0.9, decay)).unwrap();
    assert_eq!(result.previous_intensity.map(|i| (i * 100.0).round() / 100.0), Some(0.35));

    clock.advance(1);
    let now_view = bb.sniff(SniffParams::default()).unwrap();
    assert!((now_view.pheromones[0].current_intensity - 0.9).abs() < 0.001);

    clock.advance(9_999);
    let later = bb.sniff(SniffParams::default()).unwrap();
    assert!(
        (later.pheromones[0].current_intensity - 0.45).abs() < 0.005,
        "half-life counts from the reinforcement"
    );
}

#[test]
fn sniff_never_reports_above_the_clamped_emit() {
    let (_, bb) = board();
    bb.emit(emit("a", "sig", 3.5, DecayModel::Immortal)).unwrap();
    let result = bb.sniff(SniffParams::default()).unwrap();
    assert!(result.pheromones[0].current_intensity <= 1.0);
}

#[test]
fn composite_and_fires_once_per_cooldown_window() {
    let (clock, bb) = board();
    bb.emit(emit("a.alert", "spike", 0.8, DecayModel::Immortal)).unwrap();
    for i in 0..3 {
        let mut params = emit("a.warn", "w", 0.6, DecayModel::Immortal);
        params.payload.insert("i".into(), serde_json::json!(i));
        bb.emit(params).unwrap();
    }

    let condition = ScentCondition::Composite {
        operator: CompositeOp::And,
        conditions: vec![
            threshold("a.alert", "*", Aggregation::Max, CompareOp::Gte, 0.7),
            threshold("a.warn", "*", Aggregation::Count, CompareOp::Gte, 2.0),
        ],
    };
    let state = bb
        .register_scent(register("crisis", condition, TriggerMode::Level, 500))
        .unwrap();
    assert!(state.current_condition_state.met);

    // Tick every 100 ms: exactly one fire inside the cooldown window.
    let mut fires = 0;
    for _ in 0..4 {
        fires += bb.collect_due_triggers().len();
        clock.advance(100);
    }
    assert_eq!(fires, 1, "cooldown suppresses refiring inside 400 ms");

    clock.advance(200); // past the 500 ms cooldown
    assert_eq!(bb.collect_due_triggers().len(), 1, "second fire after cooldown");
}

#[test]
fn edge_rising_is_single_shot_per_transition() {
    let (clock, bb) = board();
    bb.register_scent(register(
        "watch",
        threshold("a", "sig", Aggregation::Any, CompareOp::Gte, 0.5),
        TriggerMode::EdgeRising,
        0,
    ))
    .unwrap();

    assert!(bb.collect_due_triggers().is_empty(), "no signal, no trigger");

    bb.emit(emit("a", "sig", 0.8, DecayModel::Immortal)).unwrap();
    assert_eq!(bb.collect_due_triggers().len(), 1);

    clock.advance(200);
    assert!(bb.collect_due_triggers().is_empty(), "held high does not refire");

    bb.evaporate(EvaporateParams {
        trail: Some("a".into()),
        ..Default::default()
    })
    .unwrap();
    assert!(bb.collect_due_triggers().is_empty(), "falling edge is not rising");

    bb.emit(emit("a", "sig", 0.8, DecayModel::Immortal)).unwrap();
    assert_eq!(bb.collect_due_triggers().len(), 1, "new transition fires again");
}

#[test]
fn ordered_pattern_follows_emission_order() {
    let (clock, bb) = board();
    for step in ["step-1", "step-2", "step-3"] {
        bb.emit(emit("pipeline", step, 0.5, DecayModel::Immortal)).unwrap();
        clock.advance(100);
    }

    let ordered = ScentCondition::Pattern {
        trail: "pipeline".into(),
        sequence: vec!["step-1".into(), "step-2".into(), "step-3".into()],
        window_ms: 1_000,
        ordered: true,
    };
    let state = bb
        .register_scent(register("pipe", ordered, TriggerMode::Level, 0))
        .unwrap();
    assert!(state.current_condition_state.met);
}

#[test]
fn reversed_pattern_needs_unordered_matching() {
    let (clock, bb) = board();
    for step in ["step-3", "step-2", "step-1"] {
        bb.emit(emit("pipeline", step, 0.5, DecayModel::Immortal)).unwrap();
        clock.advance(100);
    }

    let sequence: Vec<String> = vec!["step-1".into(), "step-2".into(), "step-3".into()];

    let ordered = ScentCondition::Pattern {
        trail: "pipeline".into(),
        sequence: sequence.clone(),
        window_ms: 1_000,
        ordered: true,
    };
    let state = bb
        .register_scent(register("strict", ordered, TriggerMode::Level, 0))
        .unwrap();
    assert!(!state.current_condition_state.met);

    let unordered = ScentCondition::Pattern {
        trail: "pipeline".into(),
        sequence,
        window_ms: 1_000,
        ordered: false,
    };
    let state = bb
        .register_scent(register("loose", unordered, TriggerMode::Level, 0))
        .unwrap();
    assert!(state.current_condition_state.met);
}

#[test]
fn evaporate_then_sniff_is_empty() {
    let (_, bb) = board();
    bb.emit(emit("t", "x", 0.9, DecayModel::Immortal)).unwrap();
    bb.emit(emit("t", "y", 0.9, DecayModel::Immortal)).unwrap();

    let result = bb
        .evaporate(EvaporateParams {
            trail: Some("t".into()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(result.evaporated_count, 2);

    let after = bb
        .sniff(SniffParams {
            trails: Some(vec!["t".into()]),
            ..Default::default()
        })
        .unwrap();
    assert!(after.pheromones.is_empty());
}

#[test]
fn register_then_deregister_restores_pre_register_state() {
    let (_, bb) = board();
    let condition = threshold("a", "*", Aggregation::Any, CompareOp::Gte, 1.0);

    let before = bb.inspect(InspectParams::default()).unwrap();
    assert_eq!(before.stats.unwrap().scent_count, 0);

    let first = bb
        .register_scent(register("q", condition.clone(), TriggerMode::Level, 0))
        .unwrap();
    assert_eq!(first.status, RegisterStatus::Registered);

    let second = bb
        .register_scent(register("q", condition, TriggerMode::Level, 0))
        .unwrap();
    assert_eq!(second.status, RegisterStatus::Updated);

    let removed = bb.deregister_scent("q").unwrap();
    assert_eq!(removed.status, DeregisterStatus::Deregistered);

    let after = bb.inspect(InspectParams::default()).unwrap();
    assert_eq!(after.stats.unwrap().scent_count, 0);
    assert_eq!(
        bb.deregister_scent("q").unwrap().status,
        DeregisterStatus::NotFound
    );
}

struct CapturingHandler {
    seen: Mutex<Vec<TriggerPayload>>,
}

#[async_trait]
impl TriggerHandler for CapturingHandler {
    async fn handle(&self, payload: TriggerPayload) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(payload);
        Ok(())
    }
}

struct NullDispatcher;

#[async_trait]
impl TriggerDispatcher for NullDispatcher {
    async fn dispatch(
        &self,
        _endpoint: &str,
        _payload: &TriggerPayload,
        _timeout: Duration,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn evaluator_delivers_payload_to_local_handler() {
    let (clock, bb) = board();
    bb.emit(emit("a.alert", "spike", 0.9, DecayModel::Immortal)).unwrap();
    bb.register_scent(register(
        "alarm",
        threshold("a.alert", "*", Aggregation::Max, CompareOp::Gte, 0.7),
        TriggerMode::Level,
        60_000,
    ))
    .unwrap();

    let handler = Arc::new(CapturingHandler {
        seen: Mutex::new(vec![]),
    });
    bb.on_trigger("alarm", handler.clone()).unwrap();

    let evaluator = ScentEvaluator::new(bb.clone(), Arc::new(NullDispatcher));
    evaluator.tick().await;
    clock.advance(100);
    evaluator.tick().await;

    let seen = handler.seen.lock().unwrap();
    assert_eq!(seen.len(), 1, "cooldown holds the second tick");
    let payload = &seen[0];
    assert_eq!(payload.scent_id, "alarm");
    assert_eq!(payload.triggered_at, 1_000_000);
    assert!((payload.condition_snapshot["alarm"].value - 0.9).abs() < 1e-9);
    assert_eq!(payload.context_pheromones.len(), 1);
    assert_eq!(payload.context_pheromones[0].trail, "a.alert");
}
