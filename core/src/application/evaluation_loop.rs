// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Background scent evaluation task.
//!
//! Walks the scent table at a fixed cadence and fires due triggers.
//! Evaluation happens under the engine's state lock; dispatch happens
//! out here, bounded per trigger by the scent's `max_execution_ms`.
//! Triggers for a single scent are serialized by the loop; triggers for
//! different scents within one tick are dispatched in parallel.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::blackboard::{Blackboard, DueTrigger};
use crate::infrastructure::http_dispatch::TriggerDispatcher;

pub struct ScentEvaluator {
    blackboard: Arc<Blackboard>,
    dispatcher: Arc<dyn TriggerDispatcher>,
    shutdown_token: CancellationToken,
}

impl ScentEvaluator {
    pub fn new(blackboard: Arc<Blackboard>, dispatcher: Arc<dyn TriggerDispatcher>) -> Self {
        Self {
            blackboard,
            dispatcher,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Handle used to stop the loop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Spawn the evaluation loop.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        let interval_ms = self.blackboard.config().evaluation_interval_ms;
        info!(interval_ms, "starting scent evaluation loop");

        let mut tick = interval(Duration::from_millis(interval_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    self.tick().await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("shutdown signal received, stopping scent evaluation loop");
                    break;
                }
            }
        }
    }

    /// One evaluation pass plus dispatch of everything that fired.
    pub async fn tick(&self) {
        let due = self.blackboard.collect_due_triggers();
        if due.is_empty() {
            return;
        }
        debug!(count = due.len(), "dispatching triggers");
        join_all(due.into_iter().map(|t| self.dispatch(t))).await;
    }

    async fn dispatch(&self, trigger: DueTrigger) {
        let budget = Duration::from_millis(trigger.max_execution_ms.max(0) as u64);

        // A locally registered handler preempts HTTP delivery.
        if let Some(handler) = self.blackboard.handler(&trigger.scent_id) {
            match timeout(budget, handler.handle(trigger.payload)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(scent_id = %trigger.scent_id, error = %e, "trigger handler failed")
                }
                Err(_) => {
                    warn!(scent_id = %trigger.scent_id, "trigger handler timed out")
                }
            }
            return;
        }

        let Some(endpoint) = trigger.endpoint else {
            debug!(scent_id = %trigger.scent_id, "trigger fired with no delivery target");
            return;
        };

        match self
            .dispatcher
            .dispatch(&endpoint, &trigger.payload, budget)
            .await
        {
            Ok(()) => {}
            Err(e) => {
                warn!(scent_id = %trigger.scent_id, endpoint, error = %e, "trigger delivery failed")
            }
        }
    }
}
