// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Stigmergic Blackboard Protocol (SBP) core
//!
//! A coordination substrate for autonomous agents that communicate
//! indirectly through decaying signals ("pheromones") instead of direct
//! messaging. Agents deposit signals, signals decay continuously over
//! time, and agents register declarative conditions ("scents") that wake
//! them when the environment matches.
//!
//! # Architecture
//!
//! - `domain` - pheromones, decay models, scent conditions, operation types
//! - `application` - the blackboard engine, condition evaluator, scent loop
//! - `infrastructure` - pheromone store backends, clock, trigger delivery
//! - `presentation` - JSON-RPC over streamable HTTP with SSE notifications

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use application::blackboard::{Blackboard, BlackboardConfig};
pub use application::evaluation_loop::ScentEvaluator;
pub use domain::*;
