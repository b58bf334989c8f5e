// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod condition;
pub mod decay;
pub mod error;
pub mod history;
pub mod ops;
pub mod pheromone;
pub mod scent;

pub use condition::{Aggregation, CompareOp, CompositeOp, ConditionError, RateMetric, ScentCondition};
pub use decay::{DecayModel, DecayStep, TimeToEvaporation};
pub use error::BlackboardError;
pub use history::{EmissionHistory, EmissionRecord};
pub use ops::*;
pub use pheromone::{Pheromone, PheromoneId, PheromoneSnapshot, TagFilter, DEFAULT_TTL_FLOOR};
pub use scent::{Scent, TriggerMode};
