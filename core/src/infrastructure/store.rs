// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pheromone store backends.
//!
//! The contract is deliberately narrow so alternate backends can slot in.
//! Backends may cache asynchronously behind the scenes but must present a
//! synchronous read interface to the core; the engine snapshots under its
//! own lock and never awaits a store call.

use std::collections::HashMap;

use crate::domain::pheromone::{Pheromone, PheromoneId};

/// Identity-addressed container with iteration. Iteration order is
/// unspecified.
pub trait PheromoneStore: Send {
    fn get(&self, id: &PheromoneId) -> Option<&Pheromone>;
    fn get_mut(&mut self, id: &PheromoneId) -> Option<&mut Pheromone>;
    fn set(&mut self, pheromone: Pheromone);
    fn delete(&mut self, id: &PheromoneId) -> bool;
    fn contains(&self, id: &PheromoneId) -> bool;
    fn values(&self) -> Vec<&Pheromone>;
    fn values_mut(&mut self) -> Vec<&mut Pheromone>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn clear(&mut self);
}

/// Default in-memory backend.
#[derive(Debug, Default)]
pub struct InMemoryPheromoneStore {
    pheromones: HashMap<PheromoneId, Pheromone>,
}

impl InMemoryPheromoneStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PheromoneStore for InMemoryPheromoneStore {
    fn get(&self, id: &PheromoneId) -> Option<&Pheromone> {
        self.pheromones.get(id)
    }

    fn get_mut(&mut self, id: &PheromoneId) -> Option<&mut Pheromone> {
        self.pheromones.get_mut(id)
    }

    fn set(&mut self, pheromone: Pheromone) {
        self.pheromones.insert(pheromone.id, pheromone);
    }

    fn delete(&mut self, id: &PheromoneId) -> bool {
        self.pheromones.remove(id).is_some()
    }

    fn contains(&self, id: &PheromoneId) -> bool {
        self.pheromones.contains_key(id)
    }

    fn values(&self) -> Vec<&Pheromone> {
        self.pheromones.values().collect()
    }

    fn values_mut(&mut self) -> Vec<&mut Pheromone> {
        self.pheromones.values_mut().collect()
    }

    fn len(&self) -> usize {
        self.pheromones.len()
    }

    fn clear(&mut self) {
        self.pheromones.clear();
    }
}
