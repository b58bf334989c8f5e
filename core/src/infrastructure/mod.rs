// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod clock;
pub mod http_dispatch;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use http_dispatch::{HttpTriggerDispatcher, TriggerDispatcher};
pub use store::{InMemoryPheromoneStore, PheromoneStore};
