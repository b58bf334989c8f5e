// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Bounded emission history feeding rate and pattern conditions.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// One emit call, as seen by rate and pattern conditions.
///
/// The intensity is recorded so `intensity_delta` can sum real emission
/// strengths instead of approximating with a count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionRecord {
    pub trail: String,
    #[serde(rename = "type")]
    pub signal_type: String,
    pub timestamp: i64,
    pub intensity: f64,
}

/// Append-and-prune ring of emission records, bounded by a time window.
/// Pruning happens at append time, so the ring never grows past the
/// window under steady traffic.
#[derive(Debug, Clone)]
pub struct EmissionHistory {
    window_ms: i64,
    records: VecDeque<EmissionRecord>,
}

impl EmissionHistory {
    pub fn new(window_ms: i64) -> Self {
        Self {
            window_ms,
            records: VecDeque::new(),
        }
    }

    pub fn record(&mut self, record: EmissionRecord) {
        let cutoff = record.timestamp - self.window_ms;
        while self.records.front().is_some_and(|r| r.timestamp < cutoff) {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn prune(&mut self, now: i64) {
        let cutoff = now - self.window_ms;
        while self.records.front().is_some_and(|r| r.timestamp < cutoff) {
            self.records.pop_front();
        }
    }

    /// Records in chronological order.
    pub fn records(&self) -> impl Iterator<Item = &EmissionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(trail: &str, signal_type: &str, timestamp: i64) -> EmissionRecord {
        EmissionRecord {
            trail: trail.into(),
            signal_type: signal_type.into(),
            timestamp,
            intensity: 0.5,
        }
    }

    #[test]
    fn append_prunes_expired_records() {
        let mut history = EmissionHistory::new(1_000);
        history.record(rec("t", "a", 100));
        history.record(rec("t", "b", 500));
        history.record(rec("t", "c", 1_600));
        assert_eq!(history.len(), 2);
        assert_eq!(history.records().next().unwrap().signal_type, "b");
    }

    #[test]
    fn explicit_prune() {
        let mut history = EmissionHistory::new(1_000);
        history.record(rec("t", "a", 100));
        history.record(rec("t", "b", 200));
        history.prune(2_000);
        assert!(history.is_empty());
    }

    #[test]
    fn preserves_chronological_order() {
        let mut history = EmissionHistory::new(10_000);
        for t in [10, 20, 30] {
            history.record(rec("t", "s", t));
        }
        let times: Vec<i64> = history.records().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![10, 20, 30]);
    }
}
