// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Decay models and the intensity function.
//!
//! Intensity is never stored. It is a pure function of the initial
//! intensity, the last reinforcement instant, and `now`, which keeps the
//! store free of background writers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default decay applied when neither the emit call nor the trail
/// configures one: exponential with a five minute half-life.
pub const DEFAULT_HALF_LIFE_MS: i64 = 300_000;

/// A single point in a step decay schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayStep {
    pub at_ms: i64,
    pub intensity: f64,
}

/// How a pheromone's intensity falls with time.
///
/// Immutable once set on a pheromone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecayModel {
    /// Intensity halves every `half_life_ms`.
    Exponential { half_life_ms: i64 },
    /// Intensity decreases by `rate_per_ms` each millisecond.
    Linear { rate_per_ms: f64 },
    /// Intensity jumps to the value of the greatest step whose `at_ms`
    /// has elapsed. Steps must be sorted ascending by `at_ms`.
    Step { steps: Vec<DecayStep> },
    /// Never decays.
    Immortal,
}

impl Default for DecayModel {
    fn default() -> Self {
        Self::Exponential {
            half_life_ms: DEFAULT_HALF_LIFE_MS,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DecayModelError {
    #[error("half_life_ms must be positive, got {0}")]
    NonPositiveHalfLife(i64),
    #[error("rate_per_ms must be positive, got {0}")]
    NonPositiveRate(f64),
    #[error("step schedule must be non-empty")]
    EmptySteps,
    #[error("step schedule must be sorted ascending by at_ms")]
    UnsortedSteps,
    #[error("step intensity {0} is outside [0, 1]")]
    StepIntensityOutOfRange(f64),
}

impl DecayModel {
    pub fn validate(&self) -> Result<(), DecayModelError> {
        match self {
            Self::Exponential { half_life_ms } if *half_life_ms <= 0 => {
                Err(DecayModelError::NonPositiveHalfLife(*half_life_ms))
            }
            Self::Linear { rate_per_ms } if *rate_per_ms <= 0.0 => {
                Err(DecayModelError::NonPositiveRate(*rate_per_ms))
            }
            Self::Step { steps } => {
                if steps.is_empty() {
                    return Err(DecayModelError::EmptySteps);
                }
                if steps.windows(2).any(|w| w[0].at_ms > w[1].at_ms) {
                    return Err(DecayModelError::UnsortedSteps);
                }
                if let Some(s) = steps
                    .iter()
                    .find(|s| !(0.0..=1.0).contains(&s.intensity))
                {
                    return Err(DecayModelError::StepIntensityOutOfRange(s.intensity));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Intensity after `elapsed_ms` of decay from `initial`.
    ///
    /// Negative elapsed time (clock skew at the boundary) returns the
    /// initial intensity unchanged.
    pub fn intensity_at(&self, initial: f64, elapsed_ms: i64) -> f64 {
        if elapsed_ms <= 0 {
            return initial;
        }
        match self {
            Self::Exponential { half_life_ms } => {
                initial * 0.5_f64.powf(elapsed_ms as f64 / *half_life_ms as f64)
            }
            Self::Linear { rate_per_ms } => (initial - rate_per_ms * elapsed_ms as f64).max(0.0),
            Self::Step { steps } => steps
                .iter()
                .rev()
                .find(|s| elapsed_ms >= s.at_ms)
                .map(|s| s.intensity)
                .unwrap_or(initial),
            Self::Immortal => initial,
        }
    }

    /// Milliseconds until the intensity first drops below `floor`, given
    /// `elapsed_ms` have already passed. Diagnostics only.
    pub fn time_to_floor(&self, initial: f64, floor: f64, elapsed_ms: i64) -> TimeToEvaporation {
        if self.intensity_at(initial, elapsed_ms) < floor {
            return TimeToEvaporation::In(0);
        }
        match self {
            Self::Exponential { half_life_ms } => {
                // initial * 0.5^(t / hl) = floor  =>  t = hl * log2(initial / floor)
                if floor <= 0.0 {
                    return TimeToEvaporation::Never;
                }
                let total = *half_life_ms as f64 * (initial / floor).log2();
                TimeToEvaporation::In((total - elapsed_ms as f64).ceil().max(0.0) as i64)
            }
            Self::Linear { rate_per_ms } => {
                let total = (initial - floor) / rate_per_ms;
                TimeToEvaporation::In((total - elapsed_ms as f64).ceil().max(0.0) as i64 + 1)
            }
            Self::Step { steps } => steps
                .iter()
                .find(|s| s.at_ms > elapsed_ms && s.intensity < floor)
                .map(|s| TimeToEvaporation::In(s.at_ms - elapsed_ms))
                .unwrap_or(TimeToEvaporation::Never),
            Self::Immortal => TimeToEvaporation::Never,
        }
    }
}

/// Result of [`DecayModel::time_to_floor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeToEvaporation {
    Never,
    In(i64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_half_life() {
        let decay = DecayModel::Exponential { half_life_ms: 10_000 };
        assert_eq!(decay.intensity_at(1.0, 0), 1.0);
        assert!((decay.intensity_at(1.0, 10_000) - 0.5).abs() < 0.005);
        assert!((decay.intensity_at(1.0, 20_000) - 0.25).abs() < 0.005);
    }

    #[test]
    fn exponential_is_monotone_non_increasing() {
        let decay = DecayModel::Exponential { half_life_ms: 5_000 };
        let mut prev = f64::MAX;
        for t in (0..60_000).step_by(500) {
            let i = decay.intensity_at(0.9, t);
            assert!(i <= prev, "intensity rose at t={t}");
            prev = i;
        }
    }

    #[test]
    fn linear_hits_zero_and_stays() {
        let decay = DecayModel::Linear { rate_per_ms: 0.001 };
        assert!((decay.intensity_at(1.0, 500) - 0.5).abs() < 1e-9);
        assert_eq!(decay.intensity_at(1.0, 1_000), 0.0);
        assert_eq!(decay.intensity_at(1.0, 10_000), 0.0);
    }

    #[test]
    fn step_picks_greatest_elapsed_step() {
        let decay = DecayModel::Step {
            steps: vec![
                DecayStep { at_ms: 1_000, intensity: 0.5 },
                DecayStep { at_ms: 2_000, intensity: 0.1 },
            ],
        };
        assert_eq!(decay.intensity_at(0.9, 0), 0.9);
        assert_eq!(decay.intensity_at(0.9, 999), 0.9);
        assert_eq!(decay.intensity_at(0.9, 1_000), 0.5);
        assert_eq!(decay.intensity_at(0.9, 5_000), 0.1);
    }

    #[test]
    fn immortal_never_decays() {
        let decay = DecayModel::Immortal;
        assert_eq!(decay.intensity_at(0.7, i64::MAX - 1), 0.7);
        assert_eq!(decay.time_to_floor(0.7, 0.01, 0), TimeToEvaporation::Never);
    }

    #[test]
    fn negative_elapsed_returns_initial() {
        let decay = DecayModel::Exponential { half_life_ms: 1_000 };
        assert_eq!(decay.intensity_at(0.8, -50), 0.8);
    }

    #[test]
    fn time_to_floor_exponential_inverts_decay() {
        let decay = DecayModel::Exponential { half_life_ms: 10_000 };
        // 1.0 -> 0.01 takes log2(100) ~ 6.64 half-lives.
        match decay.time_to_floor(1.0, 0.01, 0) {
            TimeToEvaporation::In(ms) => {
                assert!((ms - 66_439).abs() < 100, "got {ms}");
            }
            other => panic!("expected In, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_bad_models() {
        assert!(DecayModel::Exponential { half_life_ms: 0 }.validate().is_err());
        assert!(DecayModel::Linear { rate_per_ms: -0.1 }.validate().is_err());
        assert!(DecayModel::Step { steps: vec![] }.validate().is_err());
        assert!(DecayModel::Step {
            steps: vec![
                DecayStep { at_ms: 2_000, intensity: 0.5 },
                DecayStep { at_ms: 1_000, intensity: 0.1 },
            ],
        }
        .validate()
        .is_err());
        assert!(DecayModel::default().validate().is_ok());
    }

    #[test]
    fn serde_round_trips_the_wire_shape() {
        let json = r#"{"type":"exponential","half_life_ms":10000}"#;
        let decay: DecayModel = serde_json::from_str(json).unwrap();
        assert_eq!(decay, DecayModel::Exponential { half_life_ms: 10_000 });
        assert_eq!(serde_json::to_string(&decay).unwrap(), json);

        let json = r#"{"type":"immortal"}"#;
        let decay: DecayModel = serde_json::from_str(json).unwrap();
        assert_eq!(decay, DecayModel::Immortal);
    }
}
