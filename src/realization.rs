use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, Result};

pub trait Realization {
    /// Draws the realised value around an expected one. Realised values
    /// are never negative.
    fn realize<R: Rng>(&self, expected: f64, rng: &mut R) -> f64;

    fn validate(&self, field: &str) -> Result<()>;
}

/// How realised demand deviates from the forecast
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DemandRealization {
    /// The forecast is exact
    #[default]
    Deterministic,
    /// Forecast plus an integer shift drawn uniformly from [low, high)
    UniformShift { low: i64, high: i64 },
    /// Forecast plus a centred normal error
    Normal { sigma: f64 },
}

impl Realization for DemandRealization {
    fn realize<R: Rng>(&self, expected: f64, rng: &mut R) -> f64 {
        let value = match *self {
            DemandRealization::Deterministic => expected,
            DemandRealization::UniformShift { low, high } if low < high => {
                expected + rng.random_range(low..high) as f64
            }
            DemandRealization::UniformShift { low, .. } => expected + low as f64,
            DemandRealization::Normal { sigma } => match Normal::new(0.0, sigma) {
                Ok(noise) => expected + noise.sample(rng),
                Err(_) => expected,
            },
        };
        value.max(0.0)
    }

    fn validate(&self, field: &str) -> Result<()> {
        match *self {
            DemandRealization::UniformShift { low, high } if low >= high => {
                Err(PlanningError::configuration(
                    field,
                    format!("empty shift range [{low}, {high})"),
                ))
            }
            DemandRealization::Normal { sigma } if !(sigma > 0.0) => {
                Err(PlanningError::configuration(
                    field,
                    format!("sigma must be positive, got {sigma}"),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// How much secondary material actually shows up
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvailabilityRealization {
    /// The expected availability always shows up
    Deterministic,
    /// An integer drawn uniformly from [0, round(scale * expected)]
    Uniform {
        #[serde(default = "default_scale")]
        scale: f64,
    },
}

fn default_scale() -> f64 {
    2.0
}

impl Default for AvailabilityRealization {
    fn default() -> Self {
        Self::Uniform {
            scale: default_scale(),
        }
    }
}

impl Realization for AvailabilityRealization {
    fn realize<R: Rng>(&self, expected: f64, rng: &mut R) -> f64 {
        match *self {
            AvailabilityRealization::Deterministic => expected.max(0.0),
            AvailabilityRealization::Uniform { scale } => {
                let upper = (scale * expected).round().max(0.0) as u64;
                rng.random_range(0..=upper) as f64
            }
        }
    }

    fn validate(&self, field: &str) -> Result<()> {
        match *self {
            AvailabilityRealization::Uniform { scale } if !(scale >= 0.0) => {
                Err(PlanningError::configuration(
                    field,
                    format!("scale must be non-negative, got {scale}"),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn test_deterministic_policies_return_expected() {
        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        assert_eq!(DemandRealization::Deterministic.realize(5.0, &mut rng), 5.0);
        assert_eq!(
            AvailabilityRealization::Deterministic.realize(7.0, &mut rng),
            7.0
        );
    }

    #[test]
    fn test_uniform_shift_stays_in_range_and_non_negative() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let policy = DemandRealization::UniformShift { low: -5, high: 5 };
        for _ in 0..1000 {
            let d = policy.realize(10.0, &mut rng);
            assert!((5.0..15.0).contains(&d));
            assert!(policy.realize(2.0, &mut rng) >= 0.0);
        }
    }

    #[test]
    fn test_uniform_availability_is_integer_and_bounded() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let policy = AvailabilityRealization::default();
        for _ in 0..1000 {
            let a = policy.realize(4.0, &mut rng);
            assert!((0.0..=8.0).contains(&a));
            assert_eq!(a.fract(), 0.0);
        }
        assert_eq!(policy.realize(0.0, &mut rng), 0.0);
    }

    #[test]
    fn test_same_seed_same_draws() {
        let policy = DemandRealization::Normal { sigma: 2.0 };
        let mut a = Xoshiro256Plus::seed_from_u64(3);
        let mut b = Xoshiro256Plus::seed_from_u64(3);
        let xs: Vec<f64> = (0..10).map(|_| policy.realize(5.0, &mut a)).collect();
        let ys: Vec<f64> = (0..10).map(|_| policy.realize(5.0, &mut b)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_validation() {
        assert!(DemandRealization::UniformShift { low: 3, high: 3 }
            .validate("demand_realization")
            .is_err());
        assert!(DemandRealization::Normal { sigma: 0.0 }
            .validate("demand_realization")
            .is_err());
        assert!(AvailabilityRealization::Uniform { scale: -1.0 }
            .validate("availability_realization")
            .is_err());
    }

    #[test]
    fn test_deserialize_tagged_policy() {
        let policy: AvailabilityRealization =
            serde_json::from_str(r#"{"kind": "uniform"}"#).unwrap();
        assert_eq!(policy, AvailabilityRealization::Uniform { scale: 2.0 });
        let policy: DemandRealization =
            serde_json::from_str(r#"{"kind": "uniform_shift", "low": -5, "high": 5}"#)
                .unwrap();
        assert_eq!(policy, DemandRealization::UniformShift { low: -5, high: 5 });
    }
}
