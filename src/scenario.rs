use rand::prelude::*;
use rand_xoshiro::Xoshiro256Plus;

use crate::realization::{AvailabilityRealization, Realization};
use crate::system::System;

/// Sampled secondary-material availabilities, indexed as
/// `availability[factor][period][scenario]`
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSet {
    pub num_scenarios: usize,
    pub availability: Vec<Vec<Vec<f64>>>,
}

impl ScenarioSet {
    /// A single scenario holding the expected availabilities
    pub fn expected(system: &System) -> Self {
        let availability = system
            .secondary_factors
            .iter()
            .map(|f| f.availability.iter().map(|a| vec![*a]).collect())
            .collect();
        Self {
            num_scenarios: 1,
            availability,
        }
    }

    pub fn get(&self, factor: usize, period: usize, scenario: usize) -> f64 {
        self.availability[factor][period][scenario]
    }
}

pub struct ScenarioGenerator {
    pub num_scenarios: usize,
    /// Mirror the second half of the samples around the expected value
    pub antithetic: bool,
    pub realization: AvailabilityRealization,
}

impl ScenarioGenerator {
    pub fn new(
        num_scenarios: usize,
        antithetic: bool,
        realization: AvailabilityRealization,
    ) -> Self {
        Self {
            num_scenarios,
            antithetic,
            realization,
        }
    }

    /// Samples the availability scenarios of every secondary factor.
    /// With a single scenario the expected availabilities are used.
    pub fn generate(&self, system: &System, seed: u64) -> ScenarioSet {
        if self.num_scenarios <= 1 {
            return ScenarioSet::expected(system);
        }
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let q = self.num_scenarios;
        let half = q / 2;
        let availability = system
            .secondary_factors
            .iter()
            .map(|factor| {
                factor
                    .availability
                    .iter()
                    .map(|expected| {
                        let mut samples: Vec<f64> = (0..q)
                            .map(|_| self.realization.realize(*expected, &mut rng))
                            .collect();
                        if self.antithetic {
                            for l in half..q {
                                samples[l] = (2.0 * expected - samples[l - half]).max(0.0);
                            }
                        }
                        samples
                    })
                    .collect()
            })
            .collect();
        ScenarioSet {
            num_scenarios: q,
            availability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_scenario_uses_expected_values() {
        let system = System::default();
        let generator =
            ScenarioGenerator::new(1, true, AvailabilityRealization::default());
        let set = generator.generate(&system, 0);
        assert_eq!(set.num_scenarios, 1);
        assert_eq!(set.get(0, 1, 0), 5.0);
    }

    #[test]
    fn test_antithetic_pairs_average_to_expected() {
        let system = System::default();
        let generator =
            ScenarioGenerator::new(6, true, AvailabilityRealization::default());
        let set = generator.generate(&system, 111);
        for t in 0..2 {
            for l in 0..3 {
                let pair = set.get(0, t, l) + set.get(0, t, l + 3);
                assert_eq!(pair, 10.0);
            }
        }
    }

    #[test]
    fn test_generation_is_reproducible() {
        let system = System::default();
        let generator =
            ScenarioGenerator::new(4, false, AvailabilityRealization::default());
        assert_eq!(generator.generate(&system, 5), generator.generate(&system, 5));
    }
}
