use std::time::Instant;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;

use crate::log;
use crate::planning::Plan;
use crate::realization::{AvailabilityRealization, DemandRealization, Realization};
use crate::system::System;
use crate::utils;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationSettings {
    pub num_simulations: usize,
    pub seed: u64,
    pub demand: DemandRealization,
    pub availability: AvailabilityRealization,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SimulationOutcome {
    pub replication: usize,
    pub product_margin: f64,
    pub factor_cost: f64,
    /// Demand that could not be served
    pub lost_sales: f64,
    pub primary_purchases: f64,
}

impl SimulationOutcome {
    pub fn margin(&self) -> f64 {
        self.product_margin - self.factor_cost
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationSummary {
    pub outcomes: Vec<SimulationOutcome>,
    pub mean: f64,
    pub std: f64,
}

/// Replays the plan once with the random source of `replication`
pub fn simulate_replication(
    system: &System,
    plan: &Plan,
    settings: &SimulationSettings,
    replication: usize,
) -> SimulationOutcome {
    let mut rng = Xoshiro256Plus::seed_from_u64(settings.seed + replication as u64 + 1);
    let mut outcome = SimulationOutcome {
        replication,
        ..Default::default()
    };
    let mut inventory: Vec<f64> = system.products.iter().map(|p| p.initial_inventory).collect();
    let mut stock: Vec<f64> = system
        .secondary_factors
        .iter()
        .map(|f| f.initial_inventory)
        .collect();

    for t in 0..system.num_periods {
        for (j, product) in system.products.iter().enumerate() {
            let production = plan.production[j][t];
            let demand = settings.demand.realize(product.demand[t], &mut rng);
            let sales = (inventory[j] + production).min(demand);
            inventory[j] = (inventory[j] + production - sales).max(0.0);
            outcome.lost_sales += demand - sales;
            outcome.product_margin += product.price * sales
                - product.production_cost * production
                - product.holding_cost * inventory[j];
        }
        let executed: Vec<f64> = plan.production.iter().map(|y| y[t]).collect();
        for (i, factor) in system.secondary_factors.iter().enumerate() {
            let availability = settings.availability.realize(factor.availability[t], &mut rng);
            let remaining = system.remaining_requirement(i, t, &plan.production);
            let consumption = factor.consumption(&executed);
            let secondary = if stock[i] + availability <= remaining {
                availability
            } else {
                (remaining - stock[i]).max(0.0)
            };
            let primary = (consumption - stock[i] - secondary).max(0.0);
            stock[i] = (stock[i] + secondary + primary - consumption).max(0.0);
            outcome.primary_purchases += primary;
            outcome.factor_cost +=
                factor.secondary_cost * secondary + factor.primary_cost * primary;
        }
    }
    outcome
}

/// Runs all replications in parallel. The order of the outcomes follows
/// the replication index.
pub fn simulate(system: &System, plan: &Plan, settings: &SimulationSettings) -> SimulationSummary {
    log::simulation_greeting(settings.num_simulations);
    let begin = Instant::now();
    let outcomes: Vec<SimulationOutcome> = (0..settings.num_simulations)
        .into_par_iter()
        .map(|r| simulate_replication(system, plan, settings, r))
        .collect();
    let margins: Vec<f64> = outcomes.iter().map(|o| o.margin()).collect();
    let summary = SimulationSummary {
        mean: utils::mean(&margins),
        std: utils::std_dev(&margins),
        outcomes,
    };
    log::margin_stats(summary.mean, summary.std);
    log::simulation_duration(begin.elapsed());
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::{PlanningModel, PlanningSettings};
    use crate::scenario::ScenarioSet;

    fn toy_plan() -> (System, Plan) {
        let system = System::default();
        let scenarios = ScenarioSet::expected(&system);
        let mut model: PlanningModel =
            PlanningModel::build(&system, &scenarios, &PlanningSettings::default()).unwrap();
        let optimization = model.optimize().unwrap();
        (system, model.plan(optimization.objective))
    }

    #[test]
    fn test_deterministic_simulation_matches_plan() {
        let (system, plan) = toy_plan();
        let settings = SimulationSettings {
            num_simulations: 4,
            seed: 0,
            demand: DemandRealization::Deterministic,
            availability: AvailabilityRealization::Deterministic,
        };
        let summary = simulate(&system, &plan, &settings);
        assert_eq!(summary.outcomes.len(), 4);
        assert!((summary.mean - 70.0).abs() < 1e-6);
        assert!(summary.std.abs() < 1e-9);
        assert!(summary.outcomes.iter().all(|o| o.lost_sales.abs() < 1e-9));
    }

    #[test]
    fn test_parallel_runs_are_reproducible() {
        let (system, plan) = toy_plan();
        let settings = SimulationSettings {
            num_simulations: 16,
            seed: 9,
            demand: DemandRealization::UniformShift { low: -3, high: 3 },
            availability: AvailabilityRealization::default(),
        };
        let a = simulate(&system, &plan, &settings);
        let b = simulate(&system, &plan, &settings);
        assert_eq!(a, b);
        for (r, outcome) in a.outcomes.iter().enumerate() {
            assert_eq!(outcome.replication, r);
            assert_eq!(outcome, &simulate_replication(&system, &plan, &settings, r));
        }
    }

    #[test]
    fn test_scarce_availability_is_covered_by_primary() {
        let (system, plan) = toy_plan();
        let settings = SimulationSettings {
            num_simulations: 1,
            seed: 0,
            demand: DemandRealization::Deterministic,
            availability: AvailabilityRealization::Uniform { scale: 0.0 },
        };
        let outcome = simulate_replication(&system, &plan, &settings, 0);
        // all 10 units of material are bought at the primary price
        assert!((outcome.primary_purchases - 10.0).abs() < 1e-6);
        assert!((outcome.factor_cost - 1000.0).abs() < 1e-6);
    }
}
