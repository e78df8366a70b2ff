use std::time::Instant;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;

use crate::error::Result;
use crate::log;
use crate::nonanticipativity;
use crate::planning::{Optimization, PlanningModel, Variable};
use crate::realization::{AvailabilityRealization, DemandRealization, Realization};
use crate::solver::Solver;
use crate::utils;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RollingSettings {
    pub num_replications: usize,
    pub seed: u64,
    /// Growth rate of the purchase weights in the non-anticipativity pass.
    /// Zero disables the pass.
    pub epsilon: f64,
    pub demand: DemandRealization,
    pub availability: AvailabilityRealization,
}

/// What happened to a product in one executed period
#[derive(Clone, Debug, PartialEq)]
pub struct ProductStep {
    pub product: usize,
    pub period: usize,
    pub demand: f64,
    pub production: f64,
    pub sales: f64,
    /// Stock carried into the next period
    pub inventory: f64,
}

/// What happened to a secondary factor in one executed period
#[derive(Clone, Debug, PartialEq)]
pub struct FactorStep {
    pub factor: usize,
    pub period: usize,
    pub availability: f64,
    pub secondary: f64,
    pub primary: f64,
    /// Stock carried into the next period
    pub stock: f64,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct ReplicationOutcome {
    pub replication: usize,
    /// Sales revenue minus production and holding costs
    pub product_margin: f64,
    pub factor_cost: f64,
    pub products: Vec<ProductStep>,
    pub factors: Vec<FactorStep>,
    /// Solves stopped by the time limit at a feasible incumbent
    pub unproven_solves: usize,
}

impl ReplicationOutcome {
    pub fn margin(&self) -> f64 {
        self.product_margin - self.factor_cost
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RollingSummary {
    pub outcomes: Vec<ReplicationOutcome>,
    pub mean: f64,
    pub std: f64,
}

impl RollingSummary {
    pub fn new(outcomes: Vec<ReplicationOutcome>) -> Self {
        let margins: Vec<f64> = outcomes.iter().map(|o| o.margin()).collect();
        Self {
            mean: utils::mean(&margins),
            std: utils::std_dev(&margins),
            outcomes,
        }
    }
}

/// Runs `step` on the model and restores it afterwards, whether the step
/// succeeded or not. An error of the step takes precedence over an error
/// of the restore.
pub fn with_restore<S: Solver, T>(
    planning: &mut PlanningModel<S>,
    step: impl FnOnce(&mut PlanningModel<S>) -> Result<T>,
) -> Result<T> {
    let result = step(planning);
    let restored = planning.restore();
    let value = result?;
    restored?;
    Ok(value)
}

/// Solves the current model, followed by the non-anticipativity pass when
/// `epsilon` is positive
fn solve_step<S: Solver>(
    planning: &mut PlanningModel<S>,
    epsilon: f64,
    period: usize,
) -> Result<Optimization> {
    let optimization = planning.optimize()?;
    if epsilon > 0.0 {
        let second =
            nonanticipativity::reoptimize(planning, optimization.objective, epsilon, period)?;
        return Ok(Optimization {
            objective: second.objective,
            proven_optimal: optimization.proven_optimal && second.proven_optimal,
        });
    }
    Ok(optimization)
}

fn fix_products<S: Solver>(
    planning: &mut PlanningModel<S>,
    period: usize,
    demand: &DemandRealization,
    rng: &mut Xoshiro256Plus,
    outcome: &mut ReplicationOutcome,
) -> Result<()> {
    for j in 0..planning.system.meta.products_count {
        let inventory = planning.value(Variable::Inventory, j, period, 0).max(0.0);
        let production = planning.value(Variable::Production, j, period, 0).max(0.0);
        let product = &planning.system.products[j];
        let (price, production_cost, holding_cost) =
            (product.price, product.production_cost, product.holding_cost);
        let realized_demand = demand.realize(product.demand[period], rng);
        let sales = (inventory + production).min(realized_demand);
        let next_inventory = (inventory + production - sales).max(0.0);

        planning.pin_variable(Variable::Inventory, j, period, 0, inventory)?;
        planning.pin_variable(Variable::Production, j, period, 0, production)?;
        planning.pin_variable(Variable::Sales, j, period, 0, sales)?;
        planning.pin_variable(Variable::Inventory, j, period + 1, 0, next_inventory)?;

        outcome.product_margin +=
            price * sales - production_cost * production - holding_cost * next_inventory;
        outcome.products.push(ProductStep {
            product: j,
            period,
            demand: realized_demand,
            production,
            sales,
            inventory: next_inventory,
        });
    }
    Ok(())
}

fn fix_factors<S: Solver>(
    planning: &mut PlanningModel<S>,
    period: usize,
    availability: &AvailabilityRealization,
    rng: &mut Xoshiro256Plus,
    outcome: &mut ReplicationOutcome,
) -> Result<()> {
    let num_periods = planning.num_periods();
    let production: Vec<Vec<f64>> = (0..planning.system.meta.products_count)
        .map(|j| {
            (0..num_periods)
                .map(|t| planning.value(Variable::Production, j, t, 0).max(0.0))
                .collect()
        })
        .collect();
    let executed: Vec<f64> = production.iter().map(|y| y[period]).collect();

    for i in 0..planning.system.meta.secondary_factors_count {
        let factor = &planning.system.secondary_factors[i];
        let (secondary_cost, primary_cost) = (factor.secondary_cost, factor.primary_cost);
        let consumption = factor.consumption(&executed);
        let realized_availability = availability.realize(factor.availability[period], rng);
        let stock = planning.mean_value(Variable::Stock, i, period).max(0.0);
        let planned = planning.mean_value(Variable::Secondary, i, period).max(0.0);
        let remaining = planning.system.remaining_requirement(i, period, &production);

        let secondary = planned
            .min(realized_availability)
            .min((remaining - stock).max(0.0));
        let primary = (consumption - stock - secondary).max(0.0);
        let next_stock = (stock + secondary + primary - consumption).max(0.0);

        for l in 0..planning.num_scenarios() {
            planning.pin_variable(Variable::Stock, i, period, l, stock)?;
            planning.pin_variable(Variable::Secondary, i, period, l, secondary)?;
            planning.pin_variable(Variable::Primary, i, period, l, primary)?;
            planning.pin_variable(Variable::Stock, i, period + 1, l, next_stock)?;
        }

        outcome.factor_cost += secondary_cost * secondary + primary_cost * primary;
        outcome.factors.push(FactorStep {
            factor: i,
            period,
            availability: realized_availability,
            secondary,
            primary,
            stock: next_stock,
        });
    }
    Ok(())
}

/// Executes one replication over the whole horizon. The model is reset
/// before the first period and restored after the last one.
pub fn run_replication<S: Solver>(
    planning: &mut PlanningModel<S>,
    settings: &RollingSettings,
    replication: usize,
) -> Result<ReplicationOutcome> {
    planning.restore()?;
    with_restore(planning, |planning| {
        let mut rng = Xoshiro256Plus::seed_from_u64(settings.seed + replication as u64);
        let mut outcome = ReplicationOutcome {
            replication,
            ..Default::default()
        };
        for period in 0..planning.num_periods() {
            let optimization = solve_step(planning, settings.epsilon, period)?;
            if !optimization.proven_optimal {
                outcome.unproven_solves += 1;
            }
            fix_products(planning, period, &settings.demand, &mut rng, &mut outcome)?;
            fix_factors(planning, period, &settings.availability, &mut rng, &mut outcome)?;
            planning.registry.remove_period(&mut planning.model, period)?;
        }
        Ok(outcome)
    })
}

/// Runs every replication in sequence on the same model
pub fn evaluate<S: Solver>(
    planning: &mut PlanningModel<S>,
    settings: &RollingSettings,
) -> Result<RollingSummary> {
    log::rolling_greeting(settings.num_replications, planning.num_periods());
    log::rolling_table_divider();
    log::rolling_table_header();
    log::rolling_table_divider();
    let begin = Instant::now();
    let mut outcomes = Vec::with_capacity(settings.num_replications);
    for replication in 0..settings.num_replications {
        let start = Instant::now();
        let outcome = run_replication(planning, settings, replication)?;
        log::rolling_table_row(
            replication,
            outcome.margin(),
            outcome.unproven_solves,
            start.elapsed(),
        );
        outcomes.push(outcome);
    }
    log::rolling_table_divider();
    let summary = RollingSummary::new(outcomes);
    log::margin_stats(summary.mean, summary.std);
    log::rolling_duration(begin.elapsed());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::ConstraintKind;
    use crate::error::PlanningError;
    use crate::planning::PlanningSettings;
    use crate::scenario::{ScenarioGenerator, ScenarioSet};
    use crate::solver::{self, HighsModelStatus, Problem, Sense, SolveOutcome, SolverOptions};
    use crate::system::{FixedFactor, Product, SecondaryFactor, System};

    /// Solves with HiGHS but reports every solve as stopped by the time
    /// limit at a feasible incumbent
    #[derive(Debug)]
    struct TimeLimited(solver::Model);

    impl Solver for TimeLimited {
        fn from_problem(problem: Problem, sense: Sense) -> Result<Self> {
            Ok(Self(solver::Model::from_problem(problem, sense)?))
        }
        fn num_cols(&self) -> usize {
            Solver::num_cols(&self.0)
        }
        fn num_rows(&self) -> usize {
            Solver::num_rows(&self.0)
        }
        fn add_row(&mut self, lower: f64, upper: f64, factors: &[(usize, f64)]) -> Result<usize> {
            self.0.add_row(lower, upper, factors)
        }
        fn delete_rows(&mut self, rows: &[usize]) -> Result<()> {
            self.0.delete_rows(rows)
        }
        fn col_bounds(&self, col: usize) -> (f64, f64) {
            self.0.col_bounds(col)
        }
        fn change_col_bounds(&mut self, col: usize, lower: f64, upper: f64) -> Result<()> {
            self.0.change_col_bounds(col, lower, upper)
        }
        fn costs(&self) -> &[f64] {
            self.0.costs()
        }
        fn change_costs(&mut self, costs: &[f64]) -> Result<()> {
            self.0.change_costs(costs)
        }
        fn sense(&self) -> Sense {
            self.0.sense()
        }
        fn set_sense(&mut self, sense: Sense) -> Result<()> {
            self.0.set_sense(sense)
        }
        fn set_integer(&mut self, col: usize) -> Result<()> {
            self.0.set_integer(col)
        }
        fn apply_options(&mut self, options: &SolverOptions) {
            self.0.apply_options(options)
        }
        fn solve(&mut self) -> Result<SolveOutcome> {
            self.0.solve()?;
            Ok(SolveOutcome {
                status: HighsModelStatus::ReachedTimeLimit,
                proven_optimal: false,
            })
        }
        fn col_values(&self) -> Vec<f64> {
            self.0.col_values()
        }
        fn objective_value(&self) -> f64 {
            self.0.objective_value()
        }
    }

    fn deterministic_settings(epsilon: f64) -> RollingSettings {
        RollingSettings {
            num_replications: 1,
            seed: 0,
            epsilon,
            demand: DemandRealization::Deterministic,
            availability: AvailabilityRealization::Deterministic,
        }
    }

    fn stochastic_settings() -> RollingSettings {
        RollingSettings {
            num_replications: 3,
            seed: 17,
            epsilon: 0.1,
            demand: DemandRealization::UniformShift { low: -2, high: 2 },
            availability: AvailabilityRealization::default(),
        }
    }

    fn toy_model() -> PlanningModel {
        let system = System::default();
        let scenarios = ScenarioSet::expected(&system);
        PlanningModel::build(&system, &scenarios, &PlanningSettings::default()).unwrap()
    }

    fn stochastic_model() -> PlanningModel {
        let products = vec![
            Product::new(0, 130.0, 12.0, 1.5, 3.0, vec![6.0, 4.0, 5.0]),
            Product::new(1, 145.0, 18.0, 0.8, 4.0, vec![5.0, 7.0, 3.0]),
        ];
        let secondary = vec![SecondaryFactor::new(
            0,
            vec![2.0, 3.0],
            20.0,
            6.0,
            40.0,
            vec![15.0, 25.0, 20.0],
        )];
        let fixed = vec![FixedFactor::new(0, vec![4.0, 5.0], vec![60.0, 55.0, 70.0])];
        let system = System::new(3, products, secondary, fixed);
        let scenarios = ScenarioGenerator::new(4, true, AvailabilityRealization::default())
            .generate(&system, 111);
        PlanningModel::build(&system, &scenarios, &PlanningSettings::default()).unwrap()
    }

    #[test]
    fn test_deterministic_toy_realizes_planned_margin() {
        let mut model = toy_model();
        let outcome = run_replication(&mut model, &deterministic_settings(0.0), 0).unwrap();
        assert!((outcome.margin() - 70.0).abs() < 1e-6);
        assert_eq!(outcome.products.len(), 2);
        for step in outcome.factors.iter() {
            assert!((step.secondary - 5.0).abs() < 1e-6);
            assert!(step.primary.abs() < 1e-6);
        }
    }

    #[test]
    fn test_deterministic_toy_with_nonanticipativity() {
        let mut model = toy_model();
        let outcome = run_replication(&mut model, &deterministic_settings(0.1), 0).unwrap();
        assert!((outcome.margin() - 70.0).abs() < 1e-6);
    }

    #[test]
    fn test_time_limited_solves_are_accepted_and_counted() {
        let system = System::default();
        let scenarios = ScenarioSet::expected(&system);
        let mut model: PlanningModel<TimeLimited> =
            PlanningModel::build(&system, &scenarios, &PlanningSettings::default()).unwrap();
        let initial = model.snapshot();
        for epsilon in [0.0, 0.1] {
            let outcome =
                run_replication(&mut model, &deterministic_settings(epsilon), 0).unwrap();
            assert_eq!(outcome.unproven_solves, system.num_periods);
            assert!((outcome.margin() - 70.0).abs() < 1e-6);
            assert_eq!(model.snapshot(), initial);
        }
    }

    #[test]
    fn test_restore_returns_to_initial_structure() {
        let mut model = stochastic_model();
        let initial = model.snapshot();
        run_replication(&mut model, &stochastic_settings(), 0).unwrap();
        assert_eq!(model.snapshot(), initial);
        run_replication(&mut model, &stochastic_settings(), 1).unwrap();
        assert_eq!(model.snapshot(), initial);
    }

    #[test]
    fn test_same_seeds_same_outcomes() {
        let settings = stochastic_settings();
        let mut model = stochastic_model();
        let first = evaluate(&mut model, &settings).unwrap();
        let second = evaluate(&mut model, &settings).unwrap();
        assert_eq!(first.outcomes.len(), 3);
        for (a, b) in first.outcomes.iter().zip(second.outcomes.iter()) {
            assert!((a.margin() - b.margin()).abs() < 1e-6);
            assert_eq!(a.products.len(), b.products.len());
            for (x, y) in a.factors.iter().zip(b.factors.iter()) {
                assert_eq!(x.availability, y.availability);
            }
        }
    }

    #[test]
    fn test_executed_trajectory_balances() {
        let mut model = stochastic_model();
        let outcome = run_replication(&mut model, &stochastic_settings(), 2).unwrap();
        for j in 0..2 {
            let mut stock = model.system.products[j].initial_inventory;
            for step in outcome.products.iter().filter(|s| s.product == j) {
                assert!(step.sales <= step.demand + 1e-9);
                assert!((step.inventory - (stock + step.production - step.sales)).abs() < 1e-6);
                stock = step.inventory;
            }
        }
        for step in outcome.factors.iter() {
            assert!(step.stock >= 0.0);
            assert!(step.secondary <= step.availability + 1e-9);
        }
    }

    #[test]
    fn test_failed_step_still_restores() {
        let mut model = toy_model();
        let initial = model.snapshot();
        let result: Result<()> = with_restore(&mut model, |planning| {
            planning.registry.remove_period(&mut planning.model, 0)?;
            planning.pin_variable(Variable::Production, 0, 1, 0, 2.0)?;
            planning.registry.remove_period(&mut planning.model, 0)?;
            Ok(())
        });
        assert!(matches!(result, Err(PlanningError::ConstraintLifecycle { .. })));
        assert_eq!(model.snapshot(), initial);
        assert!(model
            .registry
            .active_keys()
            .iter()
            .all(|k| k.kind != ConstraintKind::NonAnticipativity));
    }
}
