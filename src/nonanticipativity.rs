use crate::constraint::{ConstraintKey, ConstraintKind, RowDefinition};
use crate::error::Result;
use crate::planning::{Optimization, PlanningModel, Variable};
use crate::solver::{Sense, Solver};

/// Relative half-width of the band around the pinned profit
pub const PROFIT_TOLERANCE: f64 = 1e-7;

/// Half-width of the band that pins the profit to `optimum`
pub fn profit_band(optimum: f64) -> f64 {
    PROFIT_TOLERANCE * optimum.abs().max(1.0)
}

/// Objective of the re-optimisation: weighted secondary purchase costs
fn purchase_costs<S: Solver>(planning: &PlanningModel<S>, epsilon: f64) -> Vec<f64> {
    let mut costs = vec![0.0; planning.model.num_cols()];
    let weight = 1.0 / planning.num_scenarios() as f64;
    for (i, factor) in planning.system.secondary_factors.iter().enumerate() {
        for t in 0..planning.num_periods() {
            let discount = (1.0 + epsilon).powi(t as i32);
            for l in 0..planning.num_scenarios() {
                let col = planning.accessors.column(Variable::Secondary, i, t, l);
                costs[col] = discount * factor.secondary_cost * weight;
            }
        }
    }
    costs
}

/// Re-solves the model with the profit pinned to `optimum` and the
/// weighted purchase objective, tagging the auxiliary row with `period`.
/// The row is removed and the profit objective restored before returning,
/// also when the solve fails. The returned objective is the profit of the
/// new solution.
pub fn reoptimize<S: Solver>(
    planning: &mut PlanningModel<S>,
    optimum: f64,
    epsilon: f64,
    period: usize,
) -> Result<Optimization> {
    let key = ConstraintKey::new(ConstraintKind::NonAnticipativity, 0, period, None);
    let band = profit_band(optimum);
    let row = RowDefinition::new(optimum - band, optimum + band, planning.profit_factors());
    planning.registry.add(&mut planning.model, key, row)?;

    let outcome = solve_weighted(planning, epsilon);

    let cleanup = planning
        .registry
        .discard(&mut planning.model, key)
        .and_then(|_| planning.restore_objective());
    let optimization = outcome?;
    cleanup?;
    Ok(Optimization {
        objective: planning.profit(),
        proven_optimal: optimization.proven_optimal,
    })
}

fn solve_weighted<S: Solver>(
    planning: &mut PlanningModel<S>,
    epsilon: f64,
) -> Result<Optimization> {
    let costs = purchase_costs(planning, epsilon);
    planning.model.change_costs(&costs)?;
    planning.model.set_sense(Sense::Minimise)?;
    planning.optimize()
}
