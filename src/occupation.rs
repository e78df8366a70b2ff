use crate::error::Result;
use crate::solver::{Model, Problem, Sense, Solver, SolverOptions};
use crate::transition::{InventoryProblem, TransitionModel};

/// Occupations below this value are treated as zero
pub const OCCUPATION_THRESHOLD: f64 = 1e-10;

/// Column bookkeeping: the (state, action) pair of every sigma column
#[derive(Clone, Debug, Default)]
pub struct OccupationColumns {
    pub pairs: Vec<(i64, usize)>,
    pub supply: Vec<f64>,
}

/// The ordering decision of one state
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyEntry {
    pub inventory: i64,
    pub order: usize,
    pub probability: f64,
}

/// Long-run averages of the optimal policy
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolicyMetrics {
    pub expected_cost: f64,
    pub expected_inventory: f64,
    pub max_inventory: i64,
    pub expected_shortage: f64,
    pub max_shortage: i64,
    pub expected_order: f64,
    pub expected_supply: f64,
}

#[derive(Clone, Debug)]
pub struct MdpSolution {
    pub objective: f64,
    pub occupation: Vec<f64>,
    pub policy: Vec<PolicyEntry>,
    pub metrics: PolicyMetrics,
    pub proven_optimal: bool,
}

/// Sparse Bellman rows: for each next state, the merged (column, factor)
/// entries
fn balance_rows(
    problem: &InventoryProblem,
    transitions: &TransitionModel,
    columns: &OccupationColumns,
) -> Vec<Vec<(usize, f64)>> {
    let n = problem.num_states();
    let mut dense: Vec<Vec<f64>> = vec![vec![0.0; columns.pairs.len()]; n];
    for (col, &(x, q)) in columns.pairs.iter().enumerate() {
        dense[problem.state_index(x)][col] += 1.0;
        for (next, p) in transitions.transition_row(x, q).iter().enumerate() {
            dense[next][col] -= p;
        }
    }
    dense
        .into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .filter(|(_, f)| *f != 0.0)
                .collect()
        })
        .collect()
}

/// Builds the occupation-measure LP: one column per feasible pair, the
/// normalisation row and one balance row per state.
pub fn build_problem(
    problem: &InventoryProblem,
) -> Result<(Problem, OccupationColumns, Vec<Vec<(usize, f64)>>)> {
    let transitions = problem.transitions()?;
    let mut pb = Problem::new();
    let mut columns = OccupationColumns::default();
    for x in problem.states() {
        for q in problem.actions(x) {
            pb.add_column(transitions.reward(x, q), 0.0..);
            columns.pairs.push((x, q));
            columns.supply.push(transitions.expected_supply(q));
        }
    }
    let normalization: Vec<(usize, f64)> =
        (0..columns.pairs.len()).map(|col| (col, 1.0)).collect();
    pb.add_row(1.0..=1.0, &normalization);
    let balance = balance_rows(problem, &transitions, &columns);
    for row in balance.iter() {
        pb.add_row(0.0..=0.0, row);
    }
    Ok((pb, columns, balance))
}

/// Per state, the action with the largest positive occupation. The first
/// maximum in increasing q wins ties. States never visited report their
/// smallest feasible action with probability zero.
pub fn extract_policy(
    problem: &InventoryProblem,
    columns: &OccupationColumns,
    occupation: &[f64],
) -> Vec<PolicyEntry> {
    let mut policy: Vec<PolicyEntry> = problem
        .states()
        .map(|x| PolicyEntry {
            inventory: x,
            order: problem.actions(x).next().unwrap_or(0),
            probability: 0.0,
        })
        .collect();
    for (col, &(x, q)) in columns.pairs.iter().enumerate() {
        let sigma = occupation[col];
        let entry = &mut policy[problem.state_index(x)];
        if sigma > OCCUPATION_THRESHOLD && sigma > entry.probability {
            entry.order = q;
            entry.probability = sigma;
        }
    }
    policy
}

/// Linear functionals of the occupation measure
pub fn evaluate_metrics(
    problem: &InventoryProblem,
    columns: &OccupationColumns,
    occupation: &[f64],
    objective: f64,
) -> PolicyMetrics {
    let mut state_mass = vec![0.0; problem.num_states()];
    let mut metrics = PolicyMetrics {
        expected_cost: -objective,
        ..Default::default()
    };
    for (col, &(x, q)) in columns.pairs.iter().enumerate() {
        let sigma = occupation[col];
        state_mass[problem.state_index(x)] += sigma;
        metrics.expected_order += q as f64 * sigma;
        metrics.expected_supply += columns.supply[col] * sigma;
    }
    for x in problem.states() {
        let mass = state_mass[problem.state_index(x)];
        let visited = mass > OCCUPATION_THRESHOLD;
        if x > 0 {
            metrics.expected_inventory += x as f64 * mass;
        } else if x < 0 {
            metrics.expected_shortage += -x as f64 * mass;
        }
        if visited && x >= 0 {
            metrics.max_inventory = metrics.max_inventory.max(x);
        }
        if visited && x < 0 {
            metrics.max_shortage = metrics.max_shortage.max(-x);
        }
    }
    metrics
}

/// Largest violation of the normalisation and balance rows at a solution
pub fn balance_residuals(
    balance: &[Vec<(usize, f64)>],
    occupation: &[f64],
) -> f64 {
    let total: f64 = occupation.iter().sum();
    balance
        .iter()
        .map(|row| row.iter().map(|(col, f)| f * occupation[*col]).sum::<f64>().abs())
        .fold((total - 1.0).abs(), f64::max)
}

/// Builds, solves and post-processes the occupation LP
pub fn solve(
    problem: &InventoryProblem,
    options: &SolverOptions,
) -> Result<MdpSolution> {
    let (pb, columns, _) = build_problem(problem)?;
    let mut model = Model::from_problem(pb, Sense::Maximise)?;
    model.apply_options(options);
    let outcome = model.solve()?;
    let occupation = model.col_values();
    let objective = model.objective_value();
    let policy = extract_policy(problem, &columns, &occupation);
    let metrics = evaluate_metrics(problem, &columns, &occupation, objective);
    Ok(MdpSolution {
        objective,
        occupation,
        policy,
        metrics,
        proven_optimal: outcome.proven_optimal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probability::Distribution;

    fn problem() -> InventoryProblem {
        InventoryProblem {
            d_max: 4,
            x_max: 6,
            y_max: 5,
            unit_cost: 1.0,
            holding_cost: 0.5,
            fixed_cost: 2.0,
            shortage_cost: 8.0,
            demand: Distribution::Binomial { p: 0.5 },
            availability: Distribution::DiscretizedNormal {
                mu: 3.0,
                sigma: 1.0,
            },
        }
    }

    #[test]
    fn test_merged_rows_have_unique_columns() {
        let (pb, columns, balance) = build_problem(&problem()).unwrap();
        assert_eq!(pb.num_col, columns.pairs.len());
        assert_eq!(pb.num_row, problem().num_states() + 1);
        for row in balance.iter() {
            let mut cols: Vec<usize> = row.iter().map(|(c, _)| *c).collect();
            let n = cols.len();
            cols.dedup();
            assert_eq!(cols.len(), n);
        }
    }

    #[test]
    fn test_occupation_is_a_stationary_distribution() {
        let pb = problem();
        let solution = solve(&pb, &SolverOptions::default()).unwrap();
        let (_, _, balance) = build_problem(&pb).unwrap();
        assert!(balance_residuals(&balance, &solution.occupation) < 1e-6);
        assert!(solution.metrics.expected_cost > 0.0);
        assert_eq!(solution.policy.len(), pb.num_states());
    }

    #[test]
    fn test_no_demand_no_supply_orders_nothing() {
        let mut pb = problem();
        pb.d_max = 0;
        pb.y_max = 0;
        let solution = solve(&pb, &SolverOptions::default()).unwrap();
        assert!(solution.policy.iter().all(|e| e.order == 0));
        assert!(solution.metrics.expected_order.abs() < 1e-9);
        assert!(solution.metrics.expected_supply.abs() < 1e-9);
        // all mass stays at zero inventory, where holding is free
        assert!(solution.metrics.expected_cost.abs() < 1e-7);
    }

    #[test]
    fn test_tie_break_prefers_smallest_order() {
        let pb = problem();
        let columns = OccupationColumns {
            pairs: vec![(0, 0), (0, 1), (0, 2)],
            supply: vec![0.0; 3],
        };
        let policy = extract_policy(&pb, &columns, &[0.0, 0.3, 0.3]);
        let entry = &policy[pb.state_index(0)];
        assert_eq!(entry.order, 1);
        assert_eq!(entry.probability, 0.3);
        let unvisited = &policy[pb.state_index(1)];
        assert_eq!((unvisited.order, unvisited.probability), (0, 0.0));
    }
}
