pub mod constraint;
pub mod error;
pub mod input;
mod log;
pub mod nonanticipativity;
pub mod occupation;
pub mod output;
pub mod planning;
pub mod probability;
pub mod realization;
pub mod rolling;
pub mod scenario;
pub mod simulation;
pub mod solver;
pub mod system;
pub mod transition;
pub mod utils;

use std::time::Instant;

use anyhow::Context;

use error::PlanningError;
use input::{Config, Input, NamedInstance};
use output::SummaryOutput;
use planning::{Optimization, Plan, PlanningModel};
use rolling::RollingSummary;
use simulation::SimulationSummary;

/// Everything computed for one planning instance. The `_na` studies use
/// the non-anticipativity re-optimisation and only run when epsilon is
/// positive.
pub struct InstanceResults {
    pub optimization: Optimization,
    pub plan: Plan,
    pub plan_na: Option<Plan>,
    pub simulation: Option<SimulationSummary>,
    pub simulation_na: Option<SimulationSummary>,
    pub rolling: Option<RollingSummary>,
    pub rolling_na: Option<RollingSummary>,
}

impl InstanceResults {
    pub fn summary(&self, name: &str) -> Vec<SummaryOutput> {
        let mut rows = vec![
            SummaryOutput::new(name, "planned_margin", self.optimization.objective),
            SummaryOutput::new(
                name,
                "proven_optimal",
                if self.optimization.proven_optimal { 1.0 } else { 0.0 },
            ),
            SummaryOutput::new(
                name,
                "service_level",
                self.plan.service_levels().overall,
            ),
        ];
        if let Some(plan) = &self.plan_na {
            rows.push(SummaryOutput::new(name, "planned_na_margin", plan.objective));
            rows.push(SummaryOutput::new(
                name,
                "service_level_na",
                plan.service_levels().overall,
            ));
        }
        let studies = [
            ("simulated", self.simulation.as_ref().map(|s| (s.mean, s.std))),
            ("simulated_na", self.simulation_na.as_ref().map(|s| (s.mean, s.std))),
            ("rolling", self.rolling.as_ref().map(|r| (r.mean, r.std))),
            ("rolling_na", self.rolling_na.as_ref().map(|r| (r.mean, r.std))),
        ];
        for (study, stats) in studies {
            if let Some((mean, std)) = stats {
                rows.push(SummaryOutput::new(name, &format!("{study}_margin_mean"), mean));
                rows.push(SummaryOutput::new(name, &format!("{study}_margin_std"), std));
            }
        }
        rows
    }
}

/// Builds and solves the planning model of an instance, then compares four
/// studies: simulation of the plan, simulation of the plan smoothed under
/// non-anticipativity, rolling horizon without and with the
/// non-anticipativity pass
pub fn solve_instance(
    name: &str,
    system: &system::System,
    config: &Config,
) -> error::Result<InstanceResults> {
    let scenarios = config.scenario_generator().generate(system, config.seed);
    log::instance_greeting(name, system.num_periods, scenarios.num_scenarios);
    let mut model: PlanningModel =
        PlanningModel::build(system, &scenarios, &config.planning_settings())?;
    let optimization = model.optimize()?;
    let plan = model.plan(optimization.objective);
    log::plan_result(
        optimization.objective,
        optimization.proven_optimal,
        plan.service_levels().overall,
    );

    let plan_na = if config.epsilon > 0.0 {
        let smoothed = nonanticipativity::reoptimize(
            &mut model,
            optimization.objective,
            config.epsilon,
            0,
        )?;
        log::smoothed_plan_result(smoothed.objective, config.epsilon);
        Some(model.plan(smoothed.objective))
    } else {
        None
    };

    let simulate = |plan: &Plan| {
        (config.num_simulations > 0)
            .then(|| simulation::simulate(system, plan, &config.simulation_settings()))
    };
    let simulation = simulate(&plan);
    let simulation_na = plan_na.as_ref().and_then(simulate);

    let (rolling, rolling_na) = match config.num_rolling_replications {
        0 => (None, None),
        _ => {
            let rolling = rolling::evaluate(&mut model, &config.rolling_settings(0.0))?;
            let rolling_na = match config.epsilon > 0.0 {
                true => Some(rolling::evaluate(
                    &mut model,
                    &config.rolling_settings(config.epsilon),
                )?),
                false => None,
            };
            (Some(rolling), rolling_na)
        }
    };

    Ok(InstanceResults {
        optimization,
        plan,
        plan_na,
        simulation,
        simulation_na,
        rolling,
        rolling_na,
    })
}

/// Solves every instance in turn. Infeasible instances are logged and
/// left out of the results; any other error stops the sweep.
pub fn plan_instances(
    instances: &[NamedInstance],
    config: &Config,
) -> anyhow::Result<Vec<(String, InstanceResults)>> {
    let mut solved = Vec::with_capacity(instances.len());
    for named in instances.iter() {
        match solve_instance(&named.name, &named.system, config) {
            Ok(results) => solved.push((named.name.clone(), results)),
            Err(e @ PlanningError::Infeasible { .. }) => {
                log::instance_skipped(&named.name, &e.to_string());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Error while planning {}", named.name))
            }
        }
    }
    Ok(solved)
}

pub fn run(input_args: &InputArgs) -> anyhow::Result<()> {
    log::show_greeting();

    let begin = Instant::now();
    let input = Input::build(&input_args.path)?;
    let config = &input.config;
    log::input_reading_line(&input.path);

    let mut summary: Vec<SummaryOutput> = vec![];
    for (name, results) in plan_instances(&input.instances, config)?.iter() {
        let path = input.path.join(name);
        log::output_generation_line(&path);
        output::generate_outputs(name, results, &path)?;
        summary.extend(results.summary(name));
    }

    if let Some(problem) = &input.inventory {
        let num_columns: usize = problem.states().map(|x| problem.actions(x).count()).sum();
        log::mdp_greeting(problem.num_states(), num_columns);
        let solution = occupation::solve(problem, &config.solver_options())?;
        log::mdp_result(solution.metrics.expected_cost, solution.metrics.expected_order);
        output::write_policy(&solution, &input.path)?;
        summary.extend(output::mdp_summary(&solution));
    }

    log::output_generation_line(&input.path);
    output::write_summary(&summary, &input.path)?;

    log::show_farewell(begin.elapsed());

    Ok(())
}

pub struct InputArgs {
    pub path: String,
}

impl InputArgs {
    pub fn build(args: &[String]) -> Result<Self, &'static str> {
        if args.len() < 2 {
            return Err("Not enough arguments [PATH]");
        }

        let path = args[1].clone();

        Ok(Self { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_args_need_path() {
        assert!(InputArgs::build(&["mpsched".to_string()]).is_err());
        let args = InputArgs::build(&["mpsched".to_string(), "example".to_string()]).unwrap();
        assert_eq!(args.path, "example");
    }

    fn deterministic_config(epsilon: f64) -> Config {
        serde_json::from_str(&format!(
            r#"{{
                "seed": 1,
                "num_simulations": 3,
                "num_rolling_replications": 2,
                "epsilon": {epsilon},
                "availability_realization": {{"kind": "deterministic"}}
            }}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_solve_toy_instance() {
        let system = system::System::default();
        let results = solve_instance("toy", &system, &deterministic_config(0.0)).unwrap();
        assert!((results.optimization.objective - 70.0).abs() < 1e-6);
        let rolling = results.rolling.as_ref().unwrap();
        assert!((rolling.mean - 70.0).abs() < 1e-6);
        assert!(results.plan_na.is_none());
        assert!(results.rolling_na.is_none());
        let summary = results.summary("toy");
        assert_eq!(summary.len(), 7);
        assert_eq!(summary[0].metric, "planned_margin");
    }

    #[test]
    fn test_toy_instance_compares_four_studies() {
        let system = system::System::default();
        let results = solve_instance("toy", &system, &deterministic_config(0.1)).unwrap();
        let plan_na = results.plan_na.as_ref().unwrap();
        assert!((plan_na.objective - 70.0).abs() < 1e-5);
        for summary in [&results.simulation, &results.simulation_na] {
            assert!((summary.as_ref().unwrap().mean - 70.0).abs() < 1e-5);
        }
        for summary in [&results.rolling, &results.rolling_na] {
            assert!((summary.as_ref().unwrap().mean - 70.0).abs() < 1e-5);
        }
        let metrics: Vec<String> = results
            .summary("toy")
            .into_iter()
            .map(|row| row.metric)
            .collect();
        assert_eq!(metrics.len(), 13);
        assert!(metrics.contains(&"simulated_na_margin_mean".to_string()));
        assert!(metrics.contains(&"rolling_na_margin_mean".to_string()));
    }

    #[test]
    fn test_infeasible_instance_is_skipped() {
        let toy = system::System::default();
        // y <= -1 cannot hold with y >= 0
        let broken = system::System::new(
            toy.num_periods,
            toy.products.clone(),
            toy.secondary_factors.clone(),
            vec![system::FixedFactor::new(0, vec![1.0], vec![-1.0, 5.0])],
        );
        let instances = vec![
            NamedInstance {
                name: "broken".to_string(),
                system: broken,
            },
            NamedInstance {
                name: "toy".to_string(),
                system: toy,
            },
        ];
        let solved = plan_instances(&instances, &deterministic_config(0.0)).unwrap();
        assert_eq!(solved.len(), 1);
        assert_eq!(solved[0].0, "toy");
    }
}
