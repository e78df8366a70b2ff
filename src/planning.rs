use crate::constraint::{ConstraintKey, ConstraintKind, ConstraintRegistry, RowDefinition};
use crate::error::{PlanningError, Result};
use crate::scenario::ScenarioSet;
use crate::solver::{self, Problem, Sense, Solver, SolverOptions};
use crate::system::System;
use crate::utils;

/// Tolerance when comparing planned quantities with demands
const QUANTITY_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlanningSettings {
    /// Restrict production quantities to integers (turns the LP into a MIP)
    pub integral_production: bool,
    pub solver: SolverOptions,
}

/// The decision variables of the planning model
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variable {
    /// x: product stock at the start of a period (periods 0..=T)
    Inventory,
    /// y: units produced
    Production,
    /// z: units sold
    Sales,
    /// v: secondary material bought, per scenario
    Secondary,
    /// w: primary material bought as substitute, per scenario
    Primary,
    /// R: secondary material stock at the start of a period, per scenario
    Stock,
}

/// Helper accessor for indexing the columns of each variable family
#[derive(Clone, Debug, PartialEq)]
pub struct Accessors {
    pub inventory: Vec<Vec<usize>>,
    pub production: Vec<Vec<usize>>,
    pub sales: Vec<Vec<usize>>,
    pub secondary: Vec<Vec<Vec<usize>>>,
    pub primary: Vec<Vec<Vec<usize>>>,
    pub stock: Vec<Vec<Vec<usize>>>,
}

impl Accessors {
    /// Column of a variable. The scenario is ignored for product variables.
    pub fn column(
        &self,
        variable: Variable,
        index: usize,
        period: usize,
        scenario: usize,
    ) -> usize {
        match variable {
            Variable::Inventory => self.inventory[index][period],
            Variable::Production => self.production[index][period],
            Variable::Sales => self.sales[index][period],
            Variable::Secondary => self.secondary[index][period][scenario],
            Variable::Primary => self.primary[index][period][scenario],
            Variable::Stock => self.stock[index][period][scenario],
        }
    }
}

/// Result of a successful solve
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Optimization {
    pub objective: f64,
    /// False when the time limit stopped the solver at a feasible incumbent
    pub proven_optimal: bool,
}

/// Structural state of the model, for comparing it before and after a
/// sequence of mutations
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSnapshot {
    pub num_rows: usize,
    pub active_keys: Vec<ConstraintKey>,
    pub col_bounds: Vec<(f64, f64)>,
    pub costs: Vec<f64>,
    pub sense: Sense,
}

/// A solved production plan. Secondary-factor quantities are averaged
/// over the scenarios.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Plan {
    pub objective: f64,
    pub inventory: Vec<Vec<f64>>,
    pub production: Vec<Vec<f64>>,
    pub sales: Vec<Vec<f64>>,
    pub demand: Vec<Vec<f64>>,
    pub stock: Vec<Vec<f64>>,
    pub secondary: Vec<Vec<f64>>,
    pub primary: Vec<Vec<f64>>,
}

/// Fraction of periods in which stock plus production covers demand
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceLevels {
    pub products: Vec<f64>,
    pub overall: f64,
}

impl Plan {
    pub fn num_periods(&self) -> usize {
        self.production.first().map_or(0, |p| p.len())
    }

    pub fn service_levels(&self) -> ServiceLevels {
        let products: Vec<f64> = self
            .production
            .iter()
            .enumerate()
            .map(|(j, production)| {
                let num_periods = production.len();
                let fulfilled = (0..num_periods)
                    .filter(|t| {
                        self.inventory[j][*t] + production[*t] + QUANTITY_TOLERANCE
                            >= self.demand[j][*t]
                    })
                    .count();
                utils::ratio_or_one(fulfilled as f64, num_periods as f64)
            })
            .collect();
        let overall = products.iter().product();
        ServiceLevels { products, overall }
    }
}

/// The multi-period production planning model: a solver instance, the
/// index maps of its columns and the registry of its keyed rows.
#[derive(Debug)]
pub struct PlanningModel<S: Solver = solver::Model> {
    pub system: System,
    pub scenarios: ScenarioSet,
    pub settings: PlanningSettings,
    pub model: S,
    pub accessors: Accessors,
    pub registry: ConstraintRegistry,
    profit: Vec<f64>,
    values: Vec<f64>,
}

fn validate_dimensions(system: &System, scenarios: &ScenarioSet) -> Result<()> {
    let num_periods = system.num_periods;
    let num_products = system.meta.products_count;
    if num_periods == 0 {
        return Err(PlanningError::configuration(
            "num_periods",
            "must be at least 1",
        ));
    }
    if scenarios.num_scenarios == 0 {
        return Err(PlanningError::configuration(
            "num_scenarios",
            "must be at least 1",
        ));
    }
    for (j, product) in system.products.iter().enumerate() {
        if product.demand.len() != num_periods {
            return Err(PlanningError::configuration(
                format!("products[{j}].demand"),
                format!("expected {num_periods} periods"),
            ));
        }
    }
    for (i, factor) in system.secondary_factors.iter().enumerate() {
        if factor.coefficients.len() != num_products {
            return Err(PlanningError::configuration(
                format!("secondary_factors[{i}].coefficients"),
                format!("expected {num_products} coefficients"),
            ));
        }
        let sampled = scenarios.availability.get(i);
        let consistent = sampled.is_some_and(|periods| {
            periods.len() == num_periods
                && periods.iter().all(|s| s.len() == scenarios.num_scenarios)
        });
        if !consistent {
            return Err(PlanningError::configuration(
                format!("secondary_factors[{i}].availability"),
                "scenario set does not match the horizon",
            ));
        }
    }
    for (i, factor) in system.fixed_factors.iter().enumerate() {
        if factor.coefficients.len() != num_products {
            return Err(PlanningError::configuration(
                format!("fixed_factors[{i}].coefficients"),
                format!("expected {num_products} coefficients"),
            ));
        }
        if factor.capacity.len() != num_periods {
            return Err(PlanningError::configuration(
                format!("fixed_factors[{i}].capacity"),
                format!("expected {num_periods} periods"),
            ));
        }
    }
    Ok(())
}

impl<S: Solver> PlanningModel<S> {
    pub fn build(
        system: &System,
        scenarios: &ScenarioSet,
        settings: &PlanningSettings,
    ) -> Result<Self> {
        validate_dimensions(system, scenarios)?;
        let num_periods = system.num_periods;
        let q = scenarios.num_scenarios;
        let weight = 1.0 / q as f64;
        let mut pb = Problem::new();

        // VARIABLES
        let inventory: Vec<Vec<usize>> = system
            .products
            .iter()
            .map(|product| {
                (0..=num_periods)
                    .map(|t| {
                        let cost = if t == 0 { 0.0 } else { -product.holding_cost };
                        pb.add_column(cost, 0.0..)
                    })
                    .collect()
            })
            .collect();
        let production: Vec<Vec<usize>> = system
            .products
            .iter()
            .map(|product| {
                (0..num_periods)
                    .map(|_| pb.add_column(-product.production_cost, 0.0..))
                    .collect()
            })
            .collect();
        let sales: Vec<Vec<usize>> = system
            .products
            .iter()
            .map(|product| {
                (0..num_periods)
                    .map(|_| pb.add_column(product.price, 0.0..))
                    .collect()
            })
            .collect();
        let secondary: Vec<Vec<Vec<usize>>> = system
            .secondary_factors
            .iter()
            .map(|factor| {
                (0..num_periods)
                    .map(|_| {
                        (0..q)
                            .map(|_| {
                                pb.add_column(-weight * factor.secondary_cost, 0.0..)
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();
        let primary: Vec<Vec<Vec<usize>>> = system
            .secondary_factors
            .iter()
            .map(|factor| {
                (0..num_periods)
                    .map(|_| {
                        (0..q)
                            .map(|_| pb.add_column(-weight * factor.primary_cost, 0.0..))
                            .collect()
                    })
                    .collect()
            })
            .collect();
        let stock: Vec<Vec<Vec<usize>>> = system
            .secondary_factors
            .iter()
            .map(|_| {
                (0..=num_periods)
                    .map(|_| (0..q).map(|_| pb.add_column(0.0, 0.0..)).collect())
                    .collect()
            })
            .collect();

        let accessors = Accessors {
            inventory,
            production,
            sales,
            secondary,
            primary,
            stock,
        };
        let mut registry = ConstraintRegistry::new();
        Self::add_product_rows(system, &accessors, &mut registry, &mut pb);
        Self::add_factor_rows(system, scenarios, &accessors, &mut registry, &mut pb);

        let profit = pb.col_cost.clone();
        let num_cols = pb.num_col;
        let mut model = S::from_problem(pb, Sense::Maximise)?;
        model.apply_options(&settings.solver);
        if settings.integral_production {
            for col in accessors.production.iter().flatten() {
                model.set_integer(*col)?;
            }
        }

        Ok(Self {
            system: system.clone(),
            scenarios: scenarios.clone(),
            settings: *settings,
            model,
            accessors,
            registry,
            profit,
            values: vec![0.0; num_cols],
        })
    }

    fn add_product_rows(
        system: &System,
        acc: &Accessors,
        registry: &mut ConstraintRegistry,
        pb: &mut Problem,
    ) {
        for (j, product) in system.products.iter().enumerate() {
            registry.add_to_problem(
                pb,
                ConstraintKey::new(ConstraintKind::InitialProductInventory, j, 0, None),
                RowDefinition::equal_to(
                    product.initial_inventory,
                    vec![(acc.inventory[j][0], 1.0)],
                ),
            );
            for t in 0..system.num_periods {
                registry.add_to_problem(
                    pb,
                    ConstraintKey::new(ConstraintKind::ProductFlow, j, t, None),
                    RowDefinition::equal_to(
                        0.0,
                        vec![
                            (acc.inventory[j][t + 1], 1.0),
                            (acc.inventory[j][t], -1.0),
                            (acc.production[j][t], -1.0),
                            (acc.sales[j][t], 1.0),
                        ],
                    ),
                );
                registry.add_to_problem(
                    pb,
                    ConstraintKey::new(ConstraintKind::SalesCap, j, t, None),
                    RowDefinition::at_most(
                        product.demand[t],
                        vec![(acc.sales[j][t], 1.0)],
                    ),
                );
            }
        }
        for (i, factor) in system.fixed_factors.iter().enumerate() {
            for t in 0..system.num_periods {
                let factors = factor
                    .coefficients
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| **a != 0.0)
                    .map(|(j, a)| (acc.production[j][t], *a))
                    .collect();
                registry.add_to_problem(
                    pb,
                    ConstraintKey::new(ConstraintKind::FixedCapacity, i, t, None),
                    RowDefinition::at_most(factor.capacity[t], factors),
                );
            }
        }
    }

    fn add_factor_rows(
        system: &System,
        scenarios: &ScenarioSet,
        acc: &Accessors,
        registry: &mut ConstraintRegistry,
        pb: &mut Problem,
    ) {
        for (i, factor) in system.secondary_factors.iter().enumerate() {
            for l in 0..scenarios.num_scenarios {
                registry.add_to_problem(
                    pb,
                    ConstraintKey::new(
                        ConstraintKind::InitialSecondaryInventory,
                        i,
                        0,
                        Some(l),
                    ),
                    RowDefinition::equal_to(
                        factor.initial_inventory,
                        vec![(acc.stock[i][0][l], 1.0)],
                    ),
                );
                for t in 0..system.num_periods {
                    let mut factors = vec![
                        (acc.stock[i][t + 1][l], 1.0),
                        (acc.stock[i][t][l], -1.0),
                        (acc.secondary[i][t][l], -1.0),
                        (acc.primary[i][t][l], -1.0),
                    ];
                    factors.extend(
                        factor
                            .coefficients
                            .iter()
                            .enumerate()
                            .filter(|(_, a)| **a != 0.0)
                            .map(|(j, a)| (acc.production[j][t], *a)),
                    );
                    registry.add_to_problem(
                        pb,
                        ConstraintKey::new(ConstraintKind::SecondaryFlow, i, t, Some(l)),
                        RowDefinition::equal_to(0.0, factors),
                    );
                    registry.add_to_problem(
                        pb,
                        ConstraintKey::new(
                            ConstraintKind::SecondaryAvailability,
                            i,
                            t,
                            Some(l),
                        ),
                        RowDefinition::at_most(
                            scenarios.get(i, t, l),
                            vec![(acc.secondary[i][t][l], 1.0)],
                        ),
                    );
                }
            }
        }
    }

    pub fn num_periods(&self) -> usize {
        self.system.num_periods
    }

    pub fn num_scenarios(&self) -> usize {
        self.scenarios.num_scenarios
    }

    /// Solves the model and keeps the solution for the value accessors
    pub fn optimize(&mut self) -> Result<Optimization> {
        let outcome = self.model.solve()?;
        self.values = self.model.col_values();
        Ok(Optimization {
            objective: self.model.objective_value(),
            proven_optimal: outcome.proven_optimal,
        })
    }

    /// Column values of the last solve
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn value(
        &self,
        variable: Variable,
        index: usize,
        period: usize,
        scenario: usize,
    ) -> f64 {
        self.values[self.accessors.column(variable, index, period, scenario)]
    }

    /// Average of a per-scenario variable over all scenarios
    pub fn mean_value(&self, variable: Variable, index: usize, period: usize) -> f64 {
        let values: Vec<f64> = (0..self.num_scenarios())
            .map(|l| self.value(variable, index, period, l))
            .collect();
        utils::mean(&values)
    }

    /// Coefficients of the profit objective
    pub fn profit_coefficients(&self) -> &[f64] {
        &self.profit
    }

    /// Profit terms as sparse row factors
    pub fn profit_factors(&self) -> Vec<(usize, f64)> {
        self.profit
            .iter()
            .enumerate()
            .filter(|(_, c)| **c != 0.0)
            .map(|(col, c)| (col, *c))
            .collect()
    }

    /// Profit of the last solution
    pub fn profit(&self) -> f64 {
        utils::dot_product(&self.profit, &self.values)
    }

    /// Fixes a column to a value
    pub fn pin(&mut self, col: usize, value: f64) -> Result<()> {
        self.model.change_col_bounds(col, value, value)
    }

    pub fn pin_variable(
        &mut self,
        variable: Variable,
        index: usize,
        period: usize,
        scenario: usize,
        value: f64,
    ) -> Result<()> {
        let col = self.accessors.column(variable, index, period, scenario);
        self.pin(col, value)
    }

    /// Returns every column to its natural bounds [0, inf)
    pub fn reset_bounds(&mut self) -> Result<()> {
        for col in 0..self.model.num_cols() {
            if self.model.col_bounds(col) != (0.0, f64::INFINITY) {
                self.model.change_col_bounds(col, 0.0, f64::INFINITY)?;
            }
        }
        Ok(())
    }

    /// Puts back the profit objective if it was replaced
    pub fn restore_objective(&mut self) -> Result<()> {
        if self.model.costs() != self.profit.as_slice() {
            let profit = self.profit.clone();
            self.model.change_costs(&profit)?;
        }
        if self.model.sense() != Sense::Maximise {
            self.model.set_sense(Sense::Maximise)?;
        }
        Ok(())
    }

    /// Returns the model to the structure it had right after being built:
    /// natural bounds, every row active and the profit objective.
    pub fn restore(&mut self) -> Result<()> {
        self.reset_bounds()?;
        self.registry.restore_all(&mut self.model)?;
        self.restore_objective()
    }

    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            num_rows: self.model.num_rows(),
            active_keys: self.registry.active_keys(),
            col_bounds: (0..self.model.num_cols())
                .map(|col| self.model.col_bounds(col))
                .collect(),
            costs: self.model.costs().to_vec(),
            sense: self.model.sense(),
        }
    }

    /// Extracts the plan of the last solve
    pub fn plan(&self, objective: f64) -> Plan {
        let num_periods = self.num_periods();
        let product_values = |variable: Variable, periods: usize| -> Vec<Vec<f64>> {
            (0..self.system.meta.products_count)
                .map(|j| (0..periods).map(|t| self.value(variable, j, t, 0)).collect())
                .collect()
        };
        let factor_values = |variable: Variable, periods: usize| -> Vec<Vec<f64>> {
            (0..self.system.meta.secondary_factors_count)
                .map(|i| (0..periods).map(|t| self.mean_value(variable, i, t)).collect())
                .collect()
        };
        Plan {
            objective,
            inventory: product_values(Variable::Inventory, num_periods + 1),
            production: product_values(Variable::Production, num_periods),
            sales: product_values(Variable::Sales, num_periods),
            demand: self.system.products.iter().map(|p| p.demand.clone()).collect(),
            stock: factor_values(Variable::Stock, num_periods + 1),
            secondary: factor_values(Variable::Secondary, num_periods),
            primary: factor_values(Variable::Primary, num_periods),
        }
    }

    pub fn service_levels(&self) -> ServiceLevels {
        self.plan(0.0).service_levels()
    }

    /// Largest violation of x[t+1] = x[t] + y[t] - z[t] in the last solution
    pub fn flow_residual(&self) -> f64 {
        let mut residual: f64 = 0.0;
        for j in 0..self.system.meta.products_count {
            for t in 0..self.num_periods() {
                let balance = self.value(Variable::Inventory, j, t + 1, 0)
                    - (self.value(Variable::Inventory, j, t, 0)
                        + self.value(Variable::Production, j, t, 0)
                        - self.value(Variable::Sales, j, t, 0));
                residual = residual.max(balance.abs());
            }
        }
        residual
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{FixedFactor, Product, SecondaryFactor};

    fn build_default() -> PlanningModel {
        let system = System::default();
        let scenarios = ScenarioSet::expected(&system);
        PlanningModel::build(&system, &scenarios, &PlanningSettings::default()).unwrap()
    }

    fn two_product_system() -> System {
        let products = vec![
            Product::new(0, 130.0, 12.0, 1.5, 3.0, vec![6.0, 4.0, 5.0]),
            Product::new(1, 140.0, 15.0, 0.8, 4.0, vec![5.0, 7.0, 3.0]),
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
        System::new(3, products, secondary, fixed)
    }

    #[test]
    fn test_create_model_with_default_system() {
        let model = build_default();
        assert_eq!(model.accessors.inventory[0].len(), 3);
        assert_eq!(model.accessors.production[0].len(), 2);
        assert_eq!(model.accessors.secondary[0][1].len(), 1);
        assert_eq!(model.accessors.stock[0].len(), 3);
        // 1 initial + 2 flows + 2 caps + 1 initial + 2 flows + 2 availabilities
        assert_eq!(model.registry.num_active(), 10);
        assert_eq!(model.model.num_rows(), 10);
    }

    #[test]
    fn test_toy_instance_profit() {
        let mut model = build_default();
        let optimization = model.optimize().unwrap();
        assert!(optimization.proven_optimal);
        assert!((optimization.objective - 70.0).abs() < 1e-6);
        for t in 0..2 {
            assert!((model.value(Variable::Production, 0, t, 0) - 5.0).abs() < 1e-6);
            assert!((model.value(Variable::Sales, 0, t, 0) - 5.0).abs() < 1e-6);
            assert!((model.value(Variable::Secondary, 0, t, 0) - 5.0).abs() < 1e-6);
            assert!(model.value(Variable::Primary, 0, t, 0).abs() < 1e-6);
        }
        assert!((model.profit() - 70.0).abs() < 1e-6);
    }

    #[test]
    fn test_flow_balance_of_solution() {
        let system = two_product_system();
        let scenarios = ScenarioSet::expected(&system);
        let mut model: PlanningModel =
            PlanningModel::build(&system, &scenarios, &PlanningSettings::default())
                .unwrap();
        model.optimize().unwrap();
        assert!(model.flow_residual() < 1e-6);
        let plan = model.plan(0.0);
        for j in 0..2 {
            assert!((plan.inventory[j][0] - system.products[j].initial_inventory).abs() < 1e-6);
            for t in 0..3 {
                assert!(plan.sales[j][t] <= plan.demand[j][t] + 1e-6);
            }
        }
    }

    #[test]
    fn test_build_is_idempotent() {
        let a = build_default();
        let b = build_default();
        assert_eq!(a.snapshot(), b.snapshot());
        assert_eq!(a.accessors, b.accessors);
    }

    #[test]
    fn test_mismatched_demand_is_configuration_error() {
        let mut system = System::default();
        system.products[0].demand = vec![5.0];
        let scenarios = ScenarioSet::expected(&System::default());
        let err = PlanningModel::<solver::Model>::build(
            &system,
            &scenarios,
            &PlanningSettings::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("products[0].demand"));
    }

    #[test]
    fn test_infeasible_model_reports_error() {
        let mut model = build_default();
        // more stock at the end of the horizon than can ever be made
        let col = model.accessors.column(Variable::Inventory, 0, 2, 0);
        model.model.change_col_bounds(col, 1e6, f64::INFINITY).unwrap();
        let fixed = model.accessors.column(Variable::Primary, 0, 0, 0);
        model.pin(fixed, 0.0).unwrap();
        let fixed = model.accessors.column(Variable::Primary, 0, 1, 0);
        model.pin(fixed, 0.0).unwrap();
        assert!(model.optimize().unwrap_err().is_infeasible());
    }

    #[test]
    fn test_restore_resets_pins_and_rows() {
        let mut model = build_default();
        let initial = model.snapshot();
        model.pin_variable(Variable::Production, 0, 0, 0, 3.0).unwrap();
        model.registry.remove_period(&mut model.model, 0).unwrap();
        model.model.set_sense(Sense::Minimise).unwrap();
        assert_ne!(model.snapshot(), initial);
        model.restore().unwrap();
        assert_eq!(model.snapshot(), initial);
        assert!((model.optimize().unwrap().objective - 70.0).abs() < 1e-6);
    }

    #[test]
    fn test_integral_production() {
        let mut system = System::default();
        system.products[0].demand = vec![4.5, 4.5];
        let scenarios = ScenarioSet::expected(&system);
        let settings = PlanningSettings {
            integral_production: true,
            ..Default::default()
        };
        let mut model: PlanningModel =
            PlanningModel::build(&system, &scenarios, &settings).unwrap();
        model.optimize().unwrap();
        for t in 0..2 {
            let y = model.value(Variable::Production, 0, t, 0);
            assert!((y - y.round()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_service_levels() {
        let plan = Plan {
            inventory: vec![vec![0.0, 0.0, 0.0]],
            production: vec![vec![5.0, 3.0]],
            sales: vec![vec![5.0, 3.0]],
            demand: vec![vec![5.0, 5.0]],
            ..Default::default()
        };
        let levels = plan.service_levels();
        assert_eq!(levels.products, vec![0.5]);
        assert_eq!(levels.overall, 0.5);
        assert_eq!(plan.num_periods(), 2);
    }
}
