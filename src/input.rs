use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::PlanningError;
use crate::planning::PlanningSettings;
use crate::probability::Distribution;
use crate::realization::{AvailabilityRealization, DemandRealization, Realization};
use crate::rolling::RollingSettings;
use crate::scenario::ScenarioGenerator;
use crate::simulation::SimulationSettings;
use crate::solver::SolverOptions;
use crate::system;
use crate::transition::InventoryProblem;

fn default_one() -> usize {
    1
}

fn default_time_limit() -> f64 {
    300.0
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    pub seed: u64,
    #[serde(default)]
    pub num_simulations: usize,
    #[serde(default)]
    pub num_rolling_replications: usize,
    #[serde(default = "default_time_limit")]
    pub time_limit: f64,
    #[serde(default)]
    pub epsilon: f64,
    #[serde(default = "default_one")]
    pub num_scenarios: usize,
    #[serde(default)]
    pub antithetic: bool,
    #[serde(default)]
    pub integral_production: bool,
    #[serde(default)]
    pub demand_realization: DemandRealization,
    #[serde(default)]
    pub availability_realization: AvailabilityRealization,
    /// Planning instance files, relative to the input directory
    #[serde(default)]
    pub instances: Vec<String>,
    /// Inventory problem file, relative to the input directory
    #[serde(default)]
    pub inventory: Option<String>,
}

impl Config {
    pub fn validate(&self) -> std::result::Result<(), PlanningError> {
        if !(self.time_limit > 0.0) {
            return Err(PlanningError::configuration(
                "time_limit",
                "must be positive",
            ));
        }
        if !(self.epsilon >= 0.0) {
            return Err(PlanningError::configuration(
                "epsilon",
                "must be non-negative",
            ));
        }
        if self.num_scenarios == 0 {
            return Err(PlanningError::configuration(
                "num_scenarios",
                "must be at least 1",
            ));
        }
        self.demand_realization.validate("demand_realization")?;
        self.availability_realization
            .validate("availability_realization")?;
        Ok(())
    }

    pub fn solver_options(&self) -> SolverOptions {
        SolverOptions {
            time_limit: self.time_limit,
            ..Default::default()
        }
    }

    pub fn planning_settings(&self) -> PlanningSettings {
        PlanningSettings {
            integral_production: self.integral_production,
            solver: self.solver_options(),
        }
    }

    pub fn scenario_generator(&self) -> ScenarioGenerator {
        ScenarioGenerator::new(
            self.num_scenarios,
            self.antithetic,
            self.availability_realization,
        )
    }

    /// Rolling-horizon settings with the given non-anticipativity rate
    pub fn rolling_settings(&self, epsilon: f64) -> RollingSettings {
        RollingSettings {
            num_replications: self.num_rolling_replications,
            seed: self.seed,
            epsilon,
            demand: self.demand_realization,
            availability: self.availability_realization,
        }
    }

    pub fn simulation_settings(&self) -> SimulationSettings {
        SimulationSettings {
            num_simulations: self.num_simulations,
            seed: self.seed,
            demand: self.demand_realization,
            availability: self.availability_realization,
        }
    }
}

pub fn read_config_input(filepath: &Path) -> Result<Config> {
    let contents = fs::read_to_string(filepath)
        .with_context(|| format!("Error while reading {}", filepath.display()))?;
    let parsed: Config = serde_json::from_str(&contents)
        .with_context(|| format!("Error while parsing {}", filepath.display()))?;
    Ok(parsed)
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ProductInput {
    pub id: usize,
    pub price: f64,
    pub production_cost: f64,
    pub holding_cost: f64,
    pub initial_inventory: f64,
    pub demand: Vec<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SecondaryFactorInput {
    pub id: usize,
    pub coefficients: Vec<f64>,
    pub initial_inventory: f64,
    pub secondary_cost: f64,
    pub primary_cost: f64,
    pub availability: Vec<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct FixedFactorInput {
    pub id: usize,
    pub coefficients: Vec<f64>,
    pub capacity: Vec<f64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct InstanceInput {
    pub num_periods: usize,
    pub products: Vec<ProductInput>,
    #[serde(default)]
    pub secondary_factors: Vec<SecondaryFactorInput>,
    #[serde(default)]
    pub fixed_factors: Vec<FixedFactorInput>,
}

pub fn read_instance_input(filepath: &Path) -> Result<InstanceInput> {
    let contents = fs::read_to_string(filepath)
        .with_context(|| format!("Error while reading {}", filepath.display()))?;
    let parsed: InstanceInput = serde_json::from_str(&contents)
        .with_context(|| format!("Error while parsing {}", filepath.display()))?;
    Ok(parsed)
}

type Validation = std::result::Result<(), PlanningError>;

fn validate_id_range(ids: &[usize], elem_name: &str) -> Validation {
    for elem_id in 0..ids.len() {
        if !ids.contains(&elem_id) {
            return Err(PlanningError::configuration(
                elem_name,
                format!("ID {elem_id} not found"),
            ));
        }
    }
    Ok(())
}

fn validate_non_negative(value: f64, field: &str) -> Validation {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(PlanningError::configuration(
            field,
            format!("must be a finite non-negative number, got {value}"),
        ))
    }
}

fn validate_series(values: &[f64], len: usize, field: &str) -> Validation {
    if values.len() != len {
        return Err(PlanningError::configuration(
            field,
            format!("expected {len} values, got {}", values.len()),
        ));
    }
    for (t, value) in values.iter().enumerate() {
        validate_non_negative(*value, &format!("{field}[{t}]"))?;
    }
    Ok(())
}

impl InstanceInput {
    /// Validates every parameter and builds the domain entities, sorted
    /// by id
    pub fn build_system(&self) -> std::result::Result<system::System, PlanningError> {
        let num_periods = self.num_periods;
        if num_periods == 0 {
            return Err(PlanningError::configuration(
                "num_periods",
                "must be at least 1",
            ));
        }
        let product_ids: Vec<usize> = self.products.iter().map(|p| p.id).collect();
        let secondary_ids: Vec<usize> =
            self.secondary_factors.iter().map(|f| f.id).collect();
        let fixed_ids: Vec<usize> = self.fixed_factors.iter().map(|f| f.id).collect();
        validate_id_range(&product_ids, "products")?;
        validate_id_range(&secondary_ids, "secondary_factors")?;
        validate_id_range(&fixed_ids, "fixed_factors")?;
        let num_products = product_ids.len();

        let mut products = Vec::<system::Product>::with_capacity(num_products);
        for id in 0..num_products {
            let Some(p) = self.products.iter().find(|p| p.id == id) else {
                continue;
            };
            let field = format!("products[{id}]");
            validate_non_negative(p.price, &format!("{field}.price"))?;
            validate_non_negative(p.production_cost, &format!("{field}.production_cost"))?;
            validate_non_negative(p.holding_cost, &format!("{field}.holding_cost"))?;
            validate_non_negative(
                p.initial_inventory,
                &format!("{field}.initial_inventory"),
            )?;
            validate_series(&p.demand, num_periods, &format!("{field}.demand"))?;
            products.push(system::Product::new(
                id,
                p.price,
                p.production_cost,
                p.holding_cost,
                p.initial_inventory,
                p.demand.clone(),
            ));
        }

        let mut secondary_factors =
            Vec::<system::SecondaryFactor>::with_capacity(secondary_ids.len());
        for id in 0..secondary_ids.len() {
            let Some(f) = self.secondary_factors.iter().find(|f| f.id == id) else {
                continue;
            };
            let field = format!("secondary_factors[{id}]");
            validate_series(
                &f.coefficients,
                num_products,
                &format!("{field}.coefficients"),
            )?;
            validate_non_negative(
                f.initial_inventory,
                &format!("{field}.initial_inventory"),
            )?;
            validate_non_negative(f.secondary_cost, &format!("{field}.secondary_cost"))?;
            validate_non_negative(f.primary_cost, &format!("{field}.primary_cost"))?;
            validate_series(
                &f.availability,
                num_periods,
                &format!("{field}.availability"),
            )?;
            secondary_factors.push(system::SecondaryFactor::new(
                id,
                f.coefficients.clone(),
                f.initial_inventory,
                f.secondary_cost,
                f.primary_cost,
                f.availability.clone(),
            ));
        }

        let mut fixed_factors = Vec::<system::FixedFactor>::with_capacity(fixed_ids.len());
        for id in 0..fixed_ids.len() {
            let Some(f) = self.fixed_factors.iter().find(|f| f.id == id) else {
                continue;
            };
            let field = format!("fixed_factors[{id}]");
            validate_series(
                &f.coefficients,
                num_products,
                &format!("{field}.coefficients"),
            )?;
            validate_series(&f.capacity, num_periods, &format!("{field}.capacity"))?;
            fixed_factors.push(system::FixedFactor::new(
                id,
                f.coefficients.clone(),
                f.capacity.clone(),
            ));
        }

        Ok(system::System::new(
            num_periods,
            products,
            secondary_factors,
            fixed_factors,
        ))
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct NormalParams {
    pub mu: f64,
    pub sigma: f64,
}

/// A random driver given by exactly one of its possible families
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct DistributionInput {
    #[serde(default)]
    pub binomial: Option<f64>,
    #[serde(default)]
    pub normal: Option<NormalParams>,
}

impl DistributionInput {
    pub fn build_distribution(
        &self,
        field: &str,
    ) -> std::result::Result<Distribution, PlanningError> {
        let distribution = match (self.binomial, self.normal) {
            (Some(p), None) => Distribution::Binomial { p },
            (None, Some(n)) => Distribution::DiscretizedNormal {
                mu: n.mu,
                sigma: n.sigma,
            },
            (Some(_), Some(_)) => {
                return Err(PlanningError::configuration(
                    field,
                    "both binomial and normal parameters are given",
                ))
            }
            (None, None) => {
                return Err(PlanningError::configuration(
                    field,
                    "either binomial or normal parameters are required",
                ))
            }
        };
        distribution
            .validate()
            .map_err(|e| PlanningError::configuration(field, e.to_string()))?;
        Ok(distribution)
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct InventoryInput {
    pub d_max: usize,
    pub x_max: usize,
    pub y_max: usize,
    pub unit_cost: f64,
    pub holding_cost: f64,
    pub fixed_cost: f64,
    pub shortage_cost: f64,
    pub demand: DistributionInput,
    pub availability: DistributionInput,
}

impl InventoryInput {
    pub fn build_problem(&self) -> std::result::Result<InventoryProblem, PlanningError> {
        let problem = InventoryProblem {
            d_max: self.d_max,
            x_max: self.x_max,
            y_max: self.y_max,
            unit_cost: self.unit_cost,
            holding_cost: self.holding_cost,
            fixed_cost: self.fixed_cost,
            shortage_cost: self.shortage_cost,
            demand: self.demand.build_distribution("demand")?,
            availability: self.availability.build_distribution("availability")?,
        };
        problem.validate()?;
        Ok(problem)
    }
}

pub fn read_inventory_input(filepath: &Path) -> Result<InventoryInput> {
    let contents = fs::read_to_string(filepath)
        .with_context(|| format!("Error while reading {}", filepath.display()))?;
    let parsed: InventoryInput = serde_json::from_str(&contents)
        .with_context(|| format!("Error while parsing {}", filepath.display()))?;
    Ok(parsed)
}

/// A validated planning instance, named after the file it came from
#[derive(Debug, Clone, PartialEq)]
pub struct NamedInstance {
    pub name: String,
    pub system: system::System,
}

/// Everything a run needs. Every file is read and validated here, so no
/// solve starts on a partially valid input.
pub struct Input {
    pub path: PathBuf,
    pub config: Config,
    pub instances: Vec<NamedInstance>,
    pub inventory: Option<InventoryProblem>,
}

impl Input {
    pub fn build(path: &str) -> Result<Self> {
        let root = PathBuf::from(path);
        let config = read_config_input(&root.join("config.json"))?;
        config.validate()?;
        let instances = config
            .instances
            .iter()
            .map(|file| {
                let instance = read_instance_input(&root.join(file))?;
                let name = Path::new(file)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| file.clone());
                let system = instance
                    .build_system()
                    .with_context(|| format!("Invalid instance {name}"))?;
                Ok(NamedInstance { name, system })
            })
            .collect::<Result<Vec<_>>>()?;
        let inventory = config
            .inventory
            .as_ref()
            .map(|file| -> Result<InventoryProblem> {
                let problem = read_inventory_input(&root.join(file))?
                    .build_problem()
                    .with_context(|| format!("Invalid inventory problem {file}"))?;
                Ok(problem)
            })
            .transpose()?;
        Ok(Self {
            path: root,
            config,
            instances,
            inventory,
        })
    }
}
