use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Local;
use csv::Writer;
use serde::Serialize;

use crate::occupation::MdpSolution;
use crate::planning::{Plan, ServiceLevels};
use crate::rolling::RollingSummary;
use crate::simulation::SimulationSummary;
use crate::InstanceResults;

#[derive(Serialize)]
struct ProductPlanOutput {
    product_index: usize,
    period_index: usize,
    inventory: f64,
    production: f64,
    sales: f64,
    demand: f64,
}

fn write_plan_products(plan: &Plan, path: &Path, file: &str) -> Result<()> {
    let mut wtr = Writer::from_path(path.join(file))?;
    for (product_index, production) in plan.production.iter().enumerate() {
        for period_index in 0..production.len() {
            wtr.serialize(ProductPlanOutput {
                product_index,
                period_index,
                inventory: plan.inventory[product_index][period_index],
                production: production[period_index],
                sales: plan.sales[product_index][period_index],
                demand: plan.demand[product_index][period_index],
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct FactorPlanOutput {
    factor_index: usize,
    period_index: usize,
    stock: f64,
    secondary: f64,
    primary: f64,
}

fn write_plan_factors(plan: &Plan, path: &Path, file: &str) -> Result<()> {
    let mut wtr = Writer::from_path(path.join(file))?;
    for (factor_index, secondary) in plan.secondary.iter().enumerate() {
        for period_index in 0..secondary.len() {
            wtr.serialize(FactorPlanOutput {
                factor_index,
                period_index,
                stock: plan.stock[factor_index][period_index],
                secondary: secondary[period_index],
                primary: plan.primary[factor_index][period_index],
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct SimulationOutput {
    series_index: usize,
    margin: f64,
    product_margin: f64,
    factor_cost: f64,
    lost_sales: f64,
    primary_purchases: f64,
}

fn write_simulation(summary: &SimulationSummary, path: &Path, file: &str) -> Result<()> {
    let mut wtr = Writer::from_path(path.join(file))?;
    for outcome in summary.outcomes.iter() {
        wtr.serialize(SimulationOutput {
            series_index: outcome.replication,
            margin: outcome.margin(),
            product_margin: outcome.product_margin,
            factor_cost: outcome.factor_cost,
            lost_sales: outcome.lost_sales,
            primary_purchases: outcome.primary_purchases,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct RollingOutput {
    series_index: usize,
    period_index: usize,
    entity_kind: &'static str,
    entity_index: usize,
    realized: f64,
    executed: f64,
    purchased_primary: f64,
    carried: f64,
}

fn write_rolling(summary: &RollingSummary, path: &Path, file: &str) -> Result<()> {
    let mut wtr = Writer::from_path(path.join(file))?;
    for outcome in summary.outcomes.iter() {
        for step in outcome.products.iter() {
            wtr.serialize(RollingOutput {
                series_index: outcome.replication,
                period_index: step.period,
                entity_kind: "product",
                entity_index: step.product,
                realized: step.demand,
                executed: step.sales,
                purchased_primary: 0.0,
                carried: step.inventory,
            })?;
        }
        for step in outcome.factors.iter() {
            wtr.serialize(RollingOutput {
                series_index: outcome.replication,
                period_index: step.period,
                entity_kind: "factor",
                entity_index: step.factor,
                realized: step.availability,
                executed: step.secondary,
                purchased_primary: step.primary,
                carried: step.stock,
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct PolicyOutput {
    inventory: i64,
    order: usize,
    probability: f64,
}

pub fn write_policy(solution: &MdpSolution, path: &Path) -> Result<()> {
    let mut wtr = Writer::from_path(path.join("policy.csv"))?;
    for entry in solution.policy.iter() {
        wtr.serialize(PolicyOutput {
            inventory: entry.inventory,
            order: entry.order,
            probability: entry.probability,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// One line of `summary.csv`
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SummaryOutput {
    pub study: String,
    pub metric: String,
    pub value: f64,
}

impl SummaryOutput {
    pub fn new(study: &str, metric: &str, value: f64) -> Self {
        Self {
            study: study.to_string(),
            metric: metric.to_string(),
            value,
        }
    }
}

pub fn mdp_summary(solution: &MdpSolution) -> Vec<SummaryOutput> {
    let m = &solution.metrics;
    vec![
        SummaryOutput::new("inventory", "expected_cost", m.expected_cost),
        SummaryOutput::new("inventory", "expected_inventory", m.expected_inventory),
        SummaryOutput::new("inventory", "max_inventory", m.max_inventory as f64),
        SummaryOutput::new("inventory", "expected_shortage", m.expected_shortage),
        SummaryOutput::new("inventory", "max_shortage", m.max_shortage as f64),
        SummaryOutput::new("inventory", "expected_order", m.expected_order),
        SummaryOutput::new("inventory", "expected_supply", m.expected_supply),
    ]
}

pub fn write_summary(rows: &[SummaryOutput], path: &Path) -> Result<()> {
    let mut wtr = Writer::from_path(path.join("summary.csv"))?;
    for row in rows.iter() {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Fixed-width text report of a plan
pub fn format_report(name: &str, plan: &Plan, levels: &ServiceLevels) -> String {
    let mut s = format!("# Production plan: {name}\n");
    s.push_str(&format!(
        "Generated at {}\n\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ));
    s.push_str(&format!(
        "{0: >8} | {1: >7} | {2: >10} | {3: >11} | {4: >10} | {5: >10}\n",
        "product", "period", "inventory", "production", "sales", "demand"
    ));
    s.push_str(&format!("{}\n", "-".repeat(70)));
    for (j, production) in plan.production.iter().enumerate() {
        for t in 0..production.len() {
            s.push_str(&format!(
                "{0: >8} | {1: >7} | {2: >10.4} | {3: >11.4} | {4: >10.4} | {5: >10.4}\n",
                j + 1,
                t + 1,
                plan.inventory[j][t],
                production[t],
                plan.sales[j][t],
                plan.demand[j][t]
            ));
        }
    }
    if !plan.secondary.is_empty() {
        s.push_str(&format!(
            "\n{0: >8} | {1: >7} | {2: >10} | {3: >10} | {4: >10}\n",
            "factor", "period", "stock", "secondary", "primary"
        ));
        s.push_str(&format!("{}\n", "-".repeat(57)));
        for (i, secondary) in plan.secondary.iter().enumerate() {
            for t in 0..secondary.len() {
                s.push_str(&format!(
                    "{0: >8} | {1: >7} | {2: >10.4} | {3: >10.4} | {4: >10.4}\n",
                    i + 1,
                    t + 1,
                    plan.stock[i][t],
                    secondary[t],
                    plan.primary[i][t]
                ));
            }
        }
    }
    s.push('\n');
    for (j, level) in levels.products.iter().enumerate() {
        s.push_str(&format!("Service level for product {}: {:.4}\n", j + 1, level));
    }
    s.push_str(&format!("\nOverall service level: {:.4}\n\n", levels.overall));
    s.push_str(&format!("Total contribution margin: {:.4}\n", plan.objective));
    s
}

fn write_report(name: &str, plan: &Plan, path: &Path, file: &str) -> Result<()> {
    let report = format_report(name, plan, &plan.service_levels());
    fs::write(path.join(file), report)
        .with_context(|| format!("Error while writing {file} for {name}"))
}

/// Writes every output of a planning instance to `path`, creating it if
/// needed. Files of the non-anticipativity studies carry an `_na` suffix.
pub fn generate_outputs(name: &str, results: &InstanceResults, path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("Error while creating {}", path.display()))?;
    write_plan_products(&results.plan, path, "plan_products.csv")?;
    write_plan_factors(&results.plan, path, "plan_factors.csv")?;
    write_report(name, &results.plan, path, "report.txt")?;
    if let Some(plan) = &results.plan_na {
        write_plan_products(plan, path, "plan_products_na.csv")?;
        write_plan_factors(plan, path, "plan_factors_na.csv")?;
        write_report(name, plan, path, "report_na.txt")?;
    }
    if let Some(summary) = &results.simulation {
        write_simulation(summary, path, "simulation.csv")?;
    }
    if let Some(summary) = &results.simulation_na {
        write_simulation(summary, path, "simulation_na.csv")?;
    }
    if let Some(summary) = &results.rolling {
        write_rolling(summary, path, "rolling.csv")?;
    }
    if let Some(summary) = &results.rolling_na {
        write_rolling(summary, path, "rolling_na.csv")?;
    }
    Ok(())
}
