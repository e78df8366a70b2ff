use std::path::Path;
use std::time::Duration;

fn seconds(time: Duration) -> f64 {
    time.as_millis() as f64 / 1000.0
}

pub fn show_greeting() {
    println!(
        "\nmpsched v{}: production and procurement planning under uncertainty",
        env!("CARGO_PKG_VERSION")
    );
}

pub fn input_reading_line(path: &Path) {
    println!("\nReading input files from '{}'", path.display());
}

pub fn solver_warning(operation: &str) {
    println!("WARNING: solver returned a warning status in {operation}");
}

/// Helper function for displaying the data of a planning instance
pub fn instance_greeting(name: &str, num_periods: usize, num_scenarios: usize) {
    println!("\n# Planning: {name}");
    println!("- Periods: {num_periods}");
    println!("- Scenarios: {num_scenarios}");
}

pub fn plan_result(objective: f64, proven_optimal: bool, service_level: f64) {
    println!("Planned contribution margin ($): {:.2}", objective);
    println!("Overall service level: {:.4}", service_level);
    if !proven_optimal {
        println!("WARNING: time limit reached, the plan is not proven optimal");
    }
}

pub fn smoothed_plan_result(objective: f64, epsilon: f64) {
    println!(
        "Contribution margin under non-anticipativity (epsilon = {}): {:.2}",
        epsilon, objective
    );
}

pub fn instance_skipped(name: &str, reason: &str) {
    println!("Skipping instance {name}: {reason}");
}

/// Helper function for displaying the greeting data for the rolling horizon
pub fn rolling_greeting(num_replications: usize, num_periods: usize) {
    println!("\n# Rolling horizon");
    println!("- Replications: {num_replications}");
    println!("- Periods: {num_periods}\n");
}

/// Helper function for displaying the rolling horizon table header
pub fn rolling_table_header() {
    println!(
        "{0: ^11} | {1: ^15} | {2: ^15} | {3: ^12}",
        "replication", "margin ($)", "unproven solves", "time (s)"
    )
}

/// Helper function for displaying a divider for the rolling horizon table
pub fn rolling_table_divider() {
    println!("----------------------------------------------------------------")
}

/// Helper function for displaying a row of replication results for
/// the rolling horizon table
pub fn rolling_table_row(
    replication: usize,
    margin: f64,
    unproven_solves: usize,
    time: Duration,
) {
    println!(
        "{0: >11} | {1: >15.4} | {2: >15} | {3: >12.2}",
        replication,
        margin,
        unproven_solves,
        seconds(time)
    )
}

pub fn rolling_duration(time: Duration) {
    println!("\nRolling horizon time: {:.2} s", seconds(time))
}

/// Helper function for displaying the greeting data for the simulation
pub fn simulation_greeting(num_simulations: usize) {
    println!("\n# Simulating");
    println!("- Scenarios: {num_simulations}\n");
}

pub fn margin_stats(mean: f64, std: f64) {
    println!("Expected contribution margin ($): {:.2} +- {:.2}", mean, std);
}

pub fn simulation_duration(time: Duration) {
    println!("\nSimulation time: {:.2} s", seconds(time))
}

/// Helper function for displaying the data of the inventory problem
pub fn mdp_greeting(num_states: usize, num_columns: usize) {
    println!("\n# Inventory policy");
    println!("- States: {num_states}");
    println!("- State-action pairs: {num_columns}");
}

pub fn mdp_result(expected_cost: f64, expected_order: f64) {
    println!("Expected cost per period ($): {:.4}", expected_cost);
    println!("Expected order quantity: {:.4}", expected_order);
}

pub fn output_generation_line(path: &Path) {
    println!("\nWriting outputs to '{}'", path.display());
}

pub fn show_farewell(time: Duration) {
    println!("\nTotal running time: {:.2} s", seconds(time));
}
