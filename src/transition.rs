use crate::error::{PlanningError, Result};
use crate::probability::Distribution;

/// Parameters of the stationary inventory problem. States are inventory
/// levels in [-d_max, x_max], negative ones being backlog.
#[derive(Clone, Debug, PartialEq)]
pub struct InventoryProblem {
    pub d_max: usize,
    pub x_max: usize,
    pub y_max: usize,
    /// Unit purchase cost of a delivered item
    pub unit_cost: f64,
    pub holding_cost: f64,
    /// Paid once per period whenever q > 0
    pub fixed_cost: f64,
    pub shortage_cost: f64,
    pub demand: Distribution,
    pub availability: Distribution,
}

/// Probability tables evaluated once per problem
#[derive(Clone, Debug)]
pub struct TransitionModel<'a> {
    pub problem: &'a InventoryProblem,
    demand: Vec<f64>,
    availability: Vec<f64>,
}

impl InventoryProblem {
    pub fn validate(&self) -> Result<()> {
        let costs = [
            ("unit_cost", self.unit_cost),
            ("holding_cost", self.holding_cost),
            ("fixed_cost", self.fixed_cost),
            ("shortage_cost", self.shortage_cost),
        ];
        for (field, value) in costs {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(PlanningError::configuration(
                    field,
                    format!("must be a finite non-negative number, got {value}"),
                ));
            }
        }
        self.demand.validate()?;
        self.availability.validate()?;
        Ok(())
    }

    /// Inventory levels, from the largest shortage to the largest stock
    pub fn states(&self) -> impl Iterator<Item = i64> + '_ {
        -(self.d_max as i64)..=self.x_max as i64
    }

    pub fn num_states(&self) -> usize {
        self.d_max + self.x_max + 1
    }

    /// Position of a state in [`Self::states`]
    pub fn state_index(&self, x: i64) -> usize {
        (x + self.d_max as i64) as usize
    }

    /// Order quantities allowed in state x, in increasing order
    pub fn actions(&self, x: i64) -> impl Iterator<Item = usize> {
        let cap = self.y_max.min(self.x_max) as i64;
        let room = self.x_max as i64 - x + self.d_max as i64;
        let last = cap.min(room).max(-1);
        (0..=last).map(|q| q as usize)
    }

    pub fn transitions(&self) -> Result<TransitionModel<'_>> {
        self.validate()?;
        Ok(TransitionModel {
            problem: self,
            demand: self.demand.table(self.d_max)?,
            availability: self.availability.table(self.y_max)?,
        })
    }
}

impl<'a> TransitionModel<'a> {
    /// Expected delivered quantity E[min(q, Y)]
    pub fn expected_supply(&self, q: usize) -> f64 {
        self.availability
            .iter()
            .enumerate()
            .map(|(y, p)| p * q.min(y) as f64)
            .sum()
    }

    /// One-period reward of ordering q in state x (a negated cost)
    pub fn reward(&self, x: i64, q: usize) -> f64 {
        let pb = self.problem;
        let order_cost = pb.unit_cost * self.expected_supply(q);
        let holding_cost = pb.holding_cost * x.max(0) as f64;
        let fixed_cost = if q > 0 { pb.fixed_cost } else { 0.0 };
        let shortage_cost = pb.shortage_cost * (-x).max(0) as f64;
        -(order_cost + holding_cost + fixed_cost + shortage_cost)
    }

    fn next_state(&self, x: i64, q: usize, y: usize, d: usize) -> i64 {
        let delivered = q.min(y) as i64;
        (x.max(0) + delivered - d as i64).min(self.problem.x_max as i64)
    }

    /// Distribution of the next state given (x, q), indexed like
    /// [`InventoryProblem::states`]
    pub fn transition_row(&self, x: i64, q: usize) -> Vec<f64> {
        let mut row = vec![0.0; self.problem.num_states()];
        for (y, py) in self.availability.iter().enumerate() {
            if *py == 0.0 {
                continue;
            }
            for (d, pd) in self.demand.iter().enumerate() {
                let next = self.next_state(x, q, y, d);
                row[self.problem.state_index(next)] += py * pd;
            }
        }
        row
    }

    /// P(x' | x, q)
    pub fn transition_prob(&self, x: i64, q: usize, x_next: i64) -> f64 {
        if !self.problem.states().any(|s| s == x_next) {
            return 0.0;
        }
        self.transition_row(x, q)[self.problem.state_index(x_next)]
    }
}
