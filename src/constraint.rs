use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use indexmap::IndexMap;

use crate::error::{PlanningError, Result};
use crate::solver::{Problem, Solver};

/// The families of rows in the planning model
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKind {
    InitialProductInventory,
    ProductFlow,
    SalesCap,
    FixedCapacity,
    InitialSecondaryInventory,
    SecondaryFlow,
    SecondaryAvailability,
    NonAnticipativity,
}

/// Identifies one row: the kind, the product or factor index, the period
/// and, for secondary-factor rows, the scenario.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintKey {
    pub kind: ConstraintKind,
    pub index: usize,
    pub period: usize,
    pub scenario: Option<usize>,
}

impl ConstraintKey {
    pub fn new(
        kind: ConstraintKind,
        index: usize,
        period: usize,
        scenario: Option<usize>,
    ) -> Self {
        Self {
            kind,
            index,
            period,
            scenario,
        }
    }
}

impl Display for ConstraintKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.scenario {
            Some(s) => write!(
                f,
                "{:?}[{}, t={}, s={}]",
                self.kind, self.index, self.period, s
            ),
            None => write!(f, "{:?}[{}, t={}]", self.kind, self.index, self.period),
        }
    }
}

/// Everything needed to add a row back to the solver
#[derive(Clone, Debug, PartialEq)]
pub struct RowDefinition {
    pub lower: f64,
    pub upper: f64,
    pub factors: Vec<(usize, f64)>,
}

impl RowDefinition {
    pub fn new(lower: f64, upper: f64, factors: Vec<(usize, f64)>) -> Self {
        Self {
            lower,
            upper,
            factors,
        }
    }

    pub fn equal_to(value: f64, factors: Vec<(usize, f64)>) -> Self {
        Self::new(value, value, factors)
    }

    pub fn at_most(value: f64, factors: Vec<(usize, f64)>) -> Self {
        Self::new(f64::NEG_INFINITY, value, factors)
    }
}

/// Maps every known constraint key to its definition and tracks which of
/// them are currently rows of the solver, in solver row order.
#[derive(Clone, Debug, Default)]
pub struct ConstraintRegistry {
    definitions: IndexMap<ConstraintKey, RowDefinition>,
    active: Vec<ConstraintKey>,
    positions: HashMap<ConstraintKey, usize>,
}

impl ConstraintRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row to a problem that is still being built, registering it
    /// as active. Returns the row index.
    pub fn add_to_problem(
        &mut self,
        problem: &mut Problem,
        key: ConstraintKey,
        definition: RowDefinition,
    ) -> usize {
        let row = problem.add_row(
            definition.lower..=definition.upper,
            &definition.factors,
        );
        self.definitions.insert(key, definition);
        self.positions.insert(key, self.active.len());
        self.active.push(key);
        row
    }

    pub fn is_active(&self, key: &ConstraintKey) -> bool {
        self.positions.contains_key(key)
    }

    pub fn is_known(&self, key: &ConstraintKey) -> bool {
        self.definitions.contains_key(key)
    }

    pub fn num_active(&self) -> usize {
        self.active.len()
    }

    /// The solver row index of an active key
    pub fn row_of(&self, key: &ConstraintKey) -> Option<usize> {
        self.positions.get(key).copied()
    }

    /// Active keys in sorted order, suitable for structural comparison
    pub fn active_keys(&self) -> Vec<ConstraintKey> {
        let mut keys = self.active.clone();
        keys.sort_unstable();
        keys
    }

    /// Adds a new row to a live solver. Fails if the key is already active.
    pub fn add<S: Solver>(
        &mut self,
        solver: &mut S,
        key: ConstraintKey,
        definition: RowDefinition,
    ) -> Result<usize> {
        if self.is_active(&key) {
            return Err(PlanningError::ConstraintLifecycle {
                key,
                reason: "already active".to_string(),
            });
        }
        let row = solver.add_row(
            definition.lower,
            definition.upper,
            &definition.factors,
        )?;
        self.definitions.insert(key, definition);
        self.positions.insert(key, self.active.len());
        self.active.push(key);
        Ok(row)
    }

    /// Deletes the rows of the given keys from the solver. Their
    /// definitions are kept so that they can be restored.
    pub fn remove<S: Solver>(
        &mut self,
        solver: &mut S,
        keys: &[ConstraintKey],
    ) -> Result<()> {
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            match self.positions.get(key) {
                Some(row) => rows.push(*row),
                None => {
                    return Err(PlanningError::ConstraintLifecycle {
                        key: *key,
                        reason: "removing a constraint that is not active"
                            .to_string(),
                    })
                }
            }
        }
        solver.delete_rows(&rows)?;
        self.active.retain(|k| !keys.contains(k));
        self.rebuild_positions();
        Ok(())
    }

    /// Removes a row and forgets its definition, for auxiliary rows that
    /// only live during a single solve.
    pub fn discard<S: Solver>(
        &mut self,
        solver: &mut S,
        key: ConstraintKey,
    ) -> Result<()> {
        self.remove(solver, &[key])?;
        self.definitions.shift_remove(&key);
        Ok(())
    }

    /// Removes every active row tagged with `period`. Returns the removed
    /// keys. Pruning a period twice is a lifecycle error.
    pub fn remove_period<S: Solver>(
        &mut self,
        solver: &mut S,
        period: usize,
    ) -> Result<Vec<ConstraintKey>> {
        let keys: Vec<ConstraintKey> = self
            .active
            .iter()
            .filter(|k| k.period == period)
            .copied()
            .collect();
        if keys.is_empty() {
            let key = self
                .definitions
                .keys()
                .find(|k| k.period == period)
                .copied();
            return match key {
                Some(key) => Err(PlanningError::ConstraintLifecycle {
                    key,
                    reason: format!("period {period} was already pruned"),
                }),
                None => Err(PlanningError::configuration(
                    "period",
                    format!("no constraints are tagged with period {period}"),
                )),
            };
        }
        self.remove(solver, &keys)?;
        Ok(keys)
    }

    /// Re-adds a single removed row
    pub fn restore<S: Solver>(
        &mut self,
        solver: &mut S,
        key: ConstraintKey,
    ) -> Result<usize> {
        let Some(definition) = self.definitions.get(&key).cloned() else {
            return Err(PlanningError::ConstraintLifecycle {
                key,
                reason: "restoring an unknown constraint".to_string(),
            });
        };
        self.add(solver, key, definition)
    }

    /// Re-adds every known row that is not active. Returns how many rows
    /// were restored.
    pub fn restore_all<S: Solver>(&mut self, solver: &mut S) -> Result<usize> {
        let inactive: Vec<ConstraintKey> = self
            .definitions
            .keys()
            .filter(|k| !self.positions.contains_key(*k))
            .copied()
            .collect();
        for key in inactive.iter() {
            self.restore(solver, *key)?;
        }
        Ok(inactive.len())
    }

    fn rebuild_positions(&mut self) {
        self.positions = self
            .active
            .iter()
            .enumerate()
            .map(|(row, key)| (*key, row))
            .collect();
    }
}
