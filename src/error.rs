use crate::constraint::ConstraintKey;
use std::fmt::{Display, Formatter};

/// The failure modes of building, solving and mutating the planning models.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanningError {
    /// Conflicting, missing or negative input parameters. Raised before any
    /// solver call.
    Configuration { field: String, reason: String },
    /// A probability function was evaluated outside of its support
    Domain(String),
    /// The solver proved that no feasible solution exists
    Infeasible { status: String },
    /// The solver returned an error status or an unexpected model status
    Solver { operation: String, status: String },
    /// A keyed constraint was removed twice or restored while active
    ConstraintLifecycle { key: ConstraintKey, reason: String },
}

impl PlanningError {
    pub fn configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn solver(operation: impl Into<String>, status: impl Display) -> Self {
        Self::Solver {
            operation: operation.into(),
            status: status.to_string(),
        }
    }

    pub fn is_infeasible(&self) -> bool {
        matches!(self, Self::Infeasible { .. })
    }
}

impl Display for PlanningError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration { field, reason } => {
                write!(f, "invalid configuration for '{field}': {reason}")
            }
            Self::Domain(msg) => write!(f, "domain error: {msg}"),
            Self::Infeasible { status } => {
                write!(f, "model is infeasible (solver status: {status})")
            }
            Self::Solver { operation, status } => {
                write!(f, "solver error during {operation}: {status}")
            }
            Self::ConstraintLifecycle { key, reason } => {
                write!(f, "constraint lifecycle violated for {key}: {reason}")
            }
        }
    }
}

impl std::error::Error for PlanningError {}

pub type Result<T> = std::result::Result<T, PlanningError>;
