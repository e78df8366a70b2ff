//! Thin wrapper over the HiGHS C API, only supporting a row-oriented
//! problem builder, while adding the incremental operations needed by the
//! rolling-horizon engine: deleting rows, changing column bounds and costs,
//! switching the objective sense and querying the solution status.
//!
//! The rest of the crate only talks to the solver through the [`Solver`]
//! trait, so another LP/MIP backend can be plugged in without touching the
//! planning code.

use std::borrow::Borrow;
use std::convert::TryFrom;
use std::ffi::{c_void, CStr, CString};
use std::fmt::{Debug, Display, Formatter};
use std::num::TryFromIntError;
use std::ops::{Bound, RangeBounds};
use std::os::raw::{c_char, c_int};

use highs_sys::*;

use crate::error::{PlanningError, Result};
use crate::log;

/// HiGHS value for an integer column
const VAR_TYPE_INTEGER: c_int = 1;

/// HiGHS value of `primal_solution_status` for a feasible point
const SOLUTION_STATUS_FEASIBLE: c_int = 2;

/// HiGHS values of `simplex_strategy`
const SIMPLEX_STRATEGY_DUAL: c_int = 1;
const SIMPLEX_STRATEGY_PRIMAL: c_int = 4;

/// The kinds of results of an optimization
#[derive(Clone, Copy, Debug, PartialOrd, PartialEq, Ord, Eq)]
pub enum HighsModelStatus {
    /// not initialized
    NotSet = MODEL_STATUS_NOTSET as isize,
    /// Unable to load model
    LoadError = MODEL_STATUS_LOAD_ERROR as isize,
    /// invalid model
    ModelError = MODEL_STATUS_MODEL_ERROR as isize,
    /// Unable to run the pre-solve phase
    PresolveError = MODEL_STATUS_PRESOLVE_ERROR as isize,
    /// Unable to solve
    SolveError = MODEL_STATUS_SOLVE_ERROR as isize,
    /// Unable to clean after solve
    PostsolveError = MODEL_STATUS_POSTSOLVE_ERROR as isize,
    /// No variables in the model: nothing to optimize
    ModelEmpty = MODEL_STATUS_MODEL_EMPTY as isize,
    /// There is no solution to the problem
    Infeasible = MODEL_STATUS_INFEASIBLE as isize,
    /// The problem in unbounded or infeasible
    UnboundedOrInfeasible = MODEL_STATUS_UNBOUNDED_OR_INFEASIBLE as isize,
    /// The problem is unbounded: there is no single optimal value
    Unbounded = MODEL_STATUS_UNBOUNDED as isize,
    /// An optimal solution was found
    Optimal = MODEL_STATUS_OPTIMAL as isize,
    /// objective bound
    ObjectiveBound = MODEL_STATUS_OBJECTIVE_BOUND as isize,
    /// objective target
    ObjectiveTarget = MODEL_STATUS_OBJECTIVE_TARGET as isize,
    /// reached limit
    ReachedTimeLimit = MODEL_STATUS_REACHED_TIME_LIMIT as isize,
    /// reached limit
    ReachedIterationLimit = MODEL_STATUS_REACHED_ITERATION_LIMIT as isize,
    /// Unknown model status
    Unknown = MODEL_STATUS_UNKNOWN as isize,
}

impl Display for HighsModelStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// This error should never happen: an unexpected status was returned
#[derive(PartialEq, Clone, Copy)]
pub struct InvalidStatus(pub c_int);

impl Debug for InvalidStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} is not a valid HiGHS model status", self.0)
    }
}

impl TryFrom<c_int> for HighsModelStatus {
    type Error = InvalidStatus;

    fn try_from(value: c_int) -> std::result::Result<Self, Self::Error> {
        match value {
            MODEL_STATUS_NOTSET => Ok(Self::NotSet),
            MODEL_STATUS_LOAD_ERROR => Ok(Self::LoadError),
            MODEL_STATUS_MODEL_ERROR => Ok(Self::ModelError),
            MODEL_STATUS_PRESOLVE_ERROR => Ok(Self::PresolveError),
            MODEL_STATUS_SOLVE_ERROR => Ok(Self::SolveError),
            MODEL_STATUS_POSTSOLVE_ERROR => Ok(Self::PostsolveError),
            MODEL_STATUS_MODEL_EMPTY => Ok(Self::ModelEmpty),
            MODEL_STATUS_INFEASIBLE => Ok(Self::Infeasible),
            MODEL_STATUS_UNBOUNDED => Ok(Self::Unbounded),
            MODEL_STATUS_UNBOUNDED_OR_INFEASIBLE => {
                Ok(Self::UnboundedOrInfeasible)
            }
            MODEL_STATUS_OPTIMAL => Ok(Self::Optimal),
            MODEL_STATUS_OBJECTIVE_BOUND => Ok(Self::ObjectiveBound),
            MODEL_STATUS_OBJECTIVE_TARGET => Ok(Self::ObjectiveTarget),
            MODEL_STATUS_REACHED_TIME_LIMIT => Ok(Self::ReachedTimeLimit),
            MODEL_STATUS_REACHED_ITERATION_LIMIT => {
                Ok(Self::ReachedIterationLimit)
            }
            MODEL_STATUS_UNKNOWN => Ok(Self::Unknown),
            n => Err(InvalidStatus(n)),
        }
    }
}

/// The status of a highs operation
#[derive(Clone, Copy, Debug, PartialOrd, PartialEq, Ord, Eq)]
pub enum HighsStatus {
    /// Success
    OK = 0,
    /// Done, with warning
    Warning = 1,
    /// An error occurred
    Error = 2,
}

impl Display for HighsStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl TryFrom<c_int> for HighsStatus {
    type Error = InvalidStatus;

    fn try_from(value: c_int) -> std::result::Result<Self, InvalidStatus> {
        match value {
            STATUS_OK => Ok(Self::OK),
            STATUS_WARNING => Ok(Self::Warning),
            STATUS_ERROR => Ok(Self::Error),
            n => Err(InvalidStatus(n)),
        }
    }
}

pub trait HighsOptionValue {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> c_int;
}

impl HighsOptionValue for bool {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> c_int {
        Highs_setBoolOptionValue(highs, option, if self { 1 } else { 0 })
    }
}

impl HighsOptionValue for i32 {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> c_int {
        Highs_setIntOptionValue(highs, option, self)
    }
}

impl HighsOptionValue for f64 {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> c_int {
        Highs_setDoubleOptionValue(highs, option, self)
    }
}

impl<'a> HighsOptionValue for &'a CStr {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> c_int {
        Highs_setStringOptionValue(highs, option, self.as_ptr())
    }
}

impl<'a> HighsOptionValue for &'a str {
    unsafe fn apply_to_highs(
        self,
        highs: *mut c_void,
        option: *const c_char,
    ) -> c_int {
        match CString::new(self) {
            Ok(value) => value.as_c_str().apply_to_highs(highs, option),
            Err(_) => STATUS_ERROR,
        }
    }
}

fn bound_value<N: Into<f64> + Copy>(b: Bound<&N>) -> Option<f64> {
    match b {
        Bound::Included(v) | Bound::Excluded(v) => Some((*v).into()),
        Bound::Unbounded => None,
    }
}

fn bounds_of<N: Into<f64> + Copy, B: RangeBounds<N>>(bounds: B) -> (f64, f64) {
    let low = bound_value(bounds.start_bound()).unwrap_or(f64::NEG_INFINITY);
    let high = bound_value(bounds.end_bound()).unwrap_or(f64::INFINITY);
    (low, high)
}

fn c(n: usize) -> HighsInt {
    n.try_into().expect("size too large for HiGHS")
}

fn try_handle_status(
    status: c_int,
    msg: &str,
) -> std::result::Result<HighsStatus, PlanningError> {
    let status_enum = HighsStatus::try_from(status)
        .map_err(|e| PlanningError::solver(msg, format!("{e:?}")))?;
    match status_enum {
        status @ HighsStatus::OK => Ok(status),
        status @ HighsStatus::Warning => {
            log::solver_warning(msg);
            Ok(status)
        }
        error => Err(PlanningError::solver(msg, error)),
    }
}

macro_rules! highs_call {
    ($function_name:ident ($($param:expr),+)) => {
        try_handle_status(
            $function_name($($param),+),
            stringify!($function_name)
        )
    }
}

/// An optimization problem under construction. Columns must be added before
/// the rows that reference them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Problem {
    pub num_col: usize,
    pub num_row: usize,
    pub num_nz: usize,
    pub col_cost: Vec<f64>,
    pub col_lower: Vec<f64>,
    pub col_upper: Vec<f64>,
    pub row_lower: Vec<f64>,
    pub row_upper: Vec<f64>,
    columns: Vec<(Vec<c_int>, Vec<f64>)>,
}

impl Problem {
    /// Create a new problem instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row<
        N: Into<f64> + Copy,
        B: RangeBounds<N>,
        ITEM: Borrow<(usize, f64)>,
        I: IntoIterator<Item = ITEM>,
    >(
        &mut self,
        bounds: B,
        row_factors: I,
    ) -> usize {
        let num_rows: c_int = c(self.num_row);
        for r in row_factors {
            let &(col, factor) = r.borrow();
            let column = &mut self.columns[col];
            column.0.push(num_rows);
            column.1.push(factor);
            self.num_nz += 1;
        }
        let (low, high) = bounds_of(bounds);
        self.row_lower.push(low);
        self.row_upper.push(high);
        let old_row_count = self.num_row;
        self.num_row += 1;
        old_row_count
    }

    pub fn add_column<N: Into<f64> + Copy, B: RangeBounds<N>>(
        &mut self,
        col_factor: f64,
        bounds: B,
    ) -> usize {
        self.col_cost.push(col_factor);
        let (low, high) = bounds_of(bounds);
        self.col_lower.push(low);
        self.col_upper.push(high);
        self.columns.push((vec![], vec![]));
        let old_col_count = self.num_col;
        self.num_col += 1;
        old_col_count
    }

    fn to_compressed_matrix_form(&self) -> (Vec<c_int>, Vec<c_int>, Vec<f64>) {
        let mut astart = Vec::with_capacity(self.num_col + 1);
        astart.push(0);
        let mut aindex = Vec::with_capacity(self.num_nz);
        let mut avalue = Vec::with_capacity(self.num_nz);
        for (row_indices, factors) in self.columns.iter() {
            aindex.extend_from_slice(row_indices);
            avalue.extend_from_slice(factors);
            astart.push(c(aindex.len()));
        }
        (astart, aindex, avalue)
    }
}

#[derive(Debug)]
struct HighsPtr(*mut c_void);

impl Drop for HighsPtr {
    fn drop(&mut self) {
        unsafe { Highs_destroy(self.0) }
    }
}

impl Default for HighsPtr {
    fn default() -> Self {
        Self(unsafe { Highs_create() })
    }
}

impl HighsPtr {
    // Needed until https://github.com/ERGO-Code/HiGHS/issues/479 is fixed
    unsafe fn unsafe_mut_ptr(&self) -> *mut c_void {
        self.0
    }

    fn mut_ptr(&mut self) -> *mut c_void {
        self.0
    }

    /// Prevents writing anything to the standard output when solving the model
    fn make_quiet(&mut self) {
        self.set_option(&b"output_flag"[..], false);
        self.set_option(&b"log_to_console"[..], false);
    }

    /// Set a custom parameter on the model. Unknown options are reported
    /// as warnings and otherwise ignored.
    fn set_option<STR: Into<Vec<u8>>, V: HighsOptionValue>(
        &mut self,
        option: STR,
        value: V,
    ) {
        let Ok(c_str) = CString::new(option) else {
            log::solver_warning("invalid option name");
            return;
        };
        let status =
            unsafe { value.apply_to_highs(self.mut_ptr(), c_str.as_ptr()) };
        if try_handle_status(status, "Highs_setOptionValue").is_err() {
            log::solver_warning(&format!(
                "option {} was rejected",
                c_str.to_string_lossy()
            ));
        }
    }

    #[cfg(test)]
    fn int_option(&self, option: &str) -> Option<c_int> {
        let c_str = CString::new(option).ok()?;
        let mut value: HighsInt = 0;
        let status =
            unsafe { Highs_getIntOptionValue(self.0, c_str.as_ptr(), &mut value) };
        (status == STATUS_OK).then_some(value)
    }

    #[cfg(test)]
    fn double_option(&self, option: &str) -> Option<f64> {
        let c_str = CString::new(option).ok()?;
        let mut value: f64 = 0.0;
        let status = unsafe {
            Highs_getDoubleOptionValue(self.0, c_str.as_ptr(), &mut value)
        };
        (status == STATUS_OK).then_some(value)
    }

    fn num_cols(&self) -> std::result::Result<usize, TryFromIntError> {
        let n = unsafe { Highs_getNumCols(self.0) };
        n.try_into()
    }

    fn num_rows(&self) -> std::result::Result<usize, TryFromIntError> {
        let n = unsafe { Highs_getNumRows(self.0) };
        n.try_into()
    }
}

/// Whether to maximize or minimize the objective function
#[repr(C)]
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Sense {
    /// max
    Maximise = OBJECTIVE_SENSE_MAXIMIZE as isize,
    /// min
    Minimise = OBJECTIVE_SENSE_MINIMIZE as isize,
}

/// Solver parameters shared by every solve of a model
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverOptions {
    /// Wall-clock limit for a single solve, in seconds
    pub time_limit: f64,
    pub feasibility_tolerance: f64,
    pub mip_rel_gap: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            time_limit: 300.0,
            feasibility_tolerance: 1e-7,
            mip_rel_gap: 1e-6,
        }
    }
}

/// What the caller may rely on after a successful solve
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveOutcome {
    pub status: HighsModelStatus,
    /// False when a limit was hit and only a feasible incumbent is known
    pub proven_optimal: bool,
}

/// The capabilities the planning models need from an LP/MIP solver.
pub trait Solver: Sized {
    fn from_problem(problem: Problem, sense: Sense) -> Result<Self>;
    fn num_cols(&self) -> usize;
    fn num_rows(&self) -> usize;
    /// Appends a row and returns its index
    fn add_row(
        &mut self,
        lower: f64,
        upper: f64,
        factors: &[(usize, f64)],
    ) -> Result<usize>;
    /// Deletes rows by index. The remaining rows keep their relative order.
    fn delete_rows(&mut self, rows: &[usize]) -> Result<()>;
    fn col_bounds(&self, col: usize) -> (f64, f64);
    fn change_col_bounds(
        &mut self,
        col: usize,
        lower: f64,
        upper: f64,
    ) -> Result<()>;
    fn costs(&self) -> &[f64];
    fn change_costs(&mut self, costs: &[f64]) -> Result<()>;
    fn sense(&self) -> Sense;
    fn set_sense(&mut self, sense: Sense) -> Result<()>;
    fn set_integer(&mut self, col: usize) -> Result<()>;
    fn apply_options(&mut self, options: &SolverOptions);
    fn solve(&mut self) -> Result<SolveOutcome>;
    fn col_values(&self) -> Vec<f64>;
    fn objective_value(&self) -> f64;
}

/// A model to solve, backed by a HiGHS instance
#[derive(Debug)]
pub struct Model {
    highs: HighsPtr,
    options: SolverOptions,
    sense: Sense,
    /// Set once a column is made integer; MIPs keep the automatic solver
    mip: bool,
    col_cost: Vec<f64>,
    col_lower: Vec<f64>,
    col_upper: Vec<f64>,
}

impl Model {
    /// Create a Highs model to be optimized (but don't solve it yet).
    /// Returns an error if the problem is incoherent
    pub fn try_new(problem: Problem) -> Result<Self> {
        let mut highs = HighsPtr::default();
        highs.make_quiet();
        let offset = 0.0;
        let (astart, aindex, avalue) = problem.to_compressed_matrix_form();
        unsafe {
            highs_call!(Highs_passLp(
                highs.mut_ptr(),
                c(problem.num_col),
                c(problem.num_row),
                c(problem.num_nz),
                MATRIX_FORMAT_COLUMN_WISE,
                OBJECTIVE_SENSE_MINIMIZE,
                offset,
                problem.col_cost.as_ptr(),
                problem.col_lower.as_ptr(),
                problem.col_upper.as_ptr(),
                problem.row_lower.as_ptr(),
                problem.row_upper.as_ptr(),
                astart.as_ptr(),
                aindex.as_ptr(),
                avalue.as_ptr()
            ))?;
        }
        let mut model = Self {
            highs,
            options: SolverOptions::default(),
            sense: Sense::Minimise,
            mip: false,
            col_cost: problem.col_cost,
            col_lower: problem.col_lower,
            col_upper: problem.col_upper,
        };
        model.set_default_options();
        Ok(model)
    }

    pub fn set_option<STR: Into<Vec<u8>>, V: HighsOptionValue>(
        &mut self,
        option: STR,
        value: V,
    ) {
        self.highs.set_option(option, value)
    }

    /// Helper function for setting the same default solver options on
    /// every solved problem.
    fn set_default_options(&mut self) {
        let options = self.options;
        self.set_option("presolve", "off");
        self.set_option("solver", if self.mip { "choose" } else { "simplex" });
        self.set_option("parallel", "off");
        self.set_option("threads", 1);
        self.set_option("simplex_strategy", SIMPLEX_STRATEGY_DUAL);
        self.set_option(
            "primal_feasibility_tolerance",
            options.feasibility_tolerance,
        );
        self.set_option(
            "dual_feasibility_tolerance",
            options.feasibility_tolerance,
        );
        self.set_option("mip_rel_gap", options.mip_rel_gap);
        self.set_option("time_limit", options.time_limit);
    }

    /// Helper function for setting the solver options when retrying a solve
    fn set_retry_options(&mut self, retry: usize) {
        match retry {
            1 => {
                self.set_option("primal_feasibility_tolerance", 1e-6);
                self.set_option("dual_feasibility_tolerance", 1e-6);
            }
            2 => {
                self.set_option("primal_feasibility_tolerance", 1e-5);
                self.set_option("dual_feasibility_tolerance", 1e-5);
            }
            3 => self.set_option("simplex_strategy", SIMPLEX_STRATEGY_PRIMAL),
            4 => {
                self.set_option("presolve", "on");
                if !self.mip {
                    self.set_option("solver", "ipm");
                }
                self.set_option(
                    "primal_feasibility_tolerance",
                    self.options.feasibility_tolerance,
                );
                self.set_option(
                    "dual_feasibility_tolerance",
                    self.options.feasibility_tolerance,
                );
            }
            _ => self.set_default_options(),
        }
    }

    fn run(&mut self) -> Result<HighsModelStatus> {
        unsafe { highs_call!(Highs_run(self.highs.mut_ptr())) }?;
        self.status()
    }

    /// The status of the last solve
    pub fn status(&self) -> Result<HighsModelStatus> {
        let model_status =
            unsafe { Highs_getModelStatus(self.highs.unsafe_mut_ptr()) };
        HighsModelStatus::try_from(model_status).map_err(|e| {
            PlanningError::solver("Highs_getModelStatus", format!("{e:?}"))
        })
    }

    fn has_feasible_incumbent(&self) -> bool {
        let mut value: HighsInt = 0;
        let Ok(info) = CString::new("primal_solution_status") else {
            return false;
        };
        let status = unsafe {
            Highs_getIntInfoValue(
                self.highs.unsafe_mut_ptr(),
                info.as_ptr(),
                &mut value,
            )
        };
        status == STATUS_OK && value == SOLUTION_STATUS_FEASIBLE
    }

    /// Solves once, retrying with relaxed options while the solver reports
    /// infeasibility. Default options are always restored on exit.
    fn retry_solve(&mut self) -> Result<SolveOutcome> {
        let mut retry: usize = 0;
        let outcome = loop {
            let status = match self.run() {
                Ok(status) => status,
                Err(e) => break Err(e),
            };
            match status {
                HighsModelStatus::Optimal => {
                    break Ok(SolveOutcome {
                        status,
                        proven_optimal: true,
                    })
                }
                HighsModelStatus::ReachedTimeLimit
                | HighsModelStatus::ReachedIterationLimit => {
                    if self.has_feasible_incumbent() {
                        break Ok(SolveOutcome {
                            status,
                            proven_optimal: false,
                        });
                    }
                    break Err(PlanningError::solver(
                        "Highs_run",
                        format!("{status} without a feasible incumbent"),
                    ));
                }
                HighsModelStatus::Infeasible
                | HighsModelStatus::UnboundedOrInfeasible => {
                    if retry >= 4 {
                        break Err(PlanningError::Infeasible {
                            status: status.to_string(),
                        });
                    }
                    retry += 1;
                    self.set_retry_options(retry);
                }
                other => break Err(PlanningError::solver("Highs_run", other)),
            }
        };
        if retry != 0 {
            self.set_default_options();
        }
        outcome
    }

    /// Primal column values of the last solve. HiGHS writes every
    /// solution vector, so the row and dual buffers are scratch space.
    fn primal_values(&self) -> Vec<f64> {
        let cols = Solver::num_cols(self);
        let rows = Solver::num_rows(self);
        let mut colvalue: Vec<f64> = vec![0.; cols];
        let mut coldual: Vec<f64> = vec![0.; cols];
        let mut rowvalue: Vec<f64> = vec![0.; rows];
        let mut rowdual: Vec<f64> = vec![0.; rows];

        unsafe {
            Highs_getSolution(
                self.highs.unsafe_mut_ptr(),
                colvalue.as_mut_ptr(),
                coldual.as_mut_ptr(),
                rowvalue.as_mut_ptr(),
                rowdual.as_mut_ptr(),
            );
        }

        colvalue
    }
}

impl Solver for Model {
    fn from_problem(problem: Problem, sense: Sense) -> Result<Self> {
        let mut model = Model::try_new(problem)?;
        model.set_sense(sense)?;
        Ok(model)
    }

    fn num_cols(&self) -> usize {
        self.highs.num_cols().unwrap_or(0)
    }

    fn num_rows(&self) -> usize {
        self.highs.num_rows().unwrap_or(0)
    }

    fn add_row(
        &mut self,
        lower: f64,
        upper: f64,
        factors: &[(usize, f64)],
    ) -> Result<usize> {
        let cols: Vec<HighsInt> = factors.iter().map(|(col, _)| c(*col)).collect();
        let values: Vec<f64> = factors.iter().map(|(_, value)| *value).collect();
        unsafe {
            highs_call!(Highs_addRow(
                self.highs.mut_ptr(),
                lower,
                upper,
                c(cols.len()),
                cols.as_ptr(),
                values.as_ptr()
            ))
        }?;
        Ok(Solver::num_rows(self) - 1)
    }

    fn delete_rows(&mut self, rows: &[usize]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let num_rows = Solver::num_rows(self);
        let mut set: Vec<usize> = rows.to_vec();
        set.sort_unstable();
        set.dedup();
        if set.last().is_some_and(|row| *row >= num_rows) {
            return Err(PlanningError::solver(
                "Highs_deleteRowsBySet",
                "row index out of range",
            ));
        }
        let set: Vec<HighsInt> = set.into_iter().map(c).collect();
        unsafe {
            highs_call!(Highs_deleteRowsBySet(
                self.highs.mut_ptr(),
                c(set.len()),
                set.as_ptr()
            ))
        }?;
        Ok(())
    }

    fn col_bounds(&self, col: usize) -> (f64, f64) {
        (self.col_lower[col], self.col_upper[col])
    }

    fn change_col_bounds(
        &mut self,
        col: usize,
        lower: f64,
        upper: f64,
    ) -> Result<()> {
        unsafe {
            highs_call!(Highs_changeColBounds(
                self.highs.mut_ptr(),
                c(col),
                lower,
                upper
            ))
        }?;
        self.col_lower[col] = lower;
        self.col_upper[col] = upper;
        Ok(())
    }

    fn costs(&self) -> &[f64] {
        &self.col_cost
    }

    fn change_costs(&mut self, costs: &[f64]) -> Result<()> {
        if costs.len() != self.col_cost.len() {
            return Err(PlanningError::solver(
                "Highs_changeColsCostByRange",
                "cost vector length mismatch",
            ));
        }
        if costs.is_empty() {
            return Ok(());
        }
        unsafe {
            highs_call!(Highs_changeColsCostByRange(
                self.highs.mut_ptr(),
                0,
                c(costs.len() - 1),
                costs.as_ptr()
            ))
        }?;
        self.col_cost.copy_from_slice(costs);
        Ok(())
    }

    fn sense(&self) -> Sense {
        self.sense
    }

    fn set_sense(&mut self, sense: Sense) -> Result<()> {
        unsafe {
            highs_call!(Highs_changeObjectiveSense(
                self.highs.mut_ptr(),
                sense as c_int
            ))
        }?;
        self.sense = sense;
        Ok(())
    }

    fn set_integer(&mut self, col: usize) -> Result<()> {
        unsafe {
            highs_call!(Highs_changeColIntegrality(
                self.highs.mut_ptr(),
                c(col),
                VAR_TYPE_INTEGER
            ))
        }?;
        if !self.mip {
            self.mip = true;
            self.set_option("solver", "choose");
        }
        Ok(())
    }

    fn apply_options(&mut self, options: &SolverOptions) {
        self.options = *options;
        self.set_default_options();
    }

    fn solve(&mut self) -> Result<SolveOutcome> {
        self.retry_solve()
    }

    fn col_values(&self) -> Vec<f64> {
        self.primal_values()
    }

    fn objective_value(&self) -> f64 {
        unsafe { Highs_getObjectiveValue(self.highs.unsafe_mut_ptr()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_problem() -> Problem {
        // max 3a + 2b  s.t.  a + b <= 4,  a + 3b <= 6,  a <= 3
        let mut pb = Problem::new();
        let a = pb.add_column(3.0, 0.0..3.0);
        let b = pb.add_column(2.0, 0.0..);
        pb.add_row(..4.0, &[(a, 1.0), (b, 1.0)]);
        pb.add_row(..6.0, &[(a, 1.0), (b, 3.0)]);
        pb
    }

    #[test]
    fn test_solve_small_problem() {
        let mut model = Model::from_problem(small_problem(), Sense::Maximise)
            .unwrap();
        let outcome = model.solve().unwrap();
        assert!(outcome.proven_optimal);
        assert!((model.objective_value() - 11.0).abs() < 1e-9);
        let values = model.col_values();
        assert!((values[0] - 3.0).abs() < 1e-9);
        assert!((values[1] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_delete_and_readd_row() {
        let mut model = Model::from_problem(small_problem(), Sense::Maximise)
            .unwrap();
        model.delete_rows(&[0]).unwrap();
        assert_eq!(Solver::num_rows(&model), 1);
        model.solve().unwrap();
        // a + 3b <= 6 alone still binds at a = 3, b = 1
        assert!((model.objective_value() - 11.0).abs() < 1e-9);
        model.delete_rows(&[0]).unwrap();
        model.change_col_bounds(1, 0.0, 2.0).unwrap();
        model.solve().unwrap();
        assert!((model.objective_value() - 13.0).abs() < 1e-9);
        let row = model.add_row(f64::NEG_INFINITY, 4.0, &[(0, 1.0), (1, 1.0)]).unwrap();
        assert_eq!(row, 0);
        model.solve().unwrap();
        assert!((model.objective_value() - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_delete_out_of_range_row_fails() {
        let mut model = Model::from_problem(small_problem(), Sense::Maximise)
            .unwrap();
        assert!(model.delete_rows(&[5]).is_err());
    }

    #[test]
    fn test_change_costs_and_sense() {
        let mut model = Model::from_problem(small_problem(), Sense::Maximise)
            .unwrap();
        model.change_costs(&[1.0, 1.0]).unwrap();
        model.set_sense(Sense::Minimise).unwrap();
        model.solve().unwrap();
        assert!(model.objective_value().abs() < 1e-9);
        assert_eq!(model.costs(), &[1.0, 1.0]);
        assert_eq!(model.sense(), Sense::Minimise);
        assert!(model.change_costs(&[1.0]).is_err());
    }

    #[test]
    fn test_infeasible_problem_is_reported() {
        let mut pb = Problem::new();
        let a = pb.add_column(1.0, 0.0..1.0);
        pb.add_row(2.0.., &[(a, 1.0)]);
        let mut model = Model::from_problem(pb, Sense::Maximise).unwrap();
        let err = model.solve().unwrap_err();
        assert!(err.is_infeasible());
    }

    #[test]
    fn test_default_options_restored_after_retries() {
        let mut pb = Problem::new();
        let a = pb.add_column(1.0, 0.0..1.0);
        pb.add_row(2.0.., &[(a, 1.0)]);
        let mut model = Model::from_problem(pb, Sense::Maximise).unwrap();
        assert!(model.solve().is_err());
        assert_eq!(
            model.highs.int_option("simplex_strategy"),
            Some(SIMPLEX_STRATEGY_DUAL)
        );
        assert_eq!(
            model.highs.double_option("primal_feasibility_tolerance"),
            Some(model.options.feasibility_tolerance)
        );
    }

    #[test]
    fn test_integer_column() {
        let mut pb = Problem::new();
        let a = pb.add_column(1.0, 0.0..);
        pb.add_row(..2.5, &[(a, 1.0)]);
        let mut model = Model::from_problem(pb, Sense::Maximise).unwrap();
        model.set_integer(a).unwrap();
        model.solve().unwrap();
        assert!((model.objective_value() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_are_tracked() {
        let mut model = Model::from_problem(small_problem(), Sense::Maximise)
            .unwrap();
        assert_eq!(model.col_bounds(0), (0.0, 3.0));
        model.change_col_bounds(0, 1.0, 1.0).unwrap();
        assert_eq!(model.col_bounds(0), (1.0, 1.0));
    }
}
