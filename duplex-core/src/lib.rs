//! Duplex: a dual revised simplex solver for sparse linear programs.
//!
//! Solves
//!
//! ```text
//! minimise    c'x + c0
//! subject to  rl <= Ax <= ru,  cl <= x <= cu,  x_j integer for j in I
//! ```
//!
//! returning a primal-dual optimal basic solution, or a declaration of
//! primal infeasibility or unboundedness. Integrality markers are carried
//! through the data model; the engine solves the LP relaxation.
//!
//! # Architecture
//!
//! - **model**: the LP data model, basis, scaling record and edit
//!   utilities;
//! - **sparse**: hybrid dense/indexed vectors and the doubly-stored
//!   constraint matrix with its PRICE kernels;
//! - **factor**: the LU factorisation of the basis with rank-1 updates;
//! - **simplex**: the dual simplex workspace, pricing, ratio test, crash
//!   and the two-phase driver;
//! - **presolve**: the augmented-Lagrangian feasibility subsolver used as
//!   a warm-start device;
//! - **io**: MPS and EMS readers/writers and the message sink layer.
//!
//! # Example
//!
//! ```
//! use duplex_core::{solve, Lp, SolverOptions};
//!
//! // minimise -x - y  s.t.  x + y <= 4,  0 <= x, y <= 3
//! let mut lp = Lp::with_dims(2, 1);
//! lp.a_start = vec![0, 1, 2];
//! lp.a_index = vec![0, 0];
//! lp.a_value = vec![1.0, 1.0];
//! lp.col_cost = vec![-1.0, -1.0];
//! lp.col_upper = vec![3.0, 3.0];
//! lp.row_upper = vec![4.0];
//!
//! let result = solve(&lp, &SolverOptions::default()).unwrap();
//! assert_eq!(result.status, duplex_core::SolutionStatus::Optimal);
//! assert!((result.objective_value + 4.0).abs() < 1e-7);
//! ```

pub mod factor;
pub mod io;
pub mod model;
pub mod options;
pub mod presolve;
pub mod simplex;
pub mod sparse;
pub mod util;

pub use io::messages::{MessageSink, MessageType};
pub use model::{
    EngineStatus, Integrality, Lp, LpAction, ModelError, ObjSense, Scale, SimplexBasis,
    SolutionStatus, Solution,
};
pub use options::{
    DualEdgeWeightStrategy, MpsParserType, PriceStrategy, SimplexStrategy, SolverOptions,
};

use io::messages::MessageType as LogType;
use model::util::assess_lp;
use model::SimplexLpStatus;
use simplex::crash::crash_basis;
use simplex::dual::DualSimplex;

/// Result of a solve: status, solution in the original model space, and
/// counters.
#[derive(Debug, Clone)]
pub struct SolveResult {
    pub status: SolutionStatus,
    pub solution: Solution,
    pub objective_value: f64,
    pub iteration_count: usize,
}

/// Solve an LP with a sink built from the options.
pub fn solve(lp: &Lp, options: &SolverOptions) -> Result<SolveResult, ModelError> {
    let mut sink = MessageSink::new(options.message_level);
    solve_with_sink(lp, options, &mut sink)
}

/// Solve an LP, reporting through the caller's sink.
pub fn solve_with_sink(
    lp: &Lp,
    options: &SolverOptions,
    sink: &mut MessageSink,
) -> Result<SolveResult, ModelError> {
    let mut normalised = lp.clone();
    let report = assess_lp(&mut normalised, options)?;
    if report.num_small_values_dropped > 0 {
        sink.log(
            LogType::Warning,
            &format!(
                "dropped {} matrix values below {}",
                report.num_small_values_dropped, options.small_matrix_value
            ),
        );
    }

    let mut engine = DualSimplex::new(&normalised, options);
    if options.use_crash {
        let basis = crash_basis(&engine.ws.lp);
        engine.ws.replace_with_new_basis(basis);
    }
    let status = engine.solve(options, sink);
    Ok(SolveResult {
        status,
        solution: engine.solution(),
        objective_value: engine.objective_value(),
        iteration_count: engine.ws.iteration_count,
    })
}

/// A model instance supporting repeated solves with incremental edits.
///
/// Edits communicate through the action log, so only the affected derived
/// state is rebuilt: bound and cost changes keep the basis for a warm
/// start, while structural edits extend or drop it.
#[derive(Debug)]
pub struct Solver {
    lp: Lp,
    options: SolverOptions,
    status: SimplexLpStatus,
    basis: Option<SimplexBasis>,
}

impl Solver {
    pub fn new(lp: Lp, options: SolverOptions) -> Result<Self, ModelError> {
        lp.validate()?;
        Ok(Solver {
            lp,
            options,
            status: SimplexLpStatus::default(),
            basis: None,
        })
    }

    pub fn lp(&self) -> &Lp {
        &self.lp
    }

    pub fn options_mut(&mut self) -> &mut SolverOptions {
        &mut self.options
    }

    /// Replace the costs.
    pub fn change_costs(&mut self, col_cost: Vec<f64>) {
        debug_assert_eq!(col_cost.len(), self.lp.num_col);
        self.lp.col_cost = col_cost;
        self.status.update(LpAction::NewCosts);
    }

    /// Replace column bounds.
    pub fn change_col_bounds(&mut self, lower: Vec<f64>, upper: Vec<f64>) {
        debug_assert_eq!(lower.len(), self.lp.num_col);
        self.lp.col_lower = lower;
        self.lp.col_upper = upper;
        self.status.update(LpAction::NewBounds);
    }

    /// Replace row bounds.
    pub fn change_row_bounds(&mut self, lower: Vec<f64>, upper: Vec<f64>) {
        debug_assert_eq!(lower.len(), self.lp.num_row);
        self.lp.row_lower = lower;
        self.lp.row_upper = upper;
        self.status.update(LpAction::NewBounds);
    }

    /// Append columns in CSC form; they enter the retained basis
    /// nonbasic.
    pub fn add_cols(
        &mut self,
        col_cost: &[f64],
        col_lower: &[f64],
        col_upper: &[f64],
        a_start: &[usize],
        a_index: &[usize],
        a_value: &[f64],
    ) {
        let num_new = col_cost.len();
        model::util::add_cols(
            &mut self.lp,
            col_cost,
            col_lower,
            col_upper,
            a_start,
            a_index,
            a_value,
        );
        if let Some(basis) = self.basis.as_mut() {
            model::util::extend_basis_with_nonbasic_cols(&self.lp, basis, num_new);
        }
        self.status.update(LpAction::NewCols);
        self.status.has_basis = self.basis.is_some();
    }

    /// Append rows in CSR form; their logicals enter the retained basis.
    pub fn add_rows(
        &mut self,
        row_lower: &[f64],
        row_upper: &[f64],
        ar_start: &[usize],
        ar_index: &[usize],
        ar_value: &[f64],
    ) {
        let num_new = row_lower.len();
        model::util::add_rows(&mut self.lp, row_lower, row_upper, ar_start, ar_index, ar_value);
        if let Some(basis) = self.basis.as_mut() {
            model::util::extend_basis_with_basic_rows(&self.lp, basis, num_new);
        }
        self.status.update(LpAction::NewRows);
        self.status.has_basis = self.basis.is_some();
    }

    /// Delete the column range `[from, to)`. The retained basis is
    /// dropped.
    pub fn delete_cols(&mut self, from: usize, to: usize) {
        model::util::delete_cols(&mut self.lp, from, to);
        self.basis = None;
        self.status.update(LpAction::DelCols);
    }

    /// Delete the row range `[from, to)`. The retained basis is dropped.
    pub fn delete_rows(&mut self, from: usize, to: usize) {
        model::util::delete_rows(&mut self.lp, from, to);
        self.basis = None;
        self.status.update(LpAction::DelRows);
    }

    /// Delete rows whose logicals are known to be basic: the basis
    /// survives with the corresponding entries removed.
    pub fn delete_rows_basis_ok(&mut self, from: usize, to: usize) {
        if let Some(basis) = self.basis.take() {
            let num_col = self.lp.num_col;
            let removed = to - from;
            let survives = (from..to).all(|i| {
                let logical = num_col + i;
                basis.nonbasic_flag[logical] == 0
            });
            if survives {
                let mut updated = SimplexBasis::default();
                for &var in &basis.basic_index {
                    if var < num_col {
                        updated.basic_index.push(var);
                    } else {
                        let row = var - num_col;
                        if row < from {
                            updated.basic_index.push(var);
                        } else if row >= to {
                            updated.basic_index.push(var - removed);
                        }
                    }
                }
                for (var, (&flag, &mv)) in basis
                    .nonbasic_flag
                    .iter()
                    .zip(&basis.nonbasic_move)
                    .enumerate()
                {
                    let keep = if var < num_col {
                        true
                    } else {
                        let row = var - num_col;
                        row < from || row >= to
                    };
                    if keep {
                        updated.nonbasic_flag.push(flag);
                        updated.nonbasic_move.push(mv);
                    }
                }
                self.basis = Some(updated);
            }
        }
        model::util::delete_rows(&mut self.lp, from, to);
        self.status.update(LpAction::DelRowsBasisOk);
        self.status.has_basis = self.basis.is_some();
    }

    /// Install a starting basis.
    pub fn set_basis(&mut self, basis: SimplexBasis) -> Result<(), ModelError> {
        if !basis.consistent(self.lp.num_col, self.lp.num_row) {
            return Err(ModelError::DimensionMismatch {
                name: "basis",
                expected: self.lp.num_row,
                actual: basis.basic_index.len(),
            });
        }
        self.basis = Some(basis);
        self.status.update(LpAction::NewBasis);
        Ok(())
    }

    /// Solve the current model, reusing the retained basis when the
    /// action log says it is still valid.
    pub fn solve(&mut self) -> Result<SolveResult, ModelError> {
        let mut sink = MessageSink::new(self.options.message_level);
        let mut normalised = self.lp.clone();
        assess_lp(&mut normalised, &self.options)?;

        let mut engine = DualSimplex::new(&normalised, &self.options);
        // A retained basis addresses unpermuted columns.
        let warm = !self.options.permute_simplex_lp;
        let mut installed = false;
        if warm {
            if let Some(basis) = self.basis.as_ref() {
                if self.status.has_basis
                    && basis.consistent(normalised.num_col, normalised.num_row)
                {
                    engine.ws.replace_with_new_basis(basis.clone());
                    installed = true;
                }
            }
        }
        if !installed && self.options.use_crash {
            let basis = crash_basis(&engine.ws.lp);
            engine.ws.replace_with_new_basis(basis);
        }

        let status = engine.solve(&self.options, &mut sink);
        if warm {
            self.basis = Some(engine.ws.basis.clone());
            self.status.has_basis = true;
        }
        self.status.valid = true;
        Ok(SolveResult {
            status,
            solution: engine.solution(),
            objective_value: engine.objective_value(),
            iteration_count: engine.ws.iteration_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded_lp() -> Lp {
        let mut lp = Lp::with_dims(2, 1);
        lp.a_start = vec![0, 1, 2];
        lp.a_index = vec![0, 0];
        lp.a_value = vec![1.0, 1.0];
        lp.col_cost = vec![-1.0, -1.0];
        lp.col_upper = vec![3.0, 3.0];
        lp.row_upper = vec![4.0];
        lp
    }

    #[test]
    fn test_solve_entry_point() {
        let result = solve(&bounded_lp(), &SolverOptions::default()).unwrap();
        assert_eq!(result.status, SolutionStatus::Optimal);
        assert!((result.objective_value + 4.0).abs() < 1e-9);
        assert!(result.iteration_count >= 1);
    }

    #[test]
    fn test_solver_warm_restart_after_bound_change() {
        let mut solver = Solver::new(bounded_lp(), SolverOptions::default()).unwrap();
        let first = solver.solve().unwrap();
        assert_eq!(first.status, SolutionStatus::Optimal);

        // Tighten the row: the retained basis warm-starts the second
        // solve.
        solver.change_row_bounds(vec![f64::NEG_INFINITY], vec![2.0]);
        let second = solver.solve().unwrap();
        assert_eq!(second.status, SolutionStatus::Optimal);
        assert!((second.objective_value + 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_solver_add_rows_and_cols() {
        let mut solver = Solver::new(bounded_lp(), SolverOptions::default()).unwrap();
        solver.solve().unwrap();

        // A new column with strongly negative cost joins the optimum.
        solver.add_cols(&[-10.0], &[0.0], &[1.0], &[0, 1], &[0], &[1.0]);
        let result = solver.solve().unwrap();
        assert_eq!(result.status, SolutionStatus::Optimal);
        assert!((result.objective_value + 13.0).abs() < 1e-9);

        // An extra row capping the new column.
        solver.add_rows(&[f64::NEG_INFINITY], &[0.5], &[0, 1], &[2], &[1.0]);
        let result = solver.solve().unwrap();
        assert_eq!(result.status, SolutionStatus::Optimal);
        assert!((result.objective_value + 8.5).abs() < 1e-9);
    }

    #[test]
    fn test_solver_delete_cols() {
        let mut solver = Solver::new(bounded_lp(), SolverOptions::default()).unwrap();
        solver.solve().unwrap();
        solver.delete_cols(1, 2);
        let result = solver.solve().unwrap();
        assert_eq!(result.status, SolutionStatus::Optimal);
        assert!((result.objective_value + 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_crash_option_end_to_end() {
        let options = SolverOptions {
            use_crash: true,
            ..SolverOptions::default()
        };
        let result = solve(&bounded_lp(), &options).unwrap();
        assert_eq!(result.status, SolutionStatus::Optimal);
        assert!((result.objective_value + 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_lp_rejected() {
        let mut lp = bounded_lp();
        lp.a_index = vec![0, 5];
        assert!(solve(&lp, &SolverOptions::default()).is_err());
    }
}
