//! Problem data structures and validation.
//!
//! This module defines the canonical LP representation used throughout the
//! solver, together with the scaling record, the simplex basis, and the
//! action log through which incremental model edits invalidate derived
//! state.

pub mod util;

use thiserror::Error;

/// Sparse matrix in CSC format, used at the model-builder boundary.
pub type SparseCsc = sprs::CsMatI<f64, usize>;

/// Objective sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjSense {
    #[default]
    Minimise,
    Maximise,
}

impl ObjSense {
    /// +1 for minimisation, -1 for maximisation.
    pub fn sign(self) -> f64 {
        match self {
            ObjSense::Minimise => 1.0,
            ObjSense::Maximise => -1.0,
        }
    }
}

/// Variable integrality marker. Carried through the data model; the engine
/// solves the LP relaxation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Integrality {
    #[default]
    Continuous,
    Integer,
}

/// Linear program in compressed-column form:
///
/// ```text
/// minimise    c'x + offset
/// subject to  row_lower <= A x <= row_upper
///             col_lower <=  x  <= col_upper
/// ```
///
/// # Invariants
///
/// - `a_start` has length `num_col + 1`, is monotone non-decreasing, and
///   `a_start[num_col]` equals the number of nonzeros;
/// - every entry of `a_index` is in `[0, num_row)`;
/// - bounds satisfy `lower <= upper`, with infinities permitted.
///
/// [`Lp::validate`] checks all of the above.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Lp {
    pub num_col: usize,
    pub num_row: usize,
    /// Number of integer-marked columns.
    pub num_int: usize,

    pub a_start: Vec<usize>,
    pub a_index: Vec<usize>,
    pub a_value: Vec<f64>,

    pub col_cost: Vec<f64>,
    pub col_lower: Vec<f64>,
    pub col_upper: Vec<f64>,
    pub row_lower: Vec<f64>,
    pub row_upper: Vec<f64>,

    pub sense: ObjSense,
    pub offset: f64,

    pub model_name: String,
    /// Empty when no names are known; otherwise length `num_col`.
    pub col_names: Vec<String>,
    /// Empty when no names are known; otherwise length `num_row`.
    pub row_names: Vec<String>,
    /// Empty when all columns are continuous; otherwise length `num_col`.
    pub integrality: Vec<Integrality>,
}

/// Model validation errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("array {name} has length {actual}, expected {expected}")]
    DimensionMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("a_start is not monotone non-decreasing at column {0}")]
    NonMonotoneStart(usize),

    #[error("a_start[num_col] = {start_end} but {nnz} nonzeros are stored")]
    StartNnzMismatch { start_end: usize, nnz: usize },

    #[error("row index {index} in column {col} out of range (num_row = {num_row})")]
    IndexOutOfRange {
        col: usize,
        index: usize,
        num_row: usize,
    },

    #[error("column {col} has lower bound {lower} > upper bound {upper}")]
    InconsistentColBounds { col: usize, lower: f64, upper: f64 },

    #[error("row {row} has lower bound {lower} > upper bound {upper}")]
    InconsistentRowBounds { row: usize, lower: f64, upper: f64 },

    #[error("matrix value {value} in column {col} exceeds large_matrix_value {limit}")]
    LargeMatrixValue { col: usize, value: f64, limit: f64 },
}

impl Lp {
    /// Create an empty LP with the given dimensions and default (free)
    /// bounds on rows, `[0, +inf)` bounds on columns.
    pub fn with_dims(num_col: usize, num_row: usize) -> Self {
        Lp {
            num_col,
            num_row,
            a_start: vec![0; num_col + 1],
            col_cost: vec![0.0; num_col],
            col_lower: vec![0.0; num_col],
            col_upper: vec![f64::INFINITY; num_col],
            row_lower: vec![f64::NEG_INFINITY; num_row],
            row_upper: vec![f64::INFINITY; num_row],
            ..Default::default()
        }
    }

    /// Number of stored matrix nonzeros.
    pub fn num_nz(&self) -> usize {
        self.a_value.len()
    }

    /// Size of the combined structural + logical variable space.
    pub fn num_tot(&self) -> usize {
        self.num_col + self.num_row
    }

    /// The (indices, values) pair of column `j`.
    pub fn col(&self, j: usize) -> (&[usize], &[f64]) {
        let lo = self.a_start[j];
        let hi = self.a_start[j + 1];
        (&self.a_index[lo..hi], &self.a_value[lo..hi])
    }

    /// Validate all dimension and bound invariants.
    pub fn validate(&self) -> Result<(), ModelError> {
        let check = |name: &'static str, expected: usize, actual: usize| {
            if actual != expected {
                Err(ModelError::DimensionMismatch {
                    name,
                    expected,
                    actual,
                })
            } else {
                Ok(())
            }
        };
        check("a_start", self.num_col + 1, self.a_start.len())?;
        check("col_cost", self.num_col, self.col_cost.len())?;
        check("col_lower", self.num_col, self.col_lower.len())?;
        check("col_upper", self.num_col, self.col_upper.len())?;
        check("row_lower", self.num_row, self.row_lower.len())?;
        check("row_upper", self.num_row, self.row_upper.len())?;
        check("a_value", self.a_index.len(), self.a_value.len())?;
        if !self.col_names.is_empty() {
            check("col_names", self.num_col, self.col_names.len())?;
        }
        if !self.row_names.is_empty() {
            check("row_names", self.num_row, self.row_names.len())?;
        }
        if !self.integrality.is_empty() {
            check("integrality", self.num_col, self.integrality.len())?;
        }

        for j in 0..self.num_col {
            if self.a_start[j + 1] < self.a_start[j] {
                return Err(ModelError::NonMonotoneStart(j));
            }
        }
        if self.a_start[self.num_col] != self.num_nz() {
            return Err(ModelError::StartNnzMismatch {
                start_end: self.a_start[self.num_col],
                nnz: self.num_nz(),
            });
        }
        for j in 0..self.num_col {
            let (index, _) = self.col(j);
            for &i in index {
                if i >= self.num_row {
                    return Err(ModelError::IndexOutOfRange {
                        col: j,
                        index: i,
                        num_row: self.num_row,
                    });
                }
            }
        }

        for j in 0..self.num_col {
            if self.col_lower[j] > self.col_upper[j] {
                return Err(ModelError::InconsistentColBounds {
                    col: j,
                    lower: self.col_lower[j],
                    upper: self.col_upper[j],
                });
            }
        }
        for i in 0..self.num_row {
            if self.row_lower[i] > self.row_upper[i] {
                return Err(ModelError::InconsistentRowBounds {
                    row: i,
                    lower: self.row_lower[i],
                    upper: self.row_upper[i],
                });
            }
        }
        Ok(())
    }

    /// Build an LP from a CSC constraint matrix and bound/cost vectors.
    pub fn from_csc(
        a: &SparseCsc,
        col_cost: Vec<f64>,
        col_lower: Vec<f64>,
        col_upper: Vec<f64>,
        row_lower: Vec<f64>,
        row_upper: Vec<f64>,
    ) -> Self {
        assert!(a.is_csc(), "constraint matrix must be in CSC storage");
        let num_row = a.rows();
        let num_col = a.cols();
        let mut lp = Lp::with_dims(num_col, num_row);
        lp.a_start = a.indptr().to_proper().to_vec();
        lp.a_index = a.indices().to_vec();
        lp.a_value = a.data().to_vec();
        lp.col_cost = col_cost;
        lp.col_lower = col_lower;
        lp.col_upper = col_upper;
        lp.row_lower = row_lower;
        lp.row_upper = row_upper;
        lp
    }

    /// Export the constraint matrix as a `sprs` CSC matrix. Built through
    /// the triplet form, since column entries are in file order rather
    /// than sorted.
    pub fn to_csc(&self) -> SparseCsc {
        let mut tri = sprs::TriMatI::<f64, usize>::new((self.num_row, self.num_col));
        for j in 0..self.num_col {
            let (index, value) = self.col(j);
            for (&i, &v) in index.iter().zip(value) {
                tri.add_triplet(i, j, v);
            }
        }
        tri.to_csc()
    }

    /// Objective value `c'x + offset` at a primal point.
    pub fn objective_value(&self, col_value: &[f64]) -> f64 {
        let cx: f64 = self
            .col_cost
            .iter()
            .zip(col_value)
            .map(|(&c, &x)| c * x)
            .sum();
        cx + self.offset
    }
}

/// Cost, column and row scaling factors. Stored so scaling is reversible.
#[derive(Debug, Clone, Default)]
pub struct Scale {
    pub is_scaled: bool,
    pub cost: f64,
    pub col: Vec<f64>,
    pub row: Vec<f64>,
    pub extreme_equilibration_improvement: f64,
    pub mean_equilibration_improvement: f64,
}

impl Scale {
    pub fn identity(num_col: usize, num_row: usize) -> Self {
        Scale {
            is_scaled: false,
            cost: 1.0,
            col: vec![1.0; num_col],
            row: vec![1.0; num_row],
            extreme_equilibration_improvement: 1.0,
            mean_equilibration_improvement: 1.0,
        }
    }
}

/// Nonbasic variable sits at its lower bound and may move up.
pub const NONBASIC_MOVE_UP: i8 = 1;
/// Nonbasic variable is fixed or free.
pub const NONBASIC_MOVE_ZERO: i8 = 0;
/// Nonbasic variable sits at its upper bound and may move down.
pub const NONBASIC_MOVE_DOWN: i8 = -1;

/// Flag value marking a variable nonbasic.
pub const NONBASIC_FLAG_TRUE: i8 = 1;
/// Flag value marking a variable basic.
pub const NONBASIC_FLAG_FALSE: i8 = 0;

/// Simplex basis over the combined variable space `[0, num_col + num_row)`:
/// variable `j < num_col` is structural, `num_col + i` is the logical of
/// row `i`.
///
/// Exactly `num_row` variables have `nonbasic_flag == 0` and each appears
/// once in `basic_index`; the basis matrix B is formed from the
/// corresponding columns of `[A | -I]`.
#[derive(Debug, Clone, Default)]
pub struct SimplexBasis {
    pub basic_index: Vec<usize>,
    pub nonbasic_flag: Vec<i8>,
    pub nonbasic_move: Vec<i8>,
}

impl SimplexBasis {
    /// The logical basis: the slack of each row is basic, all structural
    /// columns nonbasic.
    pub fn logical(num_col: usize, num_row: usize) -> Self {
        let num_tot = num_col + num_row;
        let mut basis = SimplexBasis {
            basic_index: (0..num_row).map(|i| num_col + i).collect(),
            nonbasic_flag: vec![NONBASIC_FLAG_TRUE; num_tot],
            nonbasic_move: vec![NONBASIC_MOVE_ZERO; num_tot],
        };
        for i in 0..num_row {
            basis.nonbasic_flag[num_col + i] = NONBASIC_FLAG_FALSE;
        }
        basis
    }

    /// Check the counting invariant: `basic_index` has one entry per row,
    /// each flagged basic, each appearing once.
    pub fn consistent(&self, num_col: usize, num_row: usize) -> bool {
        let num_tot = num_col + num_row;
        if self.basic_index.len() != num_row
            || self.nonbasic_flag.len() != num_tot
            || self.nonbasic_move.len() != num_tot
        {
            return false;
        }
        let num_basic = self
            .nonbasic_flag
            .iter()
            .filter(|&&f| f == NONBASIC_FLAG_FALSE)
            .count();
        if num_basic != num_row {
            return false;
        }
        let mut seen = vec![false; num_tot];
        for &var in &self.basic_index {
            if var >= num_tot || seen[var] || self.nonbasic_flag[var] != NONBASIC_FLAG_FALSE {
                return false;
            }
            seen[var] = true;
        }
        true
    }
}

/// Model edits that invalidate derived simplex state before the next solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpAction {
    Dualise,
    Permute,
    Scale,
    NewCosts,
    NewBounds,
    NewBasis,
    NewCols,
    NewRows,
    DelCols,
    DelRows,
    DelRowsBasisOk,
}

/// Validity flags for state derived from the LP. Cleared selectively by
/// [`SimplexLpStatus::update`] as actions are applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplexLpStatus {
    pub valid: bool,
    pub is_dualised: bool,
    pub is_permuted: bool,
    pub scaling_tried: bool,
    pub has_basis: bool,
    pub has_matrix_col_wise: bool,
    pub has_matrix_row_wise: bool,
    pub has_factor_arrays: bool,
    pub has_dual_steepest_edge_weights: bool,
    pub has_nonbasic_dual_values: bool,
    pub has_basic_primal_values: bool,
    pub has_invert: bool,
    pub has_fresh_invert: bool,
    pub has_fresh_rebuild: bool,
    pub has_dual_objective_value: bool,
}

impl SimplexLpStatus {
    /// Record `action` by clearing the flags it invalidates.
    pub fn update(&mut self, action: LpAction) {
        match action {
            LpAction::Dualise => {
                self.is_dualised = true;
                self.invalidate();
            }
            LpAction::Permute => {
                self.is_permuted = true;
                self.invalidate();
            }
            LpAction::Scale => {
                self.scaling_tried = true;
                self.invalidate();
            }
            LpAction::NewCosts => {
                self.has_nonbasic_dual_values = false;
                self.has_fresh_rebuild = false;
                self.has_dual_objective_value = false;
            }
            LpAction::NewBounds => {
                self.has_basic_primal_values = false;
                self.has_fresh_rebuild = false;
                self.has_dual_objective_value = false;
            }
            LpAction::NewBasis | LpAction::NewCols | LpAction::NewRows | LpAction::DelCols
            | LpAction::DelRows => {
                self.has_basis = matches!(action, LpAction::NewBasis);
                self.has_matrix_col_wise = false;
                self.has_matrix_row_wise = false;
                self.has_factor_arrays = false;
                self.has_dual_steepest_edge_weights = false;
                self.has_nonbasic_dual_values = false;
                self.has_basic_primal_values = false;
                self.has_invert = false;
                self.has_fresh_invert = false;
                self.has_fresh_rebuild = false;
                self.has_dual_objective_value = false;
            }
            LpAction::DelRowsBasisOk => {
                self.has_matrix_col_wise = false;
                self.has_matrix_row_wise = false;
                self.has_factor_arrays = false;
                self.has_invert = false;
                self.has_fresh_invert = false;
                self.has_fresh_rebuild = false;
                self.has_dual_objective_value = false;
            }
        }
    }

    fn invalidate(&mut self) {
        self.has_matrix_col_wise = false;
        self.has_matrix_row_wise = false;
        self.has_factor_arrays = false;
        self.has_dual_steepest_edge_weights = false;
        self.has_nonbasic_dual_values = false;
        self.has_basic_primal_values = false;
        self.has_invert = false;
        self.has_fresh_invert = false;
        self.has_fresh_rebuild = false;
        self.has_dual_objective_value = false;
    }
}

/// Algorithmic outcome of a solve. Not an error: infeasible and unbounded
/// declarations are primary results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolutionStatus {
    #[default]
    Unset,
    Optimal,
    PrimalInfeasible,
    Unbounded,
    /// Iteration/time limit or bailout; current (possibly infeasible)
    /// solution returned.
    ReachedLimit,
    /// Basis singular even after refactor from a logical crash.
    Singular,
}

impl std::fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SolutionStatus::Unset => "Unset",
            SolutionStatus::Optimal => "Optimal",
            SolutionStatus::PrimalInfeasible => "Primal infeasible",
            SolutionStatus::Unbounded => "Unbounded",
            SolutionStatus::ReachedLimit => "Reached limit",
            SolutionStatus::Singular => "Singular basis",
        };
        write!(f, "{}", name)
    }
}

/// Engine-level return status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Ok,
    Warning,
    Error,
    NotImplemented,
}

/// Primal/dual solution in the original (unscaled) model space.
#[derive(Debug, Clone, Default)]
pub struct Solution {
    pub col_value: Vec<f64>,
    pub col_dual: Vec<f64>,
    pub row_value: Vec<f64>,
    pub row_dual: Vec<f64>,
}

impl Solution {
    /// The solution dimensions match the LP.
    pub fn is_consistent(&self, lp: &Lp) -> bool {
        self.col_value.len() == lp.num_col
            && self.col_dual.len() == lp.num_col
            && self.row_value.len() == lp.num_row
            && self.row_dual.len() == lp.num_row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_lp() -> Lp {
        // min -x - y  s.t.  x + y <= 4, x <= 3, y <= 3, x,y >= 0
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
    fn test_validate_ok() {
        assert!(small_lp().validate().is_ok());
    }

    #[test]
    fn test_validate_bad_start() {
        let mut lp = small_lp();
        lp.a_start[2] = 1;
        assert!(matches!(
            lp.validate(),
            Err(ModelError::StartNnzMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_crossed_bounds() {
        let mut lp = small_lp();
        lp.col_lower[1] = 5.0;
        assert!(matches!(
            lp.validate(),
            Err(ModelError::InconsistentColBounds { col: 1, .. })
        ));
    }

    #[test]
    fn test_csc_round_trip() {
        let lp = small_lp();
        let a = lp.to_csc();
        let lp2 = Lp::from_csc(
            &a,
            lp.col_cost.clone(),
            lp.col_lower.clone(),
            lp.col_upper.clone(),
            lp.row_lower.clone(),
            lp.row_upper.clone(),
        );
        let mut lp2 = lp2;
        lp2.sense = lp.sense;
        assert_eq!(lp, lp2);
    }

    #[test]
    fn test_logical_basis_consistent() {
        let basis = SimplexBasis::logical(2, 3);
        assert!(basis.consistent(2, 3));
        assert_eq!(basis.basic_index, vec![2, 3, 4]);
    }

    #[test]
    fn test_status_invalidation() {
        let mut status = SimplexLpStatus {
            valid: true,
            has_basis: true,
            has_invert: true,
            has_nonbasic_dual_values: true,
            ..Default::default()
        };
        status.update(LpAction::NewCosts);
        assert!(!status.has_nonbasic_dual_values);
        assert!(status.has_invert);
        status.update(LpAction::NewRows);
        assert!(!status.has_invert);
        assert!(!status.has_basis);
    }
}
