//! LP editing and normalisation utilities.
//!
//! Everything here keeps the CSC invariants of [`Lp`] intact: `a_start`
//! monotone, parallel arrays (names and integrality included) resized
//! together, indices in range.

use crate::model::{Integrality, Lp, ModelError, ObjSense, SimplexBasis, NONBASIC_FLAG_TRUE};
use crate::options::SolverOptions;

/// Outcome of [`assess_lp`]: counts of the repairs applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssessReport {
    /// Matrix entries dropped for being below `small_matrix_value`.
    pub num_small_values_dropped: usize,
    /// Bounds capped to infinity for exceeding `infinite_bound`.
    pub num_bounds_made_infinite: usize,
    /// Bound pairs snapped together within tolerance.
    pub num_bounds_snapped: usize,
}

/// Validate and normalise an LP in place: structural validation, capping
/// of near-infinite bounds, dropping of negligible matrix entries, and
/// rejection of oversized entries or crossed bound pairs.
pub fn assess_lp(lp: &mut Lp, options: &SolverOptions) -> Result<AssessReport, ModelError> {
    let mut report = AssessReport::default();
    let tol = options.primal_feasibility_tolerance;

    // Bound pairs: snap tiny inversions, reject real ones, cap infinities.
    for j in 0..lp.num_col {
        if lp.col_lower[j] > lp.col_upper[j] {
            if lp.col_lower[j] > lp.col_upper[j] + tol {
                return Err(ModelError::InconsistentColBounds {
                    col: j,
                    lower: lp.col_lower[j],
                    upper: lp.col_upper[j],
                });
            }
            lp.col_lower[j] = lp.col_upper[j];
            report.num_bounds_snapped += 1;
        }
        report.num_bounds_made_infinite +=
            cap_bound(&mut lp.col_lower[j], &mut lp.col_upper[j], options.infinite_bound);
    }
    for i in 0..lp.num_row {
        if lp.row_lower[i] > lp.row_upper[i] {
            if lp.row_lower[i] > lp.row_upper[i] + tol {
                return Err(ModelError::InconsistentRowBounds {
                    row: i,
                    lower: lp.row_lower[i],
                    upper: lp.row_upper[i],
                });
            }
            lp.row_lower[i] = lp.row_upper[i];
            report.num_bounds_snapped += 1;
        }
        report.num_bounds_made_infinite +=
            cap_bound(&mut lp.row_lower[i], &mut lp.row_upper[i], options.infinite_bound);
    }

    // Matrix entries: reject the huge, drop the negligible.
    for j in 0..lp.num_col {
        let (_, value) = lp.col(j);
        for &v in value {
            if v.abs() > options.large_matrix_value {
                return Err(ModelError::LargeMatrixValue {
                    col: j,
                    value: v,
                    limit: options.large_matrix_value,
                });
            }
        }
    }
    let mut new_start = vec![0usize; lp.num_col + 1];
    let mut new_index = Vec::with_capacity(lp.num_nz());
    let mut new_value = Vec::with_capacity(lp.num_nz());
    for j in 0..lp.num_col {
        for k in lp.a_start[j]..lp.a_start[j + 1] {
            if lp.a_value[k].abs() < options.small_matrix_value {
                report.num_small_values_dropped += 1;
            } else {
                new_index.push(lp.a_index[k]);
                new_value.push(lp.a_value[k]);
            }
        }
        new_start[j + 1] = new_index.len();
    }
    if report.num_small_values_dropped > 0 {
        lp.a_start = new_start;
        lp.a_index = new_index;
        lp.a_value = new_value;
    }

    lp.validate()?;
    Ok(report)
}

fn cap_bound(lower: &mut f64, upper: &mut f64, infinite_bound: f64) -> usize {
    let mut capped = 0;
    if *lower <= -infinite_bound && lower.is_finite() {
        *lower = f64::NEG_INFINITY;
        capped += 1;
    }
    if *upper >= infinite_bound && upper.is_finite() {
        *upper = f64::INFINITY;
        capped += 1;
    }
    capped
}

/// Append columns given in CSC form.
pub fn add_cols(
    lp: &mut Lp,
    col_cost: &[f64],
    col_lower: &[f64],
    col_upper: &[f64],
    a_start: &[usize],
    a_index: &[usize],
    a_value: &[f64],
) {
    let num_new = col_cost.len();
    debug_assert_eq!(col_lower.len(), num_new);
    debug_assert_eq!(col_upper.len(), num_new);
    debug_assert_eq!(a_start.len(), num_new + 1);

    let base_nz = lp.num_nz();
    for j in 0..num_new {
        for k in a_start[j]..a_start[j + 1] {
            lp.a_index.push(a_index[k]);
            lp.a_value.push(a_value[k]);
        }
        lp.a_start.push(base_nz + a_start[j + 1]);
    }
    lp.col_cost.extend_from_slice(col_cost);
    lp.col_lower.extend_from_slice(col_lower);
    lp.col_upper.extend_from_slice(col_upper);
    if !lp.col_names.is_empty() {
        for j in 0..num_new {
            lp.col_names.push(format!("C{}", lp.num_col + j));
        }
    }
    if !lp.integrality.is_empty() {
        lp.integrality
            .extend(std::iter::repeat(Integrality::Continuous).take(num_new));
    }
    lp.num_col += num_new;
}

/// Append rows given in CSR form. The column-wise matrix is rebuilt by a
/// stable merge.
pub fn add_rows(
    lp: &mut Lp,
    row_lower: &[f64],
    row_upper: &[f64],
    ar_start: &[usize],
    ar_index: &[usize],
    ar_value: &[f64],
) {
    let num_new = row_lower.len();
    debug_assert_eq!(row_upper.len(), num_new);
    debug_assert_eq!(ar_start.len(), num_new + 1);

    let mut extra_per_col = vec![0usize; lp.num_col];
    for &j in &ar_index[..ar_start[num_new]] {
        extra_per_col[j] += 1;
    }

    let mut new_start = vec![0usize; lp.num_col + 1];
    for j in 0..lp.num_col {
        new_start[j + 1] = new_start[j] + (lp.a_start[j + 1] - lp.a_start[j]) + extra_per_col[j];
    }
    let total = new_start[lp.num_col];
    let mut new_index = vec![0usize; total];
    let mut new_value = vec![0.0; total];
    let mut fill: Vec<usize> = new_start[..lp.num_col].to_vec();
    for j in 0..lp.num_col {
        for k in lp.a_start[j]..lp.a_start[j + 1] {
            new_index[fill[j]] = lp.a_index[k];
            new_value[fill[j]] = lp.a_value[k];
            fill[j] += 1;
        }
    }
    for r in 0..num_new {
        let row = lp.num_row + r;
        for k in ar_start[r]..ar_start[r + 1] {
            let j = ar_index[k];
            new_index[fill[j]] = row;
            new_value[fill[j]] = ar_value[k];
            fill[j] += 1;
        }
    }

    lp.a_start = new_start;
    lp.a_index = new_index;
    lp.a_value = new_value;
    lp.row_lower.extend_from_slice(row_lower);
    lp.row_upper.extend_from_slice(row_upper);
    if !lp.row_names.is_empty() {
        for r in 0..num_new {
            lp.row_names.push(format!("R{}", lp.num_row + r));
        }
    }
    lp.num_row += num_new;
}

/// Delete the column range `[from, to)`.
pub fn delete_cols(lp: &mut Lp, from: usize, to: usize) {
    debug_assert!(from <= to && to <= lp.num_col);
    let removed = to - from;
    if removed == 0 {
        return;
    }
    let mut new_start = Vec::with_capacity(lp.num_col + 1 - removed);
    let mut new_index = Vec::new();
    let mut new_value = Vec::new();
    new_start.push(0);
    for j in (0..lp.num_col).filter(|j| *j < from || *j >= to) {
        for k in lp.a_start[j]..lp.a_start[j + 1] {
            new_index.push(lp.a_index[k]);
            new_value.push(lp.a_value[k]);
        }
        new_start.push(new_index.len());
    }
    lp.a_start = new_start;
    lp.a_index = new_index;
    lp.a_value = new_value;
    lp.col_cost.drain(from..to);
    lp.col_lower.drain(from..to);
    lp.col_upper.drain(from..to);
    if !lp.col_names.is_empty() {
        lp.col_names.drain(from..to);
    }
    if !lp.integrality.is_empty() {
        lp.num_int -= lp.integrality[from..to]
            .iter()
            .filter(|&&m| m == Integrality::Integer)
            .count();
        lp.integrality.drain(from..to);
    }
    lp.num_col -= removed;
}

/// Delete the row range `[from, to)`, dropping their matrix entries and
/// shifting the indices above.
pub fn delete_rows(lp: &mut Lp, from: usize, to: usize) {
    debug_assert!(from <= to && to <= lp.num_row);
    let removed = to - from;
    if removed == 0 {
        return;
    }
    let mut new_start = vec![0usize; lp.num_col + 1];
    let mut new_index = Vec::with_capacity(lp.num_nz());
    let mut new_value = Vec::with_capacity(lp.num_nz());
    for j in 0..lp.num_col {
        for k in lp.a_start[j]..lp.a_start[j + 1] {
            let i = lp.a_index[k];
            if i < from {
                new_index.push(i);
                new_value.push(lp.a_value[k]);
            } else if i >= to {
                new_index.push(i - removed);
                new_value.push(lp.a_value[k]);
            }
        }
        new_start[j + 1] = new_index.len();
    }
    lp.a_start = new_start;
    lp.a_index = new_index;
    lp.a_value = new_value;
    lp.row_lower.drain(from..to);
    lp.row_upper.drain(from..to);
    if !lp.row_names.is_empty() {
        lp.row_names.drain(from..to);
    }
    lp.num_row -= removed;
}

/// Extend a basis for columns appended to the LP: the new columns enter
/// nonbasic and the logical indices shift up.
pub fn extend_basis_with_nonbasic_cols(lp: &Lp, basis: &mut SimplexBasis, num_new_col: usize) {
    let old_num_col = lp.num_col - num_new_col;
    for var in basis.basic_index.iter_mut() {
        if *var >= old_num_col {
            *var += num_new_col;
        }
    }
    for _ in 0..num_new_col {
        basis.nonbasic_flag.insert(old_num_col, NONBASIC_FLAG_TRUE);
        basis.nonbasic_move.insert(old_num_col, 0);
    }
}

/// Extend a basis for rows appended to the LP: the new logicals enter
/// basic.
pub fn extend_basis_with_basic_rows(lp: &Lp, basis: &mut SimplexBasis, num_new_row: usize) {
    for r in (lp.num_row - num_new_row)..lp.num_row {
        let logical = lp.num_col + r;
        basis.basic_index.push(logical);
        basis.nonbasic_flag.push(0);
        basis.nonbasic_move.push(0);
    }
}

/// Rewrite `l <= Ax <= u` as `Ax - s = 0` with one boxed slack per row.
/// Objective values at corresponding points are unchanged.
pub fn transform_into_equality_problem(lp: &Lp) -> Lp {
    let mut equality = lp.clone();
    let num_col = lp.num_col;
    for i in 0..lp.num_row {
        equality.a_index.push(i);
        equality.a_value.push(-1.0);
        equality.a_start.push(equality.a_index.len());
        equality.col_cost.push(0.0);
        equality.col_lower.push(lp.row_lower[i]);
        equality.col_upper.push(lp.row_upper[i]);
        if !equality.col_names.is_empty() {
            equality.col_names.push(format!("C{}", num_col + i));
        }
        if !equality.integrality.is_empty() {
            equality.integrality.push(Integrality::Continuous);
        }
        equality.row_lower[i] = 0.0;
        equality.row_upper[i] = 0.0;
    }
    equality.num_col += lp.num_row;
    equality
}

/// Explicit dual of an equality LP `min c'x, Ax = b, l <= x <= u`:
///
/// ```text
/// max  b'y + l'zl - u'zu   s.t.  A'y + zl - zu = c,  zl, zu >= 0
/// ```
///
/// with `zl`/`zu` columns only for finite bounds. Fails when the input is
/// not an equality problem.
pub fn dualize_equality_problem(lp: &Lp) -> Result<Lp, ModelError> {
    for i in 0..lp.num_row {
        if lp.row_lower[i] != lp.row_upper[i] {
            return Err(ModelError::InconsistentRowBounds {
                row: i,
                lower: lp.row_lower[i],
                upper: lp.row_upper[i],
            });
        }
    }

    let num_dual_row = lp.num_col;
    let mut dual = Lp::with_dims(0, num_dual_row);
    dual.model_name = format!("{}_dual", lp.model_name);
    dual.sense = ObjSense::Maximise;
    dual.row_lower = lp.col_cost.clone();
    dual.row_upper = lp.col_cost.clone();

    // y columns: rows of A, free, cost b_i.
    let transpose = lp.to_csc().transpose_view().to_csc();
    let at_start = transpose.indptr().to_proper().to_vec();
    for i in 0..lp.num_row {
        for k in at_start[i]..at_start[i + 1] {
            dual.a_index.push(transpose.indices()[k]);
            dual.a_value.push(transpose.data()[k]);
        }
        dual.a_start.push(dual.a_index.len());
        dual.col_cost.push(lp.row_upper[i]);
        dual.col_lower.push(f64::NEG_INFINITY);
        dual.col_upper.push(f64::INFINITY);
        dual.num_col += 1;
    }

    // zl columns (+e_j, cost l_j) and zu columns (-e_j, cost -u_j).
    for j in 0..lp.num_col {
        if lp.col_lower[j].is_finite() {
            dual.a_index.push(j);
            dual.a_value.push(1.0);
            dual.a_start.push(dual.a_index.len());
            dual.col_cost.push(lp.col_lower[j]);
            dual.col_lower.push(0.0);
            dual.col_upper.push(f64::INFINITY);
            dual.num_col += 1;
        }
        if lp.col_upper[j].is_finite() {
            dual.a_index.push(j);
            dual.a_value.push(-1.0);
            dual.a_start.push(dual.a_index.len());
            dual.col_cost.push(-lp.col_upper[j]);
            dual.col_lower.push(0.0);
            dual.col_upper.push(f64::INFINITY);
            dual.num_col += 1;
        }
    }

    Ok(dual)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_lp() -> Lp {
        let mut lp = Lp::with_dims(2, 1);
        lp.a_start = vec![0, 1, 2];
        lp.a_index = vec![0, 0];
        lp.a_value = vec![1.0, 2.0];
        lp.col_cost = vec![1.0, 3.0];
        lp.col_upper = vec![4.0, 5.0];
        lp.row_lower = vec![1.0];
        lp.row_upper = vec![1.0];
        lp
    }

    #[test]
    fn test_assess_caps_and_drops() {
        let mut lp = small_lp();
        lp.col_upper[0] = 1e21;
        lp.a_value[1] = 1e-12;
        let report = assess_lp(&mut lp, &SolverOptions::default()).unwrap();
        assert_eq!(report.num_bounds_made_infinite, 1);
        assert_eq!(report.num_small_values_dropped, 1);
        assert_eq!(lp.col_upper[0], f64::INFINITY);
        assert_eq!(lp.num_nz(), 1);
        assert_eq!(lp.a_start, vec![0, 1, 1]);
    }

    #[test]
    fn test_assess_rejects_crossed_bounds() {
        let mut lp = small_lp();
        lp.col_lower[1] = 10.0;
        assert!(assess_lp(&mut lp, &SolverOptions::default()).is_err());
    }

    #[test]
    fn test_assess_rejects_large_values() {
        let mut lp = small_lp();
        lp.a_value[0] = 1e16;
        assert!(matches!(
            assess_lp(&mut lp, &SolverOptions::default()),
            Err(ModelError::LargeMatrixValue { col: 0, .. })
        ));
    }

    #[test]
    fn test_add_delete_cols_round_trip() {
        let mut lp = small_lp();
        let original = lp.clone();
        add_cols(
            &mut lp,
            &[7.0],
            &[0.0],
            &[1.0],
            &[0, 1],
            &[0],
            &[5.0],
        );
        assert_eq!(lp.num_col, 3);
        assert_eq!(lp.num_nz(), 3);
        assert!(lp.validate().is_ok());
        delete_cols(&mut lp, 2, 3);
        assert_eq!(lp, original);
    }

    #[test]
    fn test_add_delete_rows_round_trip() {
        let mut lp = small_lp();
        let original = lp.clone();
        add_rows(&mut lp, &[0.0], &[2.0], &[0, 2], &[0, 1], &[1.0, 1.0]);
        assert_eq!(lp.num_row, 2);
        assert_eq!(lp.num_nz(), 4);
        assert!(lp.validate().is_ok());
        // The merged matrix keeps column order.
        assert_eq!(lp.a_index, vec![0, 1, 0, 1]);
        delete_rows(&mut lp, 1, 2);
        assert_eq!(lp, original);
    }

    #[test]
    fn test_delete_middle_row_shifts_indices() {
        let mut lp = small_lp();
        add_rows(&mut lp, &[0.0], &[2.0], &[0, 1], &[1], &[9.0]);
        delete_rows(&mut lp, 0, 1);
        assert_eq!(lp.num_row, 1);
        assert_eq!(lp.a_index, vec![0]);
        assert_eq!(lp.a_value, vec![9.0]);
        assert!(lp.validate().is_ok());
    }

    #[test]
    fn test_basis_extension() {
        let lp0 = small_lp();
        let mut basis = SimplexBasis::logical(2, 1);
        let mut lp = lp0.clone();
        add_cols(&mut lp, &[0.0], &[0.0], &[1.0], &[0, 0], &[], &[]);
        extend_basis_with_nonbasic_cols(&lp, &mut basis, 1);
        assert!(basis.consistent(3, 1));
        // The logical stays basic under its shifted index.
        assert_eq!(basis.basic_index[0], 3);
        add_rows(&mut lp, &[0.0], &[1.0], &[0, 0], &[], &[]);
        extend_basis_with_basic_rows(&lp, &mut basis, 1);
        assert!(basis.consistent(3, 2));
    }

    #[test]
    fn test_equality_transform_preserves_objective() {
        let mut lp = small_lp();
        lp.row_lower = vec![f64::NEG_INFINITY];
        lp.row_upper = vec![4.0];
        let equality = transform_into_equality_problem(&lp);
        assert_eq!(equality.num_col, 3);
        assert!(equality.validate().is_ok());
        assert!(is_equality(&equality));
        // x = (1, 1): objective matches; the slack carries the row bounds.
        let x = [1.0, 1.0];
        assert_eq!(
            lp.objective_value(&x),
            equality.objective_value(&[1.0, 1.0, 3.0])
        );
        assert_eq!(equality.col_upper[2], 4.0);
        assert_eq!(equality.col_lower[2], f64::NEG_INFINITY);
    }

    fn is_equality(lp: &Lp) -> bool {
        (0..lp.num_row).all(|i| lp.row_lower[i] == lp.row_upper[i])
    }

    #[test]
    fn test_dualize_shapes() {
        // min x1 + 3 x2, x1 + 2 x2 = 1, 0 <= x <= (4, 5).
        let lp = small_lp();
        let dual = dualize_equality_problem(&lp).unwrap();
        assert_eq!(dual.sense, ObjSense::Maximise);
        assert_eq!(dual.num_row, 2);
        // One y column plus zl and zu for both bounded columns.
        assert_eq!(dual.num_col, 5);
        assert!(dual.validate().is_ok());
        // y column reproduces the row of A.
        let (index, value) = dual.col(0);
        assert_eq!(index, &[0, 1]);
        assert_eq!(value, &[1.0, 2.0]);
        // Dual rows are pinned to the primal costs.
        assert_eq!(dual.row_lower, vec![1.0, 3.0]);
    }

    #[test]
    fn test_dualize_rejects_inequality() {
        let mut lp = small_lp();
        lp.row_lower = vec![0.0];
        assert!(dualize_equality_problem(&lp).is_err());
    }
}
