//! Crash: heuristic choice of an initial basis.
//!
//! Greedy pass over the structural columns, shortest columns first,
//! replacing row logicals by singleton and doubleton columns when the
//! pivot entry is stable. Free rows are preferred, since displacing their
//! logical cannot create a primal infeasibility. Columns that find no
//! acceptable row stay nonbasic, so the result degrades gracefully to the
//! logical basis.

use crate::model::{Lp, SimplexBasis, NONBASIC_FLAG_FALSE, NONBASIC_FLAG_TRUE};

/// Columns longer than this are never crashed into the basis.
const MAX_CRASH_COL_COUNT: usize = 2;

/// Minimum pivot magnitude relative to the column max.
const CRASH_PIVOT_THRESHOLD: f64 = 0.1;

/// Build an initial basis for the LP by greedy column selection.
pub fn crash_basis(lp: &Lp) -> SimplexBasis {
    let mut basis = SimplexBasis::logical(lp.num_col, lp.num_row);
    if lp.num_row == 0 {
        return basis;
    }
    let mut row_used = vec![false; lp.num_row];

    let mut order: Vec<usize> = (0..lp.num_col)
        .filter(|&j| {
            let count = lp.a_start[j + 1] - lp.a_start[j];
            (1..=MAX_CRASH_COL_COUNT).contains(&count) && lp.col_lower[j] < lp.col_upper[j]
        })
        .collect();
    order.sort_by_key(|&j| (lp.a_start[j + 1] - lp.a_start[j], j));

    for &j in &order {
        let (index, value) = lp.col(j);
        let col_max = value.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));

        let mut best: Option<(f64, usize)> = None;
        for (&i, &v) in index.iter().zip(value) {
            if row_used[i] || v.abs() < CRASH_PIVOT_THRESHOLD * col_max {
                continue;
            }
            let free_row = lp.row_lower[i] == f64::NEG_INFINITY && lp.row_upper[i] == f64::INFINITY;
            let score = v.abs() * if free_row { 16.0 } else { 1.0 };
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, i));
            }
        }
        if let Some((_, i)) = best {
            let logical = lp.num_col + i;
            basis.basic_index[i] = j;
            basis.nonbasic_flag[j] = NONBASIC_FLAG_FALSE;
            basis.nonbasic_flag[logical] = NONBASIC_FLAG_TRUE;
            row_used[i] = true;
        }
    }
    basis
}
