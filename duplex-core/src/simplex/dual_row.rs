//! Dual ratio test: CHUZC with bound flipping (BFRT) and the Harris
//! two-pass tolerance.
//!
//! The pivotal row is packed with *signed* values: the driver folds the
//! direction of the leaving variable's movement into each entry, so a
//! candidate's directional coefficient is `nonbasic_move[j] * pack_value`
//! and the dual step is always nonnegative up to tolerance.
//!
//! Pass 1 relaxes every candidate's ratio by the dual feasibility
//! tolerance and sweeps them in increasing order, accumulating the primal
//! change available from flipping boxed candidates; the sweep stops at the
//! first candidate whose flip cannot absorb the remaining infeasibility.
//! Pass 2 picks, among the stopping group, the candidate with the largest
//! pivot magnitude. Candidates swept before the group move to their
//! opposite bounds without leaving the nonbasic partition.

use crate::model::NONBASIC_MOVE_ZERO;
use crate::simplex::workspace::SimplexWorkspace;
use crate::sparse::vector::SparseVector;
use crate::util::sort::maxheapsort_indexed;

/// Pivot entries below this magnitude are not eligible to enter.
const ALPHA_TOLERANCE: f64 = 1e-9;

/// CHUZC working state for one pivotal row.
#[derive(Debug, Clone)]
pub struct DualRow {
    num_tot: usize,

    /// Packed signed pivotal row.
    pub pack_count: usize,
    pub pack_index: Vec<usize>,
    pub pack_value: Vec<f64>,

    // Candidate list, 1-indexed for the heap sort.
    cand_ratio: Vec<f64>,
    cand_index: Vec<usize>,
    pub work_count: usize,

    /// Relaxed dual step bound from pass 1.
    pub work_theta: f64,
    /// Chosen entering variable.
    pub work_pivot: Option<usize>,
    /// Signed pivotal row entry of the chosen variable.
    pub work_alpha: f64,
    /// Boxed candidates to flip to their opposite bound.
    pub flip_list: Vec<usize>,
}

impl DualRow {
    pub fn new(num_tot: usize) -> Self {
        DualRow {
            num_tot,
            pack_count: 0,
            pack_index: vec![0; num_tot],
            pack_value: vec![0.0; num_tot],
            cand_ratio: vec![0.0; num_tot + 1],
            cand_index: vec![0; num_tot + 1],
            work_count: 0,
            work_theta: f64::INFINITY,
            work_pivot: None,
            work_alpha: 0.0,
            flip_list: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.pack_count = 0;
        self.work_count = 0;
        self.work_theta = f64::INFINITY;
        self.work_pivot = None;
        self.work_alpha = 0.0;
        self.flip_list.clear();
    }

    /// Append signed pivotal-row entries.
    pub fn make_pack(&mut self, entries: impl Iterator<Item = (usize, f64)>) {
        for (j, value) in entries {
            self.pack_index[self.pack_count] = j;
            self.pack_value[self.pack_count] = value;
            self.pack_count += 1;
        }
    }

    /// Pass 1: collect candidates and the relaxed minimum ratio.
    /// A nonbasic j is a candidate when its directional coefficient
    /// exceeds the pivot tolerance.
    pub fn choose_possible(&mut self, ws: &SimplexWorkspace) {
        let td = ws.dual_feasibility_tolerance;
        self.work_count = 0;
        self.work_theta = f64::INFINITY;
        for k in 0..self.pack_count {
            let j = self.pack_index[k];
            let mv = ws.basis.nonbasic_move[j] as f64;
            if mv == 0.0 {
                continue;
            }
            let alpha = mv * self.pack_value[k];
            if alpha > ALPHA_TOLERANCE {
                let dual = mv * ws.work_dual[j];
                let ratio = (dual + td) / alpha;
                self.work_count += 1;
                self.cand_ratio[self.work_count] = ratio;
                self.cand_index[self.work_count] = k;
                self.work_theta = self.work_theta.min(ratio);
            }
        }
    }

    /// Merge another row's candidate list (sliced CHUZC).
    pub fn choose_joinpack(&mut self, other: &DualRow) {
        for k in 0..other.pack_count {
            self.pack_index[self.pack_count] = other.pack_index[k];
            self.pack_value[self.pack_count] = other.pack_value[k];
            self.pack_count += 1;
        }
        for t in 1..=other.work_count {
            self.work_count += 1;
            self.cand_ratio[self.work_count] = other.cand_ratio[t];
            // Joined candidate entries address the merged pack.
            self.cand_index[self.work_count] =
                other.cand_index[t] + self.pack_count - other.pack_count;
        }
        self.work_theta = self.work_theta.min(other.work_theta);
    }

    /// Pass 2 with BFRT: sweep candidates by increasing relaxed ratio,
    /// flipping boxed candidates while their combined flip absorbs the
    /// remaining primal infeasibility `delta`; then choose the largest
    /// pivot in the stopping group. Returns false when no candidate
    /// blocks, i.e. the dual is unbounded.
    pub fn choose_final(&mut self, ws: &SimplexWorkspace, delta: f64) -> bool {
        self.flip_list.clear();
        self.work_pivot = None;
        if self.work_count == 0 {
            return false;
        }
        maxheapsort_indexed(&mut self.cand_ratio, &mut self.cand_index, self.work_count);

        let mut remain = delta.abs();
        let mut stop = 0usize;
        let mut found = false;
        for t in 1..=self.work_count {
            let k = self.cand_index[t];
            let j = self.pack_index[k];
            let mv = ws.basis.nonbasic_move[j] as f64;
            let alpha = mv * self.pack_value[k];
            let range = ws.work_range[j];
            if range.is_finite() && remain - range * alpha > 0.0 {
                remain -= range * alpha;
                continue;
            }
            stop = t;
            found = true;
            break;
        }
        if !found {
            // Every candidate flipped and infeasibility remains.
            return false;
        }

        // Harris window: candidates at or below the relaxed ratio of the
        // stopping candidate are admissible; take the largest pivot, ties
        // to the smaller variable index.
        let theta_relax = self.cand_ratio[stop];
        let mut best_k = self.cand_index[stop];
        let mut best_alpha = {
            let j = self.pack_index[best_k];
            ws.basis.nonbasic_move[j] as f64 * self.pack_value[best_k]
        };
        for t in stop + 1..=self.work_count {
            let k = self.cand_index[t];
            let j = self.pack_index[k];
            let mv = ws.basis.nonbasic_move[j] as f64;
            let alpha = mv * self.pack_value[k];
            let strict_ratio = mv * ws.work_dual[j] / alpha;
            if strict_ratio > theta_relax {
                continue;
            }
            let best_j = self.pack_index[best_k];
            if alpha > best_alpha || (alpha == best_alpha && j < best_j) {
                best_k = k;
                best_alpha = alpha;
            }
        }

        // Everything swept before the stopping group flips.
        for t in 1..stop {
            let k = self.cand_index[t];
            self.flip_list.push(self.pack_index[k]);
        }

        let q = self.pack_index[best_k];
        let mv = ws.basis.nonbasic_move[q] as f64;
        self.work_pivot = Some(q);
        self.work_alpha = self.pack_value[best_k];
        self.work_theta = mv * ws.work_dual[q] / best_alpha;
        true
    }

    /// Apply the dual step to every packed entry.
    pub fn update_dual(&self, ws: &mut SimplexWorkspace, theta: f64) {
        for k in 0..self.pack_count {
            let j = self.pack_index[k];
            ws.work_dual[j] -= theta * self.pack_value[k];
        }
    }

    /// Flip the collected boxed candidates and accumulate their column
    /// contributions, scaled by the value change, into the BFRT column.
    pub fn update_flip(&self, ws: &mut SimplexWorkspace, column_bfrt: &mut SparseVector) {
        for &j in &self.flip_list {
            debug_assert_ne!(ws.basis.nonbasic_move[j], NONBASIC_MOVE_ZERO);
            let old_value = ws.work_value[j];
            ws.flip_bound(j);
            let delta = ws.work_value[j] - old_value;
            if delta != 0.0 {
                ws.matrix.collect_aj(column_bfrt, j, delta);
            }
        }
    }

    pub fn num_tot(&self) -> usize {
        self.num_tot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Lp;
    use crate::options::SolverOptions;

    // Workspace over: min 0 s.t. row x1 + x2 + x3 <= 4, columns boxed.
    fn fixture() -> SimplexWorkspace {
        let mut lp = Lp::with_dims(3, 1);
        lp.a_start = vec![0, 1, 2, 3];
        lp.a_index = vec![0, 0, 0];
        lp.a_value = vec![1.0, 1.0, 1.0];
        lp.col_upper = vec![1.0, 1.0, f64::INFINITY];
        lp.row_upper = vec![4.0];
        let mut ws = SimplexWorkspace::new(
            &lp,
            &SolverOptions {
                scale_simplex_lp: false,
                ..SolverOptions::default()
            },
        );
        ws.setup_matrix();
        ws.populate_work_arrays(2, false);
        ws
    }

    #[test]
    fn test_simple_ratio_choice() {
        let mut ws = fixture();
        // All three at lower bound (move +1) with duals 2, 1, 3 and unit
        // row entries: the smallest ratio wins.
        ws.work_dual[0] = 2.0;
        ws.work_dual[1] = 1.0;
        ws.work_dual[2] = 3.0;
        let mut row = DualRow::new(ws.num_tot);
        row.make_pack([(0, 1.0), (1, 1.0), (2, 1.0)].into_iter());
        row.choose_possible(&ws);
        assert_eq!(row.work_count, 3);
        // Column 2 cannot flip (infinite range), columns 0/1 can absorb
        // 1.0 each; with delta 5 the sweep flips 1 and 0 and pivots on 2.
        assert!(row.choose_final(&ws, 5.0));
        assert_eq!(row.work_pivot, Some(2));
        assert_eq!(row.flip_list, vec![1, 0]);
    }

    #[test]
    fn test_small_delta_picks_min_ratio() {
        let mut ws = fixture();
        ws.work_dual[0] = 2.0;
        ws.work_dual[1] = 1.0;
        ws.work_dual[2] = 3.0;
        let mut row = DualRow::new(ws.num_tot);
        row.make_pack([(0, 1.0), (1, 1.0), (2, 1.0)].into_iter());
        row.choose_possible(&ws);
        // Delta smaller than any flip: first candidate blocks.
        assert!(row.choose_final(&ws, 0.5));
        assert_eq!(row.work_pivot, Some(1));
        assert!(row.flip_list.is_empty());
        assert!((row.work_theta - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_harris_prefers_large_pivot() {
        let mut ws = fixture();
        // Nearly equal ratios: dual 1.0 with alpha 1.0 vs dual 1.0+5e-8
        // with alpha 2.0. The relaxed window admits both; the larger
        // pivot is chosen.
        ws.work_dual[0] = 1.0;
        ws.work_dual[1] = 2.0 * (1.0 + 5e-8);
        let mut row = DualRow::new(ws.num_tot);
        row.make_pack([(0, 1.0), (1, 2.0)].into_iter());
        row.choose_possible(&ws);
        assert!(row.choose_final(&ws, 0.5));
        assert_eq!(row.work_pivot, Some(1));
    }

    #[test]
    fn test_no_candidate_is_unbounded() {
        let mut ws = fixture();
        // Entries all run the wrong way.
        ws.work_dual[0] = 1.0;
        let mut row = DualRow::new(ws.num_tot);
        row.make_pack([(0, -1.0), (1, -1.0)].into_iter());
        row.choose_possible(&ws);
        assert_eq!(row.work_count, 0);
        assert!(!row.choose_final(&ws, 1.0));
    }

    #[test]
    fn test_update_dual_applies_step() {
        let mut ws = fixture();
        ws.work_dual[0] = 2.0;
        ws.work_dual[1] = 1.0;
        let mut row = DualRow::new(ws.num_tot);
        row.make_pack([(0, 1.0), (1, 1.0)].into_iter());
        row.update_dual(&mut ws, 1.0);
        assert_eq!(ws.work_dual[0], 1.0);
        assert_eq!(ws.work_dual[1], 0.0);
    }

    #[test]
    fn test_update_flip_accumulates_column() {
        let mut ws = fixture();
        let mut row = DualRow::new(ws.num_tot);
        row.flip_list = vec![0, 1];
        let mut bfrt = SparseVector::new(1);
        row.update_flip(&mut ws, &mut bfrt);
        // Both columns flipped from 0 to upper bound 1; row activity rises
        // by 2.
        assert_eq!(ws.work_value[0], 1.0);
        assert_eq!(ws.work_value[1], 1.0);
        assert!((bfrt.array[0] - 2.0).abs() < 1e-12);
    }
}
