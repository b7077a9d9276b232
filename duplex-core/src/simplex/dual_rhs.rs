//! Dual simplex optimality test: primal infeasibilities and CHUZR.
//!
//! Maintains the squared primal infeasibility of every basic row in
//! `work_array`, an optional candidate list of the largest infeasibilities
//! above `work_cutoff`, and the dual edge weights. CHUZR picks the row
//! maximising infeasibility over weight.

use crate::sparse::vector::SparseVector;

/// Candidate-list build is skipped (dense scans used) when more than this
/// fraction of the rows is infeasible.
const INFEAS_LIST_DENSITY_LIMIT: f64 = 0.25;

/// Number of slices used by the partitioned multi-CHUZR scan.
const PARTITION_COUNT: usize = 8;

/// Primal infeasibility bookkeeping and edge weights for CHUZR.
#[derive(Debug, Clone)]
pub struct DualRhs {
    num_row: usize,

    /// Squared primal infeasibility per basic row.
    pub work_array: Vec<f64>,
    /// Row is in the candidate list.
    pub work_mark: Vec<bool>,
    /// Candidate rows, when the list is valid.
    pub work_index: Vec<usize>,
    /// Number of valid entries of `work_index`.
    pub work_count: usize,
    /// Infeasibility cutoff for list membership.
    pub work_cutoff: f64,
    /// Dense scans are used while false.
    pub infeas_list_valid: bool,

    /// Edge weight per basic row (DSE or Devex; unit for Dantzig).
    pub work_ed_wt: Vec<f64>,
    /// Scattered weights by variable, bridging a refactor.
    pub work_ed_wt_full: Vec<f64>,

    partition_next: usize,
}

impl DualRhs {
    pub fn new(num_row: usize, num_tot: usize) -> Self {
        DualRhs {
            num_row,
            work_array: vec![0.0; num_row],
            work_mark: vec![false; num_row],
            work_index: vec![0; num_row],
            work_count: 0,
            work_cutoff: 0.0,
            infeas_list_valid: false,
            work_ed_wt: vec![1.0; num_row],
            work_ed_wt_full: vec![1.0; num_tot],
            partition_next: 0,
        }
    }

    fn squared_infeasibility(value: f64, lower: f64, upper: f64) -> f64 {
        let infeas = if value < lower {
            value - lower
        } else if value > upper {
            value - upper
        } else {
            0.0
        };
        infeas * infeas
    }

    /// Fill `work_array` from the basic values and bounds.
    pub fn create_infeas_array(&mut self, base_value: &[f64], base_lower: &[f64], base_upper: &[f64]) {
        for i in 0..self.num_row {
            self.work_array[i] =
                Self::squared_infeasibility(base_value[i], base_lower[i], base_upper[i]);
        }
        self.infeas_list_valid = false;
    }

    /// Build the candidate list of the greatest infeasibilities. With many
    /// infeasible rows, or a dense pivotal column making list maintenance
    /// expensive, the list is left invalid and CHUZR scans densely.
    pub fn create_infeas_list(&mut self, column_density: f64) {
        self.work_mark.fill(false);
        self.work_count = 0;
        self.infeas_list_valid = false;
        if column_density > 0.1 {
            return;
        }

        let mut max_infeas = 0.0f64;
        let mut num_infeas = 0usize;
        for i in 0..self.num_row {
            if self.work_array[i] > 0.0 {
                max_infeas = max_infeas.max(self.work_array[i]);
                num_infeas += 1;
            }
        }
        if num_infeas == 0 {
            self.infeas_list_valid = true;
            self.work_cutoff = 0.0;
            return;
        }
        if (num_infeas as f64) > INFEAS_LIST_DENSITY_LIMIT * self.num_row as f64 {
            return;
        }

        self.work_cutoff = 1e-2 * max_infeas;
        for i in 0..self.num_row {
            if self.work_array[i] > self.work_cutoff {
                self.work_mark[i] = true;
                self.work_index[self.work_count] = i;
                self.work_count += 1;
            }
        }
        self.infeas_list_valid = true;
    }

    /// CHUZR: the row maximising infeasibility over edge weight among rows
    /// whose squared infeasibility exceeds `tolerance` squared. Ties go to
    /// the larger infeasibility, then the smaller index.
    pub fn choose_normal(&self, tolerance: f64) -> Option<usize> {
        let cutoff = tolerance * tolerance;
        let better =
            |merit: f64, infeas: f64, row: usize, best: &Option<(f64, f64, usize)>| match best {
                None => true,
                Some((bm, bi, br)) => {
                    merit > *bm
                        || (merit == *bm && (infeas > *bi || (infeas == *bi && row < *br)))
                }
            };
        let mut best: Option<(f64, f64, usize)> = None;
        if self.infeas_list_valid {
            for k in 0..self.work_count {
                let i = self.work_index[k];
                let infeas = self.work_array[i];
                if infeas <= cutoff {
                    continue;
                }
                let merit = infeas / self.work_ed_wt[i];
                if better(merit, infeas, i, &best) {
                    best = Some((merit, infeas, i));
                }
            }
            if best.is_some() {
                return best.map(|(_, _, i)| i);
            }
            // The list may have gone stale below the cutoff; fall through
            // to a dense scan.
        }
        for i in 0..self.num_row {
            let infeas = self.work_array[i];
            if infeas <= cutoff {
                continue;
            }
            let merit = infeas / self.work_ed_wt[i];
            if better(merit, infeas, i, &best) {
                best = Some((merit, infeas, i));
            }
        }
        best.map(|(_, _, i)| i)
    }

    /// Multiple CHUZR over all rows: up to `limit` rows by decreasing
    /// merit.
    pub fn choose_multi_global(&self, tolerance: f64, limit: usize) -> Vec<usize> {
        let cutoff = tolerance * tolerance;
        let mut candidates: Vec<(f64, usize)> = (0..self.num_row)
            .filter(|&i| self.work_array[i] > cutoff)
            .map(|i| (self.work_array[i] / self.work_ed_wt[i], i))
            .collect();
        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then(a.1.cmp(&b.1)));
        candidates.truncate(limit);
        candidates.into_iter().map(|(_, i)| i).collect()
    }

    /// Multiple CHUZR over the next partition slice only.
    pub fn choose_multi_hg_part(&mut self, tolerance: f64, limit: usize) -> Vec<usize> {
        let cutoff = tolerance * tolerance;
        let slice = self.num_row.div_ceil(PARTITION_COUNT).max(1);
        let start = self.partition_next * slice;
        let end = (start + slice).min(self.num_row);
        self.partition_next = (self.partition_next + 1) % PARTITION_COUNT;

        let mut candidates: Vec<(f64, usize)> = (start..end)
            .filter(|&i| self.work_array[i] > cutoff)
            .map(|i| (self.work_array[i] / self.work_ed_wt[i], i))
            .collect();
        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap().then(a.1.cmp(&b.1)));
        candidates.truncate(limit);
        candidates.into_iter().map(|(_, i)| i).collect()
    }

    /// Multiple CHUZR choosing between the global and partitioned scans by
    /// the infeasibility density.
    pub fn choose_multi_hg_auto(&mut self, tolerance: f64, limit: usize) -> Vec<usize> {
        let cutoff = tolerance * tolerance;
        let num_infeas = (0..self.num_row)
            .filter(|&i| self.work_array[i] > cutoff)
            .count();
        if (num_infeas as f64) > 0.1 * self.num_row as f64 {
            let chosen = self.choose_multi_hg_part(tolerance, limit);
            if !chosen.is_empty() {
                return chosen;
            }
        }
        self.choose_multi_global(tolerance, limit)
    }

    /// Apply base_value -= theta * column and refresh the touched
    /// infeasibilities and list entries.
    pub fn update_primal(
        &mut self,
        column: &SparseVector,
        theta: f64,
        base_value: &mut [f64],
        base_lower: &[f64],
        base_upper: &[f64],
    ) {
        for k in 0..column.count {
            let i = column.index[k];
            base_value[i] -= theta * column.array[i];
            self.work_array[i] =
                Self::squared_infeasibility(base_value[i], base_lower[i], base_upper[i]);
        }
        if self.infeas_list_valid {
            self.update_infeas_list(column);
        }
    }

    /// Admit newly infeasible rows among the changed ones to the list.
    pub fn update_infeas_list(&mut self, column: &SparseVector) {
        for k in 0..column.count {
            let i = column.index[k];
            if !self.work_mark[i] && self.work_array[i] > self.work_cutoff {
                if self.work_count >= self.work_index.len() {
                    self.infeas_list_valid = false;
                    return;
                }
                self.work_mark[i] = true;
                self.work_index[self.work_count] = i;
                self.work_count += 1;
            }
        }
    }

    /// The basis change landed a new value in `row`; record its
    /// infeasibility.
    pub fn update_pivots(&mut self, row: usize, value: f64, lower: f64, upper: f64) {
        self.work_array[row] = Self::squared_infeasibility(value, lower, upper);
        if self.infeas_list_valid && !self.work_mark[row] && self.work_array[row] > self.work_cutoff
        {
            if self.work_count >= self.work_index.len() {
                self.infeas_list_valid = false;
                return;
            }
            self.work_mark[row] = true;
            self.work_index[self.work_count] = row;
            self.work_count += 1;
        }
    }

    /// Dual steepest edge update for a pivot on row `row_out` with pivotal
    /// column alpha and FTRAN-DSE result tau:
    ///
    /// ```text
    /// g_i <- max(g_i - 2 (a_i/a_p) t_i + (a_i/a_p)^2 g_p, 1 + (a_i/a_p)^2)
    /// ```
    ///
    /// The weight of the pivot row itself is set by the caller.
    pub fn update_weight_dse(
        &mut self,
        column: &SparseVector,
        row_out: usize,
        alpha_p: f64,
        gamma_p: f64,
        tau: &[f64],
    ) {
        for k in 0..column.count {
            let i = column.index[k];
            if i == row_out {
                continue;
            }
            let r = column.array[i] / alpha_p;
            let updated = self.work_ed_wt[i] - 2.0 * r * tau[i] + r * r * gamma_p;
            self.work_ed_wt[i] = updated.max(1.0 + r * r);
        }
    }

    /// Devex update: w_i <- max(w_i, (a_i/a_p)^2 w_p) for significant
    /// pivotal column entries. The pivot row weight is set by the caller.
    pub fn update_weight_devex(&mut self, column: &SparseVector, row_out: usize, alpha_p: f64, w_p: f64) {
        for k in 0..column.count {
            let i = column.index[k];
            if i == row_out {
                continue;
            }
            let a = column.array[i];
            if a.abs() < 1e-12 {
                continue;
            }
            let r = a / alpha_p;
            let candidate = r * r * w_p;
            if candidate > self.work_ed_wt[i] {
                self.work_ed_wt[i] = candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rhs_with_infeas(values: &[f64], lower: f64, upper: f64) -> DualRhs {
        let mut rhs = DualRhs::new(values.len(), values.len() + 2);
        let lo = vec![lower; values.len()];
        let hi = vec![upper; values.len()];
        rhs.create_infeas_array(values, &lo, &hi);
        rhs
    }

    #[test]
    fn test_choose_normal_max_merit() {
        let mut rhs = rhs_with_infeas(&[0.5, 3.0, 1.5], 0.0, 1.0);
        // Infeasibilities: 0, 4, 0.25; weights 1 -> row 1 wins.
        assert_eq!(rhs.choose_normal(1e-7), Some(1));
        // A large weight on row 1 hands the choice to row 2.
        rhs.work_ed_wt[1] = 100.0;
        assert_eq!(rhs.choose_normal(1e-7), Some(2));
    }

    #[test]
    fn test_choose_normal_feasible() {
        let rhs = rhs_with_infeas(&[0.2, 0.8], 0.0, 1.0);
        assert_eq!(rhs.choose_normal(1e-7), None);
    }

    #[test]
    fn test_infeas_list_filters() {
        let mut rhs = rhs_with_infeas(&[100.0, 1.0 + 1e-6, 0.5, 0.5, 0.5, 0.5, 0.5, 0.5], 0.0, 1.0);
        rhs.create_infeas_list(0.0);
        assert!(rhs.infeas_list_valid);
        // Only the dominant infeasibility survives the cutoff.
        assert_eq!(rhs.work_count, 1);
        assert_eq!(rhs.work_index[0], 0);
        // The tiny infeasibility on row 1 is still found via fallback once
        // row 0 is repaired.
        rhs.work_array[0] = 0.0;
        assert_eq!(rhs.choose_normal(1e-7), Some(1));
    }

    #[test]
    fn test_choose_multi_global_ordering() {
        let rhs = rhs_with_infeas(&[2.0, 5.0, 3.0, 0.5], 0.0, 1.0);
        let chosen = rhs.choose_multi_global(1e-7, 2);
        assert_eq!(chosen, vec![1, 2]);
    }

    #[test]
    fn test_choose_multi_part_covers_all_slices() {
        let mut rhs = rhs_with_infeas(&[5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 3.0], 0.0, 1.0);
        let mut seen = Vec::new();
        for _ in 0..PARTITION_COUNT {
            seen.extend(rhs.choose_multi_hg_part(1e-7, 4));
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 7]);
    }

    #[test]
    fn test_update_primal_refreshes() {
        let mut rhs = rhs_with_infeas(&[2.0, 0.5], 0.0, 1.0);
        let mut base_value = vec![2.0, 0.5];
        let mut column = SparseVector::new(2);
        column.scatter(0, 1.0);
        rhs.update_primal(&column, 1.0, &mut base_value, &[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(base_value[0], 1.0);
        assert_eq!(rhs.work_array[0], 0.0);
    }

    #[test]
    fn test_dse_weight_floor() {
        let mut rhs = DualRhs::new(3, 5);
        let mut column = SparseVector::new(3);
        column.scatter(0, 2.0);
        column.scatter(1, 4.0);
        let tau = vec![10.0, 10.0, 0.0];
        // Large tau drives the raw update negative; the floor keeps the
        // weight at 1 + r^2.
        rhs.update_weight_dse(&column, 0, 2.0, 1.0, &tau);
        let r: f64 = 2.0;
        assert_eq!(rhs.work_ed_wt[1], 1.0 + r * r);
        assert_eq!(rhs.work_ed_wt[2], 1.0);
    }

    #[test]
    fn test_devex_weight_monotone() {
        let mut rhs = DualRhs::new(2, 4);
        rhs.work_ed_wt = vec![3.0, 1.0];
        let mut column = SparseVector::new(2);
        column.scatter(0, 1.0);
        column.scatter(1, 4.0);
        rhs.update_weight_devex(&column, 0, 2.0, 2.0);
        // Row 1: (4/2)^2 * 2 = 8 > 1.
        assert_eq!(rhs.work_ed_wt[1], 8.0);
        assert_eq!(rhs.work_ed_wt[0], 3.0);
    }
}
