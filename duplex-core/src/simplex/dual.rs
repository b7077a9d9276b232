//! Dual simplex driver: two-phase loop, rebuild, and the iteration body.
//!
//! Phase 1 solves the problem under artificial dual-feasible bounds (every
//! variable boxed), so primal infeasibility there measures dual
//! infeasibility of the real problem; phase 2 restores the model bounds and
//! iterates to optimality. Each iteration sub-step returns early once an
//! invert hint is posted; the hint is decisive only when it survives a
//! fresh rebuild.
//!
//! Per iteration: CHUZR -> BTRAN -> PRICE -> CHUZC -> FTRAN -> verify ->
//! FTRAN-BFRT -> FTRAN-DSE -> update dual/primal/pivots. A synthetic clock
//! bounds the work done on one factorisation independently of the update
//! count.

use std::time::Instant;

use log::debug;

use crate::io::messages::{MessageSink, MessageType, ML_DETAILED, ML_MINIMAL};
use crate::model::{
    Lp, SolutionStatus, Solution, NONBASIC_FLAG_TRUE, NONBASIC_MOVE_DOWN, NONBASIC_MOVE_UP,
};
use crate::options::{DualEdgeWeightStrategy, PriceStrategy, SimplexStrategy, SolverOptions};
use crate::simplex::dual_rhs::DualRhs;
use crate::simplex::dual_row::DualRow;
use crate::simplex::workspace::SimplexWorkspace;
use crate::simplex::InvertHint;
use crate::sparse::matrix::DENSITY_COL_PRICE_SWITCH;
use crate::sparse::vector::SparseVector;

/// A Devex framework is replaced when the maintained pivot-row weight
/// disagrees with the recomputed one by more than this ratio.
const MAX_ALLOWED_DEVEX_WEIGHT_RATIO: f64 = 3.0;

/// Limit on CHUZR re-choices after a rejected DSE weight.
const MAX_WEIGHT_REJECTIONS: usize = 10;

/// Outcome of one phase loop.
enum PhaseOutcome {
    SwitchToPhase2,
    Optimal,
    PrimalInfeasible,
    Unbounded,
    Singular,
    Bailout,
}

/// The dual simplex engine. Owns the workspace and all per-iteration
/// buffers; the caller's LP is only borrowed to construct it.
pub struct DualSimplex {
    pub ws: SimplexWorkspace,
    dual_rhs: DualRhs,
    dual_row: DualRow,

    edge_weight_mode: DualEdgeWeightStrategy,
    price_strategy: PriceStrategy,
    perturb_costs: bool,
    update_limit: usize,
    iteration_limit: Option<usize>,
    time_limit_ms: Option<u64>,

    row_ep: SparseVector,
    row_ap: SparseVector,
    column: SparseVector,
    column_bfrt: SparseVector,
    column_dse: SparseVector,

    column_density: f64,
    row_ep_density: f64,

    // Pivot data for the current iteration.
    row_out: usize,
    var_out: usize,
    var_in: usize,
    source_out: f64,
    delta_primal: f64,
    theta_dual: f64,
    theta_primal: f64,
    alpha: f64,
    alpha_row: f64,
    numerical_trouble: f64,

    invert_hint: Option<InvertHint>,
    solve_phase: usize,
    pub solve_bailout: bool,

    // Devex framework state.
    devex_index: Vec<i8>,
    num_devex_iterations: usize,
    num_devex_frameworks: usize,
    new_devex_framework: bool,

    total_synthetic_tick: f64,
    started: Instant,
}

impl DualSimplex {
    pub fn new(lp: &Lp, options: &SolverOptions) -> Self {
        let ws = SimplexWorkspace::new(lp, options);
        let (num_col, num_row, num_tot) = (ws.num_col, ws.num_row, ws.num_tot);
        let edge_weight_mode = options.dual_edge_weight_strategy;
        let price_strategy = options.price_strategy;
        DualSimplex {
            ws,
            dual_rhs: DualRhs::new(num_row, num_tot),
            dual_row: DualRow::new(num_tot),
            edge_weight_mode,
            price_strategy,
            perturb_costs: options.perturb_costs,
            update_limit: options.update_limit,
            iteration_limit: options.iteration_limit,
            time_limit_ms: options.time_limit_ms,
            row_ep: SparseVector::new(num_row),
            row_ap: SparseVector::new(num_col),
            column: SparseVector::new(num_row),
            column_bfrt: SparseVector::new(num_row),
            column_dse: SparseVector::new(num_row),
            column_density: 0.0,
            row_ep_density: 0.0,
            row_out: 0,
            var_out: 0,
            var_in: 0,
            source_out: 0.0,
            delta_primal: 0.0,
            theta_dual: 0.0,
            theta_primal: 0.0,
            alpha: 0.0,
            alpha_row: 0.0,
            numerical_trouble: 0.0,
            invert_hint: None,
            solve_phase: 0,
            solve_bailout: false,
            devex_index: vec![1; num_tot],
            num_devex_iterations: 0,
            num_devex_frameworks: 0,
            new_devex_framework: false,
            total_synthetic_tick: 0.0,
            started: Instant::now(),
        }
    }

    /// Request an immediate return with the current solution.
    pub fn bailout(&mut self) {
        self.solve_bailout = true;
    }

    /// Run the dual simplex to termination.
    pub fn solve(&mut self, options: &SolverOptions, sink: &mut MessageSink) -> SolutionStatus {
        self.started = Instant::now();
        match options.simplex_strategy {
            SimplexStrategy::Dual => {}
            other => {
                sink.log(
                    MessageType::Warning,
                    &format!(
                        "simplex strategy {:?} is not implemented; using serial dual",
                        other
                    ),
                );
            }
        }

        self.ws.setup_matrix();
        self.ws.initialise_cost(false);
        self.ws.initialise_bound(2);
        self.ws.initialise_value();
        if !self.ws.ok_to_solve(1, 2) {
            sink.log(MessageType::Error, "inconsistent simplex work arrays");
            return SolutionStatus::Unset;
        }
        if let Err(hint) = self.ws.compute_factor() {
            debug_assert_eq!(hint, InvertHint::Singular);
            sink.log(MessageType::Error, "initial basis is singular");
            return SolutionStatus::Singular;
        }
        self.ws.compute_dual();
        self.flips_for_dual_feasibility();
        let dual_infeasibilities = self.ws.compute_dual_infeasibilities();
        self.solve_phase = if dual_infeasibilities > 0 { 1 } else { 2 };
        debug!(
            "dual simplex start: {} rows, {} cols, {} dual infeasibilities, phase {}",
            self.ws.num_row, self.ws.num_col, dual_infeasibilities, self.solve_phase
        );

        let status = loop {
            let outcome = match self.solve_phase {
                1 => {
                    sink.print(ML_DETAILED, "dual-phase-1 start");
                    self.ws.initialise_cost(false);
                    self.ws.initialise_bound(1);
                    self.ws.initialise_value();
                    self.solve_phase_loop(1, sink)
                }
                2 => {
                    sink.print(ML_DETAILED, "dual-phase-2 start");
                    self.ws.initialise_cost(self.perturb_costs);
                    self.ws.initialise_bound(2);
                    self.ws.initialise_value();
                    self.solve_phase_loop(2, sink)
                }
                _ => break SolutionStatus::Unset,
            };
            match outcome {
                PhaseOutcome::SwitchToPhase2 => {
                    self.solve_phase = 2;
                }
                PhaseOutcome::Optimal => break SolutionStatus::Optimal,
                PhaseOutcome::PrimalInfeasible => break SolutionStatus::PrimalInfeasible,
                PhaseOutcome::Unbounded => break SolutionStatus::Unbounded,
                PhaseOutcome::Singular => break SolutionStatus::Singular,
                PhaseOutcome::Bailout => break SolutionStatus::ReachedLimit,
            }
        };

        sink.print(
            ML_MINIMAL,
            &format!(
                "dual simplex finished: {} after {} iterations",
                status, self.ws.iteration_count
            ),
        );
        status
    }

    /// The rebuild-iterate loop for one phase.
    fn solve_phase_loop(&mut self, phase: usize, sink: &mut MessageSink) -> PhaseOutcome {
        loop {
            self.rebuild(phase, sink);

            if let Some(hint) = self.invert_hint {
                // Hints posted by rebuild itself are decisive: the
                // factorisation and all derived values are fresh.
                match hint {
                    InvertHint::Singular => return PhaseOutcome::Singular,
                    InvertHint::PossiblyPhase1Feasible => {
                        return PhaseOutcome::SwitchToPhase2;
                    }
                    InvertHint::PossiblyOptimal => {
                        if self.ws.costs_perturbed {
                            self.cleanup(sink);
                            continue;
                        }
                        return PhaseOutcome::Optimal;
                    }
                    InvertHint::PossiblyPrimalUnbounded => {
                        if self.ws.costs_perturbed {
                            self.cleanup(sink);
                            continue;
                        }
                        return PhaseOutcome::Unbounded;
                    }
                    InvertHint::PossiblyDualUnbounded => {
                        if self.ws.costs_perturbed {
                            self.cleanup(sink);
                            continue;
                        }
                        return PhaseOutcome::PrimalInfeasible;
                    }
                    _ => continue,
                }
            }

            loop {
                self.iterate();
                if self.invert_hint.is_some() || self.solve_bailout {
                    break;
                }
            }
            if self.solve_bailout {
                return PhaseOutcome::Bailout;
            }

            match self.invert_hint {
                Some(InvertHint::PossiblyDualUnbounded) => {
                    // Decisive only straight after a rebuild, with no
                    // pivots applied since.
                    if self.ws.factor.update_count() == 0 && self.ws.factor.is_fresh() {
                        if self.ws.costs_perturbed {
                            self.cleanup(sink);
                            continue;
                        }
                        return PhaseOutcome::PrimalInfeasible;
                    }
                }
                // Everything else rebuilds and re-derives: a stale
                // PossiblyOptimal is re-examined by rebuild, Trouble and
                // UpdateLimit force the refactor, ChooseColumnFail
                // retries.
                _ => {}
            }
        }
    }

    /// Reinvert if the factorisation is not fresh, then recompute duals,
    /// primal values, infeasibilities and the dual objective. Posts a
    /// decisive hint when the phase is finished.
    fn rebuild(&mut self, phase: usize, sink: &mut MessageSink) {
        self.invert_hint = None;
        let reinvert = !self.ws.factor.is_fresh() || !self.ws.status.has_invert;
        if reinvert {
            // Scatter edge weights by variable so they survive any basis
            // repair during the refactor.
            for i in 0..self.ws.num_row {
                self.dual_rhs.work_ed_wt_full[self.ws.basis.basic_index[i]] =
                    self.dual_rhs.work_ed_wt[i];
            }
            match self.ws.compute_factor() {
                Ok(deficiency) => {
                    if deficiency > 0 {
                        sink.log(
                            MessageType::Warning,
                            &format!("basis rank deficiency {} repaired with logicals", deficiency),
                        );
                    }
                }
                Err(hint) => {
                    self.invert_hint = Some(hint);
                    return;
                }
            }
            for i in 0..self.ws.num_row {
                self.dual_rhs.work_ed_wt[i] =
                    self.dual_rhs.work_ed_wt_full[self.ws.basis.basic_index[i]];
            }
        }

        if self.new_devex_framework {
            self.initialise_devex_framework();
        }

        self.ws.compute_dual();
        let unfixable = self.flips_for_dual_feasibility();
        self.ws.compute_primal();
        self.dual_rhs.create_infeas_array(
            &self.ws.base_value,
            &self.ws.base_lower,
            &self.ws.base_upper,
        );
        self.dual_rhs.create_infeas_list(self.column_density);
        self.ws.compute_dual_objective_value(phase);
        self.total_synthetic_tick = 0.0;
        self.ws.status.has_fresh_rebuild = true;

        sink.print(
            ML_DETAILED,
            &format!(
                "iteration {:9}: dual objective {:14.6e} (phase {})",
                self.ws.iteration_count, self.ws.dual_objective_value, phase
            ),
        );

        if phase == 2 && unfixable > 0 {
            // Dual infeasibility that no bound flip can remove: with
            // phase 1 passed, the dual is infeasible, so the primal is
            // unbounded when feasible and infeasible otherwise.
            let primal_infeasible = self
                .dual_rhs
                .choose_normal(self.ws.primal_feasibility_tolerance)
                .is_some();
            self.invert_hint = Some(if primal_infeasible {
                InvertHint::PossiblyDualUnbounded
            } else {
                InvertHint::PossiblyPrimalUnbounded
            });
            return;
        }

        if self
            .dual_rhs
            .choose_normal(self.ws.primal_feasibility_tolerance)
            .is_none()
        {
            self.invert_hint = Some(if phase == 1 {
                InvertHint::PossiblyPhase1Feasible
            } else {
                InvertHint::PossiblyOptimal
            });
        }
    }

    /// Remove the cost perturbation and any shifts, recompute the duals,
    /// and restore dual feasibility by flips where possible. Iterations
    /// continue on the clean problem.
    fn cleanup(&mut self, sink: &mut MessageSink) {
        sink.print(ML_DETAILED, "dual-cleanup: removing cost perturbation");
        self.ws.initialise_cost(false);
        self.ws.compute_dual();
        let residual = self.flips_for_dual_feasibility();
        if residual > 0 {
            debug!("cleanup leaves {} unfixable dual infeasibilities", residual);
        }
        self.ws.status.has_fresh_rebuild = false;
    }

    /// Flip every boxed nonbasic variable whose dual sign asks for the
    /// opposite bound. Returns the number of dual infeasibilities that
    /// flips cannot remove.
    fn flips_for_dual_feasibility(&mut self) -> usize {
        let tol = self.ws.dual_feasibility_tolerance;
        let mut unfixable = 0;
        for j in 0..self.ws.num_tot {
            if self.ws.basis.nonbasic_flag[j] != NONBASIC_FLAG_TRUE {
                continue;
            }
            let mv = self.ws.basis.nonbasic_move[j];
            let infeasible = (mv == NONBASIC_MOVE_UP && self.ws.work_dual[j] < -tol)
                || (mv == NONBASIC_MOVE_DOWN && self.ws.work_dual[j] > tol)
                || (mv == 0
                    && self.ws.work_lower[j] != self.ws.work_upper[j]
                    && self.ws.work_dual[j].abs() > tol);
            if !infeasible {
                continue;
            }
            if mv != 0 && self.ws.work_range[j].is_finite() {
                self.ws.flip_bound(j);
            } else {
                unfixable += 1;
            }
        }
        unfixable
    }

    /// One serial dual simplex iteration. Every sub-step exits early when
    /// an invert hint is posted.
    fn iterate(&mut self) {
        if self.check_limits() {
            return;
        }
        self.choose_row();
        self.choose_column();
        self.update_ftran();
        self.update_verify();
        self.update_ftran_bfrt();
        self.update_ftran_dse();
        self.update_dual_values();
        self.update_primal_values();
        self.update_pivots();
    }

    /// Map iteration and time limits to the bailout flag.
    fn check_limits(&mut self) -> bool {
        if let Some(limit) = self.iteration_limit {
            if self.ws.iteration_count >= limit {
                self.solve_bailout = true;
            }
        }
        if let Some(ms) = self.time_limit_ms {
            if self.started.elapsed().as_millis() as u64 >= ms {
                self.solve_bailout = true;
            }
        }
        self.solve_bailout
    }

    /// CHUZR and BTRAN, with the steepest-edge weight accuracy check on
    /// the chosen row.
    fn choose_row(&mut self) {
        if self.invert_hint.is_some() || self.solve_bailout {
            return;
        }
        let tp = self.ws.primal_feasibility_tolerance;
        let mut rejections = 0;
        loop {
            let Some(row_out) = self.dual_rhs.choose_normal(tp) else {
                self.invert_hint = Some(InvertHint::PossiblyOptimal);
                return;
            };
            self.row_out = row_out;

            self.row_ep.clear();
            self.row_ep.scatter(row_out, 1.0);
            self.ws.factor.btran(&mut self.row_ep);
            if self.solve_bailout {
                return;
            }

            if self.edge_weight_mode == DualEdgeWeightStrategy::SteepestEdge
                && rejections < MAX_WEIGHT_REJECTIONS
            {
                // The accuracy check compares the recomputed weight with
                // the maintained one on the pivot row only.
                let computed = {
                    let norm = self.row_ep.norm2();
                    norm * norm
                };
                let maintained = self.dual_rhs.work_ed_wt[row_out];
                if maintained < 0.25 * computed || maintained > 4.0 * computed {
                    self.dual_rhs.work_ed_wt[row_out] = computed;
                    rejections += 1;
                    continue;
                }
            }
            break;
        }
        self.row_ep_density = update_density(self.row_ep.density(), self.row_ep_density);

        self.var_out = self.ws.basis.basic_index[self.row_out];
        let value = self.ws.base_value[self.row_out];
        let lower = self.ws.base_lower[self.row_out];
        let upper = self.ws.base_upper[self.row_out];
        self.delta_primal = if value < lower {
            value - lower
        } else {
            value - upper
        };
        self.source_out = if self.delta_primal < 0.0 { -1.0 } else { 1.0 };
    }

    /// PRICE the pivotal row and run CHUZC with BFRT.
    fn choose_column(&mut self) {
        if self.invert_hint.is_some() || self.solve_bailout {
            return;
        }
        match self.price_strategy {
            PriceStrategy::Col => {
                self.ws.matrix.price_by_column(&mut self.row_ap, &self.row_ep)
            }
            PriceStrategy::Row => self.ws.matrix.price_by_row(&mut self.row_ap, &self.row_ep),
            PriceStrategy::RowSwitch => {
                // A persistently dense BTRAN result makes row PRICE
                // pointless; go straight to the column kernel.
                if self.row_ep_density > 0.1 {
                    self.ws.matrix.price_by_column(&mut self.row_ap, &self.row_ep);
                } else {
                    self.ws.matrix.price_by_row_with_switch(
                        &mut self.row_ap,
                        &self.row_ep,
                        DENSITY_COL_PRICE_SWITCH,
                    );
                }
            }
            PriceStrategy::RowUltra => self
                .ws
                .matrix
                .price_by_row_sparse_result(&mut self.row_ap, &self.row_ep),
        }

        let s = self.source_out;
        self.dual_row.clear();
        let row_ap = &self.row_ap;
        self.dual_row.make_pack(
            (0..row_ap.count).map(|k| {
                let j = row_ap.index[k];
                (j, s * row_ap.array[j])
            }),
        );
        let num_col = self.ws.num_col;
        let row_ep = &self.row_ep;
        let flags = &self.ws.basis.nonbasic_flag;
        self.dual_row.make_pack(
            (0..row_ep.count)
                .map(|k| {
                    let i = row_ep.index[k];
                    // Logical column of row i is -e_i.
                    (num_col + i, -s * row_ep.array[i])
                })
                .filter(|&(j, _)| flags[j] == NONBASIC_FLAG_TRUE),
        );

        self.dual_row.choose_possible(&self.ws);
        if !self.dual_row.choose_final(&self.ws, self.delta_primal) {
            self.invert_hint = Some(InvertHint::PossiblyDualUnbounded);
            return;
        }
        let Some(var_in) = self.dual_row.work_pivot else {
            self.invert_hint = Some(InvertHint::ChooseColumnFail);
            return;
        };
        self.var_in = var_in;
        self.alpha_row = s * self.dual_row.work_alpha;
        self.theta_dual = self.dual_row.work_theta;
    }

    /// FTRAN of the entering column.
    fn update_ftran(&mut self) {
        if self.invert_hint.is_some() || self.solve_bailout {
            return;
        }
        self.column.clear();
        self.ws.matrix.collect_aj(&mut self.column, self.var_in, 1.0);
        self.ws.factor.ftran(&mut self.column);
        self.alpha = self.column.array[self.row_out];
        self.column_density = update_density(self.column.density(), self.column_density);
        self.check_limits();
    }

    /// Compare the pivot computed row-wise and column-wise. A
    /// disagreement forces a refactor; with an already-fresh
    /// factorisation the column value is the trusted one and the
    /// iteration proceeds.
    fn update_verify(&mut self) {
        if self.invert_hint.is_some() || self.solve_bailout {
            return;
        }
        let alpha_col = self.alpha;
        self.numerical_trouble = (self.alpha_row - alpha_col).abs() / alpha_col.abs().max(1.0);
        if self.numerical_trouble > 1e-7 || alpha_col == 0.0 {
            debug!(
                "pivot disagreement {:.3e}: alpha_row {:.6e} vs alpha_col {:.6e}",
                self.numerical_trouble, self.alpha_row, alpha_col
            );
            if self.ws.factor.update_count() > 0 || alpha_col == 0.0 {
                self.invert_hint = Some(InvertHint::Trouble);
            }
        }
    }

    /// Apply the BFRT flips and FTRAN their accumulated column.
    fn update_ftran_bfrt(&mut self) {
        if self.invert_hint.is_some() || self.solve_bailout {
            return;
        }
        self.column_bfrt.clear();
        if self.dual_row.flip_list.is_empty() {
            return;
        }
        self.dual_row.update_flip(&mut self.ws, &mut self.column_bfrt);
        if self.column_bfrt.count > 0 {
            self.ws.factor.ftran(&mut self.column_bfrt);
        }
    }

    /// FTRAN of the BTRAN result, for the DSE weight update.
    fn update_ftran_dse(&mut self) {
        if self.invert_hint.is_some() || self.solve_bailout {
            return;
        }
        if self.edge_weight_mode != DualEdgeWeightStrategy::SteepestEdge {
            return;
        }
        self.column_dse.copy_from(&self.row_ep);
        self.ws.factor.ftran(&mut self.column_dse);
    }

    /// Update the dual values along the pivotal row.
    fn update_dual_values(&mut self) {
        if self.invert_hint.is_some() || self.solve_bailout {
            return;
        }
        if self.theta_dual == 0.0 {
            // Degenerate dual step: shift the entering column's cost.
            let amount = -self.ws.work_dual[self.var_in];
            self.ws.shift_cost(self.var_in, amount);
            self.ws.work_dual[self.var_in] = 0.0;
        } else {
            self.dual_row.update_dual(&mut self.ws, self.theta_dual);
        }
        self.ws.work_dual[self.var_in] = 0.0;
        self.ws.work_dual[self.var_out] = -self.theta_dual * self.source_out;
    }

    /// Update the primal values and the edge weights.
    fn update_primal_values(&mut self) {
        if self.invert_hint.is_some() || self.solve_bailout {
            return;
        }
        if self.column_bfrt.count > 0 {
            self.dual_rhs.update_primal(
                &self.column_bfrt,
                1.0,
                &mut self.ws.base_value,
                &self.ws.base_lower,
                &self.ws.base_upper,
            );
        }

        self.theta_primal = self.delta_primal / self.alpha;

        match self.edge_weight_mode {
            DualEdgeWeightStrategy::SteepestEdge => {
                let gamma_p = self.dual_rhs.work_ed_wt[self.row_out];
                self.dual_rhs.update_weight_dse(
                    &self.column,
                    self.row_out,
                    self.alpha,
                    gamma_p,
                    &self.column_dse.array,
                );
                self.dual_rhs.work_ed_wt[self.row_out] = gamma_p / (self.alpha * self.alpha);
            }
            DualEdgeWeightStrategy::Devex => {
                let w_p = self.dual_rhs.work_ed_wt[self.row_out];
                // Framework accuracy check against the exact steepest-edge
                // weight of the post-pivot row.
                let column_norm: f64 = (0..self.column.count)
                    .map(|k| {
                        let v = self.column.array[self.column.index[k]];
                        v * v
                    })
                    .sum();
                let computed = 1.0
                    + (column_norm - self.alpha * self.alpha).max(0.0)
                        / (self.alpha * self.alpha);
                let ratio = (w_p / computed).max(computed / w_p);
                if ratio > MAX_ALLOWED_DEVEX_WEIGHT_RATIO {
                    self.new_devex_framework = true;
                }
                self.dual_rhs
                    .update_weight_devex(&self.column, self.row_out, self.alpha, w_p);
                // The reference-set indicator of the entering variable is
                // the floor of the new pivotal weight.
                let reference_in = self.devex_index[self.var_in] as f64;
                self.dual_rhs.work_ed_wt[self.row_out] =
                    w_p.max(reference_in) / (self.alpha * self.alpha);
            }
            DualEdgeWeightStrategy::Dantzig => {}
        }

        self.dual_rhs.update_primal(
            &self.column,
            self.theta_primal,
            &mut self.ws.base_value,
            &self.ws.base_lower,
            &self.ws.base_upper,
        );
    }

    /// Commit the basis change: basis arrays, factorisation update,
    /// matrix partition, entering value, and the synthetic clock.
    fn update_pivots(&mut self) {
        if self.invert_hint.is_some() || self.solve_bailout {
            return;
        }
        let move_out = if self.source_out < 0.0 {
            NONBASIC_MOVE_UP
        } else {
            NONBASIC_MOVE_DOWN
        };
        let var_in = self.var_in;
        let var_out = self.var_out;
        self.ws.update_pivots(var_in, self.row_out, move_out);

        if let Some(hint) = self.ws.update_factor(&self.column, &self.row_ep, self.row_out) {
            self.invert_hint = Some(hint);
            // The basis arrays already reflect the pivot; the forced
            // rebuild refactorises them from scratch.
        }
        self.ws.update_matrix(var_in, var_out);

        let value_in = self.ws.work_value[var_in] + self.theta_primal;
        self.dual_rhs.update_pivots(
            self.row_out,
            value_in,
            self.ws.work_lower[var_in],
            self.ws.work_upper[var_in],
        );
        self.ws.base_value[self.row_out] = value_in;

        if self.edge_weight_mode == DualEdgeWeightStrategy::Devex {
            // The entering variable leaves the reference set.
            self.devex_index[var_in] = 0;
            self.num_devex_iterations += 1;
            let framework_limit = 25.max(self.ws.num_row / 100);
            if self.num_devex_iterations > framework_limit {
                self.new_devex_framework = true;
            }
        }

        self.total_synthetic_tick += (self.column.count + self.row_ep.count) as f64;
        if self.invert_hint.is_none() {
            let update_budget = self.update_limit.min(self.ws.num_row.max(10));
            let tick_budget = 100.0 * self.ws.num_row.max(10) as f64;
            if self.ws.factor.update_count() >= update_budget
                || self.total_synthetic_tick > tick_budget
            {
                self.invert_hint = Some(InvertHint::UpdateLimit);
            }
        }
    }

    /// Reset the Devex framework: unit weights, all variables in the
    /// reference set.
    fn initialise_devex_framework(&mut self) {
        self.devex_index.fill(1);
        self.dual_rhs.work_ed_wt.fill(1.0);
        self.num_devex_iterations = 0;
        self.num_devex_frameworks += 1;
        self.new_devex_framework = false;
    }

    /// Number of Devex frameworks used so far.
    pub fn devex_framework_count(&self) -> usize {
        self.num_devex_frameworks
    }

    /// Extract the solution in the original model space, reversing the
    /// column permutation, the scaling, and the objective sense.
    pub fn solution(&self) -> Solution {
        let ws = &self.ws;
        let sign = ws.sense.sign();
        let mut value = vec![0.0; ws.num_tot];
        for j in 0..ws.num_tot {
            if ws.basis.nonbasic_flag[j] == NONBASIC_FLAG_TRUE {
                value[j] = ws.work_value[j];
            }
        }
        for i in 0..ws.num_row {
            value[ws.basis.basic_index[i]] = ws.base_value[i];
        }

        let mut solution = Solution {
            col_value: vec![0.0; ws.num_col],
            col_dual: vec![0.0; ws.num_col],
            row_value: vec![0.0; ws.num_row],
            row_dual: vec![0.0; ws.num_row],
        };
        for j in 0..ws.num_col {
            let original = ws.col_permutation[j];
            solution.col_value[original] = value[j] * ws.scale.col[j];
            solution.col_dual[original] =
                sign * ws.scale.cost * ws.work_dual[j] / ws.scale.col[j];
        }
        for i in 0..ws.num_row {
            solution.row_value[i] = value[ws.num_col + i] / ws.scale.row[i];
            solution.row_dual[i] =
                sign * ws.scale.cost * ws.work_dual[ws.num_col + i] * ws.scale.row[i];
        }
        solution
    }

    /// Objective value of the current solution in the original space.
    pub fn objective_value(&self) -> f64 {
        self.ws.compute_primal_objective_value()
    }
}

/// Running-average density record, as used to pick PRICE strategies.
fn update_density(recent: f64, average: f64) -> f64 {
    0.95 * average + 0.05 * recent
}
