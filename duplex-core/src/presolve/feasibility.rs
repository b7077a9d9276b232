//! Approximate feasibility for equality LPs.
//!
//! Runs an augmented-Lagrangian outer loop on
//!
//! ```text
//! minimise  c'x + lambda'(b - Ax) + (1/mu) ||b - Ax||^2   s.t. l <= x <= u
//! ```
//!
//! with componentwise coordinate minimisation in the inner loop. The
//! result is an approximate primal point for warm-starting the simplex.
//! Only equality, minimisation problems are handled; anything else must be
//! transformed by the caller first.

use crate::io::messages::{MessageSink, ML_ALWAYS, ML_DETAILED};
use crate::model::{EngineStatus, Lp, ObjSense, Solution};

const EXIT_TOLERANCE: f64 = 1e-8;
const OUTER_ITERATIONS: usize = 30;
const INNER_ITERATIONS: usize = 100;
const INITIAL_MU: f64 = 10.0;

/// Inner minimisation flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimizationType {
    /// Coordinate descent over the columns.
    ComponentWise,
    /// Projected gradient; not implemented.
    Exact,
}

/// Every row is an equality.
pub fn is_equality_problem(lp: &Lp) -> bool {
    (0..lp.num_row).all(|i| lp.row_lower[i] == lp.row_upper[i])
}

/// Working state of the quadratic subproblem.
struct Quadratic<'a> {
    lp: &'a Lp,
    col_value: Vec<f64>,
    row_value: Vec<f64>,
    residual: Vec<f64>,
    objective: f64,
    residual_norm_2: f64,
}

impl<'a> Quadratic<'a> {
    fn new(lp: &'a Lp, col_value: Vec<f64>) -> Self {
        let mut quadratic = Quadratic {
            lp,
            col_value,
            row_value: vec![0.0; lp.num_row],
            residual: vec![0.0; lp.num_row],
            objective: 0.0,
            residual_norm_2: 0.0,
        };
        quadratic.update();
        quadratic
    }

    fn update(&mut self) {
        self.update_objective();
        self.update_row_value();
        self.update_residual();
    }

    fn update_objective(&mut self) {
        self.objective = (0..self.lp.num_col)
            .map(|j| self.lp.col_cost[j] * self.col_value[j])
            .sum();
    }

    fn update_row_value(&mut self) {
        self.row_value.fill(0.0);
        for j in 0..self.lp.num_col {
            let (index, value) = self.lp.col(j);
            for (&i, &v) in index.iter().zip(value) {
                self.row_value[i] += v * self.col_value[j];
            }
        }
    }

    fn update_residual(&mut self) {
        let mut norm2 = 0.0;
        for i in 0..self.lp.num_row {
            // Equality rows: the bound pair coincides.
            self.residual[i] = self.lp.row_upper[i] - self.row_value[i];
            norm2 += self.residual[i] * self.residual[i];
        }
        self.residual_norm_2 = norm2.sqrt();
    }

    /// One inner loop: coordinate minimisation sweeps over the columns.
    fn minimize_by_component(&mut self, mu: f64, lambda: &[f64], sink: &mut MessageSink) {
        for iteration in 0..INNER_ITERATIONS {
            for col in 0..self.lp.num_col {
                if self.lp.a_start[col] == self.lp.a_start[col + 1] {
                    continue;
                }

                // 1-D quadratic in x_col: a x^2 + 2 b x + const.
                let mut a = 0.0;
                let mut b = 0.0;
                let (index, value) = self.lp.col(col);
                for (&row, &v) in index.iter().zip(value) {
                    a += v * v;
                    let mut bracket = -self.residual[row] - v * self.col_value[col];
                    bracket += lambda[row];
                    b += v * bracket;
                }
                a = (0.5 / mu) * a;
                b = (0.5 / mu) * b + 0.5 * self.lp.col_cost[col];

                let theta = -b / a;
                let new_value = if theta > 0.0 {
                    theta.min(self.lp.col_upper[col])
                } else {
                    theta.max(self.lp.col_lower[col])
                };
                let delta = new_value - self.col_value[col];
                self.col_value[col] = new_value;

                self.objective += self.lp.col_cost[col] * delta;
                for (&row, &v) in index.iter().zip(value) {
                    self.residual[row] -= v * delta;
                    self.row_value[row] += v * delta;
                }
            }

            self.update();
            sink.print(
                ML_DETAILED,
                &format!(
                    "inner iteration {:3}: objective {:3.2e} residual {:3.4e}",
                    iteration, self.objective, self.residual_norm_2
                ),
            );
        }
        self.update();
    }

    fn write_solution(&self, solution: &mut Solution) {
        solution.col_value = self.col_value.clone();
        solution.row_value = self.row_value.clone();
    }
}

/// Starting point: zero when feasible for the column bounds, otherwise the
/// nearest bound.
fn initial_point(lp: &Lp) -> Result<Vec<f64>, EngineStatus> {
    let mut col_value = vec![0.0; lp.num_col];
    for (col, value) in col_value.iter_mut().enumerate() {
        if lp.col_lower[col] <= 0.0 && lp.col_upper[col] >= 0.0 {
            *value = 0.0;
        } else if lp.col_lower[col] > 0.0 {
            *value = lp.col_lower[col];
        } else if lp.col_upper[col] < 0.0 {
            *value = lp.col_upper[col];
        } else {
            return Err(EngineStatus::Error);
        }
    }
    Ok(col_value)
}

/// Run the feasibility search, leaving the approximate point in
/// `solution`.
pub fn run_feasibility(
    lp: &Lp,
    solution: &mut Solution,
    minimization_type: MinimizationType,
    sink: &mut MessageSink,
) -> EngineStatus {
    if !is_equality_problem(lp) {
        return EngineStatus::NotImplemented;
    }
    if lp.sense != ObjSense::Minimise {
        sink.print(
            ML_ALWAYS,
            "feasibility search does not support maximisation problems",
        );
        return EngineStatus::NotImplemented;
    }
    if minimization_type == MinimizationType::Exact {
        return EngineStatus::NotImplemented;
    }

    let col_value = match initial_point(lp) {
        Ok(v) => v,
        Err(status) => return status,
    };
    let mut mu = INITIAL_MU;
    let mut lambda = vec![0.0; lp.num_row];

    let mut quadratic = Quadratic::new(lp, col_value);
    sink.print(
        ML_ALWAYS,
        &format!(
            "iteration {:3}: objective {:3.2} residual {:3.4e}",
            0, quadratic.objective, quadratic.residual_norm_2
        ),
    );
    if quadratic.residual_norm_2 < EXIT_TOLERANCE {
        quadratic.write_solution(solution);
        return EngineStatus::Ok;
    }

    for iteration in 1..=OUTER_ITERATIONS {
        quadratic.minimize_by_component(mu, &lambda, sink);

        sink.print(
            ML_ALWAYS,
            &format!(
                "iteration {:3}: objective {:3.2} residual {:3.4e}",
                iteration, quadratic.objective, quadratic.residual_norm_2
            ),
        );
        if quadratic.residual_norm_2 < EXIT_TOLERANCE {
            break;
        }

        // Tighten the penalty every third iteration; otherwise take a
        // multiplier step.
        if iteration % 3 == 2 {
            mu *= 0.1;
        } else {
            for (l, r) in lambda.iter_mut().zip(&quadratic.residual) {
                *l = mu * r;
            }
        }
    }

    quadratic.write_solution(solution);
    sink.print(ML_ALWAYS, "solution set at the end of feasibility search");
    EngineStatus::Ok
}
