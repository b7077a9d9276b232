//! End-to-end tests: model building, file round trips, and full solves.

use approx::assert_abs_diff_eq;

use duplex_core::io::ems::{parse_ems, write_ems_string};
use duplex_core::io::messages::MessageSink;
use duplex_core::io::mps::{parse_mps_free, read_mps, write_mps, write_mps_string};
use duplex_core::model::util::transform_into_equality_problem;
use duplex_core::presolve::feasibility::{run_feasibility, MinimizationType};
use duplex_core::{
    solve, EngineStatus, Lp, SolutionStatus, Solution, SolverOptions,
};

fn quiet_sink() -> MessageSink {
    MessageSink::quiet()
}

fn solve_default(lp: &Lp) -> (SolutionStatus, Solution, f64) {
    let result = solve(lp, &SolverOptions::default()).unwrap();
    (result.status, result.solution, result.objective_value)
}

// ----- end-to-end scenarios --------------------------------------------

#[test]
fn scenario_trivial_bounded_variable() {
    // minimise x s.t. 1 <= x <= 3.
    let mut lp = Lp::with_dims(1, 0);
    lp.col_cost = vec![1.0];
    lp.col_lower = vec![1.0];
    lp.col_upper = vec![3.0];
    let (status, solution, objective) = solve_default(&lp);
    assert_eq!(status, SolutionStatus::Optimal);
    assert_abs_diff_eq!(solution.col_value[0], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(objective, 1.0, epsilon = 1e-9);
}

#[test]
fn scenario_upper_bounded_lp() {
    // minimise -x - y s.t. x + y <= 4, 0 <= x, y <= 3. Either of the two
    // optimal bases is acceptable; the objective is -4.
    let mut lp = Lp::with_dims(2, 1);
    lp.a_start = vec![0, 1, 2];
    lp.a_index = vec![0, 0];
    lp.a_value = vec![1.0, 1.0];
    lp.col_cost = vec![-1.0, -1.0];
    lp.col_upper = vec![3.0, 3.0];
    lp.row_upper = vec![4.0];
    let (status, solution, objective) = solve_default(&lp);
    assert_eq!(status, SolutionStatus::Optimal);
    assert_abs_diff_eq!(objective, -4.0, epsilon = 1e-9);
    let (x, y) = (solution.col_value[0], solution.col_value[1]);
    assert_abs_diff_eq!(x + y, 4.0, epsilon = 1e-9);
    assert!(x <= 3.0 + 1e-9 && y <= 3.0 + 1e-9);
    assert!(x >= -1e-9 && y >= -1e-9);
    assert_abs_diff_eq!(solution.row_value[0], 4.0, epsilon = 1e-9);
}

#[test]
fn scenario_primal_infeasible() {
    // minimise x s.t. x <= -1 (row), x >= 1 (bound).
    let mut lp = Lp::with_dims(1, 1);
    lp.a_start = vec![0, 1];
    lp.a_index = vec![0];
    lp.a_value = vec![1.0];
    lp.col_cost = vec![1.0];
    lp.col_lower = vec![1.0];
    lp.row_upper = vec![-1.0];
    let (status, _, _) = solve_default(&lp);
    assert_eq!(status, SolutionStatus::PrimalInfeasible);
}

#[test]
fn scenario_unbounded() {
    // minimise -x s.t. x >= 0.
    let mut lp = Lp::with_dims(1, 0);
    lp.col_cost = vec![-1.0];
    let (status, _, _) = solve_default(&lp);
    assert_eq!(status, SolutionStatus::Unbounded);

    // The same with a non-binding row.
    let mut lp = Lp::with_dims(1, 1);
    lp.a_start = vec![0, 1];
    lp.a_index = vec![0];
    lp.a_value = vec![1.0];
    lp.col_cost = vec![-1.0];
    lp.row_lower = vec![0.0];
    let (status, _, _) = solve_default(&lp);
    assert_eq!(status, SolutionStatus::Unbounded);
}

#[test]
fn scenario_degenerate_assignment() {
    // 3x3 assignment polytope: x_ij in [0, 1], row and column sums equal
    // one. Costs make the diagonal optimal with value 3; the vertex is
    // degenerate and several optimal bases exist.
    let costs = [
        [1.0, 2.0, 3.0],
        [2.0, 1.0, 3.0],
        [3.0, 2.0, 1.0],
    ];
    let mut lp = Lp::with_dims(9, 6);
    let mut a_start = vec![0];
    let mut a_index = Vec::new();
    let mut a_value = Vec::new();
    let mut col_cost = Vec::new();
    for i in 0..3 {
        for j in 0..3 {
            // Row-sum constraint i, column-sum constraint 3 + j.
            a_index.push(i);
            a_value.push(1.0);
            a_index.push(3 + j);
            a_value.push(1.0);
            a_start.push(a_index.len());
            col_cost.push(costs[i][j]);
        }
    }
    lp.a_start = a_start;
    lp.a_index = a_index;
    lp.a_value = a_value;
    lp.col_cost = col_cost;
    lp.col_upper = vec![1.0; 9];
    lp.row_lower = vec![1.0; 6];
    lp.row_upper = vec![1.0; 6];

    let (status, solution, objective) = solve_default(&lp);
    assert_eq!(status, SolutionStatus::Optimal);
    assert_abs_diff_eq!(objective, 3.0, epsilon = 1e-12);
    // The solution is a doubly stochastic matrix.
    for i in 0..3 {
        let row_sum: f64 = (0..3).map(|j| solution.col_value[3 * i + j]).sum();
        assert_abs_diff_eq!(row_sum, 1.0, epsilon = 1e-7);
    }
}

#[test]
fn scenario_feasibility_subsolver() {
    // Equality system with b in the column span and a unique feasible
    // point x* = (0.25, 0.75, 0.5).
    let mut lp = Lp::with_dims(3, 3);
    lp.a_start = vec![0, 1, 2, 3];
    lp.a_index = vec![0, 1, 2];
    lp.a_value = vec![2.0, 1.0, 4.0];
    lp.col_upper = vec![1.0, 1.0, 1.0];
    lp.row_lower = vec![0.5, 0.75, 2.0];
    lp.row_upper = vec![0.5, 0.75, 2.0];

    let mut solution = Solution::default();
    let status = run_feasibility(
        &lp,
        &mut solution,
        MinimizationType::ComponentWise,
        &mut quiet_sink(),
    );
    assert_eq!(status, EngineStatus::Ok);
    let expected = [0.25, 0.75, 0.5];
    for (value, want) in solution.col_value.iter().zip(expected) {
        assert_abs_diff_eq!(*value, want, epsilon = 1e-4);
    }
    let residual: f64 = (0..3)
        .map(|i| {
            let r = lp.row_upper[i] - solution.row_value[i];
            r * r
        })
        .sum::<f64>()
        .sqrt();
    assert!(residual < 1e-6, "residual {} too large", residual);
}

// ----- boundary behaviour ----------------------------------------------

#[test]
fn empty_lp_returns_offset() {
    let mut lp = Lp::with_dims(0, 0);
    lp.offset = 5.25;
    let (status, _, objective) = solve_default(&lp);
    assert_eq!(status, SolutionStatus::Optimal);
    assert_abs_diff_eq!(objective, 5.25, epsilon = 1e-12);

    // Zero columns but a (vacuous) row.
    let mut lp = Lp::with_dims(0, 1);
    lp.offset = -1.0;
    lp.row_lower = vec![-1.0];
    lp.row_upper = vec![1.0];
    let (status, _, objective) = solve_default(&lp);
    assert_eq!(status, SolutionStatus::Optimal);
    assert_abs_diff_eq!(objective, -1.0, epsilon = 1e-12);
}

#[test]
fn fixed_variables_only() {
    // Every variable fixed: phase 1 is immediate and phase 2 returns the
    // weighted sum.
    let mut lp = Lp::with_dims(2, 1);
    lp.a_start = vec![0, 1, 2];
    lp.a_index = vec![0, 0];
    lp.a_value = vec![1.0, 1.0];
    lp.col_cost = vec![3.0, -2.0];
    lp.col_lower = vec![2.0, 1.0];
    lp.col_upper = vec![2.0, 1.0];
    lp.row_upper = vec![10.0];
    let (status, solution, objective) = solve_default(&lp);
    assert_eq!(status, SolutionStatus::Optimal);
    assert_abs_diff_eq!(objective, 4.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.col_value[0], 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.row_value[0], 3.0, epsilon = 1e-9);
}

#[test]
fn keep_n_rows_changes_only_row_count() {
    let text = "\
NAME        NTEST
ROWS
 N  COST
 N  SPARE
 L  R1
COLUMNS
    X         COST      1.0   R1        1.0
    X         SPARE     3.0
RHS
    RHS       R1        2.0
ENDATA
";
    let dropped = parse_mps_free(text, false, &mut quiet_sink()).unwrap();
    let kept = parse_mps_free(text, true, &mut quiet_sink()).unwrap();
    assert_eq!(dropped.num_row + 1, kept.num_row);
    assert_eq!(dropped.num_col, kept.num_col);
    assert_eq!(dropped.col_cost, kept.col_cost);
    // The retained free row is unbounded both ways.
    assert_eq!(kept.row_lower[0], f64::NEG_INFINITY);
    assert_eq!(kept.row_upper[0], f64::INFINITY);

    // Both variants solve to the same objective.
    let (status_a, _, obj_a) = solve_default(&dropped);
    let (status_b, _, obj_b) = solve_default(&kept);
    assert_eq!(status_a, SolutionStatus::Optimal);
    assert_eq!(status_b, SolutionStatus::Optimal);
    assert_abs_diff_eq!(obj_a, obj_b, epsilon = 1e-9);
}

// ----- round trips -----------------------------------------------------

fn scratch_path(name: &str) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("duplex-{}-{}", std::process::id(), name));
    path
}

#[test]
fn mps_file_round_trip() {
    let mut lp = Lp::with_dims(3, 2);
    lp.model_name = "RT".into();
    lp.a_start = vec![0, 2, 3, 4];
    lp.a_index = vec![0, 1, 0, 1];
    lp.a_value = vec![1.0, -1.0, 2.0, 4.0];
    lp.col_cost = vec![1.0, 2.0, 0.0];
    lp.col_lower = vec![0.0, -1.0, 0.0];
    lp.col_upper = vec![f64::INFINITY, 1.0, 5.0];
    lp.row_lower = vec![0.0, -2.0];
    lp.row_upper = vec![3.0, -2.0];
    lp.col_names = vec!["X1".into(), "X2".into(), "X3".into()];
    lp.row_names = vec!["R1".into(), "R2".into()];

    let path = scratch_path("round.mps");
    write_mps(&lp, &path, true).unwrap();
    let read = read_mps(&path, &SolverOptions::default(), &mut quiet_sink()).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(read, lp);
}

#[test]
fn mps_fixed_and_free_forms_agree() {
    let mut lp = Lp::with_dims(2, 1);
    lp.model_name = "FORM".into();
    lp.a_start = vec![0, 1, 2];
    lp.a_index = vec![0, 0];
    lp.a_value = vec![1.5, 2.5];
    lp.col_cost = vec![1.0, -2.0];
    lp.col_upper = vec![2.0, 4.0];
    lp.row_upper = vec![3.0];
    lp.col_names = vec!["A".into(), "B".into()];
    lp.row_names = vec!["R".into()];

    let free_text = write_mps_string(&lp, true).unwrap();
    let fixed_text = write_mps_string(&lp, false).unwrap();
    let from_free = parse_mps_free(&free_text, false, &mut quiet_sink()).unwrap();
    let from_fixed =
        duplex_core::io::mps::parse_mps_fixed(&fixed_text, false, &mut quiet_sink()).unwrap();
    assert_eq!(from_free, from_fixed);
    assert_eq!(from_free, lp);
}

#[test]
fn ems_file_round_trip() {
    let mut lp = Lp::with_dims(2, 1);
    lp.a_start = vec![0, 1, 2];
    lp.a_index = vec![0, 0];
    lp.a_value = vec![1.0, 2.0];
    lp.col_cost = vec![-1.0, 1.0];
    lp.col_upper = vec![4.0, f64::INFINITY];
    lp.row_upper = vec![6.0];
    let text = write_ems_string(&lp);
    let read = parse_ems(&text).unwrap();
    assert_eq!(read, lp);
}

#[test]
fn equality_transform_objective_parity() {
    let mut lp = Lp::with_dims(2, 2);
    lp.a_start = vec![0, 2, 4];
    lp.a_index = vec![0, 1, 0, 1];
    lp.a_value = vec![1.0, 2.0, 1.0, -1.0];
    lp.col_cost = vec![3.0, -1.0];
    lp.col_upper = vec![5.0, 5.0];
    lp.row_lower = vec![f64::NEG_INFINITY, -4.0];
    lp.row_upper = vec![4.0, 4.0];

    let equality = transform_into_equality_problem(&lp);
    // A feasible point of the original extends with slack values equal to
    // the row activities, and the objectives agree.
    let x = [1.0, 1.5];
    let activity0 = x[0] + x[1];
    let activity1 = 2.0 * x[0] - x[1];
    let extended = [x[0], x[1], activity0, activity1];
    assert_abs_diff_eq!(
        lp.objective_value(&x),
        equality.objective_value(&extended),
        epsilon = 1e-12
    );

    // Solving both gives the same optimal value.
    let (status_a, _, obj_a) = solve_default(&lp);
    let (status_b, _, obj_b) = solve_default(&equality);
    assert_eq!(status_a, SolutionStatus::Optimal);
    assert_eq!(status_b, SolutionStatus::Optimal);
    assert_abs_diff_eq!(obj_a, obj_b, epsilon = 1e-7);
}

#[test]
fn parse_then_solve_end_to_end() {
    let text = "\
NAME        E2E
ROWS
 N  COST
 L  CAP
COLUMNS
    X         COST      -1.0  CAP       1.0
    Y         COST      -1.0  CAP       1.0
RHS
    RHS       CAP       4.0
BOUNDS
 UP BND       X         3.0
 UP BND       Y         3.0
ENDATA
";
    let lp = parse_mps_free(text, false, &mut quiet_sink()).unwrap();
    let (status, _, objective) = solve_default(&lp);
    assert_eq!(status, SolutionStatus::Optimal);
    assert_abs_diff_eq!(objective, -4.0, epsilon = 1e-9);
}

#[test]
fn dual_solution_satisfies_complementarity() {
    // minimise -x - 2y s.t. x + y <= 4, y <= 2, x, y >= 0.
    // Optimum (2, 2) with row duals (-1, -1).
    let mut lp = Lp::with_dims(2, 2);
    lp.a_start = vec![0, 1, 3];
    lp.a_index = vec![0, 0, 1];
    lp.a_value = vec![1.0, 1.0, 1.0];
    lp.col_cost = vec![-1.0, -2.0];
    lp.row_upper = vec![4.0, 2.0];
    let (status, solution, objective) = solve_default(&lp);
    assert_eq!(status, SolutionStatus::Optimal);
    assert_abs_diff_eq!(objective, -6.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.col_value[0], 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(solution.col_value[1], 2.0, epsilon = 1e-9);
    // Reduced costs of basic structurals vanish; binding rows carry
    // nonzero duals of the right sign for minimisation.
    assert_abs_diff_eq!(solution.col_dual[0], 0.0, epsilon = 1e-7);
    assert_abs_diff_eq!(solution.col_dual[1], 0.0, epsilon = 1e-7);
    assert!(solution.row_dual[0] < -1e-9);
    assert!(solution.row_dual[1] < -1e-9);
}
