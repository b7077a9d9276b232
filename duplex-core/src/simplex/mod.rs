//! Dual revised simplex method.
//!
//! Control flow between the sub-modules is driven by a small enum of
//! *invert hints* rather than deep branching: every kernel may post a hint,
//! each iteration sub-step returns early once one is set, and the next
//! rebuild decides what the hint means for termination.

pub mod crash;
pub mod dual;
pub mod dual_rhs;
pub mod dual_row;
pub mod workspace;

/// Reasons a kernel requests a refactor and/or signals a termination
/// condition. Checked at the top of each iteration sub-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvertHint {
    /// CHUZR found no candidate: primal feasible, so possibly optimal.
    PossiblyOptimal,
    /// Phase 1 found no primal infeasibility under artificial bounds.
    PossiblyPhase1Feasible,
    /// CHUZC found no candidate: dual ray, so primal may be infeasible.
    PossiblyDualUnbounded,
    /// Phase 2 detected unbounded primal movement.
    PossiblyPrimalUnbounded,
    /// CHUZC failed for a recoverable reason; rebuild and retry.
    ChooseColumnFail,
    /// The basis proved singular.
    Singular,
    /// The Forrest-Tomlin style update budget is spent.
    UpdateLimit,
    /// Numerical trouble: a rejected update or a failed pivot check.
    Trouble,
}
