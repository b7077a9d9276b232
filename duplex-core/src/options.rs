//! Solver options and strategy selections.

use crate::io::messages::ML_MINIMAL;

/// MPS reader selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MpsParserType {
    /// Whitespace-delimited tokens; falls back to fixed format when a name
    /// contains an internal space.
    #[default]
    Free,
    /// 80-column fixed fields.
    Fixed,
}

/// Outer simplex algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimplexStrategy {
    #[default]
    Dual,
    Primal,
    /// Single-iteration parallelism. Not implemented: falls back to `Dual`
    /// with a warning.
    Sip,
    /// Parallel minor iterations. Not implemented: falls back to `Dual`
    /// with a warning.
    Pami,
}

/// Dual edge weight policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DualEdgeWeightStrategy {
    /// Unit weights.
    Dantzig,
    /// Reference-framework approximation to steepest edge.
    Devex,
    /// True squared norms of the rows of the basis inverse.
    #[default]
    SteepestEdge,
}

/// PRICE kernel policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceStrategy {
    /// Column-wise PRICE.
    Col,
    /// Row-wise PRICE using the nonbasic partition.
    Row,
    /// Row-wise with a mid-operation switch to column PRICE on density.
    #[default]
    RowSwitch,
    /// Row-wise with the result kept in indexed form.
    RowUltra,
}

/// Solver settings and parameters.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// MPS reader to use.
    pub mps_parser_type: MpsParserType,

    /// Retain N-rows beyond the first (the objective) as free rows.
    pub keep_n_rows: bool,

    /// Outer algorithm.
    pub simplex_strategy: SimplexStrategy,

    /// Dual edge weight policy.
    pub dual_edge_weight_strategy: DualEdgeWeightStrategy,

    /// PRICE policy.
    pub price_strategy: PriceStrategy,

    /// Primal feasibility tolerance.
    pub primal_feasibility_tolerance: f64,

    /// Dual feasibility tolerance.
    pub dual_feasibility_tolerance: f64,

    /// Perturb costs in dual phase 2.
    pub perturb_costs: bool,

    /// Rank-1 updates tolerated before a forced refactor.
    pub update_limit: usize,

    /// Bounds of at least this magnitude are treated as infinite.
    pub infinite_bound: f64,

    /// Costs of at least this magnitude are rejected.
    pub infinite_cost: f64,

    /// Matrix entries below this magnitude are dropped.
    pub small_matrix_value: f64,

    /// Matrix entries above this magnitude are rejected.
    pub large_matrix_value: f64,

    /// Run the crash heuristic to seed the initial basis.
    pub use_crash: bool,

    /// Equilibration-scale the LP before solving.
    pub scale_simplex_lp: bool,

    /// Randomly permute columns to break CHUZR ties.
    pub permute_simplex_lp: bool,

    /// Seed for the permutation and cost perturbation.
    pub random_seed: u64,

    /// Simplex iteration limit (None = no limit).
    pub iteration_limit: Option<usize>,

    /// Time limit in milliseconds (None = no limit).
    pub time_limit_ms: Option<u64>,

    /// Message-level bitmask for the print sink.
    pub message_level: u32,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            mps_parser_type: MpsParserType::Free,
            keep_n_rows: false,
            simplex_strategy: SimplexStrategy::Dual,
            dual_edge_weight_strategy: DualEdgeWeightStrategy::SteepestEdge,
            price_strategy: PriceStrategy::RowSwitch,
            primal_feasibility_tolerance: 1e-7,
            dual_feasibility_tolerance: 1e-7,
            perturb_costs: true,
            update_limit: 5000,
            infinite_bound: 1e20,
            infinite_cost: 1e20,
            small_matrix_value: 1e-9,
            large_matrix_value: 1e15,
            use_crash: false,
            scale_simplex_lp: true,
            permute_simplex_lp: false,
            random_seed: 1,
            iteration_limit: None,
            time_limit_ms: None,
            message_level: ML_MINIMAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = SolverOptions::default();
        assert_eq!(opts.primal_feasibility_tolerance, 1e-7);
        assert_eq!(opts.dual_feasibility_tolerance, 1e-7);
        assert_eq!(opts.update_limit, 5000);
        assert_eq!(opts.infinite_bound, 1e20);
        assert_eq!(opts.small_matrix_value, 1e-9);
        assert_eq!(opts.large_matrix_value, 1e15);
        assert_eq!(
            opts.dual_edge_weight_strategy,
            DualEdgeWeightStrategy::SteepestEdge
        );
    }
}
