//! Derivative-free minimization via argmin's Nelder–Mead simplex.
//!
//! The Earth-Mover objective is piecewise linear in the rates and carries
//! an infinite-cost rejection region on negative proposals, so gradient
//! methods with line searches are a poor fit; the simplex only ever
//! compares cost values and handles both properties cleanly.

use argmin::core::{CostFunction, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;
use lf_core::Result;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Configuration for the Nelder–Mead minimizer.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations — the global guard around the search.
    pub max_iter: u64,
    /// Terminate when the sample standard deviation of the simplex costs
    /// falls below this.
    pub sd_tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 500, sd_tolerance: 1e-8 }
    }
}

/// Result of a minimization run.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-found parameters.
    pub parameters: Vec<f64>,
    /// Objective value at the best point.
    pub fval: f64,
    /// Number of iterations run.
    pub n_iter: u64,
    /// Number of objective evaluations.
    pub n_fev: usize,
    /// Whether the solver converged (as opposed to hitting `max_iter`).
    pub converged: bool,
    /// Termination message from the solver.
    pub message: String,
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.converged
        )
    }
}

/// Objective function to minimize.
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate the objective at `params`. Infeasible points are expected
    /// to evaluate to `f64::INFINITY`, not to error.
    fn eval(&self, params: &[f64]) -> Result<f64>;
}

/// Wrapper making an [`ObjectiveFunction`] compatible with argmin.
struct ArgminProblem<'a> {
    objective: &'a dyn ObjectiveFunction,
    counts: Arc<AtomicUsize>,
}

impl CostFunction for ArgminProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.fetch_add(1, Ordering::Relaxed);
        self.objective.eval(params).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

/// Nelder–Mead minimizer over an [`ObjectiveFunction`].
pub struct NelderMeadOptimizer {
    config: OptimizerConfig,
}

impl NelderMeadOptimizer {
    /// Create a minimizer with the given configuration.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Minimize `objective` starting from `init_params`.
    ///
    /// The initial simplex is `init_params` plus one vertex per dimension,
    /// displaced by 5% of the coordinate (or a small absolute step where
    /// the coordinate is zero). Non-convergence is not an error: the best
    /// point found is returned with `converged: false`.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
    ) -> Result<OptimizationResult> {
        if init_params.is_empty() {
            return Err(lf_core::Error::Validation("optimizer: empty initial parameters".into()));
        }

        let mut simplex: Vec<Vec<f64>> = vec![init_params.to_vec()];
        for i in 0..init_params.len() {
            let mut vertex = init_params.to_vec();
            vertex[i] = if vertex[i] != 0.0 { vertex[i] * 1.05 } else { 2.5e-4 };
            simplex.push(vertex);
        }

        let counts = Arc::new(AtomicUsize::new(0));
        let problem = ArgminProblem { objective, counts: counts.clone() };

        let solver: NelderMead<Vec<f64>, f64> =
            NelderMead::new(simplex).with_sd_tolerance(self.config.sd_tolerance).map_err(|e| {
                lf_core::Error::Validation(format!("optimizer: invalid sd tolerance: {e}"))
            })?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.max_iters(self.config.max_iter))
            .run()
            .map_err(|e| lf_core::Error::Computation(format!("optimization failed: {e}")))?;

        let state = res.state();
        let parameters = state
            .get_best_param()
            .ok_or_else(|| lf_core::Error::Computation("optimizer: no best point found".into()))?
            .clone();
        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        Ok(OptimizationResult {
            parameters,
            fval: state.get_best_cost(),
            n_iter: state.get_iter(),
            n_fev: counts.load(Ordering::Relaxed),
            converged,
            message: termination.to_string(),
        })
    }
}

impl Default for NelderMeadOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}
