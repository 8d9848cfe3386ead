//! Collaborator contracts consumed by the solvers.
//!
//! The engine never assembles residuals or solves linear systems itself.
//! It drives implementations of the traits in this module:
//!
//! - [`Evaluator`] evaluates the residual and its tangent for a flat state vector
//! - [`LinearSolver`] solves `A x = b`, optionally reusing a pre-factorised operator
//! - [`NonlinearSolver`] finds a root of an [`Evaluator`]
//! - [`Problem`] is the discretised system being integrated
//! - [`SolverHooks`] receives the accepted steps of a run
use crate::dependency::DependencyGraph;
use crate::errors::{RSTSError, RSTSResult};
use crate::state::SolutionState;
use crate::stepper::StepperState;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Residual and tangent evaluation for a flat state vector.
///
/// Evaluation must not depend on time other than through the most recent
/// [`Problem::time_update`] notification.
pub trait Evaluator {
    fn residual(&self, x: &DVector<f64>) -> RSTSResult<DVector<f64>>;

    fn tangent_matrix(&self, x: &DVector<f64>) -> RSTSResult<DMatrix<f64>>;
}

pub trait LinearSolver {
    /// Prepare the solver for repeated solves with `mtx`.
    ///
    /// Subsequent calls to [`LinearSolver::solve`] with the same matrix reuse the prepared
    /// operator.
    fn presolve(&mut self, _mtx: &DMatrix<f64>) -> RSTSResult<()> {
        Ok(())
    }

    fn solve(&mut self, rhs: &DVector<f64>, mtx: &DMatrix<f64>) -> RSTSResult<DVector<f64>>;
}

/// Outcome of a single nonlinear solve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveStatus {
    pub converged: bool,
    pub n_iter: usize,
    /// Final residual norm
    pub err: f64,
}

impl SolveStatus {
    /// Status of a step where no nonlinear solve was required
    pub fn not_solved() -> Self {
        Self {
            converged: true,
            n_iter: 0,
            err: 0.0,
        }
    }
}

impl Default for SolveStatus {
    fn default() -> Self {
        Self::not_solved()
    }
}

pub trait NonlinearSolver {
    /// Find `x` such that `evaluator.residual(x) = 0`, starting from `x0`.
    ///
    /// Failing to converge is reported through the returned [`SolveStatus`].
    /// Errors are reserved for evaluation and linear solver failures.
    fn solve(
        &self,
        x0: &DVector<f64>,
        evaluator: &dyn Evaluator,
        ls: &mut dyn LinearSolver,
    ) -> RSTSResult<(DVector<f64>, SolveStatus)>;
}

/// A discretised system of equations.
///
/// The [`Evaluator`] implementation operates on the flat vector of the state created by
/// [`Problem::create_state`].
pub trait Problem: Evaluator {
    /// Variables of the problem, with their boundary and initial conditions
    fn create_state(&self) -> SolutionState;

    /// Notify the problem of the time of the step about to be solved.
    ///
    /// `None` is used by stationary solves.
    fn time_update(&mut self, ts: Option<&StepperState>) -> RSTSResult<()>;

    /// Called once an accepted step has been handed to the caller, before the next step
    fn advance(&mut self, _ts: Option<&StepperState>, _state: &SolutionState) -> RSTSResult<()> {
        Ok(())
    }

    /// If true, the tangent matrix does not depend on the state or on time
    fn is_linear(&self) -> bool {
        false
    }

    /// Dependencies between the (virtual) variables of the equations
    fn variable_dependencies(&self) -> DependencyGraph {
        DependencyGraph::new()
    }

    /// Map from virtual variable names to the state variables they test
    fn dual_names(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Create a problem containing only the equations of the `block` variables.
    ///
    /// `solved` holds the values of all variables solved so far and is read-only context
    /// for the sub-problem. The state of the sub-problem contains only the `block`
    /// variables.
    fn create_subproblem(
        &self,
        block: &[String],
        _solved: &SolutionState,
    ) -> RSTSResult<Box<dyn Problem>> {
        Err(RSTSError::Error(format!(
            "Problem does not support sub-problems (requested block {:?})",
            block
        )))
    }
}

/// Callbacks invoked while a solver runs.
///
/// `()` can be used when no hooks are needed.
pub trait SolverHooks {
    /// Called once for each accepted step, including the initial condition.
    ///
    /// `ts` is `None` for stationary solves.
    fn step(
        &mut self,
        _ts: Option<&StepperState>,
        _state: &SolutionState,
        _is_initial: bool,
    ) -> RSTSResult<()> {
        Ok(())
    }

    /// Called once with the final state after the last step of a run
    fn post_process(&mut self, _state: &SolutionState) -> RSTSResult<()> {
        Ok(())
    }
}

impl SolverHooks for () {}

/// Create the state a run starts from.
///
/// The state is zero except where initial conditions are given and has its history
/// initialised.
pub fn get_initial_state(problem: &dyn Problem) -> SolutionState {
    let mut state = problem.create_state();
    state.apply_ic();
    state.init_history();
    state
}
