use crate::errors::{RSTSError, RSTSResult};
use crate::problem::{Evaluator, LinearSolver, NonlinearSolver, Problem, SolveStatus};
use crate::state::SolutionState;
use crate::stepper::StepperState;
use log::{debug, error, info, warn};
use nalgebra::{DMatrix, DVector};

/// Makes single implicit time steps by delegating to a nonlinear solver.
///
/// The executor owns the solver stack used for all steps of a run.
/// For linear problems the tangent matrix is handed to the linear solver once, at the
/// initial step, and reused afterwards.
pub struct ImplicitStepExecutor {
    nls: Box<dyn NonlinearSolver>,
    ls: Box<dyn LinearSolver>,
}

impl ImplicitStepExecutor {
    pub fn new(nls: Box<dyn NonlinearSolver>, ls: Box<dyn LinearSolver>) -> Self {
        Self { nls, ls }
    }

    /// Compute the solution at the step described by `ts`, starting from `state0`.
    ///
    /// At the initial step the boundary conditions are applied to `state0` and the
    /// returned state is a copy of it, unless the run is quasistatic in which case an
    /// ordinary solve is performed.
    /// Later steps notify the problem of the new time and solve from `state0`.
    pub fn solve_step(
        &mut self,
        ts: &StepperState,
        state0: &mut SolutionState,
        problem: &mut dyn Problem,
    ) -> RSTSResult<(SolutionState, SolveStatus)> {
        if ts.step > 0 {
            problem.time_update(Some(ts))?;
            return self.solve(state0, &*problem);
        }

        state0.apply_ebc();
        let state = state0.clone();
        let vec = state.to_vector();

        if !ts.is_quasistatic {
            let residual = problem.residual(&vec).map_err(|e| {
                error!("Initial residual evaluation failed, giving up: {}", e);
                as_residual_error(e)
            })?;
            let err = residual.norm();
            if err.is_finite() {
                info!("Initial residual: {:e}", err);
            } else {
                warn!("Initial residual is not finite: {}", err);
            }
        }

        if problem.is_linear() {
            let mtx = problem.tangent_matrix(&vec).map_err(|e| {
                error!("Matrix evaluation failed, giving up: {}", e);
                as_matrix_error(e)
            })?;
            debug!("Presolving linear system of size {}", mtx.nrows());
            self.ls.presolve(&mtx)?;
        }

        if ts.is_quasistatic {
            problem.time_update(Some(ts))?;
            return self.solve(&state, &*problem);
        }

        Ok((state, SolveStatus::not_solved()))
    }

    /// Run the nonlinear solver on `problem` starting from `state0`
    pub fn solve(
        &mut self,
        state0: &SolutionState,
        problem: &dyn Problem,
    ) -> RSTSResult<(SolutionState, SolveStatus)> {
        let (vec, status) = self.solve_evaluator(&state0.to_vector(), &ProblemEvaluator(problem))?;
        let mut state = state0.clone();
        state.set_vector(&vec)?;
        Ok((state, status))
    }

    /// Run the nonlinear solver on an arbitrary evaluator
    pub fn solve_evaluator(
        &mut self,
        x0: &DVector<f64>,
        evaluator: &dyn Evaluator,
    ) -> RSTSResult<(DVector<f64>, SolveStatus)> {
        let (vec, status) = self.nls.solve(x0, evaluator, self.ls.as_mut())?;
        debug!(
            "Nonlinear solve: converged={} n_iter={} err={:e}",
            status.converged, status.n_iter, status.err
        );
        Ok((vec, status))
    }

    /// The linear solver, for one-off algebraic solves
    pub fn linear_solver_mut(&mut self) -> &mut dyn LinearSolver {
        self.ls.as_mut()
    }
}

impl std::fmt::Debug for ImplicitStepExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImplicitStepExecutor").finish_non_exhaustive()
    }
}

/// Exposes a [`Problem`] as a plain [`Evaluator`]
struct ProblemEvaluator<'a>(&'a dyn Problem);

impl Evaluator for ProblemEvaluator<'_> {
    fn residual(&self, x: &DVector<f64>) -> RSTSResult<DVector<f64>> {
        self.0.residual(x)
    }

    fn tangent_matrix(&self, x: &DVector<f64>) -> RSTSResult<DMatrix<f64>> {
        self.0.tangent_matrix(x)
    }
}

fn as_residual_error(e: RSTSError) -> RSTSError {
    match e {
        RSTSError::ResidualEvaluation(_) => e,
        other => RSTSError::ResidualEvaluation(other.to_string()),
    }
}

fn as_matrix_error(e: RSTSError) -> RSTSError {
    match e {
        RSTSError::MatrixEvaluation(_) => e,
        other => RSTSError::MatrixEvaluation(other.to_string()),
    }
}
