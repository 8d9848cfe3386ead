use super::{SolvedStep, TimeSteppingSolver};
use crate::errors::RSTSResult;
use crate::executor::ImplicitStepExecutor;
use crate::problem::{get_initial_state, Problem};
use crate::state::SolutionState;
use log::{info, warn};

/// Solves a problem once, without time stepping.
///
/// Provides the time stepping interface for stationary problems: a run consists of the
/// single step `(0, 0.0)`.
#[derive(Debug)]
pub struct StationarySolver {
    executor: ImplicitStepExecutor,
    state0: Option<SolutionState>,
}

impl StationarySolver {
    pub fn new(executor: ImplicitStepExecutor) -> Self {
        Self {
            executor,
            state0: None,
        }
    }
}

impl TimeSteppingSolver for StationarySolver {
    fn init_run(
        &mut self,
        problem: &mut dyn Problem,
        state0: Option<SolutionState>,
    ) -> RSTSResult<()> {
        problem.time_update(None)?;
        self.state0 = Some(state0.unwrap_or_else(|| get_initial_state(problem)));
        Ok(())
    }

    fn next_state(&mut self, problem: &mut dyn Problem) -> RSTSResult<Option<SolvedStep>> {
        let Some(mut state0) = self.state0.take() else {
            return Ok(None);
        };

        info!("====== stationary solve =====");
        state0.apply_ebc();
        let (state, status) = self.executor.solve(&state0, problem)?;
        if !status.converged {
            warn!("Nonlinear solver did not converge (err {:e})", status.err);
        }

        Ok(Some(SolvedStep::new(None, state, status)))
    }
}
