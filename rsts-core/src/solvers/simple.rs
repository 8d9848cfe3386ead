use super::{SaveSchedule, SolvedStep, TimeSteppingSolver};
use crate::errors::{RSTSError, RSTSResult};
use crate::executor::ImplicitStepExecutor;
use crate::problem::{get_initial_state, Problem};
use crate::state::SolutionState;
use crate::stepper::{FixedStepper, StepPosition, TimeStepper};
use log::info;

/// Implicit time stepping with a fixed time step
#[derive(Debug)]
pub struct SimpleTimeSteppingSolver {
    ts: FixedStepper,
    executor: ImplicitStepExecutor,
    save: SaveSchedule,
    state0: Option<SolutionState>,
}

impl SimpleTimeSteppingSolver {
    pub fn new(ts: FixedStepper, executor: ImplicitStepExecutor) -> Self {
        let save = SaveSchedule::all(ts.n_step());
        Self {
            ts,
            executor,
            save,
            state0: None,
        }
    }

    /// Select the steps flagged for output, see [`SaveSchedule::new`]
    pub fn with_save_steps(mut self, save_steps: i64) -> Self {
        self.save = SaveSchedule::new(self.ts.n_step(), save_steps);
        self
    }

    pub fn stepper(&self) -> &FixedStepper {
        &self.ts
    }
}

impl TimeSteppingSolver for SimpleTimeSteppingSolver {
    fn init_run(
        &mut self,
        problem: &mut dyn Problem,
        state0: Option<SolutionState>,
    ) -> RSTSResult<()> {
        self.ts.set_step(StepPosition::Step(0))?;
        problem.time_update(Some(self.ts.state()))?;
        self.state0 = Some(state0.unwrap_or_else(|| get_initial_state(problem)));
        Ok(())
    }

    fn next_state(&mut self, problem: &mut dyn Problem) -> RSTSResult<Option<SolvedStep>> {
        let state0 = self
            .state0
            .as_mut()
            .ok_or_else(|| RSTSError::Error("The run has not been initialised".to_string()))?;
        let Some((step, time)) = self.ts.next_step() else {
            return Ok(None);
        };

        info!(
            "====== time {:e} (step {}) =====",
            time,
            self.ts.format().label(step + 1, self.ts.n_step())
        );

        let (state, status) = self.executor.solve_step(self.ts.state(), state0, problem)?;
        *state0 = state.clone();

        let mut solved = SolvedStep::new(Some(self.ts.state()), state, status);
        solved.save = self.save.contains(step);
        Ok(Some(solved))
    }
}
