use super::{SolvedStep, TimeSteppingSolver};
use crate::adaptive::AdaptiveController;
use crate::errors::{RSTSError, RSTSResult};
use crate::problem::{get_initial_state, Problem};
use crate::state::SolutionState;
use crate::stepper::{StepPosition, TimeStepper, VariableStepper};
use log::info;

/// Implicit time stepping with an adaptive time step.
///
/// Every accepted step is flagged for output.
#[derive(Debug)]
pub struct AdaptiveTimeSteppingSolver {
    ts: VariableStepper,
    controller: AdaptiveController,
    state0: Option<SolutionState>,
}

impl AdaptiveTimeSteppingSolver {
    pub fn new(ts: VariableStepper, controller: AdaptiveController) -> Self {
        Self {
            ts,
            controller,
            state0: None,
        }
    }

    pub fn stepper(&self) -> &VariableStepper {
        &self.ts
    }

    pub fn controller(&self) -> &AdaptiveController {
        &self.controller
    }
}

impl TimeSteppingSolver for AdaptiveTimeSteppingSolver {
    fn init_run(
        &mut self,
        problem: &mut dyn Problem,
        state0: Option<SolutionState>,
    ) -> RSTSResult<()> {
        self.ts.set_step(StepPosition::Step(0))?;
        self.controller.init(&mut self.ts)?;
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
            "====== time {:e} (dt {:e}, wait {}, step {}) =====",
            time,
            self.ts.state().dt,
            self.controller.adt().wait,
            self.ts.format().label(step + 1, self.ts.state().n_step)
        );

        let outcome = self.controller.solve_step(&mut self.ts, state0, problem)?;
        *state0 = outcome.state.clone();

        let mut solved = SolvedStep::new(Some(self.ts.state()), outcome.state, outcome.status);
        solved.forced = outcome.forced;
        Ok(Some(solved))
    }
}
