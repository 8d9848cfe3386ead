use super::{SaveSchedule, SolvedStep, TimeSteppingSolver};
use crate::errors::{RSTSError, RSTSResult};
use crate::executor::ImplicitStepExecutor;
use crate::newmark::{get_a0, NewmarkEvaluator, NewmarkMaps, NewmarkState, NewmarkVariables};
use crate::problem::{get_initial_state, Problem, SolveStatus};
use crate::state::SolutionState;
use crate::stepper::{FixedStepper, StepPosition, TimeStepper};
use log::{debug, info};

/// Newmark time stepping for second order problems.
///
/// The initial acceleration is computed from the initial displacement and velocity and
/// the initial condition is yielded as step 0. Each later step solves for the
/// acceleration at the end of the step.
#[derive(Debug)]
pub struct NewmarkSolver {
    ts: FixedStepper,
    executor: ImplicitStepExecutor,
    beta1: f64,
    beta2: f64,
    variables: NewmarkVariables,
    save: SaveSchedule,
    run: Option<NewmarkRun>,
}

#[derive(Debug)]
struct NewmarkRun {
    state: SolutionState,
    current: NewmarkState,
    initial_pending: bool,
}

impl NewmarkSolver {
    pub fn new(ts: FixedStepper, executor: ImplicitStepExecutor) -> Self {
        let save = SaveSchedule::all(ts.n_step());
        Self {
            ts,
            executor,
            beta1: 0.5,
            beta2: 0.5,
            variables: NewmarkVariables::default(),
            save,
            run: None,
        }
    }

    pub fn with_betas(mut self, beta1: f64, beta2: f64) -> RSTSResult<Self> {
        for (name, beta) in [("beta1", beta1), ("beta2", beta2)] {
            if !(0.0..=1.0).contains(&beta) {
                return Err(RSTSError::Error(format!(
                    "Newmark parameter {}={} must be in [0, 1]",
                    name, beta
                )));
            }
        }
        self.beta1 = beta1;
        self.beta2 = beta2;
        Ok(self)
    }

    pub fn with_variables(mut self, variables: NewmarkVariables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_save_steps(mut self, save_steps: i64) -> Self {
        self.save = SaveSchedule::new(self.ts.n_step(), save_steps);
        self
    }

    pub fn stepper(&self) -> &FixedStepper {
        &self.ts
    }
}

impl TimeSteppingSolver for NewmarkSolver {
    fn init_run(
        &mut self,
        problem: &mut dyn Problem,
        state0: Option<SolutionState>,
    ) -> RSTSResult<()> {
        self.ts.set_step(StepPosition::Step(0))?;
        problem.time_update(Some(self.ts.state()))?;

        let mut state = state0.unwrap_or_else(|| get_initial_state(problem));
        let start = self.variables.unpack(&state)?;
        let a0 = get_a0(
            problem,
            &self.variables,
            &state,
            &start.u,
            &start.v,
            self.executor.linear_solver_mut(),
        )?;
        debug!("Initial acceleration norm: {:e}", a0.norm());

        let current = NewmarkState { a: a0, ..start };
        self.variables.pack(&mut state, &current)?;
        self.run = Some(NewmarkRun {
            state,
            current,
            initial_pending: true,
        });
        Ok(())
    }

    fn next_state(&mut self, problem: &mut dyn Problem) -> RSTSResult<Option<SolvedStep>> {
        let run = self
            .run
            .as_mut()
            .ok_or_else(|| RSTSError::Error("The run has not been initialised".to_string()))?;
        let Some((step, time)) = self.ts.next_step() else {
            return Ok(None);
        };

        if run.initial_pending {
            run.initial_pending = false;
            let mut solved = SolvedStep::new(
                Some(self.ts.state()),
                run.state.clone(),
                SolveStatus::not_solved(),
            );
            solved.is_initial = true;
            solved.save = self.save.contains(step);
            return Ok(Some(solved));
        }

        info!(
            "====== time {:e} (step {}) =====",
            time,
            self.ts.format().label(step + 1, self.ts.n_step())
        );
        problem.time_update(Some(self.ts.state()))?;

        let maps = NewmarkMaps::new(self.ts.state().dt, self.beta1, self.beta2, &run.current);
        let evaluator = NewmarkEvaluator::new(&*problem, &self.variables, &run.state, maps)?;
        let (a, status) = self.executor.solve_evaluator(&run.current.a, &evaluator)?;

        let next = evaluator.maps().state(&a);
        self.variables.pack(&mut run.state, &next)?;
        run.current = next;

        let mut solved = SolvedStep::new(Some(self.ts.state()), run.state.clone(), status);
        solved.save = self.save.contains(step);
        Ok(Some(solved))
    }
}
