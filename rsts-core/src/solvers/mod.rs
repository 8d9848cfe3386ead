//! Time stepping solvers.
//!
//! A solver owns its stepper and its nonlinear/linear solver stack and produces the
//! accepted steps of a run one at a time. Runs are consumed through [`Run`], a lazy
//! iterator that also drives the [`SolverHooks`] and [`Problem::advance`].
//!
//! The available solvers are enumerated by [`Strategy`].
mod adaptive;
mod newmark;
mod sequence;
mod simple;
mod stationary;

pub use adaptive::AdaptiveTimeSteppingSolver;
pub use newmark::NewmarkSolver;
pub use sequence::EquationSequenceSolver;
pub use simple::SimpleTimeSteppingSolver;
pub use stationary::StationarySolver;

use crate::errors::RSTSResult;
use crate::problem::{Problem, SolveStatus, SolverHooks};
use crate::state::SolutionState;
use crate::stepper::StepperState;
use log::debug;

/// An accepted step of a run
#[derive(Debug, Clone)]
pub struct SolvedStep {
    pub step: usize,
    pub time: f64,
    /// Stepper state at the step. `None` for stationary solves
    pub ts: Option<StepperState>,
    pub state: SolutionState,
    pub status: SolveStatus,
    /// True for the synthetic initial condition step of the Newmark solver
    pub is_initial: bool,
    /// True if the step is selected for output by the save schedule
    pub save: bool,
    /// True if the step was accepted without the nonlinear solver converging
    pub forced: bool,
}

impl SolvedStep {
    pub(crate) fn new(ts: Option<&StepperState>, state: SolutionState, status: SolveStatus) -> Self {
        Self {
            step: ts.map_or(0, |ts| ts.step),
            time: ts.map_or(0.0, |ts| ts.time),
            ts: ts.cloned(),
            state,
            status,
            is_initial: false,
            save: true,
            forced: false,
        }
    }
}

/// Common interface of the time stepping solvers
pub trait TimeSteppingSolver {
    /// Prepare a new run starting from `state0`.
    ///
    /// If `state0` is `None` the initial state is created from the problem.
    fn init_run(
        &mut self,
        problem: &mut dyn Problem,
        state0: Option<SolutionState>,
    ) -> RSTSResult<()>;

    /// Compute the next accepted step, or `None` once the run is complete
    fn next_state(&mut self, problem: &mut dyn Problem) -> RSTSResult<Option<SolvedStep>>;
}

/// Start a run of `solver` on `problem`
pub fn run<'a>(
    solver: &'a mut dyn TimeSteppingSolver,
    problem: &'a mut dyn Problem,
    state0: Option<SolutionState>,
    hooks: &'a mut dyn SolverHooks,
) -> RSTSResult<Run<'a>> {
    solver.init_run(problem, state0)?;
    Ok(Run {
        solver,
        problem,
        hooks,
        last: None,
        done: false,
    })
}

/// Lazy sequence of the accepted steps of a run.
///
/// Each step is computed when requested. Before computing a step, the problem is advanced
/// past the previously yielded one. After the last step the post-processing hook is
/// called. The sequence stops after the first error.
pub struct Run<'a> {
    solver: &'a mut dyn TimeSteppingSolver,
    problem: &'a mut dyn Problem,
    hooks: &'a mut dyn SolverHooks,
    last: Option<SolvedStep>,
    done: bool,
}

impl Run<'_> {
    fn step(&mut self) -> RSTSResult<Option<SolvedStep>> {
        if let Some(last) = &self.last {
            self.problem.advance(last.ts.as_ref(), &last.state)?;
        }

        match self.solver.next_state(self.problem)? {
            Some(solved) => {
                self.hooks
                    .step(solved.ts.as_ref(), &solved.state, solved.is_initial)?;
                self.last = Some(solved.clone());
                Ok(Some(solved))
            }
            None => {
                self.done = true;
                if let Some(last) = &self.last {
                    debug!("Run finished after step {}", last.step);
                    self.hooks.post_process(&last.state)?;
                }
                Ok(None)
            }
        }
    }

    /// Consume the run, returning the final state
    pub fn last_state(self) -> RSTSResult<Option<SolutionState>> {
        let mut last = None;
        for solved in self {
            last = Some(solved?.state);
        }
        Ok(last)
    }
}

impl Iterator for Run<'_> {
    type Item = RSTSResult<SolvedStep>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(solved) => solved.map(Ok),
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Steps of a run selected for output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSchedule {
    steps: Vec<usize>,
}

impl SaveSchedule {
    /// Select `save_steps` steps evenly spread over `n_step` steps.
    ///
    /// A negative `save_steps` selects all steps.
    pub fn new(n_step: usize, save_steps: i64) -> Self {
        if save_steps < 0 || n_step == 0 {
            return Self::all(n_step);
        }
        let n = save_steps as usize;
        let last = (n_step - 1) as f64;
        let mut steps: Vec<usize> = (0..n)
            .map(|ii| {
                if n > 1 {
                    (ii as f64 * last / (n - 1) as f64) as usize
                } else {
                    0
                }
            })
            .collect();
        steps.dedup();
        Self { steps }
    }

    pub fn all(n_step: usize) -> Self {
        Self {
            steps: (0..n_step).collect(),
        }
    }

    pub fn contains(&self, step: usize) -> bool {
        self.steps.binary_search(&step).is_ok()
    }

    pub fn steps(&self) -> &[usize] {
        &self.steps
    }
}

/// The available time stepping solvers
#[derive(Debug)]
pub enum Strategy {
    Stationary(StationarySolver),
    Simple(SimpleTimeSteppingSolver),
    Adaptive(AdaptiveTimeSteppingSolver),
    Newmark(NewmarkSolver),
    EquationSequence(EquationSequenceSolver),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Stationary(_) => "stationary",
            Strategy::Simple(_) => "simple",
            Strategy::Adaptive(_) => "adaptive",
            Strategy::Newmark(_) => "newmark",
            Strategy::EquationSequence(_) => "equation_sequence",
        }
    }

    pub fn solver_mut(&mut self) -> &mut dyn TimeSteppingSolver {
        match self {
            Strategy::Stationary(solver) => solver,
            Strategy::Simple(solver) => solver,
            Strategy::Adaptive(solver) => solver,
            Strategy::Newmark(solver) => solver,
            Strategy::EquationSequence(solver) => solver,
        }
    }

    /// Start a run of the selected solver
    pub fn run<'a>(
        &'a mut self,
        problem: &'a mut dyn Problem,
        state0: Option<SolutionState>,
        hooks: &'a mut dyn SolverHooks,
    ) -> RSTSResult<Run<'a>> {
        run(self.solver_mut(), problem, state0, hooks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_all_steps() {
        let schedule = SaveSchedule::new(11, -1);
        assert_eq!(schedule.steps(), (0..11).collect::<Vec<_>>().as_slice());
        assert!(schedule.contains(10));
        assert!(!schedule.contains(11));
    }

    #[test]
    fn save_some_steps() {
        assert_eq!(SaveSchedule::new(11, 3).steps(), &[0, 5, 10]);
        assert_eq!(SaveSchedule::new(11, 4).steps(), &[0, 3, 6, 10]);
        assert_eq!(SaveSchedule::new(11, 1).steps(), &[0]);
        assert!(SaveSchedule::new(11, 0).steps().is_empty());
        // More requested steps than available
        assert_eq!(SaveSchedule::new(3, 10).steps(), &[0, 1, 2]);
    }
}
