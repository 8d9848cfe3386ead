use super::{SolvedStep, TimeSteppingSolver};
use crate::dependency::Block;
use crate::errors::RSTSResult;
use crate::executor::ImplicitStepExecutor;
use crate::problem::{Problem, SolveStatus};
use crate::state::SolutionState;
use log::{debug, info};
use nalgebra::DVector;
use std::collections::HashMap;

/// Staggered solver for stationary problems.
///
/// The variables are split into blocks using the dependencies of the equations. The
/// blocks are solved one after another, each seeing the values of the blocks solved
/// before it.
#[derive(Debug)]
pub struct EquationSequenceSolver {
    executor: ImplicitStepExecutor,
    state0: Option<SolutionState>,
}

impl EquationSequenceSolver {
    pub fn new(executor: ImplicitStepExecutor) -> Self {
        Self {
            executor,
            state0: None,
        }
    }

    /// Block order of the state variables of `problem`
    pub fn resolve_blocks(problem: &dyn Problem) -> RSTSResult<Vec<Block>> {
        problem
            .variable_dependencies()
            .replace_virtuals(&problem.dual_names())
            .resolve()
    }

    fn solve_block(
        &mut self,
        problem: &dyn Problem,
        block: &[String],
        parts0: &HashMap<String, DVector<f64>>,
        state: &mut SolutionState,
        solved: &[String],
    ) -> RSTSResult<SolveStatus> {
        info!("Solving for {:?}", block);

        let context = state.subset(solved)?;
        let mut subproblem = problem.create_subproblem(block, &context)?;
        subproblem.time_update(None)?;

        let mut substate0 = subproblem.create_state();
        let values: HashMap<String, DVector<f64>> = parts0
            .iter()
            .filter(|(name, _)| block.contains(*name))
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect();
        substate0.set_parts(&values)?;
        substate0.apply_ebc();

        let (substate, status) = self.executor.solve(&substate0, subproblem.as_ref())?;
        state.set_parts(&substate.get_parts())?;

        debug!("Block {:?} solved in {} iterations", block, status.n_iter);
        Ok(status)
    }
}

impl TimeSteppingSolver for EquationSequenceSolver {
    fn init_run(
        &mut self,
        problem: &mut dyn Problem,
        state0: Option<SolutionState>,
    ) -> RSTSResult<()> {
        self.state0 = Some(state0.unwrap_or_else(|| problem.create_state()));
        Ok(())
    }

    fn next_state(&mut self, problem: &mut dyn Problem) -> RSTSResult<Option<SolvedStep>> {
        let Some(state0) = self.state0.take() else {
            return Ok(None);
        };

        let blocks = Self::resolve_blocks(problem)?;
        let parts0 = state0.get_parts();
        let mut state = state0;
        let mut solved: Vec<String> = vec![];
        let mut status = SolveStatus::not_solved();

        for block in &blocks {
            let block_status = self.solve_block(problem, block, &parts0, &mut state, &solved)?;
            status.converged &= block_status.converged;
            status.n_iter += block_status.n_iter;
            status.err = status.err.max(block_status.err);
            solved.extend(block.iter().cloned());
        }

        Ok(Some(SolvedStep::new(None, state, status)))
    }
}
