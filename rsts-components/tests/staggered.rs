//! Block-wise (staggered) solution of a coupled chain compared with a monolithic solve.

use approx::assert_relative_eq;
use rsts_components::linear::LuSolver;
use rsts_components::newton::{NewtonConfig, NewtonSolver};
use rsts_components::problems::{CoupledChain, CoupledChainParameters};
use rsts_core::errors::RSTSResult;
use rsts_core::executor::ImplicitStepExecutor;
use rsts_core::problem::SolverHooks;
use rsts_core::solvers::{run, EquationSequenceSolver, StationarySolver};
use rsts_core::state::SolutionState;
use rsts_core::stepper::StepperState;

fn executor() -> ImplicitStepExecutor {
    let newton = NewtonSolver::new(NewtonConfig {
        i_max: 100,
        ..Default::default()
    });
    ImplicitStepExecutor::new(Box::new(newton), Box::new(LuSolver::new()))
}

fn chain(alpha: f64) -> CoupledChain {
    CoupledChain::from_parameters(CoupledChainParameters {
        n_dof: 3,
        alpha,
        kappa: 0.75,
        sources: vec![1.0, -0.5, 2.0, 0.25],
    })
}

fn solve_staggered(problem: &mut CoupledChain) -> SolutionState {
    let mut solver = EquationSequenceSolver::new(executor());
    run(&mut solver, problem, None, &mut ())
        .unwrap()
        .last_state()
        .unwrap()
        .unwrap()
}

fn solve_monolithic(problem: &mut CoupledChain) -> SolutionState {
    let mut solver = StationarySolver::new(executor());
    run(&mut solver, problem, None, &mut ())
        .unwrap()
        .last_state()
        .unwrap()
        .unwrap()
}

#[derive(Default)]
struct Counter {
    steps: usize,
    post_processed: usize,
}

impl SolverHooks for Counter {
    fn step(
        &mut self,
        ts: Option<&StepperState>,
        _state: &SolutionState,
        is_initial: bool,
    ) -> RSTSResult<()> {
        assert!(ts.is_none());
        assert!(!is_initial);
        self.steps += 1;
        Ok(())
    }

    fn post_process(&mut self, _state: &SolutionState) -> RSTSResult<()> {
        self.post_processed += 1;
        Ok(())
    }
}

mod equation_sequence {
    use super::*;

    #[test]
    fn test_blocks() {
        let problem = chain(0.2);
        let blocks = EquationSequenceSolver::resolve_blocks(&problem).unwrap();
        assert_eq!(blocks, vec![vec!["x0"], vec!["x1"], vec!["x2"], vec!["x3"]]);
    }

    #[test]
    fn test_linear_chain_closed_form() {
        let mut problem = chain(0.0);
        let state = solve_staggered(&mut problem);

        let sources = [1.0, -0.5, 2.0, 0.25];
        let mut prev = [0.0; 3];
        for (i, source) in sources.iter().enumerate() {
            let x = state.get(&CoupledChain::variable_name(i)).unwrap();
            for j in 0..3 {
                let expected = source * (j + 1) as f64 + 0.75 * prev[j];
                assert_relative_eq!(x[j], expected, epsilon = 1e-10);
                prev[j] = expected;
            }
        }
    }

    #[test]
    fn test_matches_monolithic_solve() {
        let staggered = solve_staggered(&mut chain(0.2));
        let monolithic = solve_monolithic(&mut chain(0.2));

        assert_eq!(staggered.names(), monolithic.names());
        assert_relative_eq!(
            staggered.to_vector(),
            monolithic.to_vector(),
            epsilon = 1e-8
        );
    }

    #[test]
    fn test_single_step_with_hooks() {
        let mut problem = chain(0.2);
        let mut solver = EquationSequenceSolver::new(executor());
        let mut hooks = Counter::default();

        let steps = run(&mut solver, &mut problem, None, &mut hooks)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].step, 0);
        assert_eq!(steps[0].time, 0.0);
        assert!(steps[0].status.converged);
        // One Newton solve per block, each needing at least one iteration
        assert!(steps[0].status.n_iter >= 4);
        assert_eq!(hooks.steps, 1);
        assert_eq!(hooks.post_processed, 1);
    }

    #[test]
    fn test_initial_guess_is_used() {
        let mut problem = chain(0.2);
        let reference = solve_staggered(&mut problem);

        let mut solver = EquationSequenceSolver::new(executor());
        let steps = run(&mut solver, &mut problem, Some(reference.clone()), &mut ())
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(steps[0].status.n_iter, 0);
        assert_eq!(steps[0].state, reference);
    }
}
