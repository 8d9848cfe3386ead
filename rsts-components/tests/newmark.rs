//! Newmark integration of a linear oscillator.
//!
//! The results are compared against an explicit Runge-Kutta reference solution and
//! against the energy conservation of the average acceleration scheme.

use approx::assert_relative_eq;
use ode_solvers::{Rk4, SVector, System};
use rsts_components::linear::LuSolver;
use rsts_components::newton::NewtonSolver;
use rsts_components::problems::{Oscillator, OscillatorParameters};
use rsts_core::executor::ImplicitStepExecutor;
use rsts_core::solvers::{run, NewmarkSolver, SolvedStep};
use rsts_core::stepper::{FixedStepper, TimeInterval};
use std::f64::consts::PI;

type OdeState = SVector<f64, 2>;

/// First order form of the oscillator, `y = [u, v]`
struct OscillatorOde {
    mass: f64,
    damping: f64,
    stiffness: f64,
}

impl System<f64, OdeState> for OscillatorOde {
    fn system(&self, _t: f64, y: &OdeState, dy: &mut OdeState) {
        dy[0] = y[1];
        dy[1] = -(self.damping * y[1] + self.stiffness * y[0]) / self.mass;
    }
}

fn parameters(damping: f64) -> OscillatorParameters {
    OscillatorParameters {
        mass: 1.0,
        damping,
        stiffness: 4.0 * PI * PI,
        force: 0.0,
        omega: 0.0,
        u0: 1.0,
        v0: 0.0,
    }
}

fn solve_newmark(parameters: OscillatorParameters, n_step: usize) -> Vec<SolvedStep> {
    let mut problem = Oscillator::from_parameters(parameters);
    let executor =
        ImplicitStepExecutor::new(Box::new(NewtonSolver::default()), Box::new(LuSolver::new()));
    let ts = FixedStepper::new(TimeInterval::new(0.0, 1.0).unwrap(), n_step).unwrap();
    let mut solver = NewmarkSolver::new(ts, executor)
        .with_betas(0.5, 0.5)
        .unwrap();

    run(&mut solver, &mut problem, None, &mut ())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

fn value(step: &SolvedStep, name: &str) -> f64 {
    step.state.get(name).unwrap()[0]
}

mod newmark_oscillator {
    use super::*;

    #[test]
    fn test_initial_step() {
        let steps = solve_newmark(parameters(0.1), 11);
        assert_eq!(steps.len(), 11);

        let first = &steps[0];
        assert!(first.is_initial);
        assert_eq!(first.step, 0);
        assert_eq!(first.status.n_iter, 0);
        assert_eq!(value(first, "u"), 1.0);
        assert_eq!(value(first, "v"), 0.0);
        // M a0 = -(K u0 + C v0)
        assert_relative_eq!(value(first, "a"), -4.0 * PI * PI, epsilon = 1e-10);

        assert!(steps[1..].iter().all(|s| !s.is_initial && s.status.converged));
        assert_eq!(steps.last().unwrap().time, 1.0);
    }

    #[test]
    fn test_matches_runge_kutta_reference() {
        let params = parameters(0.1);
        let n_interval = 1024;
        let steps = solve_newmark(params.clone(), n_interval + 1);

        let h = 1.0 / n_interval as f64;
        let ode = OscillatorOde {
            mass: params.mass,
            damping: params.damping,
            stiffness: params.stiffness,
        };
        let mut stepper = Rk4::new(ode, 0.0, OdeState::new(params.u0, params.v0), 1.0, h);
        stepper.integrate().unwrap();
        let x_out = stepper.x_out();
        let y_out = stepper.y_out();

        for step in [256, 512, 768, 1024] {
            let t = step as f64 * h;
            let index = x_out
                .iter()
                .position(|x| (x - t).abs() < 1e-12)
                .expect("Reference solution should contain the comparison time");
            let reference = y_out[index];

            assert_relative_eq!(steps[step].time, t, epsilon = 1e-12);
            assert_relative_eq!(value(&steps[step], "u"), reference[0], epsilon = 1e-3);
            assert_relative_eq!(value(&steps[step], "v"), reference[1], epsilon = 1e-2);
        }
    }

    #[test]
    fn test_average_acceleration_conserves_energy() {
        let params = parameters(0.0);
        let steps = solve_newmark(params.clone(), 201);

        let energy = |s: &SolvedStep| {
            0.5 * params.mass * value(s, "v").powi(2)
                + 0.5 * params.stiffness * value(s, "u").powi(2)
        };
        let e0 = energy(&steps[0]);
        for step in &steps {
            assert_relative_eq!(energy(step), e0, max_relative = 1e-8);
        }
    }

    #[test]
    fn test_acceleration_satisfies_equation_of_motion() {
        let params = OscillatorParameters {
            force: 2.0,
            omega: 3.0,
            ..parameters(0.3)
        };
        let steps = solve_newmark(params.clone(), 51);

        for step in &steps {
            let force = params.force * (params.omega * step.time).cos();
            let lhs = params.mass * value(step, "a")
                + params.damping * value(step, "v")
                + params.stiffness * value(step, "u");
            assert_relative_eq!(lhs, force, epsilon = 1e-8);
        }
    }
}
