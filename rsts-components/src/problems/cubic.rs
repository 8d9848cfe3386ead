use super::check_len;
use nalgebra::{DMatrix, DVector};
use rsts_core::errors::RSTSResult;
use rsts_core::problem::{Evaluator, Problem};
use rsts_core::state::SolutionState;
use rsts_core::stepper::StepperState;
use serde::{Deserialize, Serialize};

const VAR_X: &str = "x";

/// Parameters for the cubic decay problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CubicDecayParameters {
    /// Decay rate
    /// unit: 1 / (s x^2)
    pub k: f64,
    /// Initial value
    pub x0: f64,
}

/// Nonlinear decay discretised with the implicit Euler method
///
/// $$ \frac{dx}{dt} = -k x^3 $$
///
/// Each step solves
/// $$ x - x_{prev} + \Delta t k x^3 = 0 $$
/// where $x_{prev}$ is the value at the last accepted step.
/// The exact solution is $x(t) = x_0 / \sqrt{1 + 2 k x_0^2 t}$.
///
/// Large time steps make the Newton iteration slow to converge, which makes the
/// problem suitable for exercising time step adaptivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CubicDecay {
    parameters: CubicDecayParameters,
    x_prev: f64,
    dt: f64,
}

impl CubicDecay {
    pub fn from_parameters(parameters: CubicDecayParameters) -> Self {
        Self {
            x_prev: parameters.x0,
            dt: 0.0,
            parameters,
        }
    }

    pub fn exact(&self, t: f64) -> f64 {
        let CubicDecayParameters { k, x0 } = self.parameters;
        x0 / (1.0 + 2.0 * k * x0.powi(2) * t).sqrt()
    }

    /// Value at the last accepted step
    pub fn previous(&self) -> f64 {
        self.x_prev
    }
}

impl Evaluator for CubicDecay {
    fn residual(&self, x: &DVector<f64>) -> RSTSResult<DVector<f64>> {
        check_len(VAR_X, x, 1)?;
        let k = self.parameters.k;
        Ok(x.map(|x| x - self.x_prev + self.dt * k * x.powi(3)))
    }

    fn tangent_matrix(&self, x: &DVector<f64>) -> RSTSResult<DMatrix<f64>> {
        check_len(VAR_X, x, 1)?;
        let k = self.parameters.k;
        Ok(DMatrix::from_element(
            1,
            1,
            1.0 + 3.0 * self.dt * k * x[0].powi(2),
        ))
    }
}

impl Problem for CubicDecay {
    fn create_state(&self) -> SolutionState {
        let state = SolutionState::new().with_variable(VAR_X, 1);
        state
            .clone()
            .with_initial_condition(VAR_X, DVector::from_element(1, self.parameters.x0))
            .unwrap_or(state)
    }

    fn time_update(&mut self, ts: Option<&StepperState>) -> RSTSResult<()> {
        self.dt = ts.map_or(0.0, |ts| ts.dt);
        Ok(())
    }

    fn advance(&mut self, _ts: Option<&StepperState>, state: &SolutionState) -> RSTSResult<()> {
        if let Some(x) = state.get(VAR_X) {
            self.x_prev = x[0];
        }
        Ok(())
    }
}
