use super::check_len;
use nalgebra::{DMatrix, DVector};
use rsts_core::errors::{RSTSError, RSTSResult};
use rsts_core::problem::{Evaluator, Problem};
use rsts_core::state::SolutionState;
use rsts_core::stepper::StepperState;
use serde::{Deserialize, Serialize};

const VAR_U: &str = "u";
const VAR_V: &str = "v";
const VAR_A: &str = "a";

/// Parameters for a single degree of freedom oscillator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OscillatorParameters {
    /// unit: kg
    pub mass: f64,
    /// unit: kg / s
    pub damping: f64,
    /// unit: N / m
    pub stiffness: f64,
    /// Amplitude of the external force
    /// unit: N
    pub force: f64,
    /// Angular frequency of the external force
    /// unit: rad / s
    pub omega: f64,
    /// Initial displacement
    /// unit: m
    pub u0: f64,
    /// Initial velocity
    /// unit: m / s
    pub v0: f64,
}

/// Damped, driven linear oscillator
///
/// $$ M \ddot{u} + C \dot{u} + K u = f \cos(\omega t) $$
///
/// The state holds displacement `u`, velocity `v` and acceleration `a` as separate
/// variables. The residual has one block per variable, `K u - f(t)`, `C v` and `M a`,
/// whose sum is the equation of motion. The tangent is block diagonal.
#[derive(Debug, Clone)]
pub struct Oscillator {
    mass: DMatrix<f64>,
    damping: DMatrix<f64>,
    stiffness: DMatrix<f64>,
    force: DVector<f64>,
    omega: f64,
    u0: DVector<f64>,
    v0: DVector<f64>,
    time: f64,
}

impl Oscillator {
    pub fn new(
        mass: DMatrix<f64>,
        damping: DMatrix<f64>,
        stiffness: DMatrix<f64>,
    ) -> RSTSResult<Self> {
        let n = mass.nrows();
        for (name, mtx) in [("mass", &mass), ("damping", &damping), ("stiffness", &stiffness)] {
            if mtx.shape() != (n, n) {
                return Err(RSTSError::DimensionMismatch {
                    name: name.to_string(),
                    expected: n,
                    got: mtx.nrows().max(mtx.ncols()),
                });
            }
        }
        Ok(Self {
            mass,
            damping,
            stiffness,
            force: DVector::zeros(n),
            omega: 0.0,
            u0: DVector::zeros(n),
            v0: DVector::zeros(n),
            time: 0.0,
        })
    }

    pub fn from_parameters(parameters: OscillatorParameters) -> Self {
        Self {
            mass: DMatrix::from_element(1, 1, parameters.mass),
            damping: DMatrix::from_element(1, 1, parameters.damping),
            stiffness: DMatrix::from_element(1, 1, parameters.stiffness),
            force: DVector::from_element(1, parameters.force),
            omega: parameters.omega,
            u0: DVector::from_element(1, parameters.u0),
            v0: DVector::from_element(1, parameters.v0),
            time: 0.0,
        }
    }

    pub fn with_force(mut self, force: DVector<f64>, omega: f64) -> RSTSResult<Self> {
        check_len("force", &force, self.n_dof())?;
        self.force = force;
        self.omega = omega;
        Ok(self)
    }

    pub fn with_initial_condition(mut self, u0: DVector<f64>, v0: DVector<f64>) -> RSTSResult<Self> {
        check_len(VAR_U, &u0, self.n_dof())?;
        check_len(VAR_V, &v0, self.n_dof())?;
        self.u0 = u0;
        self.v0 = v0;
        Ok(self)
    }

    pub fn n_dof(&self) -> usize {
        self.mass.nrows()
    }

    /// External force at time `t`
    pub fn force_at(&self, t: f64) -> DVector<f64> {
        &self.force * (self.omega * t).cos()
    }

    fn initial_state(&self) -> RSTSResult<SolutionState> {
        let n = self.n_dof();
        SolutionState::new()
            .with_variable(VAR_U, n)
            .with_variable(VAR_V, n)
            .with_variable(VAR_A, n)
            .with_initial_condition(VAR_U, self.u0.clone())?
            .with_initial_condition(VAR_V, self.v0.clone())
    }
}

impl Evaluator for Oscillator {
    fn residual(&self, x: &DVector<f64>) -> RSTSResult<DVector<f64>> {
        let n = self.n_dof();
        check_len("state", x, 3 * n)?;

        let mut r = DVector::zeros(3 * n);
        r.rows_mut(0, n)
            .copy_from(&(&self.stiffness * x.rows(0, n) - self.force_at(self.time)));
        r.rows_mut(n, n).copy_from(&(&self.damping * x.rows(n, n)));
        r.rows_mut(2 * n, n).copy_from(&(&self.mass * x.rows(2 * n, n)));
        Ok(r)
    }

    fn tangent_matrix(&self, x: &DVector<f64>) -> RSTSResult<DMatrix<f64>> {
        let n = self.n_dof();
        check_len("state", x, 3 * n)?;

        let mut mtx = DMatrix::zeros(3 * n, 3 * n);
        for (i, block) in [&self.stiffness, &self.damping, &self.mass].into_iter().enumerate() {
            mtx.view_mut((i * n, i * n), (n, n)).copy_from(block);
        }
        Ok(mtx)
    }
}

impl Problem for Oscillator {
    fn create_state(&self) -> SolutionState {
        // Initial conditions are length checked on construction
        self.initial_state().unwrap_or_default()
    }

    fn time_update(&mut self, ts: Option<&StepperState>) -> RSTSResult<()> {
        self.time = ts.map_or(0.0, |ts| ts.time);
        Ok(())
    }

    fn is_linear(&self) -> bool {
        true
    }
}
