//! Solver configuration.
//!
//! A [`SolverConfig`] selects one of the time stepping solvers and holds its parameters.
//! It is usually read from TOML:
//!
//! ```toml
//! kind = "adaptive"
//! t0 = 0.0
//! t1 = 1.0
//! n_step = 11
//! dt_red_factor = 0.5
//! floor_policy = "fail"
//! ```
use crate::adaptive::{AdaptiveController, AdaptivityParameters, FloorPolicy};
use crate::errors::{RSTSError, RSTSResult};
use crate::executor::ImplicitStepExecutor;
use crate::newmark::NewmarkVariables;
use crate::problem::{LinearSolver, NonlinearSolver};
use crate::solvers::{
    AdaptiveTimeSteppingSolver, EquationSequenceSolver, NewmarkSolver, SimpleTimeSteppingSolver,
    StationarySolver, Strategy,
};
use crate::stepper::{FixedStepper, VariableStepper};
use serde::{Deserialize, Serialize};

/// Number of steps used when neither `dt` nor `n_step` is given
const DEFAULT_N_STEP: usize = 10;

/// Time axis parameters shared by the time dependent solvers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub t0: f64,
    pub t1: f64,
    /// Time step. Used if `n_step` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dt: Option<f64>,
    /// Number of time steps. Has precedence over `dt`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_step: Option<usize>,
    /// If true, the nonlinear solver is also invoked for the initial time
    pub quasistatic: bool,
    /// Number of steps flagged for output. A negative value flags all steps
    pub save_steps: i64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            t0: 0.0,
            t1: 1.0,
            dt: None,
            n_step: None,
            quasistatic: false,
            save_steps: -1,
        }
    }
}

impl TimeConfig {
    fn n_step(&self) -> Option<usize> {
        match (self.n_step, self.dt) {
            (Some(n_step), _) => Some(n_step),
            (None, Some(_)) => None,
            (None, None) => Some(DEFAULT_N_STEP),
        }
    }

    pub fn fixed_stepper(&self) -> RSTSResult<FixedStepper> {
        FixedStepper::from_data(self.t0, self.t1, self.dt, self.n_step(), self.quasistatic)
    }

    pub fn variable_stepper(&self) -> RSTSResult<VariableStepper> {
        VariableStepper::from_data(self.t0, self.t1, self.dt, self.n_step(), self.quasistatic)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    #[serde(flatten)]
    pub time: TimeConfig,
    pub dt_red_factor: f64,
    pub dt_red_max: f64,
    pub dt_inc_factor: f64,
    pub dt_inc_on_iter: usize,
    pub dt_inc_wait: usize,
    pub floor_policy: FloorPolicy,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        let adt = AdaptivityParameters::default();
        Self {
            time: TimeConfig::default(),
            dt_red_factor: adt.red_factor,
            dt_red_max: adt.red_max,
            dt_inc_factor: adt.inc_factor,
            dt_inc_on_iter: adt.inc_on_iter,
            dt_inc_wait: adt.inc_wait,
            floor_policy: FloorPolicy::default(),
        }
    }
}

impl AdaptiveConfig {
    pub fn adaptivity(&self) -> AdaptivityParameters {
        AdaptivityParameters::default()
            .with_red_factor(self.dt_red_factor)
            .with_red_max(self.dt_red_max)
            .with_inc_factor(self.dt_inc_factor)
            .with_inc_on_iter(self.dt_inc_on_iter)
            .with_inc_wait(self.dt_inc_wait)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewmarkConfig {
    #[serde(flatten)]
    pub time: TimeConfig,
    pub beta1: f64,
    pub beta2: f64,
    /// Displacement variable name
    pub u: String,
    /// Velocity variable name
    pub v: String,
    /// Acceleration variable name
    pub a: String,
}

impl Default for NewmarkConfig {
    fn default() -> Self {
        Self {
            time: TimeConfig::default(),
            beta1: 0.5,
            beta2: 0.5,
            u: "u".to_string(),
            v: "v".to_string(),
            a: "a".to_string(),
        }
    }
}

/// Selection and parameters of a time stepping solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolverConfig {
    Stationary,
    Simple(TimeConfig),
    Adaptive(AdaptiveConfig),
    Newmark(NewmarkConfig),
    EquationSequence,
}

impl SolverConfig {
    pub fn from_toml_str(s: &str) -> RSTSResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> RSTSResult<String> {
        toml::to_string(self).map_err(|e| RSTSError::Error(e.to_string()))
    }
}

impl Strategy {
    /// Build the solver selected by `config` around the given solver stack
    pub fn from_config(
        config: &SolverConfig,
        nls: Box<dyn NonlinearSolver>,
        ls: Box<dyn LinearSolver>,
    ) -> RSTSResult<Self> {
        let executor = ImplicitStepExecutor::new(nls, ls);

        let strategy = match config {
            SolverConfig::Stationary => Strategy::Stationary(StationarySolver::new(executor)),
            SolverConfig::Simple(time) => Strategy::Simple(
                SimpleTimeSteppingSolver::new(time.fixed_stepper()?, executor)
                    .with_save_steps(time.save_steps),
            ),
            SolverConfig::Adaptive(adaptive) => {
                let controller = AdaptiveController::new(executor, adaptive.adaptivity())?
                    .with_floor_policy(adaptive.floor_policy);
                Strategy::Adaptive(AdaptiveTimeSteppingSolver::new(
                    adaptive.time.variable_stepper()?,
                    controller,
                ))
            }
            SolverConfig::Newmark(newmark) => Strategy::Newmark(
                NewmarkSolver::new(newmark.time.fixed_stepper()?, executor)
                    .with_betas(newmark.beta1, newmark.beta2)?
                    .with_variables(NewmarkVariables::new(&newmark.u, &newmark.v, &newmark.a))
                    .with_save_steps(newmark.time.save_steps),
            ),
            SolverConfig::EquationSequence => {
                Strategy::EquationSequence(EquationSequenceSolver::new(executor))
            }
        };
        Ok(strategy)
    }
}
