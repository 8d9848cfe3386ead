//! Adaptive time step control.
//!
//! The [`AdaptiveController`] repeats an implicit step with a shrinking time step until
//! the nonlinear solver converges, and grows the time step again after a run of steps
//! that converged quickly.
//!
//! The step size is always `dt0 * red`, where `dt0` is the default time step of the
//! [`VariableStepper`] and `red` is the reduction multiplier in `[red_max, 1]`.
use crate::errors::{RSTSError, RSTSResult};
use crate::executor::ImplicitStepExecutor;
use crate::problem::{Problem, SolveStatus};
use crate::state::SolutionState;
use crate::stepper::{TimeStepper, VariableStepper};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Parameters and running state of the time step adaptivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptivityParameters {
    /// Factor applied to `red` after a failed attempt
    pub red_factor: f64,
    /// Smallest permitted value of `red`
    pub red_max: f64,
    /// Factor applied to `red` after `inc_wait` quickly converging steps
    pub inc_factor: f64,
    /// A step converging in at most this many iterations counts as quick
    pub inc_on_iter: usize,
    pub inc_wait: usize,
    /// Current reduction of the default time step
    pub red: f64,
    /// Number of consecutive quickly converging steps
    pub wait: usize,
    /// Default time step
    pub dt0: f64,
}

impl Default for AdaptivityParameters {
    fn default() -> Self {
        Self {
            red_factor: 0.2,
            red_max: 1e-3,
            inc_factor: 1.25,
            inc_on_iter: 4,
            inc_wait: 5,
            red: 1.0,
            wait: 0,
            dt0: 0.0,
        }
    }
}

impl AdaptivityParameters {
    pub fn with_red_factor(mut self, red_factor: f64) -> Self {
        self.red_factor = red_factor;
        self
    }

    pub fn with_red_max(mut self, red_max: f64) -> Self {
        self.red_max = red_max;
        self
    }

    pub fn with_inc_factor(mut self, inc_factor: f64) -> Self {
        self.inc_factor = inc_factor;
        self
    }

    pub fn with_inc_on_iter(mut self, inc_on_iter: usize) -> Self {
        self.inc_on_iter = inc_on_iter;
        self
    }

    pub fn with_inc_wait(mut self, inc_wait: usize) -> Self {
        self.inc_wait = inc_wait;
        self
    }

    /// Check that the parameters describe a usable adaptivity scheme
    pub fn validate(&self) -> RSTSResult<()> {
        let invalid = |name: &str, value: f64, reason: &str| {
            Err(RSTSError::InvalidAdaptivity {
                name: name.to_string(),
                value,
                reason: reason.to_string(),
            })
        };

        if !(self.red_factor > 0.0 && self.red_factor < 1.0) {
            return invalid("red_factor", self.red_factor, "must be in (0, 1)");
        }
        if !(self.red_max > 0.0 && self.red_max <= 1.0) {
            return invalid("red_max", self.red_max, "must be in (0, 1]");
        }
        if !(self.inc_factor > 1.0 && self.inc_factor.is_finite()) {
            return invalid("inc_factor", self.inc_factor, "must be greater than 1");
        }
        if !(self.red >= self.red_max && self.red <= 1.0) {
            return invalid("red", self.red, "must be in [red_max, 1]");
        }
        Ok(())
    }
}

/// Smallest time step the adaptivity can reach before giving up on reductions
pub fn get_min_dt(adt: &AdaptivityParameters) -> f64 {
    let mut red = adt.red;
    while red * adt.red_factor >= adt.red_max {
        red *= adt.red_factor;
    }
    adt.dt0 * red
}

/// What to do with the result of an attempted step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptDecision {
    /// The step is accepted
    Accept,
    /// The step must be attempted again with the (reduced) time step now set in the stepper
    Retry,
    /// The step did not converge and the time step cannot be reduced any further
    Floor,
}

/// Rule adapting the time step after each attempt.
pub trait AdaptTimeStep {
    /// Inspect the outcome of an attempt and update the stepper and the adaptivity state.
    ///
    /// A [`AdaptDecision::Retry`] must leave a smaller time step in the stepper, using
    /// [`VariableStepper::retry_current_step`].
    fn adapt_time_step(
        &mut self,
        ts: &mut VariableStepper,
        status: &SolveStatus,
        adt: &mut AdaptivityParameters,
    ) -> RSTSResult<AdaptDecision>;
}

/// Reduce the time step on failure and increase it after several quick steps
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAdaptivity;

impl AdaptTimeStep for DefaultAdaptivity {
    fn adapt_time_step(
        &mut self,
        ts: &mut VariableStepper,
        status: &SolveStatus,
        adt: &mut AdaptivityParameters,
    ) -> RSTSResult<AdaptDecision> {
        if status.converged {
            if status.n_iter <= adt.inc_on_iter {
                adt.wait += 1;

                if adt.wait > adt.inc_wait {
                    if adt.red < 1.0 {
                        adt.red = (adt.red * adt.inc_factor).min(1.0);
                        ts.set_time_step(adt.dt0 * adt.red)?;
                        info!("+++++ new time step: {:e} +++++", ts.time_step());
                    }
                    adt.wait = 0;
                }
            } else {
                adt.wait = 0;
            }
            return Ok(AdaptDecision::Accept);
        }

        let red = adt.red * adt.red_factor;
        adt.wait = 0;
        if red < adt.red_max {
            return Ok(AdaptDecision::Floor);
        }

        adt.red = red;
        ts.retry_current_step(adt.dt0 * adt.red)?;
        info!("----- new time step: {:e} -----", ts.state().dt);
        Ok(AdaptDecision::Retry)
    }
}

/// Behaviour when a step does not converge with the smallest permitted time step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorPolicy {
    /// Accept the result of the last attempt
    #[default]
    Accept,
    /// Fail with [`RSTSError::StepSizeFloorReached`]
    Fail,
}

/// Counters over all steps solved by a controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveStats {
    pub attempts: usize,
    pub rejected: usize,
    /// Steps accepted without convergence
    pub forced: usize,
}

/// Result of an adaptively solved step
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub state: SolutionState,
    pub status: SolveStatus,
    /// True if the step was accepted without convergence
    pub forced: bool,
}

/// Accept/reject/retry loop around an [`ImplicitStepExecutor`]
pub struct AdaptiveController {
    executor: ImplicitStepExecutor,
    adt: AdaptivityParameters,
    adapt: Box<dyn AdaptTimeStep>,
    floor_policy: FloorPolicy,
    stats: AdaptiveStats,
}

impl AdaptiveController {
    pub fn new(executor: ImplicitStepExecutor, adt: AdaptivityParameters) -> RSTSResult<Self> {
        adt.validate()?;
        Ok(Self {
            executor,
            adt,
            adapt: Box::new(DefaultAdaptivity),
            floor_policy: FloorPolicy::default(),
            stats: AdaptiveStats::default(),
        })
    }

    /// Use a custom adaptivity rule
    pub fn with_adapt_fn(mut self, adapt: Box<dyn AdaptTimeStep>) -> Self {
        self.adapt = adapt;
        self
    }

    pub fn with_floor_policy(mut self, floor_policy: FloorPolicy) -> Self {
        self.floor_policy = floor_policy;
        self
    }

    pub fn adt(&self) -> &AdaptivityParameters {
        &self.adt
    }

    pub fn stats(&self) -> AdaptiveStats {
        self.stats
    }

    pub fn executor_mut(&mut self) -> &mut ImplicitStepExecutor {
        &mut self.executor
    }

    /// Prepare the stepper for an adaptive run.
    ///
    /// Every run starts from the default time step (`red = 1`) with fresh counters.
    /// Takes the default time step of the stepper as `dt0` and sizes the step number format
    /// for the smallest reachable time step.
    pub fn init(&mut self, ts: &mut VariableStepper) -> RSTSResult<()> {
        self.adt.red = 1.0;
        self.adt.wait = 0;
        self.stats = AdaptiveStats::default();
        self.adt.dt0 = ts.get_default_time_step();
        ts.set_n_digit_from_min_dt(get_min_dt(&self.adt));
        ts.set_time_step(self.adt.dt0 * self.adt.red)
    }

    /// Solve the current step of `ts`, retrying with smaller time steps as needed
    pub fn solve_step(
        &mut self,
        ts: &mut VariableStepper,
        state0: &mut SolutionState,
        problem: &mut dyn Problem,
    ) -> RSTSResult<StepOutcome> {
        loop {
            self.stats.attempts += 1;
            let (state, status) = self.executor.solve_step(ts.state(), state0, problem)?;

            match self
                .adapt
                .adapt_time_step(ts, &status, &mut self.adt)?
            {
                AdaptDecision::Accept => {
                    return Ok(StepOutcome {
                        state,
                        status,
                        forced: false,
                    })
                }
                AdaptDecision::Retry => self.stats.rejected += 1,
                AdaptDecision::Floor => {
                    let (time, dt) = (ts.state().time, ts.state().dt);
                    return match self.floor_policy {
                        FloorPolicy::Accept => {
                            warn!(
                                "Nonlinear solver did not converge at time {:e} with the minimal time step {:e}, accepting the step anyway",
                                time, dt
                            );
                            self.stats.forced += 1;
                            Ok(StepOutcome {
                                state,
                                status,
                                forced: true,
                            })
                        }
                        FloorPolicy::Fail => Err(RSTSError::StepSizeFloorReached { time, dt }),
                    };
                }
            }
        }
    }
}

impl std::fmt::Debug for AdaptiveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveController")
            .field("adt", &self.adt)
            .field("floor_policy", &self.floor_policy)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
