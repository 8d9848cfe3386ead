use super::{
    get_n_step, n_step_from_dt, resolve_position, StepFormat, StepPosition, StepperState, Steps,
    TimeInterval, TimeStepper,
};
use crate::errors::{RSTSError, RSTSResult};

/// Relative tolerance used to snap the final step onto `t1`
const END_SNAP_TOLERANCE: f64 = 1e-10;

/// Time stepper with a variable time step.
///
/// The time axis is built incrementally: each advance appends `time + dt` where `dt` is the
/// step size requested via [`VariableStepper::set_time_step`].
/// The step that would cross `t1` is shortened so that the last step ends exactly at `t1`.
///
/// Taken steps are history and never modified, except for the current (latest) step which
/// can be recomputed with [`VariableStepper::retry_current_step`] before it is accepted.
#[derive(Debug, Clone)]
pub struct VariableStepper {
    state: StepperState,
    interval: TimeInterval,
    /// Step size used by the next advance
    requested_dt: f64,
    dt0: f64,
    n_step0: usize,
    times: Vec<f64>,
    dts: Vec<f64>,
    format: StepFormat,
    started: bool,
}

impl VariableStepper {
    /// Create a stepper whose default step size splits the interval into `n_step` steps
    pub fn new(interval: TimeInterval, n_step: usize) -> RSTSResult<Self> {
        Self::from_data(interval.t0(), interval.t1(), None, Some(n_step), false)
    }

    pub fn with_dt(interval: TimeInterval, dt: f64) -> RSTSResult<Self> {
        Self::from_data(interval.t0(), interval.t1(), Some(dt), None, false)
    }

    /// Create a stepper from raw configuration values.
    ///
    /// The default time step is derived in the same way as for a
    /// [`super::FixedStepper`], `n_step` having precedence over `dt`.
    pub fn from_data(
        t0: f64,
        t1: f64,
        dt: Option<f64>,
        n_step: Option<usize>,
        is_quasistatic: bool,
    ) -> RSTSResult<Self> {
        let interval = TimeInterval::new(t0, t1)?;
        let dtime = interval.length();
        let dt = dt.unwrap_or(dtime);
        if !dt.is_finite() || dt <= 0.0 {
            return Err(RSTSError::InvalidTimeStep(dt));
        }
        let n_step0 = match n_step {
            Some(n_step) => n_step,
            None => n_step_from_dt(t0, t1, dt)?,
        };
        if n_step0 == 0 {
            return Err(RSTSError::Error(
                "A time stepper requires at least one step".to_string(),
            ));
        }
        let dt = if n_step0 > 1 {
            dtime / (n_step0 - 1) as f64
        } else {
            dtime
        };

        let mut stepper = Self {
            state: StepperState::new(interval, dt, 1, is_quasistatic),
            interval,
            requested_dt: dt,
            dt0: dt,
            n_step0,
            times: vec![],
            dts: vec![],
            format: StepFormat::new(5),
            started: false,
        };
        stepper.reset();

        Ok(stepper)
    }

    pub fn with_quasistatic(mut self, is_quasistatic: bool) -> Self {
        self.state.is_quasistatic = is_quasistatic;
        self
    }

    /// The nominal step size derived from the configuration
    pub fn get_default_time_step(&self) -> f64 {
        self.dt0
    }

    /// Number of steps the nominal step size would need to cover the interval
    pub fn n_step0(&self) -> usize {
        self.n_step0
    }

    /// Step size that will be used by the next advance
    pub fn time_step(&self) -> f64 {
        self.requested_dt
    }

    /// Set the step size used by the next advance.
    ///
    /// Already taken steps are not modified.
    pub fn set_time_step(&mut self, dt: f64) -> RSTSResult<()> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(RSTSError::InvalidTimeStep(dt));
        }
        self.requested_dt = dt;
        Ok(())
    }

    /// Set the step size and recompute the time of the current step with it.
    ///
    /// This is used to retry a step that has not been accepted yet.
    /// The initial step always stays at `t0`.
    pub fn retry_current_step(&mut self, dt: f64) -> RSTSResult<()> {
        self.set_time_step(dt)?;

        let step = self.state.step;
        if step > 0 {
            let (time, dt) = self.clip_to_end(self.times[step - 1], dt);
            self.times[step] = time;
            self.dts[step - 1] = dt;
            self.state.time = time;
            self.state.dt = dt;
            self.state.normalize_time();
        }
        Ok(())
    }

    /// Size the step number format using the smallest step size that can occur in a run
    pub fn set_n_digit_from_min_dt(&mut self, dt: f64) {
        self.format = StepFormat::new(get_n_step(self.state.t0, self.state.t1, dt));
    }

    /// Advance by the requested step size, recording the new time in the history
    pub fn advance(&mut self) {
        let (time, dt) = self.clip_to_end(self.state.time, self.requested_dt);

        self.state.step += 1;
        self.state.time = time;
        self.state.dt = dt;
        self.state.normalize_time();

        self.times.push(time);
        self.dts.push(dt);
        self.state.n_step = self.state.step + 1;
    }

    /// All times visited so far
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// All step sizes taken so far
    pub fn dts(&self) -> &[f64] {
        &self.dts
    }

    /// Iterate over the whole interval, starting from `t0`
    pub fn iter(&mut self) -> Steps<'_, Self> {
        self.reset();
        Steps { stepper: self }
    }

    fn reset(&mut self) {
        self.state.step = 0;
        self.state.time = self.state.t0;
        self.state.normalized_time = 0.0;
        self.state.n_step = 1;
        self.times = vec![self.state.t0];
        self.dts = vec![];
        self.started = false;
    }

    /// New time and effective step size when stepping from `time` by `dt`
    fn clip_to_end(&self, time: f64, dt: f64) -> (f64, f64) {
        let t1 = self.interval.t1();
        let remaining = t1 - time;
        if dt >= remaining - END_SNAP_TOLERANCE * self.interval.length() {
            (t1, remaining)
        } else {
            (time + dt, dt)
        }
    }
}

impl TimeStepper for VariableStepper {
    fn state(&self) -> &StepperState {
        &self.state
    }

    /// Only the initial step can be set, which resets the history.
    fn set_step(&mut self, position: StepPosition) -> RSTSResult<()> {
        resolve_position(position, 1)?;
        self.reset();
        Ok(())
    }

    fn next_step(&mut self) -> Option<(usize, f64)> {
        if !self.started {
            self.started = true;
        } else if self.state.normalized_time >= 1.0 {
            return None;
        } else {
            self.advance();
        }

        Some((self.state.step, self.state.time))
    }

    fn restart_cursor(&mut self) {
        self.started = false;
    }

    fn format(&self) -> &StepFormat {
        &self.format
    }
}

impl PartialEq for VariableStepper {
    fn eq(&self, other: &Self) -> bool {
        (self.state.t0 - other.state.t0).abs() < 1e-15
            && (self.state.t1 - other.state.t1).abs() < 1e-15
            && self.state.n_step == other.state.n_step
    }
}
