use super::{
    n_step_from_dt, resolve_position, StepFormat, StepPosition, StepperState, Steps, TimeInterval,
    TimeStepper,
};
use crate::errors::{RSTSError, RSTSResult};

/// Time stepper with a fixed number of equally spaced steps.
///
/// The times are precomputed when the stepper is created.
/// Both ends of the interval are always part of the time axis.
#[derive(Debug, Clone)]
pub struct FixedStepper {
    state: StepperState,
    times: Vec<f64>,
    format: StepFormat,
    /// Index of the step yielded by the next call to `next_step`
    cursor: Option<usize>,
}

impl FixedStepper {
    /// Create a stepper with `n_step` steps
    pub fn new(interval: TimeInterval, n_step: usize) -> RSTSResult<Self> {
        Self::from_data(interval.t0(), interval.t1(), None, Some(n_step), false)
    }

    /// Create a stepper with steps of approximately `dt`.
    ///
    /// The number of steps is `floor((t1 - t0) / dt + 0.5) + 1` and the actual step is
    /// adjusted so that the steps end exactly at `t1`.
    pub fn with_dt(interval: TimeInterval, dt: f64) -> RSTSResult<Self> {
        Self::from_data(interval.t0(), interval.t1(), Some(dt), None, false)
    }

    /// Create a stepper from raw configuration values.
    ///
    /// `n_step` has precedence over `dt`. If neither is given, `dt = t1 - t0`.
    pub fn from_data(
        t0: f64,
        t1: f64,
        dt: Option<f64>,
        n_step: Option<usize>,
        is_quasistatic: bool,
    ) -> RSTSResult<Self> {
        let interval = TimeInterval::new(t0, t1)?;
        let dt = dt.unwrap_or(interval.length());
        if !dt.is_finite() || dt <= 0.0 {
            return Err(RSTSError::InvalidTimeStep(dt));
        }
        let n_step = match n_step {
            Some(n_step) => n_step,
            None => n_step_from_dt(t0, t1, dt)?,
        };
        if n_step == 0 {
            return Err(RSTSError::Error(
                "A time stepper requires at least one step".to_string(),
            ));
        }

        let (times, dt) = if n_step > 1 {
            let dt = interval.length() / (n_step - 1) as f64;
            let mut times: Vec<f64> = (0..n_step).map(|ii| t0 + ii as f64 * dt).collect();
            // The final time is exact regardless of rounding
            times[n_step - 1] = t1;
            (times, dt)
        } else {
            (vec![t0], interval.length())
        };

        Ok(Self {
            state: StepperState::new(interval, dt, n_step, is_quasistatic),
            times,
            format: StepFormat::new(n_step),
            cursor: Some(0),
        })
    }

    pub fn with_quasistatic(mut self, is_quasistatic: bool) -> Self {
        self.state.is_quasistatic = is_quasistatic;
        self
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn n_step(&self) -> usize {
        self.state.n_step
    }

    pub fn dt(&self) -> f64 {
        self.state.dt
    }

    /// Iterate from a given step to the end of the interval
    pub fn iter_from(&mut self, step: usize) -> RSTSResult<Steps<'_, Self>> {
        self.set_step(step.into())?;
        Ok(self.iter_from_current())
    }

    /// Iterate over the whole interval
    pub fn iter(&mut self) -> Steps<'_, Self> {
        self.cursor = Some(0);
        Steps { stepper: self }
    }

    fn move_to(&mut self, step: usize) {
        self.state.step = step;
        self.state.time = self.times[step];
        self.state.normalize_time();
    }
}

impl TimeStepper for FixedStepper {
    fn state(&self) -> &StepperState {
        &self.state
    }

    fn set_step(&mut self, position: StepPosition) -> RSTSResult<()> {
        let step = resolve_position(position, self.state.n_step)?;
        self.move_to(step);
        self.cursor = Some(step);
        Ok(())
    }

    fn next_step(&mut self) -> Option<(usize, f64)> {
        let step = self.cursor?;
        if step >= self.state.n_step {
            self.cursor = None;
            return None;
        }
        self.move_to(step);
        self.cursor = Some(step + 1);

        Some((self.state.step, self.state.time))
    }

    fn restart_cursor(&mut self) {
        self.cursor = Some(self.state.step);
    }

    fn format(&self) -> &StepFormat {
        &self.format
    }
}

/// Steppers are equal if they cover the same interval with the same number of steps
impl PartialEq for FixedStepper {
    fn eq(&self, other: &Self) -> bool {
        (self.state.t0 - other.state.t0).abs() < 1e-15
            && (self.state.t1 - other.state.t1).abs() < 1e-15
            && self.state.n_step == other.state.n_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn interval() -> TimeInterval {
        TimeInterval::new(0.0, 1.0).unwrap()
    }

    #[test]
    fn eleven_steps_over_unit_interval() {
        let mut ts = FixedStepper::with_dt(interval(), 0.1).unwrap();
        assert_eq!(ts.n_step(), 11);

        let steps: Vec<(usize, f64)> = ts.iter().collect();
        assert_eq!(steps.len(), 11);
        assert_eq!(steps[0], (0, 0.0));
        assert_eq!(steps[10], (10, 1.0));
        for (ii, (step, time)) in steps.iter().enumerate() {
            assert_eq!(*step, ii);
            assert!(is_close!(*time, ii as f64 * 0.1));
        }
    }

    #[test]
    fn times_are_uniform_and_span_interval() {
        for n_step in 2..40 {
            let interval = TimeInterval::new(-3.5, 7.25).unwrap();
            let ts = FixedStepper::new(interval, n_step).unwrap();
            let times = ts.times();
            let dt = (7.25 + 3.5) / (n_step - 1) as f64;

            assert_eq!(times.len(), n_step);
            assert_eq!(times[0], -3.5);
            assert_eq!(times[n_step - 1], 7.25);
            assert!(is_close!(ts.dt(), dt));
            for pair in times.windows(2) {
                assert!(pair[1] > pair[0]);
                assert!(is_close!(pair[1] - pair[0], dt, rel_tol = 1e-9, abs_tol = 1e-12));
            }
        }
    }

    #[test]
    fn single_step() {
        let mut ts = FixedStepper::with_dt(interval(), 5.0).unwrap();
        assert_eq!(ts.n_step(), 1);
        assert_eq!(ts.dt(), 1.0);
        assert_eq!(ts.iter().collect::<Vec<_>>(), vec![(0, 0.0)]);
    }

    #[test]
    fn n_step_has_precedence() {
        let ts = FixedStepper::from_data(0.0, 1.0, Some(0.1), Some(5), false).unwrap();
        assert_eq!(ts.n_step(), 5);
        assert_eq!(ts.dt(), 0.25);
    }

    #[test]
    fn invalid_dt() {
        assert!(matches!(
            FixedStepper::with_dt(interval(), 0.0),
            Err(RSTSError::InvalidTimeStep(_))
        ));
        assert!(FixedStepper::with_dt(interval(), -0.1).is_err());
        assert!(FixedStepper::new(interval(), 0).is_err());
        assert!(matches!(
            FixedStepper::with_dt(interval(), 1e-300),
            Err(RSTSError::InvalidTimeStep(_))
        ));
    }

    #[test]
    fn normalized_time_endpoints() {
        let mut ts = FixedStepper::new(TimeInterval::new(2.0, 5.0).unwrap(), 7).unwrap();
        let mut normalized = vec![];
        while ts.next_step().is_some() {
            normalized.push(ts.state().normalized_time);
        }
        assert_eq!(normalized.len(), 7);
        assert_eq!(normalized[0], 0.0);
        assert_eq!(normalized[6], 1.0);
    }

    #[test]
    fn iteration_updates_state() {
        let mut ts = FixedStepper::new(interval(), 5).unwrap();
        let mut observed = vec![];
        while let Some((step, time)) = ts.next_step() {
            assert_eq!(ts.state().step, step);
            assert_eq!(ts.state().time, time);
            observed.push(ts.state().normalized_time);
        }
        assert_eq!(observed, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert!(ts.next_step().is_none());
    }

    #[test]
    fn iterate_from_middle() {
        let mut ts = FixedStepper::new(interval(), 5).unwrap();
        let steps: Vec<usize> = ts.iter_from(3).unwrap().map(|(step, _)| step).collect();
        assert_eq!(steps, vec![3, 4]);

        // Restartable from any valid step
        let steps: Vec<usize> = ts.iter_from(1).unwrap().map(|(step, _)| step).collect();
        assert_eq!(steps, vec![1, 2, 3, 4]);

        assert!(matches!(
            ts.iter_from(5),
            Err(RSTSError::OutOfRange { .. })
        ));
    }

    #[test]
    fn set_step_is_idempotent() {
        let mut ts = FixedStepper::new(interval(), 11).unwrap();
        ts.set_step(StepPosition::Step(4)).unwrap();
        let first = ts.state().clone();
        ts.set_step(StepPosition::Step(4)).unwrap();
        assert_eq!(&first, ts.state());

        ts.set_step(StepPosition::NormalizedTime(0.7)).unwrap();
        let first = ts.state().clone();
        ts.set_step(StepPosition::NormalizedTime(0.7)).unwrap();
        assert_eq!(&first, ts.state());
        assert_eq!(first.step, 7);
    }

    #[test]
    fn set_step_out_of_range() {
        let mut ts = FixedStepper::new(interval(), 11).unwrap();
        ts.set_step(StepPosition::Step(2)).unwrap();
        let before = ts.state().clone();

        assert!(ts.set_step(StepPosition::Step(11)).is_err());
        assert!(ts.set_step(StepPosition::NormalizedTime(1.5)).is_err());
        // A failed call leaves the state untouched
        assert_eq!(&before, ts.state());
    }

    #[test]
    fn equality() {
        let a = FixedStepper::new(interval(), 11).unwrap();
        let b = FixedStepper::with_dt(interval(), 0.1).unwrap();
        let c = FixedStepper::new(interval(), 10).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
