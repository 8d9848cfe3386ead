//! Time steppers.
//!
//! A stepper owns the time axis of a run and hands out `(step, time)` pairs one at a time.
//! Two flavours exist:
//!
//! - [`FixedStepper`] precomputes `n_step` equally spaced times spanning `[t0, t1]`.
//! - [`VariableStepper`] grows its time axis as it goes, using a step size that may be
//!   changed between advances (see [`crate::adaptive`]).
//!
//! Both expose the same cursor interface through [`TimeStepper`].
//! Consuming the cursor mutates the [`StepperState`] of the stepper, so only one traversal
//! can be active at a time.

mod fixed;
mod variable;

pub use fixed::FixedStepper;
pub use variable::VariableStepper;

use crate::errors::{RSTSError, RSTSResult};
use serde::{Deserialize, Serialize};

/// A closed time interval `[t0, t1]` with `t0 < t1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    t0: f64,
    t1: f64,
}

impl TimeInterval {
    pub fn new(t0: f64, t1: f64) -> RSTSResult<Self> {
        if !(t0.is_finite() && t1.is_finite()) || t0 >= t1 {
            return Err(RSTSError::InvalidInterval { t0, t1 });
        }
        Ok(Self { t0, t1 })
    }

    pub fn t0(&self) -> f64 {
        self.t0
    }

    pub fn t1(&self) -> f64 {
        self.t1
    }

    pub fn length(&self) -> f64 {
        self.t1 - self.t0
    }

    /// Map a time onto `[0, 1]` relative to the interval
    pub fn normalize(&self, time: f64) -> f64 {
        (time - self.t0) / (self.t1 - self.t0)
    }
}

/// Observable state of a stepper.
///
/// `step`, `time` and `normalized_time` describe the most recently yielded step.
/// For a [`VariableStepper`] `n_step` is only known retroactively and equals the number of
/// steps taken so far plus one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepperState {
    pub t0: f64,
    pub t1: f64,
    /// Time increment that led to the current step
    pub dt: f64,
    pub n_step: usize,
    pub step: usize,
    pub time: f64,
    pub normalized_time: f64,
    /// If true, the initial step is solved with an ordinary nonlinear solve
    pub is_quasistatic: bool,
}

impl StepperState {
    fn new(interval: TimeInterval, dt: f64, n_step: usize, is_quasistatic: bool) -> Self {
        Self {
            t0: interval.t0(),
            t1: interval.t1(),
            dt,
            n_step,
            step: 0,
            time: interval.t0(),
            normalized_time: 0.0,
            is_quasistatic,
        }
    }

    fn normalize_time(&mut self) {
        self.normalized_time = (self.time - self.t0) / (self.t1 - self.t0);
    }
}

/// Position that a stepper can be moved to using [`TimeStepper::set_step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepPosition {
    /// Step index. Negative values count from the end (`-1` is the last step)
    Step(i64),
    /// Normalized time in `[0, 1]`, rounded to the nearest step
    NormalizedTime(f64),
}

impl From<usize> for StepPosition {
    fn from(step: usize) -> Self {
        StepPosition::Step(step as i64)
    }
}

/// Resolve a position into a step index in `[0, n_step - 1]`
fn resolve_position(position: StepPosition, n_step: usize) -> RSTSResult<usize> {
    let nm1 = n_step as i64 - 1;
    let step = match position {
        StepPosition::Step(step) if step < 0 => n_step as i64 + step,
        StepPosition::Step(step) => step,
        StepPosition::NormalizedTime(nt) if !nt.is_finite() => {
            return Err(RSTSError::OutOfRange {
                step: -1,
                min: 0,
                max: nm1,
            })
        }
        StepPosition::NormalizedTime(nt) => (nt * nm1 as f64).round() as i64,
    };
    if step < 0 || step > nm1 {
        return Err(RSTSError::OutOfRange {
            step,
            min: 0,
            max: nm1,
        });
    }
    Ok(step as usize)
}

/// Number of steps (including the initial one) needed to cover `[t0, t1]` with a step `dt`.
///
/// Saturates at `usize::MAX` for step sizes too small to count.
pub fn get_n_step(t0: f64, t1: f64, dt: f64) -> usize {
    let n_interval = ((t1 - t0) / dt + 0.5).floor();
    if n_interval.is_nan() || n_interval >= usize::MAX as f64 {
        return usize::MAX;
    }
    (n_interval as usize).saturating_add(1)
}

/// [`get_n_step`] for a stepper that has to realise all of its steps
fn n_step_from_dt(t0: f64, t1: f64, dt: f64) -> RSTSResult<usize> {
    match get_n_step(t0, t1, dt) {
        usize::MAX => Err(RSTSError::InvalidTimeStep(dt)),
        n_step => Ok(n_step),
    }
}

/// Formatting of step numbers in log output and output file suffixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFormat {
    n_digit: usize,
}

impl StepFormat {
    /// Size the format for a run of `n_step` steps
    pub fn new(n_step: usize) -> Self {
        let n_digit = if n_step > 1 {
            (n_step - 1).to_string().len()
        } else {
            1
        };
        Self { n_digit }
    }

    pub fn n_digit(&self) -> usize {
        self.n_digit
    }

    /// e.g. ` 3 of 10`
    pub fn label(&self, step: usize, n_step: usize) -> String {
        format!("{:>w$} of {:>w$}", step, n_step, w = self.n_digit)
    }

    /// Zero-padded step number, e.g. `03`
    pub fn suffix(&self, step: usize) -> String {
        format!("{:0w$}", step, w = self.n_digit)
    }
}

/// Cursor interface shared by the steppers.
pub trait TimeStepper {
    /// Current state of the stepper
    fn state(&self) -> &StepperState;

    /// Move the stepper to a given position.
    ///
    /// The next call to [`TimeStepper::next_step`] yields this position.
    /// Fails with [`RSTSError::OutOfRange`] if the position is outside `[0, n_step - 1]`.
    fn set_step(&mut self, position: StepPosition) -> RSTSResult<()>;

    /// Realise the next `(step, time)` pair, updating the stepper state.
    ///
    /// Returns `None` once the end of the interval has been yielded.
    fn next_step(&mut self) -> Option<(usize, f64)>;

    /// Make the next call to [`TimeStepper::next_step`] yield the current step again
    fn restart_cursor(&mut self);

    fn format(&self) -> &StepFormat;

    /// Iterate from the current step onwards
    fn iter_from_current(&mut self) -> Steps<'_, Self>
    where
        Self: Sized,
    {
        self.restart_cursor();
        Steps { stepper: self }
    }
}

/// Lazy sequence of `(step, time)` pairs borrowed from a stepper.
#[derive(Debug)]
pub struct Steps<'a, S: TimeStepper> {
    stepper: &'a mut S,
}

impl<S: TimeStepper> Iterator for Steps<'_, S> {
    type Item = (usize, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.stepper.next_step()
    }
}
