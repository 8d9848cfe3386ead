//! Model problems.
//!
//! Each problem implements [`rsts_core::problem::Problem`] on a dense representation and
//! has a known exact or reference solution.
mod chain;
mod cubic;
mod linear;
mod oscillator;

pub use chain::{CoupledChain, CoupledChainParameters};
pub use cubic::{CubicDecay, CubicDecayParameters};
pub use linear::LinearProblem;
pub use oscillator::{Oscillator, OscillatorParameters};

use nalgebra::DVector;
use rsts_core::errors::{RSTSError, RSTSResult};

pub(crate) fn check_len(name: &str, x: &DVector<f64>, expected: usize) -> RSTSResult<()> {
    if x.len() != expected {
        return Err(RSTSError::DimensionMismatch {
            name: name.to_string(),
            expected,
            got: x.len(),
        });
    }
    Ok(())
}
