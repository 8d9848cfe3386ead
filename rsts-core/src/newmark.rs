//! Newmark integration of second order systems.
//!
//! The problem is written for three variables: displacement `u`, velocity `v` and
//! acceleration `a`, with one equation block per variable. Within a step of size `dt`
//! the velocity and displacement are affine functions of the new acceleration `a_t`:
//!
//! ```text
//! v(a_t) = v0 + dt * ((1 - beta1) * a0 + beta1 * a_t)
//! u(a_t) = u0 + dt * v0 + dt^2 / 2 * ((1 - beta2) * a0 + beta2 * a_t)
//! ```
//!
//! so that each step reduces to a root finding problem in `a_t` alone.
use crate::errors::{RSTSError, RSTSResult};
use crate::problem::{Evaluator, LinearSolver, Problem};
use crate::state::SolutionState;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

/// Names of the displacement, velocity and acceleration variables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewmarkVariables {
    pub u: String,
    pub v: String,
    pub a: String,
}

impl Default for NewmarkVariables {
    fn default() -> Self {
        Self::new("u", "v", "a")
    }
}

impl NewmarkVariables {
    pub fn new(u: &str, v: &str, a: &str) -> Self {
        Self {
            u: u.to_string(),
            v: v.to_string(),
            a: a.to_string(),
        }
    }

    /// Extract the displacement, velocity and acceleration from a state
    pub fn unpack(&self, state: &SolutionState) -> RSTSResult<NewmarkState> {
        let get = |name: &str| {
            state
                .get(name)
                .cloned()
                .ok_or_else(|| RSTSError::UnknownVariable(name.to_string()))
        };
        let out = NewmarkState {
            u: get(&self.u)?,
            v: get(&self.v)?,
            a: get(&self.a)?,
        };
        out.check(self)?;
        Ok(out)
    }

    /// Write the displacement, velocity and acceleration into a state
    pub fn pack(&self, state: &mut SolutionState, values: &NewmarkState) -> RSTSResult<()> {
        values.check(self)?;
        let parts: HashMap<String, DVector<f64>> = [
            (self.u.clone(), values.u.clone()),
            (self.v.clone(), values.v.clone()),
            (self.a.clone(), values.a.clone()),
        ]
        .into_iter()
        .collect();
        state.set_parts(&parts)
    }

    fn ranges(&self, state: &SolutionState) -> RSTSResult<[Range<usize>; 3]> {
        let range = |name: &str| {
            state
                .range_of(name)
                .ok_or_else(|| RSTSError::UnknownVariable(name.to_string()))
        };
        Ok([range(&self.u)?, range(&self.v)?, range(&self.a)?])
    }
}

/// Displacement, velocity and acceleration of a second order system
#[derive(Debug, Clone, PartialEq)]
pub struct NewmarkState {
    pub u: DVector<f64>,
    pub v: DVector<f64>,
    pub a: DVector<f64>,
}

impl NewmarkState {
    fn check(&self, names: &NewmarkVariables) -> RSTSResult<()> {
        let n = self.u.len();
        for (name, len) in [(&names.v, self.v.len()), (&names.a, self.a.len())] {
            if len != n {
                return Err(RSTSError::DimensionMismatch {
                    name: name.clone(),
                    expected: n,
                    got: len,
                });
            }
        }
        Ok(())
    }
}

/// Velocity and displacement as functions of the acceleration at the end of a step
#[derive(Debug, Clone)]
pub struct NewmarkMaps {
    pub dt: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub u0: DVector<f64>,
    pub v0: DVector<f64>,
    pub a0: DVector<f64>,
}

impl NewmarkMaps {
    pub fn new(dt: f64, beta1: f64, beta2: f64, start: &NewmarkState) -> Self {
        Self {
            dt,
            beta1,
            beta2,
            u0: start.u.clone(),
            v0: start.v.clone(),
            a0: start.a.clone(),
        }
    }

    /// `v0 + dt ((1 - beta1) a0 + beta1 a)`
    pub fn v(&self, a: &DVector<f64>) -> DVector<f64> {
        &self.v0 + (&self.a0 * (1.0 - self.beta1) + a * self.beta1) * self.dt
    }

    /// `u0 + dt v0 + dt^2 / 2 ((1 - beta2) a0 + beta2 a)`
    pub fn u(&self, a: &DVector<f64>) -> DVector<f64> {
        let dt2 = 0.5 * self.dt.powi(2);
        &self.u0 + &self.v0 * self.dt + (&self.a0 * (1.0 - self.beta2) + a * self.beta2) * dt2
    }

    /// State at the end of the step for the acceleration `a`
    pub fn state(&self, a: &DVector<f64>) -> NewmarkState {
        NewmarkState {
            u: self.u(a),
            v: self.v(a),
            a: a.clone(),
        }
    }
}

/// Full three-block problem projected onto the acceleration unknown
pub struct NewmarkEvaluator<'a> {
    problem: &'a dyn Problem,
    variables: &'a NewmarkVariables,
    template: SolutionState,
    ranges: [Range<usize>; 3],
    maps: NewmarkMaps,
}

impl<'a> NewmarkEvaluator<'a> {
    pub fn new(
        problem: &'a dyn Problem,
        variables: &'a NewmarkVariables,
        template: &SolutionState,
        maps: NewmarkMaps,
    ) -> RSTSResult<Self> {
        let ranges = variables.ranges(template)?;
        Ok(Self {
            problem,
            variables,
            template: template.clone(),
            ranges,
            maps,
        })
    }

    pub fn maps(&self) -> &NewmarkMaps {
        &self.maps
    }

    fn full_vector(&self, values: &NewmarkState) -> RSTSResult<DVector<f64>> {
        let mut state = self.template.clone();
        self.variables.pack(&mut state, values)?;
        Ok(state.to_vector())
    }

    /// Sum of the three residual blocks of the full problem
    fn project_residual(&self, full: &DVector<f64>) -> DVector<f64> {
        let [iu, iv, ia] = &self.ranges;
        full.rows(iu.start, iu.len()) + full.rows(iv.start, iv.len()) + full.rows(ia.start, ia.len())
    }

    fn diagonal_block(mtx: &DMatrix<f64>, range: &Range<usize>) -> DMatrix<f64> {
        mtx.view((range.start, range.start), (range.len(), range.len()))
            .into_owned()
    }
}

impl Evaluator for NewmarkEvaluator<'_> {
    fn residual(&self, a: &DVector<f64>) -> RSTSResult<DVector<f64>> {
        let full = self.full_vector(&self.maps.state(a))?;
        Ok(self.project_residual(&self.problem.residual(&full)?))
    }

    fn tangent_matrix(&self, a: &DVector<f64>) -> RSTSResult<DMatrix<f64>> {
        let full = self.full_vector(&self.maps.state(a))?;
        let mtx = self.problem.tangent_matrix(&full)?;

        let [iu, iv, ia] = &self.ranges;
        let k = Self::diagonal_block(&mtx, iu);
        let c = Self::diagonal_block(&mtx, iv);
        let m = Self::diagonal_block(&mtx, ia);

        let dt = self.maps.dt;
        let dt2 = 0.5 * dt.powi(2);
        Ok(m + c * (self.maps.beta1 * dt) + k * (self.maps.beta2 * dt2))
    }
}

/// Initial acceleration consistent with the initial displacement and velocity.
///
/// Solves `M a0 = -r(u0, v0, 0)` where `M` is the acceleration block of the tangent.
pub fn get_a0(
    problem: &dyn Problem,
    variables: &NewmarkVariables,
    template: &SolutionState,
    u0: &DVector<f64>,
    v0: &DVector<f64>,
    ls: &mut dyn LinearSolver,
) -> RSTSResult<DVector<f64>> {
    let start = NewmarkState {
        u: u0.clone(),
        v: v0.clone(),
        a: DVector::zeros(u0.len()),
    };
    let maps = NewmarkMaps::new(0.0, 0.0, 0.0, &start);
    let evaluator = NewmarkEvaluator::new(problem, variables, template, maps)?;

    let full = evaluator.full_vector(&start)?;
    let r = evaluator.project_residual(&problem.residual(&full)?);
    let mtx = problem.tangent_matrix(&full)?;
    let m = NewmarkEvaluator::diagonal_block(&mtx, &evaluator.ranges[2]);

    ls.solve(&-r, &m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn start() -> NewmarkState {
        NewmarkState {
            u: DVector::from_vec(vec![1.0, -2.0]),
            v: DVector::from_vec(vec![0.5, 3.0]),
            a: DVector::from_vec(vec![-4.0, 0.25]),
        }
    }

    #[test]
    fn maps_are_exact_for_zero_step() {
        let start = start();
        for (beta1, beta2) in [(0.5, 0.5), (0.0, 0.0), (1.0, 0.25), (0.3, 0.9)] {
            let maps = NewmarkMaps::new(0.0, beta1, beta2, &start);
            let a = DVector::from_vec(vec![123.0, -7.0]);
            assert_eq!(maps.u(&a), start.u);
            assert_eq!(maps.v(&a), start.v);
            assert_eq!(maps.u(&start.a), start.u);
            assert_eq!(maps.v(&start.a), start.v);
        }
    }

    #[test]
    fn explicit_predictor() {
        let start = start();
        let dt = 0.1;
        let maps = NewmarkMaps::new(dt, 0.0, 0.0, &start);
        let a = DVector::from_vec(vec![10.0, 20.0]);

        let v = maps.v(&a);
        let u = maps.u(&a);
        assert_eq!(v, maps.v(&start.a));
        assert_eq!(u, maps.u(&start.a));
        assert_relative_eq!(v[0], 0.5 + dt * -4.0);
        assert_relative_eq!(u[1], -2.0 + dt * 3.0 + 0.5 * dt * dt * 0.25);
    }

    #[test]
    fn trapezoidal_maps() {
        let start = start();
        let dt = 0.2;
        let maps = NewmarkMaps::new(dt, 0.5, 0.5, &start);
        let a = DVector::from_vec(vec![2.0, 1.0]);

        let v = maps.v(&a);
        let u = maps.u(&a);
        assert_relative_eq!(v[0], 0.5 + dt * 0.5 * (-4.0 + 2.0));
        assert_relative_eq!(u[0], 1.0 + dt * 0.5 + 0.5 * dt * dt * 0.5 * (-4.0 + 2.0));
    }

    #[test]
    fn pack_and_unpack() {
        let names = NewmarkVariables::new("disp", "vel", "acc");
        let mut state = SolutionState::new()
            .with_variable("disp", 2)
            .with_variable("vel", 2)
            .with_variable("acc", 2);

        names.pack(&mut state, &start()).unwrap();
        assert_eq!(names.unpack(&state).unwrap(), start());
        assert_eq!(
            state.to_vector().as_slice(),
            &[1.0, -2.0, 0.5, 3.0, -4.0, 0.25]
        );

        assert!(matches!(
            NewmarkVariables::default().unpack(&state),
            Err(RSTSError::UnknownVariable(_))
        ));
    }

    #[test]
    fn unequal_lengths_are_rejected() {
        let names = NewmarkVariables::default();
        let state = SolutionState::new()
            .with_variable("u", 2)
            .with_variable("v", 2)
            .with_variable("a", 3);
        assert!(matches!(
            names.unpack(&state),
            Err(RSTSError::DimensionMismatch { expected: 2, got: 3, .. })
        ));
    }
}
