use super::check_len;
use nalgebra::{DMatrix, DVector};
use rsts_core::errors::{RSTSError, RSTSResult};
use rsts_core::problem::{Evaluator, Problem};
use rsts_core::state::SolutionState;
use rsts_core::stepper::StepperState;

const VAR_X: &str = "x";

/// Linear system with a time dependent right hand side
///
/// $$ A x = b_0 + t b_1 $$
///
/// Degrees of freedom with a prescribed value replace their equation by `x_i = value`.
#[derive(Debug, Clone)]
pub struct LinearProblem {
    mtx: DMatrix<f64>,
    b0: DVector<f64>,
    b1: DVector<f64>,
    ebc: Vec<(usize, f64)>,
    template: SolutionState,
    time: f64,
}

impl LinearProblem {
    pub fn new(mtx: DMatrix<f64>, b0: DVector<f64>) -> RSTSResult<Self> {
        let n = mtx.nrows();
        if !mtx.is_square() {
            return Err(RSTSError::DimensionMismatch {
                name: "matrix columns".to_string(),
                expected: n,
                got: mtx.ncols(),
            });
        }
        check_len("b0", &b0, n)?;
        Ok(Self {
            mtx,
            b0,
            b1: DVector::zeros(n),
            ebc: vec![],
            template: SolutionState::new().with_variable(VAR_X, n),
            time: 0.0,
        })
    }

    /// Set the rate of change of the right hand side
    pub fn with_rate(mut self, b1: DVector<f64>) -> RSTSResult<Self> {
        check_len("b1", &b1, self.mtx.nrows())?;
        self.b1 = b1;
        Ok(self)
    }

    /// Prescribe the value of a degree of freedom
    pub fn with_ebc(mut self, dof: usize, value: f64) -> RSTSResult<Self> {
        self.template = self.template.with_ebc(VAR_X, dof, value)?;
        self.ebc.push((dof, value));
        Ok(self)
    }

    pub fn rhs(&self) -> DVector<f64> {
        &self.b0 + &self.b1 * self.time
    }
}

impl Evaluator for LinearProblem {
    fn residual(&self, x: &DVector<f64>) -> RSTSResult<DVector<f64>> {
        check_len(VAR_X, x, self.mtx.nrows())?;
        let mut r = &self.mtx * x - self.rhs();
        for &(dof, value) in &self.ebc {
            r[dof] = x[dof] - value;
        }
        Ok(r)
    }

    fn tangent_matrix(&self, _x: &DVector<f64>) -> RSTSResult<DMatrix<f64>> {
        let mut mtx = self.mtx.clone();
        for &(dof, _) in &self.ebc {
            mtx.row_mut(dof).fill(0.0);
            mtx[(dof, dof)] = 1.0;
        }
        Ok(mtx)
    }
}

impl Problem for LinearProblem {
    fn create_state(&self) -> SolutionState {
        self.template.clone()
    }

    fn time_update(&mut self, ts: Option<&StepperState>) -> RSTSResult<()> {
        self.time = ts.map_or(0.0, |ts| ts.time);
        Ok(())
    }

    fn is_linear(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn ebc_rows() {
        let problem = LinearProblem::new(
            DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 3.0]),
            DVector::from_vec(vec![1.0, 1.0]),
        )
        .unwrap()
        .with_ebc(0, 5.0)
        .unwrap();

        let x = DVector::from_vec(vec![5.0, 0.0]);
        let r = problem.residual(&x).unwrap();
        assert_eq!(r[0], 0.0);
        assert_relative_eq!(r[1], 4.0);

        let mtx = problem.tangent_matrix(&x).unwrap();
        assert_eq!(mtx.row(0).transpose(), DVector::from_vec(vec![1.0, 0.0]));

        let state = problem.create_state();
        let mut applied = state.clone();
        applied.apply_ebc();
        assert_eq!(applied.get("x").unwrap()[0], 5.0);
    }

    #[test]
    fn invalid_inputs() {
        assert!(LinearProblem::new(DMatrix::zeros(2, 3), DVector::zeros(2)).is_err());
        assert!(LinearProblem::new(DMatrix::zeros(2, 2), DVector::zeros(3)).is_err());
        let problem = LinearProblem::new(DMatrix::identity(2, 2), DVector::zeros(2)).unwrap();
        assert!(problem.clone().with_ebc(2, 0.0).is_err());
        assert!(problem.with_rate(DVector::zeros(1)).is_err());
    }
}
