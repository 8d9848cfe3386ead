use log::debug;
use nalgebra::{linalg::LU, DMatrix, DVector, Dyn};
use rsts_core::errors::{RSTSError, RSTSResult};
use rsts_core::problem::LinearSolver;

/// Dense direct solver based on an LU decomposition with partial pivoting.
///
/// The factorisation of the most recent matrix is kept and reused for as long as the
/// solver is handed an identical matrix.
#[derive(Debug, Clone, Default)]
pub struct LuSolver {
    factorised: Option<(DMatrix<f64>, LU<f64, Dyn, Dyn>)>,
    n_factorisations: usize,
}

impl LuSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of factorisations computed so far
    pub fn n_factorisations(&self) -> usize {
        self.n_factorisations
    }

    fn factorise(&mut self, mtx: &DMatrix<f64>) -> RSTSResult<&LU<f64, Dyn, Dyn>> {
        if !mtx.is_square() {
            return Err(RSTSError::DimensionMismatch {
                name: "matrix columns".to_string(),
                expected: mtx.nrows(),
                got: mtx.ncols(),
            });
        }

        let reuse = matches!(&self.factorised, Some((cached, _)) if cached == mtx);
        if !reuse {
            let lu = mtx.clone().lu();
            if !lu.is_invertible() {
                return Err(RSTSError::LinearSolve(format!(
                    "singular matrix of size {}",
                    mtx.nrows()
                )));
            }
            self.n_factorisations += 1;
            debug!("LU factorisation #{} (size {})", self.n_factorisations, mtx.nrows());
            self.factorised = Some((mtx.clone(), lu));
        }

        match &self.factorised {
            Some((_, lu)) => Ok(lu),
            None => Err(RSTSError::LinearSolve("missing factorisation".to_string())),
        }
    }
}

impl LinearSolver for LuSolver {
    fn presolve(&mut self, mtx: &DMatrix<f64>) -> RSTSResult<()> {
        self.factorise(mtx).map(|_| ())
    }

    fn solve(&mut self, rhs: &DVector<f64>, mtx: &DMatrix<f64>) -> RSTSResult<DVector<f64>> {
        if rhs.len() != mtx.nrows() {
            return Err(RSTSError::DimensionMismatch {
                name: "right hand side".to_string(),
                expected: mtx.nrows(),
                got: rhs.len(),
            });
        }
        self.factorise(mtx)?
            .solve(rhs)
            .ok_or_else(|| RSTSError::LinearSolve("LU back substitution failed".to_string()))
    }
}
