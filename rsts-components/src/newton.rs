use log::{debug, warn};
use nalgebra::DVector;
use rsts_core::errors::RSTSResult;
use rsts_core::problem::{Evaluator, LinearSolver, NonlinearSolver, SolveStatus};
use serde::{Deserialize, Serialize};

/// Parameters of the Newton solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    /// Maximum number of iterations
    pub i_max: usize,
    /// Absolute tolerance on the residual norm
    pub eps_a: f64,
    /// Relative tolerance on the residual norm, with respect to the initial residual
    pub eps_r: f64,
    /// Line search step reduction factor
    pub ls_red: f64,
    /// Smallest line search step before the iteration is abandoned
    pub ls_min: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            i_max: 10,
            eps_a: 1e-10,
            eps_r: 1e-12,
            ls_red: 0.1,
            ls_min: 1e-5,
        }
    }
}

/// Damped Newton method.
///
/// Each iteration solves `J dx = -r` and takes the largest step `alpha * dx`, with
/// `alpha` reduced by `ls_red`, that decreases the residual norm.
/// Exhausting the iterations or the line search is reported as a non-converged
/// [`SolveStatus`].
#[derive(Debug, Clone, Default)]
pub struct NewtonSolver {
    config: NewtonConfig,
}

impl NewtonSolver {
    pub fn new(config: NewtonConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NewtonConfig {
        &self.config
    }

    fn is_converged(&self, err: f64, err0: f64) -> bool {
        err <= self.config.eps_a || err <= self.config.eps_r * err0
    }
}

impl NonlinearSolver for NewtonSolver {
    fn solve(
        &self,
        x0: &DVector<f64>,
        evaluator: &dyn Evaluator,
        ls: &mut dyn LinearSolver,
    ) -> RSTSResult<(DVector<f64>, SolveStatus)> {
        let mut x = x0.clone();
        let mut r = evaluator.residual(&x)?;
        let mut err = r.norm();
        let err0 = err;

        let mut n_iter = 0;
        loop {
            debug!("nls: iter: {}, residual: {:e}", n_iter, err);

            if !err.is_finite() {
                warn!("nls: residual is not finite");
                break;
            }
            if self.is_converged(err, err0) {
                return Ok((
                    x,
                    SolveStatus {
                        converged: true,
                        n_iter,
                        err,
                    },
                ));
            }
            if n_iter >= self.config.i_max {
                break;
            }

            let mtx = evaluator.tangent_matrix(&x)?;
            let dx = ls.solve(&-&r, &mtx)?;

            let mut alpha = 1.0;
            let accepted = loop {
                let x_new = &x + &dx * alpha;
                let r_new = evaluator.residual(&x_new)?;
                let err_new = r_new.norm();
                if err_new.is_finite() && err_new < err {
                    break Some((x_new, r_new, err_new));
                }

                alpha *= self.config.ls_red;
                if alpha < self.config.ls_min {
                    break None;
                }
                debug!("nls: line search, alpha: {:e}", alpha);
            };

            n_iter += 1;
            match accepted {
                Some((x_new, r_new, err_new)) => {
                    x = x_new;
                    r = r_new;
                    err = err_new;
                }
                None => {
                    warn!("nls: line search failed (residual {:e})", err);
                    break;
                }
            }
        }

        Ok((
            x,
            SolveStatus {
                converged: false,
                n_iter,
                err,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::LuSolver;
    use is_close::is_close;
    use nalgebra::DMatrix;
    use rsts_core::errors::RSTSError;

    /// r(x) = x^2 - c, componentwise
    struct Square {
        c: DVector<f64>,
    }

    impl Evaluator for Square {
        fn residual(&self, x: &DVector<f64>) -> RSTSResult<DVector<f64>> {
            Ok(x.component_mul(x) - &self.c)
        }

        fn tangent_matrix(&self, x: &DVector<f64>) -> RSTSResult<DMatrix<f64>> {
            Ok(DMatrix::from_diagonal(&(x * 2.0)))
        }
    }

    /// r(x) = x^2 + 1 has no real root
    struct NoRoot;

    impl Evaluator for NoRoot {
        fn residual(&self, x: &DVector<f64>) -> RSTSResult<DVector<f64>> {
            Ok(x.map(|v| v * v + 1.0))
        }

        fn tangent_matrix(&self, x: &DVector<f64>) -> RSTSResult<DMatrix<f64>> {
            Ok(DMatrix::from_diagonal(&(x * 2.0)))
        }
    }

    struct Failing;

    impl Evaluator for Failing {
        fn residual(&self, _x: &DVector<f64>) -> RSTSResult<DVector<f64>> {
            Err(RSTSError::ResidualEvaluation("negative density".to_string()))
        }

        fn tangent_matrix(&self, _x: &DVector<f64>) -> RSTSResult<DMatrix<f64>> {
            unreachable!()
        }
    }

    #[test]
    fn finds_square_roots() {
        let evaluator = Square {
            c: DVector::from_vec(vec![2.0, 9.0]),
        };
        let (x, status) = NewtonSolver::default()
            .solve(&DVector::from_element(2, 1.0), &evaluator, &mut LuSolver::new())
            .unwrap();

        assert!(status.converged);
        assert!(status.n_iter > 1);
        assert!(status.err <= 1e-10);
        assert!(is_close!(x[0], 2.0_f64.sqrt()));
        assert!(is_close!(x[1], 3.0));
    }

    #[test]
    fn zero_iterations_at_solution() {
        let evaluator = Square {
            c: DVector::from_element(1, 4.0),
        };
        let (x, status) = NewtonSolver::default()
            .solve(&DVector::from_element(1, 2.0), &evaluator, &mut LuSolver::new())
            .unwrap();

        assert_eq!(status.n_iter, 0);
        assert!(status.converged);
        assert_eq!(x[0], 2.0);
    }

    #[test]
    fn iteration_limit() {
        let solver = NewtonSolver::new(NewtonConfig {
            i_max: 1,
            ..Default::default()
        });
        let evaluator = Square {
            c: DVector::from_element(1, 100.0),
        };
        let (_, status) = solver
            .solve(&DVector::from_element(1, 1.0), &evaluator, &mut LuSolver::new())
            .unwrap();

        assert!(!status.converged);
        assert_eq!(status.n_iter, 1);
    }

    #[test]
    fn line_search_failure_is_not_an_error() {
        let (_, status) = NewtonSolver::default()
            .solve(&DVector::from_element(1, 0.5), &NoRoot, &mut LuSolver::new())
            .unwrap();
        assert!(!status.converged);
        assert!(status.err >= 1.0);
    }

    #[test]
    fn evaluation_errors_propagate() {
        let result =
            NewtonSolver::default().solve(&DVector::zeros(1), &Failing, &mut LuSolver::new());
        assert!(matches!(result, Err(RSTSError::ResidualEvaluation(_))));
    }

    #[test]
    fn config_from_toml() {
        let config: NewtonConfig = toml::from_str("i_max = 3\neps_a = 1e-6").unwrap();
        assert_eq!(config.i_max, 3);
        assert_eq!(config.eps_a, 1e-6);
        assert_eq!(config.ls_red, NewtonConfig::default().ls_red);
    }
}
