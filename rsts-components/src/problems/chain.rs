use nalgebra::{DMatrix, DVector};
use rsts_core::dependency::DependencyGraph;
use rsts_core::errors::{RSTSError, RSTSResult};
use rsts_core::problem::{Evaluator, Problem};
use rsts_core::state::SolutionState;
use rsts_core::stepper::StepperState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Parameters for the coupled chain problem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoupledChainParameters {
    /// Degrees of freedom of each variable
    pub n_dof: usize,
    /// Strength of the cubic term
    pub alpha: f64,
    /// Coupling to the preceding variable
    pub kappa: f64,
    /// Source of each variable. Its length sets the number of variables
    pub sources: Vec<f64>,
}

/// A chain of nonlinear equations where each variable is driven by its predecessor
///
/// $$ x_i + \alpha x_i^3 - \kappa x_{i-1} = s_i (j + 1) $$
///
/// for every degree of freedom $j$ of the variables `x0`, `x1`, ..., with $x_{-1} = 0$.
/// The equations are written in terms of the virtual variables `q0`, `q1`, ... which
/// test the matching `x` variable.
///
/// The system is block lower triangular, so it can either be solved at once or one
/// variable after another.
#[derive(Debug, Clone)]
pub struct CoupledChain {
    parameters: CoupledChainParameters,
    /// Indices of the variables solved for, in state order
    members: Vec<usize>,
    /// Values of variables outside `members`, by index
    known: HashMap<usize, DVector<f64>>,
}

impl CoupledChain {
    pub fn from_parameters(parameters: CoupledChainParameters) -> Self {
        Self {
            members: (0..parameters.sources.len()).collect(),
            known: HashMap::new(),
            parameters,
        }
    }

    pub fn n_variable(&self) -> usize {
        self.parameters.sources.len()
    }

    pub fn variable_name(index: usize) -> String {
        format!("x{}", index)
    }

    fn virtual_name(index: usize) -> String {
        format!("q{}", index)
    }

    fn index_of(&self, name: &str) -> RSTSResult<usize> {
        name.strip_prefix('x')
            .and_then(|index| index.parse::<usize>().ok())
            .filter(|index| *index < self.n_variable())
            .ok_or_else(|| RSTSError::UnknownVariable(name.to_string()))
    }

    fn position(&self, index: usize) -> Option<usize> {
        self.members.iter().position(|m| *m == index)
    }

    fn check_vector(&self, x: &DVector<f64>) -> RSTSResult<()> {
        let expected = self.members.len() * self.parameters.n_dof;
        if x.len() != expected {
            return Err(RSTSError::DimensionMismatch {
                name: "state".to_string(),
                expected,
                got: x.len(),
            });
        }
        Ok(())
    }

    /// Value of the predecessor of variable `index`
    fn predecessor(&self, index: usize, x: &DVector<f64>) -> RSTSResult<DVector<f64>> {
        let n = self.parameters.n_dof;
        if index == 0 {
            return Ok(DVector::zeros(n));
        }
        if let Some(pos) = self.position(index - 1) {
            return Ok(x.rows(pos * n, n).into_owned());
        }
        self.known
            .get(&(index - 1))
            .cloned()
            .ok_or_else(|| RSTSError::UnknownVariable(Self::variable_name(index - 1)))
    }
}

impl Evaluator for CoupledChain {
    fn residual(&self, x: &DVector<f64>) -> RSTSResult<DVector<f64>> {
        self.check_vector(x)?;
        let CoupledChainParameters {
            n_dof: n,
            alpha,
            kappa,
            ..
        } = self.parameters;

        let mut r = DVector::zeros(x.len());
        for (pos, &index) in self.members.iter().enumerate() {
            let prev = self.predecessor(index, x)?;
            let source = self.parameters.sources[index];
            for j in 0..n {
                let xi = x[pos * n + j];
                r[pos * n + j] = xi + alpha * xi.powi(3) - kappa * prev[j] - source * (j + 1) as f64;
            }
        }
        Ok(r)
    }

    fn tangent_matrix(&self, x: &DVector<f64>) -> RSTSResult<DMatrix<f64>> {
        self.check_vector(x)?;
        let n = self.parameters.n_dof;
        let alpha = self.parameters.alpha;

        let mut mtx = DMatrix::zeros(x.len(), x.len());
        for (pos, &index) in self.members.iter().enumerate() {
            for j in 0..n {
                let row = pos * n + j;
                mtx[(row, row)] = 1.0 + 3.0 * alpha * x[row].powi(2);
            }
            if let Some(prev) = index.checked_sub(1).and_then(|i| self.position(i)) {
                for j in 0..n {
                    mtx[(pos * n + j, prev * n + j)] = -self.parameters.kappa;
                }
            }
        }
        Ok(mtx)
    }
}

impl Problem for CoupledChain {
    fn create_state(&self) -> SolutionState {
        self.members
            .iter()
            .fold(SolutionState::new(), |state, &index| {
                state.with_variable(&Self::variable_name(index), self.parameters.n_dof)
            })
    }

    fn time_update(&mut self, _ts: Option<&StepperState>) -> RSTSResult<()> {
        Ok(())
    }

    fn is_linear(&self) -> bool {
        self.parameters.alpha == 0.0
    }

    fn variable_dependencies(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for &index in &self.members {
            let mut dependencies = vec![Self::virtual_name(index)];
            if index > 0 {
                dependencies.push(Self::variable_name(index - 1));
            }
            graph.insert(Self::virtual_name(index), dependencies);
        }
        graph
    }

    fn dual_names(&self) -> HashMap<String, String> {
        self.members
            .iter()
            .map(|&index| (Self::virtual_name(index), Self::variable_name(index)))
            .collect()
    }

    fn create_subproblem(
        &self,
        block: &[String],
        solved: &SolutionState,
    ) -> RSTSResult<Box<dyn Problem>> {
        let members = block
            .iter()
            .map(|name| self.index_of(name))
            .collect::<RSTSResult<Vec<_>>>()?;

        let mut known = HashMap::new();
        for name in solved.names() {
            let index = self.index_of(&name)?;
            if let Some(values) = solved.get(&name) {
                known.insert(index, values.clone());
            }
        }

        Ok(Box::new(Self {
            parameters: self.parameters.clone(),
            members,
            known,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> CoupledChain {
        CoupledChain::from_parameters(CoupledChainParameters {
            n_dof: 2,
            alpha: 0.0,
            kappa: 0.5,
            sources: vec![1.0, 2.0, 3.0],
        })
    }

    #[test]
    fn blocks_follow_the_chain() {
        let problem = chain();
        let blocks = problem
            .variable_dependencies()
            .replace_virtuals(&problem.dual_names())
            .resolve()
            .unwrap();
        assert_eq!(blocks, vec![vec!["x0"], vec!["x1"], vec!["x2"]]);
    }

    #[test]
    fn linear_residual() {
        let problem = chain();
        let x = DVector::from_vec(vec![1.0, 2.0, 2.5, 5.0, 0.0, 0.0]);
        let r = problem.residual(&x).unwrap();
        assert_eq!(r.rows(0, 4).into_owned(), DVector::<f64>::zeros(4));
        assert_eq!(r[4], -0.5 * 2.5 - 3.0);

        let mtx = problem.tangent_matrix(&x).unwrap();
        assert_eq!(mtx[(2, 0)], -0.5);
        assert_eq!(mtx[(3, 1)], -0.5);
        assert_eq!(mtx[(2, 2)], 1.0);
        assert_eq!(mtx[(0, 2)], 0.0);
    }

    #[test]
    fn subproblem_uses_solved_values() {
        let problem = chain();
        let mut solved = SolutionState::new().with_variable("x0", 2);
        let parts = HashMap::from([("x0".to_string(), DVector::from_vec(vec![1.0, 2.0]))]);
        solved.set_parts(&parts).unwrap();

        let sub = problem
            .create_subproblem(&["x1".to_string()], &solved)
            .unwrap();
        assert_eq!(sub.create_state().names(), vec!["x1"]);

        let r = sub.residual(&DVector::from_vec(vec![2.5, 5.0])).unwrap();
        assert_eq!(r, DVector::zeros(2));
    }

    #[test]
    fn subproblem_missing_predecessor() {
        let problem = chain();
        let sub = problem
            .create_subproblem(&["x2".to_string()], &SolutionState::new())
            .unwrap();
        let result = sub.residual(&DVector::zeros(2));
        assert!(matches!(result, Err(RSTSError::UnknownVariable(name)) if name == "x1"));
    }

    #[test]
    fn unknown_block_variable() {
        let result = chain().create_subproblem(&["y".to_string()], &SolutionState::new());
        assert!(matches!(result, Err(RSTSError::UnknownVariable(_))));
        let result = chain().create_subproblem(&["x7".to_string()], &SolutionState::new());
        assert!(matches!(result, Err(RSTSError::UnknownVariable(_))));
    }
}
