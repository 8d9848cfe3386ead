//! Solution state container.
//!
//! A [`SolutionState`] holds the reduced degree-of-freedom vectors of an ordered set of
//! variables. The flat vector seen by the nonlinear solver is the concatenation of the
//! variable vectors in declaration order.
use crate::errors::{RSTSError, RSTSResult};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;

/// A single variable of a [`SolutionState`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVariable {
    name: String,
    values: DVector<f64>,
    /// Essential boundary conditions as `(dof, value)` pairs
    ebc: Vec<(usize, f64)>,
    initial_condition: Option<DVector<f64>>,
    history: Option<DVector<f64>>,
}

impl StateVariable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &DVector<f64> {
        &self.values
    }

    pub fn n_dof(&self) -> usize {
        self.values.len()
    }

    /// Values at the start of the current step, if history was initialised
    pub fn history(&self) -> Option<&DVector<f64>> {
        self.history.as_ref()
    }
}

/// Collection of named variable vectors.
///
/// Cloning a state produces an independent deep copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolutionState {
    variables: Vec<StateVariable>,
}

impl SolutionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a zero-initialised variable with `n_dof` degrees of freedom
    pub fn with_variable(mut self, name: &str, n_dof: usize) -> Self {
        self.variables.push(StateVariable {
            name: name.to_string(),
            values: DVector::zeros(n_dof),
            ebc: vec![],
            initial_condition: None,
            history: None,
        });
        self
    }

    /// Prescribe the value of a degree of freedom.
    ///
    /// The value is enforced by [`SolutionState::apply_ebc`].
    pub fn with_ebc(mut self, name: &str, dof: usize, value: f64) -> RSTSResult<Self> {
        let variable = self.variable_mut(name)?;
        if dof >= variable.n_dof() {
            return Err(RSTSError::OutOfRange {
                step: dof as i64,
                min: 0,
                max: variable.n_dof() as i64 - 1,
            });
        }
        variable.ebc.retain(|(d, _)| *d != dof);
        variable.ebc.push((dof, value));
        Ok(self)
    }

    /// Set the initial condition of a variable, enforced by [`SolutionState::apply_ic`]
    pub fn with_initial_condition(mut self, name: &str, values: DVector<f64>) -> RSTSResult<Self> {
        let variable = self.variable_mut(name)?;
        check_dimension(name, variable.n_dof(), values.len())?;
        variable.initial_condition = Some(values);
        Ok(self)
    }

    pub fn variables(&self) -> &[StateVariable] {
        &self.variables
    }

    pub fn names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.iter().any(|v| v.name == name)
    }

    /// Total number of degrees of freedom
    pub fn n_dof(&self) -> usize {
        self.variables.iter().map(|v| v.n_dof()).sum()
    }

    pub fn get(&self, name: &str) -> Option<&DVector<f64>> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| &v.values)
    }

    /// Position of a variable in the flat state vector
    pub fn range_of(&self, name: &str) -> Option<Range<usize>> {
        let mut offset = 0;
        for variable in &self.variables {
            if variable.name == name {
                return Some(offset..offset + variable.n_dof());
            }
            offset += variable.n_dof();
        }
        None
    }

    /// Copy of the variable vectors keyed by name
    pub fn get_parts(&self) -> HashMap<String, DVector<f64>> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.values.clone()))
            .collect()
    }

    /// Overwrite the vectors of the named variables.
    ///
    /// Variables not present in `parts` are left untouched.
    pub fn set_parts(&mut self, parts: &HashMap<String, DVector<f64>>) -> RSTSResult<()> {
        // Validate everything first so that a failure leaves the state unchanged
        for (name, values) in parts {
            let variable = self.variable(name)?;
            check_dimension(name, variable.n_dof(), values.len())?;
        }
        for variable in self.variables.iter_mut() {
            if let Some(values) = parts.get(&variable.name) {
                variable.values.copy_from(values);
            }
        }
        Ok(())
    }

    /// Concatenation of all variable vectors
    pub fn to_vector(&self) -> DVector<f64> {
        let mut out = DVector::zeros(self.n_dof());
        let mut offset = 0;
        for variable in &self.variables {
            out.rows_mut(offset, variable.n_dof())
                .copy_from(&variable.values);
            offset += variable.n_dof();
        }
        out
    }

    /// Split a flat vector back into the variables
    pub fn set_vector(&mut self, vec: &DVector<f64>) -> RSTSResult<()> {
        check_dimension("state", self.n_dof(), vec.len())?;
        let mut offset = 0;
        for variable in self.variables.iter_mut() {
            let n_dof = variable.n_dof();
            variable.values.copy_from(&vec.rows(offset, n_dof));
            offset += n_dof;
        }
        Ok(())
    }

    /// Enforce the essential boundary conditions on the current values
    pub fn apply_ebc(&mut self) {
        for variable in self.variables.iter_mut() {
            for (dof, value) in &variable.ebc {
                variable.values[*dof] = *value;
            }
        }
    }

    /// Replace the current values with the initial conditions, where given
    pub fn apply_ic(&mut self) {
        for variable in self.variables.iter_mut() {
            if let Some(ic) = &variable.initial_condition {
                variable.values.copy_from(ic);
            }
        }
    }

    /// Record the current values as the history of each variable
    pub fn init_history(&mut self) {
        for variable in self.variables.iter_mut() {
            variable.history = Some(variable.values.clone());
        }
    }

    /// New state containing only the named variables, in the order of this state
    pub fn subset(&self, names: &[String]) -> RSTSResult<SolutionState> {
        for name in names {
            self.variable(name)?;
        }
        Ok(SolutionState {
            variables: self
                .variables
                .iter()
                .filter(|v| names.contains(&v.name))
                .cloned()
                .collect(),
        })
    }

    fn variable(&self, name: &str) -> RSTSResult<&StateVariable> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| RSTSError::UnknownVariable(name.to_string()))
    }

    fn variable_mut(&mut self, name: &str) -> RSTSResult<&mut StateVariable> {
        self.variables
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| RSTSError::UnknownVariable(name.to_string()))
    }
}

fn check_dimension(name: &str, expected: usize, got: usize) -> RSTSResult<()> {
    if expected != got {
        return Err(RSTSError::DimensionMismatch {
            name: name.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SolutionState {
        SolutionState::new()
            .with_variable("u", 2)
            .with_variable("p", 3)
    }

    #[test]
    fn flat_vector_layout() {
        let mut state = state();
        state
            .set_vector(&DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0]))
            .unwrap();

        assert_eq!(state.n_dof(), 5);
        assert_eq!(state.get("u").unwrap().as_slice(), &[1.0, 2.0]);
        assert_eq!(state.get("p").unwrap().as_slice(), &[3.0, 4.0, 5.0]);
        assert_eq!(state.range_of("p"), Some(2..5));
        assert_eq!(state.range_of("missing"), None);
        assert_eq!(state.to_vector().as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn set_vector_checks_length() {
        let mut state = state();
        let res = state.set_vector(&DVector::zeros(4));
        assert!(matches!(
            res,
            Err(RSTSError::DimensionMismatch {
                expected: 5,
                got: 4,
                ..
            })
        ));
    }

    #[test]
    fn parts_round_trip() {
        let mut state = state();
        let mut parts = state.get_parts();
        parts.insert("p".to_string(), DVector::from_vec(vec![7.0, 8.0, 9.0]));
        parts.remove("u");
        state.set_parts(&parts).unwrap();

        assert_eq!(state.get("p").unwrap().as_slice(), &[7.0, 8.0, 9.0]);
        assert_eq!(state.get("u").unwrap().as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn set_parts_is_atomic() {
        let mut state = state();
        let mut parts = HashMap::new();
        parts.insert("u".to_string(), DVector::from_vec(vec![1.0, 1.0]));
        parts.insert("p".to_string(), DVector::from_vec(vec![1.0]));

        assert!(state.set_parts(&parts).is_err());
        assert_eq!(state.to_vector(), DVector::zeros(5));

        let mut parts = HashMap::new();
        parts.insert("q".to_string(), DVector::from_vec(vec![1.0]));
        assert!(matches!(
            state.set_parts(&parts),
            Err(RSTSError::UnknownVariable(_))
        ));
    }

    #[test]
    fn conditions_and_history() {
        let mut state = state()
            .with_initial_condition("u", DVector::from_vec(vec![3.0, 4.0]))
            .unwrap()
            .with_ebc("p", 0, -1.0)
            .unwrap();

        state.apply_ic();
        state.apply_ebc();
        state.init_history();

        assert_eq!(state.to_vector().as_slice(), &[3.0, 4.0, -1.0, 0.0, 0.0]);
        assert_eq!(
            state.variables()[0].history().unwrap().as_slice(),
            &[3.0, 4.0]
        );

        assert!(state.clone().with_ebc("p", 3, 0.0).is_err());
        assert!(state
            .clone()
            .with_initial_condition("u", DVector::zeros(3))
            .is_err());
    }

    #[test]
    fn clone_is_independent() {
        let state = state();
        let mut copy = state.clone();
        copy.set_vector(&DVector::from_element(5, 1.0)).unwrap();
        assert_eq!(state.to_vector(), DVector::zeros(5));
    }

    #[test]
    fn subset_keeps_declaration_order() {
        let state = state().with_variable("t", 1);
        let sub = state
            .subset(&["t".to_string(), "u".to_string()])
            .unwrap();
        assert_eq!(sub.names(), vec!["u".to_string(), "t".to_string()]);
        assert!(state.subset(&["x".to_string()]).is_err());
    }
}
