//! Time stepping solvers for discretised systems of equations.
//!
//! The engine lives in [`rsts_core`] and the reference Newton and LU solvers and model
//! problems in [`rsts_components`]. This crate ties them together behind a single
//! configuration file:
//!
//! ```toml
//! [solver]
//! kind = "adaptive"
//! t1 = 2.0
//! n_step = 21
//!
//! [newton]
//! i_max = 6
//! ```
pub use rsts_components as components;
pub use rsts_core as engine;

use log::debug;
use rsts_components::linear::LuSolver;
use rsts_components::newton::{NewtonConfig, NewtonSolver};
use rsts_core::config::SolverConfig;
use rsts_core::errors::{RSTSError, RSTSResult};
use rsts_core::solvers::Strategy;
use serde::{Deserialize, Serialize};

/// Solver selection together with the parameters of the nonlinear solver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub solver: SolverConfig,
    #[serde(default)]
    pub newton: NewtonConfig,
}

impl Settings {
    pub fn from_toml_str(s: &str) -> RSTSResult<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> RSTSResult<String> {
        toml::to_string(self).map_err(|e| RSTSError::Error(e.to_string()))
    }

    /// Build the configured solver using Newton iterations with dense LU solves
    pub fn strategy(&self) -> RSTSResult<Strategy> {
        let strategy = Strategy::from_config(
            &self.solver,
            Box::new(NewtonSolver::new(self.newton.clone())),
            Box::new(LuSolver::new()),
        )?;
        debug!("Using the {} solver", strategy.name());
        Ok(strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newton_defaults() {
        let settings = Settings::from_toml_str("[solver]\nkind = \"stationary\"").unwrap();
        assert_eq!(settings.solver, SolverConfig::Stationary);
        assert_eq!(settings.newton, NewtonConfig::default());
        assert_eq!(settings.strategy().unwrap().name(), "stationary");
    }

    #[test]
    fn missing_solver() {
        assert!(matches!(
            Settings::from_toml_str("[newton]\ni_max = 2"),
            Err(RSTSError::Config(_))
        ));
    }

    #[test]
    fn round_trip() {
        let settings = Settings::from_toml_str(
            r#"
            [solver]
            kind = "newmark"
            n_step = 5
            beta2 = 0.25

            [newton]
            i_max = 3
            "#,
        )
        .unwrap();
        let text = settings.to_toml_string().unwrap();
        assert_eq!(Settings::from_toml_str(&text).unwrap(), settings);
    }
}
