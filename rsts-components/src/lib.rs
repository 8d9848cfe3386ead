//! Reference collaborators for the `rsts-core` solvers.
//!
//! - [`linear::LuSolver`] is a dense LU linear solver that reuses its factorisation
//! - [`newton::NewtonSolver`] is a damped Newton method with a backtracking line search
//! - [`problems`] contains small model problems used to exercise the time stepping solvers
pub mod linear;
pub mod newton;
pub mod problems;
