pub mod adaptive;
pub mod config;
pub mod dependency;
pub mod errors;
pub mod executor;
pub mod newmark;
pub mod problem;
pub mod solvers;
pub mod state;
pub mod stepper;
