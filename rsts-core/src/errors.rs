use thiserror::Error;

/// Error type for invalid operations.
#[derive(Error, Debug)]
pub enum RSTSError {
    #[error("{0}")]
    Error(String),
    #[error("Invalid time interval: t0={t0} must be less than t1={t1}")]
    InvalidInterval { t0: f64, t1: f64 },
    #[error("Invalid time step dt={0}. The time step must be positive and finite")]
    InvalidTimeStep(f64),
    #[error("Time step {step} is out of range. Steps must be in [{min}, {max}]")]
    OutOfRange { step: i64, min: i64, max: i64 },
    #[error("Unsupported adaptivity parameter {name}={value}: {reason}")]
    InvalidAdaptivity {
        name: String,
        value: f64,
        reason: String,
    },
    #[error("Cyclic dependency detected involving variable '{variable}'. Variables cannot be ordered into blocks")]
    CyclicDependency { variable: String },
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("Dimension mismatch for '{name}': expected {expected}, got {got}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("Residual evaluation failed: {0}")]
    ResidualEvaluation(String),
    #[error("Matrix evaluation failed: {0}")]
    MatrixEvaluation(String),
    #[error("Linear solve failed: {0}")]
    LinearSolve(String),
    #[error("Nonlinear solve did not converge at time {time} with the minimal time step dt={dt}")]
    StepSizeFloorReached { time: f64, dt: f64 },
    #[error("Invalid solver configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Convenience type for `Result<T, RSTSError>`.
pub type RSTSResult<T> = Result<T, RSTSError>;
