//! Error types.
//!
//! - `AppError` is the application boundary error: a message plus the process
//!   exit code (2 = input/config, 4 = computation).
//! - `FitError` is the distinct failure surface of the binding-curve fitter.
//!   Callers that fit many titrations keep going on a `FitError` and report it
//!   per titration.

use thiserror::Error;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Why a binding-curve fit was refused or failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("concentration and response series differ in length ({conc_len} vs {resp_len})")]
    MismatchedInputs { conc_len: usize, resp_len: usize },

    #[error("need at least {min} points to fit, got {got}")]
    TooFewPoints { got: usize, min: usize },

    #[error("concentration #{index} is invalid ({value}); concentrations must be finite and >= 0")]
    InvalidConcentration { index: usize, value: f64 },

    #[error("need at least {min} distinct concentrations, got {distinct}")]
    DegenerateConcentrations { distinct: usize, min: usize },

    #[error("response #{index} is not finite")]
    NonFiniteResponse { index: usize },

    #[error("responses have zero variance; the binding curve is not identifiable")]
    ZeroVariance,

    #[error("invalid kd bound: max_kd={max_kd} (must be finite and > 0)")]
    InvalidBounds { max_kd: f64 },

    #[error("initial guess for {name} is not finite ({value})")]
    InvalidGuess { name: &'static str, value: f64 },

    #[error("invalid fit options: {0}")]
    InvalidOptions(String),

    #[error("fit did not converge after {iterations} iterations (sse={sse})")]
    NotConverged { iterations: usize, sse: f64 },

    #[error("numerical failure during fit: {0}")]
    NumericalFailure(String),
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let code = match err {
            FitError::InvalidBounds { .. } | FitError::InvalidOptions(_) => 2,
            _ => 4,
        };
        AppError::new(code, format!("Fit failed: {err}"))
    }
}
