//! Error types for the optimizer and the rebalancing simulator.

use thiserror::Error;

/// Main error type for the advisor library.
///
/// Optimizer non-convergence is deliberately absent: it is reported through
/// `OptimizationResult::converged` and never aborts a run.
#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for advisor operations.
pub type Result<T> = std::result::Result<T, AdvisorError>;
