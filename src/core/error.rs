use thiserror::Error;

/// Errors raised by the projection engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    /// Unsupported model selector or distribution parameters that cannot be sampled.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Parameter set rejected before any trial runs.
    #[error("validation error: {0}")]
    Validation(String),

    /// Historical table is missing data the sampler asked for.
    #[error("data error: {0}")]
    Data(String),

    #[error("simulation cancelled")]
    Cancelled,
}
