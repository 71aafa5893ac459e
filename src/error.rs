/*
Error taxonomy for the coupling engine.

Only configuration problems are errors. Numeric guards (clamped lambda,
non-negative resampled kinetic energy, zero thermal force on massless links)
are silent corrections and never surface here.
*/

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CouplingError {
    #[error("invalid coupling configuration: {0}")]
    Config(String),

    #[error("unsupported ensemble: {0}")]
    UnsupportedEnsemble(String),

    #[error("barostat is coupled to temperature group {group} which has no degrees of freedom")]
    ZeroDegreesOfFreedom { group: usize },

    #[error("v-rescale was called for a group with {0} degrees of freedom, but for fewer than 3 only integer values are supported")]
    NonIntegerDof(f64),

    #[error("box matrix is singular")]
    SingularBox,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CouplingError {
    pub fn config(message: impl Into<String>) -> Self {
        CouplingError::Config(message.into())
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        CouplingError::UnsupportedEnsemble(message.into())
    }
}

pub type CouplingResult<T> = Result<T, CouplingError>;
