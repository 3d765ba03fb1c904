use bridge_spec::SpecError;
use thiserror::Error;

/// Errors from selecting or configuring a bundled code.
#[derive(Debug, Error)]
pub enum CodeError {
    #[error("unknown code '{0}'")]
    UnknownCode(String),

    #[error("unknown huayno mode '{0}'")]
    UnknownMode(String),

    #[error("unknown integrator '{0}'")]
    UnknownIntegrator(String),

    #[error("unknown boundary condition '{0}'")]
    UnknownBoundary(String),

    #[error(transparent)]
    Spec(#[from] SpecError),
}
