use thiserror::Error;

/// Failures that are handled inside the substep loop by refining the substep
/// count. They never reach the caller directly; once the refinement ceiling is
/// hit the last one is wrapped into [`ConstitutiveError::SubstepExhausted`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RecoverableFailure {
    #[error("slip increment {increment:.3e} on system {system} exceeds tolerance {tolerance:.3e}")]
    SlipRateOverflow {
        system: usize,
        increment: f64,
        tolerance: f64,
    },
    #[error("stress residual {residual:.3e} not converged after {iterations} iterations")]
    StressResidualNonconvergence { iterations: usize, residual: f64 },
    #[error("state variables not converged after {iterations} iterations")]
    StateVariableNonconvergence { iterations: usize },
    #[error("dislocation density on system {system} would become negative ({density:.3e})")]
    NegativeDislocationDensity { system: usize, density: f64 },
    #[error("line search failed to reduce the stress residual")]
    LineSearchFailed,
    #[error("singular stress jacobian")]
    SingularJacobian,
}

/// Outcome of one attempt inside the substep loop.
pub type Attempt = std::result::Result<(), RecoverableFailure>;

#[derive(Debug, Error)]
pub enum ConstitutiveError {
    #[error(
        "constitutive failure at point {point} (t = {time}): {reason}; gave up after {substeps} substeps"
    )]
    SubstepExhausted {
        point: usize,
        time: f64,
        substeps: usize,
        reason: RecoverableFailure,
    },
    #[error("critical damage reached at point {point} (t = {time}): {damage} > {threshold}")]
    CriticalDamageReached {
        point: usize,
        time: f64,
        damage: f64,
        threshold: f64,
    },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("singular tensor: {0}")]
    SingularTensor(&'static str),
    #[error("array of length {actual} does not match {expected} values per point")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConstitutiveError>;
