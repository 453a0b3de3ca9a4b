use meter_math::{InvalidShearError, RootFindError, SingularMatrixError, SplineError};
use std::fmt;
use thiserror::Error;

/// Evaluation domain of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    RealSpace,
    Fourier,
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::RealSpace => write!(f, "real-space"),
            Domain::Fourier => write!(f, "Fourier"),
        }
    }
}

/// Errors produced while building profiles or rendering them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A scale parameter is zero, negative or non-finite.
    #[error("degenerate profile: {0}")]
    DegenerateProfile(String),

    /// A linear map with zero (or non-finite) determinant.
    #[error("singular transform: determinant={determinant:.6e}")]
    SingularTransform {
        /// Determinant of the rejected matrix.
        determinant: f64,
    },

    /// The Fourier working grid would exceed the configured limit.
    #[error("required FFT size {required} exceeds max_fft_size {limit}")]
    GridTooLarge {
        /// Effective grid size N·(2M+1) including alias folding.
        required: usize,
        /// Configured `max_fft_size`.
        limit: usize,
    },

    /// A parameter outside its domain.
    #[error("invalid parameter {name}={value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: String,
    },

    /// A numerical solver did not converge.
    #[error("{context} did not converge after {iterations} iterations")]
    Convergence { context: String, iterations: usize },

    /// The profile has no analytic representation in the requested domain.
    #[error("{profile} has no analytic {domain} representation")]
    NotAnalytic {
        profile: &'static str,
        domain: Domain,
    },

    /// Deposition outside the image under `EdgePolicy::Reject`.
    #[error("deposit at ({x:.3}, {y:.3}) lies outside the image")]
    OutOfBounds { x: f64, y: f64 },
}

impl RenderError {
    pub(crate) fn invalid(name: &'static str, value: f64, reason: impl Into<String>) -> Self {
        RenderError::InvalidParameter {
            name,
            value,
            reason: reason.into(),
        }
    }

    pub(crate) fn degenerate(message: impl Into<String>) -> Self {
        RenderError::DegenerateProfile(message.into())
    }
}

impl From<SingularMatrixError> for RenderError {
    fn from(err: SingularMatrixError) -> Self {
        RenderError::SingularTransform {
            determinant: err.determinant,
        }
    }
}

impl From<InvalidShearError> for RenderError {
    fn from(err: InvalidShearError) -> Self {
        RenderError::invalid("shear", err.magnitude, err.to_string())
    }
}

impl From<RootFindError> for RenderError {
    fn from(err: RootFindError) -> Self {
        let iterations = match &err {
            RootFindError::MaxIterations { iterations } => *iterations,
            _ => 0,
        };
        RenderError::Convergence {
            context: format!("root finding ({err})"),
            iterations,
        }
    }
}

impl From<SplineError> for RenderError {
    fn from(err: SplineError) -> Self {
        RenderError::Convergence {
            context: format!("table interpolation ({err})"),
            iterations: 0,
        }
    }
}

/// Check that a scale parameter is positive and finite.
pub(crate) fn require_scale(name: &str, value: f64) -> Result<f64, RenderError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(RenderError::degenerate(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

/// Check that a flux is finite (zero and negative fluxes are allowed).
pub(crate) fn require_flux(value: f64) -> Result<f64, RenderError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(RenderError::invalid("flux", value, "flux must be finite"))
    }
}
