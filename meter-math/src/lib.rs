//! meter-math - Numerical primitives for surface-brightness rendering
//!
//! This crate provides the small numerical toolkit used by the `skyrender`
//! engine:
//!
//! - **Matrix** - 2x2 linear maps (rotation, scale, reduced shear), checked inversion
//! - **Spline** - Natural cubic spline interpolation of tabulated functions
//! - **Quadrature** - Gauss-Legendre and composite 2D Simpson rules
//! - **Roots** - Bracketed bisection with bounded iteration counts
//! - **Special** - Bessel J0/J1, erf, gamma and incomplete gamma
//! - **Summation** - Neumaier compensated summation
//!
//! # Example
//!
//! ```rust
//! use meter_math::{bisect, regularized_lower_gamma};
//!
//! // Sérsic b_n for n = 1 solves P(2, b) = 1/2
//! let b = bisect(|b| regularized_lower_gamma(2.0, b) - 0.5, 0.0, 10.0, 1e-12, 200).unwrap();
//! assert!((b - 1.678).abs() < 1e-3);
//! ```

pub mod matrix2;
pub mod quadrature;
pub mod roots;
pub mod special;
pub mod spline;
pub mod summation;

// Re-export commonly used types
pub use matrix2::{
    checked_determinant, invert_matrix, rotation_matrix, scale_matrix, shear_matrix,
    singular_values, transpose_apply, InvalidShearError, SingularMatrixError,
};
pub use quadrature::{simpson_2d, GaussLegendre};
pub use roots::{bisect, bracket_upward, RootFindError, DEFAULT_MAX_ITERATIONS};
pub use special::{
    bessel_j0, bessel_j1, circle_overlap_area, erf, gamma, jinc, ln_gamma,
    regularized_lower_gamma, sinc,
};
pub use spline::{CubicSpline, SplineError};
pub use summation::{neumaier_sum, NeumaierSum};
