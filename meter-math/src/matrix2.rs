//! 2x2 linear maps on the sky plane
//!
//! Provides the linear maps used to distort surface-brightness profiles
//! (rotation, anisotropic scaling, reduced shear) together with checked
//! inversion and singular-value helpers for sizing sampling grids.

use nalgebra::{Matrix2, Vector2};
use thiserror::Error;

/// A linear map that cannot be inverted
#[derive(Error, Debug, Clone, PartialEq)]
#[error("linear map is not invertible (det {determinant:.6e})")]
pub struct SingularMatrixError {
    /// Offending determinant: zero, negligible against the entries, or NaN
    pub determinant: f64,
}

/// Error when a reduced shear lies outside the unit disc
#[derive(Error, Debug, Clone, PartialEq)]
#[error("shear magnitude |g|={magnitude:.6} must be < 1")]
pub struct InvalidShearError {
    /// Magnitude of the requested shear
    pub magnitude: f64,
}

/// Relative threshold for considering a determinant as zero.
///
/// Compared against the squared Frobenius norm so that matrices with very
/// small but well-conditioned entries (e.g. degrees per pixel) are accepted.
const DETERMINANT_EPSILON: f64 = 1e-14;

/// Check that a matrix is finite and not (numerically) singular.
///
/// # Arguments
/// * `matrix` - The 2x2 matrix to check
///
/// # Returns
/// * `Ok(f64)` - The determinant
/// * `Err(SingularMatrixError)` - If the matrix cannot be inverted
pub fn checked_determinant(matrix: &Matrix2<f64>) -> Result<f64, SingularMatrixError> {
    let det = matrix.determinant();
    let scale = matrix.norm_squared();

    if !det.is_finite() || !scale.is_finite() || det.abs() <= DETERMINANT_EPSILON * scale {
        return Err(SingularMatrixError { determinant: det });
    }
    Ok(det)
}

/// Inverse of `matrix`, rejecting the maps [`checked_determinant`] rejects.
pub fn invert_matrix(matrix: &Matrix2<f64>) -> Result<Matrix2<f64>, SingularMatrixError> {
    let determinant = checked_determinant(matrix)?;
    matrix
        .try_inverse()
        .ok_or(SingularMatrixError { determinant })
}

/// Counter-clockwise rotation by `theta` radians.
pub fn rotation_matrix(theta: f64) -> Matrix2<f64> {
    let (sin, cos) = theta.sin_cos();
    Matrix2::new(cos, -sin, sin, cos)
}

/// Independent stretch of the two axes.
pub fn scale_matrix(x_scale: f64, y_scale: f64) -> Matrix2<f64> {
    Matrix2::from_diagonal(&Vector2::new(x_scale, y_scale))
}

/// Create the area-preserving distortion matrix for a reduced shear (g1, g2).
///
/// ```text
/// M = 1/sqrt(1 - |g|²) * | 1 + g1    g2   |
///                        |   g2    1 - g1 |
/// ```
///
/// The result has unit determinant, so a sheared profile keeps its flux.
pub fn shear_matrix(g1: f64, g2: f64) -> Result<Matrix2<f64>, InvalidShearError> {
    let g_sq = g1 * g1 + g2 * g2;
    if !g_sq.is_finite() || g_sq >= 1.0 {
        return Err(InvalidShearError {
            magnitude: g_sq.sqrt(),
        });
    }
    let norm = 1.0 / (1.0 - g_sq).sqrt();
    Ok(Matrix2::new(1.0 + g1, g2, g2, 1.0 - g1) * norm)
}

/// Singular values of a 2x2 matrix as `(largest, smallest)`.
///
/// Closed form from the eigenvalues of MᵀM; used to bound how much a
/// linear map stretches real space (largest) and compresses k-space (smallest).
pub fn singular_values(matrix: &Matrix2<f64>) -> (f64, f64) {
    let mtm = matrix.transpose() * matrix;
    let trace = mtm.trace();
    let det = mtm.determinant();
    let disc = (0.25 * trace * trace - det).max(0.0).sqrt();
    let big = (0.5 * trace + disc).max(0.0).sqrt();
    let small = (0.5 * trace - disc).max(0.0).sqrt();
    (big, small)
}

/// Apply the transpose of `matrix` to a vector.
///
/// Frequency vectors transform with Mᵀ when positions transform with M.
pub fn transpose_apply(matrix: &Matrix2<f64>, v: &Vector2<f64>) -> Vector2<f64> {
    matrix.tr_mul(v)
}
