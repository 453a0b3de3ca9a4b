//! Natural cubic spline interpolation.
//!
//! Used to interpolate tabulated radial Fourier transforms, whose samples are
//! smooth but expensive to compute one at a time.

use thiserror::Error;

/// Errors raised while building a spline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SplineError {
    #[error("X and Y vectors must have same length ({x_len} != {y_len})")]
    MismatchedLengths { x_len: usize, y_len: usize },
    #[error("Need at least 2 points for interpolation, got {0}")]
    InsufficientData(usize),
    #[error("X values must be strictly ascending (index {0})")]
    UnsortedData(usize),
    #[error("Non-finite sample at index {0}")]
    NonFinite(usize),
}

/// Cubic spline interpolation for smooth curve fitting
///
/// Implements natural cubic spline interpolation (second derivatives are zero
/// at the endpoints). Each segment has the form:
///
/// S(x) = a + b(x-xi) + c(x-xi)² + d(x-xi)³
///
/// # Examples
///
/// ```rust
/// use meter_math::spline::CubicSpline;
///
/// let x = vec![0.0, 1.0, 2.0, 3.0];
/// let y = vec![0.0, 1.0, 4.0, 9.0];
/// let spline = CubicSpline::new(x, y).unwrap();
///
/// let interpolated = spline.evaluate(1.5);
/// assert!((interpolated - 2.25).abs() < 0.1);
/// ```
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    coeffs: Vec<[f64; 4]>, // a, b, c, d coefficients for each segment
    y_last: f64,
}

impl CubicSpline {
    /// Create a new cubic spline from input points
    ///
    /// # Arguments
    /// * `x` - X coordinates (strictly ascending)
    /// * `y` - Y coordinates corresponding to x values
    ///
    /// # Performance
    /// Construction time is O(n) (Thomas algorithm on the tridiagonal system).
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, SplineError> {
        if x.len() != y.len() {
            return Err(SplineError::MismatchedLengths {
                x_len: x.len(),
                y_len: y.len(),
            });
        }
        if x.len() < 2 {
            return Err(SplineError::InsufficientData(x.len()));
        }
        for i in 0..x.len() {
            if !x[i].is_finite() || !y[i].is_finite() {
                return Err(SplineError::NonFinite(i));
            }
            if i > 0 && x[i] <= x[i - 1] {
                return Err(SplineError::UnsortedData(i));
            }
        }

        let coeffs = Self::compute_coefficients(&x, &y);
        let y_last = y[y.len() - 1];
        Ok(Self { x, coeffs, y_last })
    }

    fn compute_coefficients(x: &[f64], y: &[f64]) -> Vec<[f64; 4]> {
        let n = x.len();
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let mut alpha = vec![0.0; n - 1];

        for i in 1..n - 1 {
            alpha[i] = (3.0 / h[i]) * (y[i + 1] - y[i]) - (3.0 / h[i - 1]) * (y[i] - y[i - 1]);
        }

        // Solve tridiagonal system for second derivatives
        let mut l = vec![1.0; n];
        let mut mu = vec![0.0; n];
        let mut z = vec![0.0; n];

        for i in 1..n - 1 {
            l[i] = 2.0 * (x[i + 1] - x[i - 1]) - h[i - 1] * mu[i - 1];
            mu[i] = h[i] / l[i];
            z[i] = (alpha[i] - h[i - 1] * z[i - 1]) / l[i];
        }

        let mut c = vec![0.0; n];
        let mut coeffs = vec![[0.0; 4]; n - 1];

        for j in (0..n - 1).rev() {
            c[j] = z[j] - mu[j] * c[j + 1];
            let b = (y[j + 1] - y[j]) / h[j] - h[j] * (c[j + 1] + 2.0 * c[j]) / 3.0;
            let d = (c[j + 1] - c[j]) / (3.0 * h[j]);
            coeffs[j] = [y[j], b, c[j], d];
        }
        coeffs
    }

    /// Domain covered by the knots as `(first, last)`.
    pub fn x_range(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }

    /// Evaluate the spline at a given x value
    ///
    /// Outside the knot range the boundary value is returned (no extrapolation).
    pub fn evaluate(&self, x: f64) -> f64 {
        if x <= self.x[0] {
            return self.coeffs[0][0];
        }
        if x >= self.x[self.x.len() - 1] {
            return self.y_last;
        }

        let segment = self.find_segment(x);
        let dx = x - self.x[segment];
        let [a, b, c, d] = self.coeffs[segment];

        a + dx * (b + dx * (c + dx * d))
    }

    /// Binary search for the segment whose left knot is at or below `x`.
    fn find_segment(&self, x: f64) -> usize {
        let mut left = 0;
        let mut right = self.x.len() - 1;

        while left < right - 1 {
            let mid = (left + right) / 2;
            if x < self.x[mid] {
                right = mid;
            } else {
                left = mid;
            }
        }
        left
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_interpolation() {
        let spline = CubicSpline::new(vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        assert!((spline.evaluate(0.5) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_passes_through_knots() {
        let x = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        let y = vec![0.0, 1.0, 0.0, -1.0, 0.0];
        let spline = CubicSpline::new(x.clone(), y.clone()).unwrap();

        for i in 0..x.len() {
            assert!((spline.evaluate(x[i]) - y[i]).abs() < 1e-10);
        }
    }

    #[test]
    fn test_mismatched_lengths() {
        let err = CubicSpline::new(vec![0.0, 1.0, 2.0], vec![0.0, 1.0]).unwrap_err();
        assert_eq!(err, SplineError::MismatchedLengths { x_len: 3, y_len: 2 });
    }

    #[test]
    fn test_unsorted_x() {
        let err = CubicSpline::new(vec![0.0, 2.0, 1.0], vec![0.0, 4.0, 1.0]).unwrap_err();
        assert_eq!(err, SplineError::UnsortedData(2));
    }

    #[test]
    fn test_boundary_conditions() {
        let spline = CubicSpline::new(vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 1.0, 4.0, 9.0]).unwrap();

        assert!((spline.evaluate(-1.0) - 0.0).abs() < 1e-10);
        assert!((spline.evaluate(5.0) - 9.0).abs() < 1e-10);
        assert_eq!(spline.x_range(), (0.0, 3.0));
    }

    #[test]
    fn test_smooth_function_accuracy() {
        let x: Vec<f64> = (0..=60).map(|i| i as f64 * 0.1).collect();
        let y: Vec<f64> = x.iter().map(|v| (-v).exp()).collect();
        let spline = CubicSpline::new(x, y).unwrap();

        for &t in &[0.55_f64, 1.234, 3.3, 5.05] {
            assert!((spline.evaluate(t) - (-t).exp()).abs() < 1e-4);
        }
    }
}
