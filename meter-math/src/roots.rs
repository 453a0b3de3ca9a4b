//! Bracketed root finding with bounded iteration counts.

use thiserror::Error;

/// Errors from the root finders
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RootFindError {
    #[error("root is not bracketed: f({lower})={f_lower:.3e}, f({upper})={f_upper:.3e}")]
    NotBracketed {
        lower: f64,
        upper: f64,
        f_lower: f64,
        f_upper: f64,
    },
    #[error("no convergence after {iterations} iterations")]
    MaxIterations { iterations: usize },
    #[error("function returned a non-finite value at x={x}")]
    NonFinite { x: f64 },
}

/// Default iteration cap for bisection (enough for full f64 precision).
pub const DEFAULT_MAX_ITERATIONS: usize = 200;

/// Find a root of `f` in [lower, upper] by bisection.
///
/// Stops when the bracket is narrower than `tolerance * max(1, |mid|)`.
pub fn bisect<F: Fn(f64) -> f64>(
    f: F,
    lower: f64,
    upper: f64,
    tolerance: f64,
    max_iterations: usize,
) -> Result<f64, RootFindError> {
    let (mut lo, mut hi) = if lower <= upper {
        (lower, upper)
    } else {
        (upper, lower)
    };
    let mut f_lo = f(lo);
    let f_hi = f(hi);
    if !f_lo.is_finite() {
        return Err(RootFindError::NonFinite { x: lo });
    }
    if !f_hi.is_finite() {
        return Err(RootFindError::NonFinite { x: hi });
    }
    if f_lo == 0.0 {
        return Ok(lo);
    }
    if f_hi == 0.0 {
        return Ok(hi);
    }
    if f_lo.signum() == f_hi.signum() {
        return Err(RootFindError::NotBracketed {
            lower: lo,
            upper: hi,
            f_lower: f_lo,
            f_upper: f_hi,
        });
    }

    for _ in 0..max_iterations {
        let mid = 0.5 * (lo + hi);
        if hi - lo <= tolerance * mid.abs().max(1.0) {
            return Ok(mid);
        }
        let f_mid = f(mid);
        if !f_mid.is_finite() {
            return Err(RootFindError::NonFinite { x: mid });
        }
        if f_mid == 0.0 {
            return Ok(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(RootFindError::MaxIterations {
        iterations: max_iterations,
    })
}

/// Grow `upper` geometrically until `f` changes sign between `lower` and `upper`.
///
/// Returns the bracket `(lower, upper)`; `lower` is moved up to the last
/// upper bound that did not bracket the root.
pub fn bracket_upward<F: Fn(f64) -> f64>(
    f: F,
    lower: f64,
    upper: f64,
    factor: f64,
    max_iterations: usize,
) -> Result<(f64, f64), RootFindError> {
    let f_lo = f(lower);
    if !f_lo.is_finite() {
        return Err(RootFindError::NonFinite { x: lower });
    }
    let mut lo = lower;
    let mut hi = upper;
    for _ in 0..max_iterations {
        let f_hi = f(hi);
        if !f_hi.is_finite() {
            return Err(RootFindError::NonFinite { x: hi });
        }
        if f_hi == 0.0 || f_hi.signum() != f_lo.signum() {
            return Ok((lo, hi));
        }
        lo = hi;
        hi *= factor;
    }
    Err(RootFindError::MaxIterations {
        iterations: max_iterations,
    })
}
