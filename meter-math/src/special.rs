//! Special functions used by radial surface-brightness profiles.
//!
//! Bessel functions of the first kind come from `scilib` for small arguments
//! (power series) and switch to the Hankel asymptotic expansion beyond
//! |x| = 8, where the series loses precision. Gamma functions delegate to
//! `statrs`.

use scilib::math::basic;
use scilib::math::bessel;
use statrs::function::gamma as sgamma;

/// Argument above which the asymptotic Bessel expansion is used
const BESSEL_ASYMPTOTIC_THRESHOLD: f64 = 8.0;

/// Bessel function of the first kind, order zero.
pub fn bessel_j0(x: f64) -> f64 {
    let ax = x.abs();
    if ax < BESSEL_ASYMPTOTIC_THRESHOLD {
        let j: f64 = bessel::j_n(0, ax);
        return j;
    }
    let z = 8.0 / ax;
    let y = z * z;
    let xx = ax - 0.785398164;
    let p = 1.0
        + y * (-0.1098628627e-2
            + y * (0.2734510407e-4 + y * (-0.2073370639e-5 + y * 0.2093887211e-6)));
    let q = -0.1562499995e-1
        + y * (0.1430488765e-3
            + y * (-0.6911147651e-5 + y * (0.7621095161e-6 - y * 0.934935152e-7)));
    (0.636619772 / ax).sqrt() * (xx.cos() * p - z * xx.sin() * q)
}

/// Bessel function of the first kind, order one.
pub fn bessel_j1(x: f64) -> f64 {
    let ax = x.abs();
    let value = if ax < BESSEL_ASYMPTOTIC_THRESHOLD {
        let j: f64 = bessel::j_n(1, ax);
        j
    } else {
        let z = 8.0 / ax;
        let y = z * z;
        let xx = ax - 2.356194491;
        let p = 1.0
            + y * (0.183105e-2
                + y * (-0.3516396496e-4 + y * (0.2457520174e-5 + y * (-0.240337019e-6))));
        let q = 0.04687499995
            + y * (-0.2002690873e-3
                + y * (0.8449199096e-5 + y * (-0.88228987e-6 + y * 0.105787412e-6)));
        (0.636619772 / ax).sqrt() * (xx.cos() * p - z * xx.sin() * q)
    };
    if x < 0.0 {
        -value
    } else {
        value
    }
}

/// 2 J1(x) / x, with the x → 0 limit of 1.
pub fn jinc(x: f64) -> f64 {
    if x.abs() < 1e-4 {
        // 1 - x²/8 + x⁴/192
        let x2 = x * x;
        1.0 - x2 / 8.0 * (1.0 - x2 / 24.0)
    } else {
        2.0 * bessel_j1(x) / x
    }
}

/// sin(x) / x, with the x → 0 limit of 1.
pub fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-4 {
        let x2 = x * x;
        1.0 - x2 / 6.0 * (1.0 - x2 / 20.0)
    } else {
        x.sin() / x
    }
}

/// Error function.
pub fn erf(x: f64) -> f64 {
    basic::erf(x)
}

/// Gamma function Γ(a).
pub fn gamma(a: f64) -> f64 {
    sgamma::gamma(a)
}

/// Natural log of Γ(a).
pub fn ln_gamma(a: f64) -> f64 {
    sgamma::ln_gamma(a)
}

/// Regularized lower incomplete gamma function P(a, x).
///
/// Clamped to 0 for x ≤ 0 and 1 for x = ∞. `a` must be positive; non-positive
/// or non-finite `a` yields NaN.
pub fn regularized_lower_gamma(a: f64, x: f64) -> f64 {
    if a.is_nan() || a <= 0.0 || a.is_infinite() || x.is_nan() {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 0.0;
    }
    if x.is_infinite() {
        return 1.0;
    }
    sgamma::gamma_lr(a, x)
}

/// Area of the intersection of two circles with radii `r1`, `r2` whose
/// centers are `d` apart.
pub fn circle_overlap_area(r1: f64, r2: f64, d: f64) -> f64 {
    use std::f64::consts::PI;

    let (big, small) = if r1 >= r2 { (r1, r2) } else { (r2, r1) };
    if small <= 0.0 {
        return 0.0;
    }
    if d >= big + small {
        return 0.0;
    }
    if d <= big - small {
        return PI * small * small;
    }
    let cos1 = ((d * d + small * small - big * big) / (2.0 * d * small)).clamp(-1.0, 1.0);
    let cos2 = ((d * d + big * big - small * small) / (2.0 * d * big)).clamp(-1.0, 1.0);
    let a1 = cos1.acos();
    let a2 = cos2.acos();
    let kite = 0.5
        * ((-d + small + big) * (d + small - big) * (d - small + big) * (d + small + big))
            .max(0.0)
            .sqrt();
    small * small * a1 + big * big * a2 - kite
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_bessel_j0_reference_values() {
        assert_relative_eq!(bessel_j0(0.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(bessel_j0(1.0), 0.7651976865579666, epsilon = 1e-8);
        assert_relative_eq!(bessel_j0(5.0), -0.1775967713143383, epsilon = 1e-7);
        assert_relative_eq!(bessel_j0(10.0), -0.2459357644513483, epsilon = 1e-7);
        assert_relative_eq!(bessel_j0(-10.0), -0.2459357644513483, epsilon = 1e-7);
    }

    #[test]
    fn test_bessel_j1_reference_values() {
        assert_relative_eq!(bessel_j1(0.0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(bessel_j1(1.0), 0.4400505857449335, epsilon = 1e-8);
        assert_relative_eq!(bessel_j1(3.8317059702075125), 0.0, epsilon = 1e-7);
        assert_relative_eq!(bessel_j1(12.0), -0.2234471044906276, epsilon = 1e-7);
        assert_relative_eq!(bessel_j1(-12.0), 0.2234471044906276, epsilon = 1e-7);
    }

    #[test]
    fn test_bessel_continuity_at_switch() {
        let below = bessel_j1(BESSEL_ASYMPTOTIC_THRESHOLD - 1e-9);
        let above = bessel_j1(BESSEL_ASYMPTOTIC_THRESHOLD + 1e-9);
        assert!((below - above).abs() < 1e-6);
    }

    #[test]
    fn test_jinc_and_sinc_limits() {
        assert_eq!(jinc(0.0), 1.0);
        assert_eq!(sinc(0.0), 1.0);
        assert_relative_eq!(jinc(1e-5), 1.0, epsilon = 1e-10);
        assert_relative_eq!(sinc(PI), 0.0, epsilon = 1e-15);
        assert_relative_eq!(jinc(2.0), bessel_j1(2.0), epsilon = 1e-15);
    }

    #[test]
    fn test_erf_basic_values() {
        assert!((erf(0.0) - 0.0).abs() < 1e-6);
        assert!((erf(1.0) - 0.8427007929).abs() < 1e-6);
        assert!((erf(-1.0) - (-0.8427007929)).abs() < 1e-6);
    }

    #[test]
    fn test_gamma_functions() {
        assert_relative_eq!(gamma(5.0), 24.0, max_relative = 1e-12);
        assert_relative_eq!(ln_gamma(10.0), 362880.0_f64.ln(), max_relative = 1e-12);
        // P(1, x) = 1 - exp(-x)
        assert_relative_eq!(
            regularized_lower_gamma(1.0, 2.0),
            1.0 - (-2.0_f64).exp(),
            epsilon = 1e-12
        );
        assert_eq!(regularized_lower_gamma(2.0, 0.0), 0.0);
        assert_eq!(regularized_lower_gamma(2.0, f64::INFINITY), 1.0);
        assert!(regularized_lower_gamma(-1.0, 1.0).is_nan());
    }

    #[test]
    fn test_circle_overlap() {
        assert_relative_eq!(circle_overlap_area(1.0, 1.0, 0.0), PI, epsilon = 1e-12);
        assert_eq!(circle_overlap_area(1.0, 1.0, 2.5), 0.0);
        assert_relative_eq!(circle_overlap_area(2.0, 0.5, 1.0), PI * 0.25, epsilon = 1e-12);
        // Two unit circles one radius apart: 2π/3 - √3/2
        assert_relative_eq!(
            circle_overlap_area(1.0, 1.0, 1.0),
            2.0 * PI / 3.0 - 3.0_f64.sqrt() / 2.0,
            epsilon = 1e-12
        );
    }
}
