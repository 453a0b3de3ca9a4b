//! Tabulated Hankel transforms of axisymmetric profiles.
//!
//! For a radial surface brightness `f(r)` the 2D Fourier transform is
//! `F(k) = 2π ∫ f(r) J0(k r) r dr`. Profiles without a closed form tabulate
//! `F(k) / F(0)` once on a logarithmic grid in `k` and interpolate with a
//! natural cubic spline.
//!
//! The inner region `r < π/k` is integrated in `ln r` (it holds the cusp of
//! peaked profiles); beyond it the integral is split into half periods of the
//! Bessel kernel and summed until the contributions die out.

use log::debug;
use meter_math::{bessel_j0, CubicSpline, GaussLegendre};
use std::f64::consts::PI;

use crate::error::RenderError;
use crate::params::RenderParams;

/// Spacing of the k grid in ln k.
const LN_K_STEP: f64 = 0.05;
/// Gauss-Legendre order per integration segment.
const RULE_ORDER: usize = 16;
/// Grid starts at this many inverse half-light radii.
const K_MIN_HLR: f64 = 1e-3;
/// Grid never extends past this many inverse half-light radii.
const K_CAP_HLR: f64 = 200.0;
/// Innermost radius integrated, in half-light radii.
const R_MIN_HLR: f64 = 1e-7;
const MAX_SEGMENTS: usize = 200_000;
/// Consecutive below-threshold samples that end the table.
const TAIL_RUN: usize = 5;

/// `F(k) / F(0)` for a unit-scale radial profile.
#[derive(Debug, Clone)]
pub(crate) struct HankelTable {
    spline: CubicSpline,
    k_min: f64,
    ratio_at_min: f64,
    k_end: f64,
    tail: Option<(f64, f64)>,
    max_k: f64,
}

impl HankelTable {
    /// Tabulate the transform of `profile`, which is zero beyond `r_max`.
    ///
    /// `r_half` sets the natural scale of the grid (the half-light radius in
    /// the same units as `r_max`).
    pub(crate) fn build<F: Fn(f64) -> f64>(
        profile: F,
        r_half: f64,
        r_max: f64,
        params: &RenderParams,
    ) -> Result<Self, RenderError> {
        let rule = GaussLegendre::new(RULE_ORDER);
        let integrator = HankelIntegrator {
            profile: &profile,
            rule: &rule,
            r_min: R_MIN_HLR * r_half,
            r_max,
            r_half,
            tolerance: 0.0,
        };
        let f0 = integrator.transform(0.0);
        if !f0.is_finite() || f0 == 0.0 {
            return Err(RenderError::degenerate(format!(
                "radial profile integrates to {f0}"
            )));
        }
        let integrator = HankelIntegrator {
            tolerance: 1e-2 * params.kvalue_accuracy * f0.abs() / (2.0 * PI),
            ..integrator
        };

        let k_min = K_MIN_HLR / r_half;
        let k_cap = K_CAP_HLR / r_half;
        let mut ln_k = Vec::new();
        let mut ratios = Vec::new();
        let mut last_above = k_min;
        let mut below_run = 0;

        let mut k = k_min;
        while k <= k_cap {
            let ratio = integrator.transform(k) / f0;
            ln_k.push(k.ln());
            ratios.push(ratio);

            if ratio.abs() >= params.maxk_threshold {
                last_above = k;
                below_run = 0;
            } else if ratio.abs() < 0.25 * params.maxk_threshold {
                below_run += 1;
                if below_run >= TAIL_RUN {
                    break;
                }
            }
            k *= LN_K_STEP.exp();
        }
        if k > k_cap {
            debug!(
                "Hankel table reached the k cap ({:.3e}) with |F/F0| still above {:.1e}",
                k_cap, params.maxk_threshold
            );
        }

        let n = ratios.len();
        let tail = if n >= 2 && ratios[n - 1] > 0.0 && ratios[n - 2] > ratios[n - 1] {
            let slope = (ratios[n - 1] / ratios[n - 2]).ln() / (ln_k[n - 1] - ln_k[n - 2]);
            Some((ratios[n - 1], slope))
        } else {
            None
        };
        let k_end = ln_k[n - 1].exp();
        let ratio_at_min = ratios[0];
        let max_k = (last_above * LN_K_STEP.exp()).min(k_end);

        debug!(
            "Hankel table: {} samples over k ∈ [{:.3e}, {:.3e}], max_k={:.4e}",
            n, k_min, k_end, max_k
        );

        Ok(Self {
            spline: CubicSpline::new(ln_k, ratios)?,
            k_min,
            ratio_at_min,
            k_end,
            tail,
            max_k,
        })
    }

    /// `F(k) / F(0)` in the table's unit scale.
    pub(crate) fn ratio(&self, k: f64) -> f64 {
        if k <= 0.0 {
            1.0
        } else if k < self.k_min {
            1.0 + (self.ratio_at_min - 1.0) * (k / self.k_min)
        } else if k <= self.k_end {
            self.spline.evaluate(k.ln())
        } else {
            match self.tail {
                Some((value, slope)) => value * (k / self.k_end).powf(slope),
                None => 0.0,
            }
        }
    }

    /// Frequency beyond which |F/F0| stays below `maxk_threshold`.
    pub(crate) fn max_k(&self) -> f64 {
        self.max_k
    }
}

struct HankelIntegrator<'a, F: Fn(f64) -> f64> {
    profile: &'a F,
    rule: &'a GaussLegendre,
    r_min: f64,
    r_max: f64,
    r_half: f64,
    tolerance: f64,
}

impl<'a, F: Fn(f64) -> f64> HankelIntegrator<'a, F> {
    /// `2π ∫ f(r) J0(k r) r dr` over `[0, r_max]`.
    fn transform(&self, k: f64) -> f64 {
        let f = self.profile;
        let inner_end = if k > 0.0 {
            (PI / k).min(self.r_max)
        } else {
            self.r_max
        };

        let mut total = 0.0;
        if inner_end > self.r_min {
            // r = e^u, dr = r du; the kernel varies by less than half a period here
            total += self.rule.integrate_segmented(
                |u| {
                    let r = u.exp();
                    f(r) * bessel_j0(k * r) * r * r
                },
                self.r_min.ln(),
                inner_end.ln(),
                0.5,
            );
        }

        if inner_end < self.r_max {
            let width = PI / k;
            let mut start = inner_end;
            let mut previous = 0.0;
            let mut quiet = 0;
            let mut segments = 0;
            while start < self.r_max && segments < MAX_SEGMENTS {
                let end = (start + width).min(self.r_max);
                let piece = self
                    .rule
                    .integrate(|r| f(r) * bessel_j0(k * r) * r, start, end);
                total += piece;
                // Neighbouring half periods nearly cancel once the envelope is flat
                if (piece + previous).abs() < self.tolerance && start > 2.0 * self.r_half {
                    quiet += 1;
                    if quiet >= 2 {
                        // The remaining alternating tail sums to about -piece / 2
                        total -= 0.5 * piece;
                        break;
                    }
                } else {
                    quiet = 0;
                }
                previous = piece;
                start = end;
                segments += 1;
            }
        }

        2.0 * PI * total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_table_matches_closed_form() {
        let params = RenderParams::default();
        // exp(-r²/2) has F(k)/F(0) = exp(-k²/2)
        let table =
            HankelTable::build(|r| (-0.5 * r * r).exp(), 1.1774, 12.0, &params).unwrap();
        for &k in &[0.0_f64, 1e-4, 0.3, 1.0, 2.0, 3.0] {
            assert_relative_eq!(table.ratio(k), (-0.5 * k * k).exp(), epsilon = 2e-6);
        }
        // maxk_threshold is reached near sqrt(-2 ln 1e-3) = 3.717
        assert!(table.max_k() > 3.6 && table.max_k() < 4.0);
    }

    #[test]
    fn test_exponential_table_matches_closed_form() {
        let params = RenderParams::default();
        let r_max = 40.0;
        let table = HankelTable::build(|r: f64| (-r).exp(), 1.678, r_max, &params).unwrap();
        for &k in &[0.05_f64, 0.5, 1.0, 4.0, 9.0] {
            let expected = (1.0 + k * k).powf(-1.5);
            assert_relative_eq!(table.ratio(k), expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_tophat_table_matches_jinc() {
        // A unit disk transforms to 2 J1(k) / k
        let params = RenderParams::default();
        let table = HankelTable::build(|_| 1.0, 0.7071, 1.0, &params).unwrap();
        for &k in &[0.5_f64, 2.0, 5.0, 10.0] {
            assert_relative_eq!(table.ratio(k), meter_math::jinc(k), epsilon = 5e-5);
        }
    }

    #[test]
    fn test_zero_profile_rejected() {
        let params = RenderParams::default();
        assert!(matches!(
            HankelTable::build(|_| 0.0, 1.0, 5.0, &params),
            Err(RenderError::DegenerateProfile(_))
        ));
    }
}
