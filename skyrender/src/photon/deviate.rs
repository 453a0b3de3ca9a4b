//! Tabulated radial deviates for profiles without a closed-form inverse CDF.

use meter_math::GaussLegendre;

use crate::error::RenderError;

/// Inverse-CDF sampler for a radial intensity `f(r)` on a fixed radius grid.
///
/// The flux in each annulus `[r_i, r_{i+1}]` is integrated with a
/// Gauss-Legendre rule; within an annulus radii are drawn uniformly in area.
#[derive(Debug, Clone)]
pub(crate) struct RadialDeviate {
    radii: Vec<f64>,
    /// Normalised cumulative flux at each radius; `cdf[0] = 0`, last is 1.
    cdf: Vec<f64>,
}

impl RadialDeviate {
    /// Tabulate `f` over `radii` (ascending, starting at zero).
    ///
    /// Each annulus is integrated in pieces no wider than `max_width`, which
    /// should resolve any oscillation of `f`.
    pub(crate) fn build<F: Fn(f64) -> f64>(
        f: F,
        radii: Vec<f64>,
        max_width: f64,
    ) -> Result<Self, RenderError> {
        if radii.len() < 2 || radii.windows(2).any(|w| w[1] <= w[0]) {
            return Err(RenderError::degenerate(
                "radial deviate needs at least two increasing radii",
            ));
        }
        let rule = GaussLegendre::new(8);
        let mut cdf = Vec::with_capacity(radii.len());
        cdf.push(0.0);
        let mut total = 0.0;
        for w in radii.windows(2) {
            let annulus = rule.integrate_segmented(|r| f(r).abs() * r, w[0], w[1], max_width);
            total += annulus;
            cdf.push(total);
        }
        if !total.is_finite() || total <= 0.0 {
            return Err(RenderError::degenerate(format!(
                "radial deviate integrates to {total}"
            )));
        }
        cdf.iter_mut().for_each(|c| *c /= total);
        Ok(Self { radii, cdf })
    }

    /// Radius with cumulative fraction `u ∈ [0, 1)`.
    pub(crate) fn sample(&self, u: f64) -> f64 {
        let i = self.cdf.partition_point(|&c| c <= u).clamp(1, self.cdf.len() - 1);
        let (c0, c1) = (self.cdf[i - 1], self.cdf[i]);
        let (r0, r1) = (self.radii[i - 1], self.radii[i]);
        let t = if c1 > c0 { (u - c0) / (c1 - c0) } else { 0.0 };
        (r0 * r0 + t.clamp(0.0, 1.0) * (r1 * r1 - r0 * r0)).sqrt()
    }

    #[cfg(test)]
    pub(crate) fn max_radius(&self) -> f64 {
        self.radii[self.radii.len() - 1]
    }
}
