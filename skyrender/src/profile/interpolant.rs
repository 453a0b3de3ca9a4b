use meter_math::sinc;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 1D interpolation kernel for [`super::SampledImage`], in units of the sample spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolant {
    /// Piecewise constant (box of width 1).
    Nearest,
    /// Piecewise linear (triangle of half-width 1).
    Linear,
    /// Keys cubic convolution with `a = -0.5` (support 2).
    #[default]
    Cubic,
}

impl Interpolant {
    /// Kernel value at offset `x` samples.
    pub fn kernel(&self, x: f64) -> f64 {
        let ax = x.abs();
        match self {
            Interpolant::Nearest => {
                if ax < 0.5 {
                    1.0
                } else if ax == 0.5 {
                    0.5
                } else {
                    0.0
                }
            }
            Interpolant::Linear => (1.0 - ax).max(0.0),
            Interpolant::Cubic => {
                if ax <= 1.0 {
                    (1.5 * ax - 2.5) * ax * ax + 1.0
                } else if ax < 2.0 {
                    ((-0.5 * ax + 2.5) * ax - 4.0) * ax + 2.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Half-width of the kernel support.
    pub fn range(&self) -> f64 {
        match self {
            Interpolant::Nearest => 0.5,
            Interpolant::Linear => 1.0,
            Interpolant::Cubic => 2.0,
        }
    }

    /// Fourier transform of the kernel at angular frequency `k` (radians per sample).
    pub fn u_value(&self, k: f64) -> f64 {
        let s = sinc(0.5 * k);
        match self {
            Interpolant::Nearest => s,
            Interpolant::Linear => s * s,
            Interpolant::Cubic => s * s * s * (3.0 * s - 2.0 * (0.5 * k).cos()),
        }
    }

    /// Frequency (radians per sample) beyond which |U(k)| < `threshold`.
    pub fn max_k(&self, threshold: f64) -> f64 {
        // Envelopes of the sinc powers: |sinc(k/2)| <= 2/k
        match self {
            Interpolant::Nearest => 2.0 / threshold,
            Interpolant::Linear => 2.0 / threshold.sqrt(),
            Interpolant::Cubic => (16.0 / threshold).cbrt(),
        }
    }

    /// `∫ |K(x)| dx`.
    pub fn abs_integral(&self) -> f64 {
        match self {
            Interpolant::Nearest | Interpolant::Linear => 1.0,
            // Unit integral plus twice the two negative lobes of area 1/24
            Interpolant::Cubic => 7.0 / 6.0,
        }
    }

    /// Draw an offset with density `|K(x)| / ∫|K|`.
    pub(crate) fn sample_offset<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            Interpolant::Nearest => rng.gen::<f64>() - 0.5,
            Interpolant::Linear => rng.gen::<f64>() + rng.gen::<f64>() - 1.0,
            Interpolant::Cubic => loop {
                // |K| <= 1 everywhere
                let x = 4.0 * rng.gen::<f64>() - 2.0;
                if rng.gen::<f64>() < self.kernel(x).abs() {
                    break x;
                }
            },
        }
    }
}
