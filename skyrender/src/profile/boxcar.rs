use meter_math::sinc;
use rand::Rng;
use rustfft::num_complex::Complex64;

use super::{Capabilities, SamplingScales, SurfaceBrightness};
use crate::error::{require_flux, require_scale, RenderError};
use crate::params::RenderParams;
use crate::photon::{AllocationPolicy, PhotonArray};

/// Uniform rectangle of width `w` and height `h` centered on the origin.
///
/// A unit-flux `Boxcar(1, 1)` is the response of a square pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Boxcar {
    width: f64,
    height: f64,
    flux: f64,
    params: RenderParams,
}

impl Boxcar {
    pub fn new(width: f64, height: f64, flux: f64) -> Result<Self, RenderError> {
        Ok(Self {
            width: require_scale("width", width)?,
            height: require_scale("height", height)?,
            flux: require_flux(flux)?,
            params: RenderParams::default(),
        })
    }

    /// Unit-flux square pixel of side `scale`.
    pub fn pixel(scale: f64) -> Result<Self, RenderError> {
        Self::new(scale, scale, 1.0)
    }

    pub fn with_params(mut self, params: RenderParams) -> Self {
        self.params = params;
        self
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }
}

impl SurfaceBrightness for Boxcar {
    fn flux(&self) -> f64 {
        self.flux
    }

    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        if x.abs() < 0.5 * self.width && y.abs() < 0.5 * self.height {
            Ok(self.flux / (self.width * self.height))
        } else {
            Ok(0.0)
        }
    }

    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError> {
        let value = self.flux * sinc(0.5 * kx * self.width) * sinc(0.5 * ky * self.height);
        Ok(Complex64::new(value, 0.0))
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        // |sinc(u)| <= 1/u, so the transform is below threshold past 2 / (thr · w)
        let max_k = 2.0 / (self.params.maxk_threshold * self.width.min(self.height));
        Ok(SamplingScales::from_radius(
            0.5 * self.width.max(self.height),
            max_k,
        ))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            real_space: true,
            fourier: true,
            axisymmetric: false,
            hard_edges: true,
        }
    }

    fn shoot<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
        _allocation: AllocationPolicy,
    ) -> Result<PhotonArray, RenderError> {
        let mut photons = PhotonArray::with_capacity(n);
        if n == 0 {
            return Ok(photons);
        }
        let weight = self.flux / n as f64;
        for _ in 0..n {
            let x = (rng.gen::<f64>() - 0.5) * self.width;
            let y = (rng.gen::<f64>() - 0.5) * self.height;
            photons.push(x, y, weight);
        }
        Ok(photons)
    }
}
