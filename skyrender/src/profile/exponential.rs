use meter_math::{bisect, bracket_upward, DEFAULT_MAX_ITERATIONS};
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use super::{random_direction, Capabilities, RadialSize, SamplingScales, SurfaceBrightness};
use crate::error::{require_flux, require_scale, RenderError};
use crate::params::RenderParams;
use crate::photon::{AllocationPolicy, PhotonArray};

/// Exponential disk: `I(r) = flux / (2π r0²) · exp(-r / r0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Exponential {
    scale_radius: f64,
    flux: f64,
    params: RenderParams,
}

impl Exponential {
    /// Half-light radius in units of r0: the root of (1 + x) e^{-x} = 1/2.
    pub const HLR_FACTOR: f64 = 1.678_346_990_016_660_5;

    /// Size given as `Scale`, `HalfLight` or `Fwhm`.
    pub fn new(size: RadialSize, flux: f64) -> Result<Self, RenderError> {
        let value = require_scale(size.name(), size.value())?;
        let scale_radius = match size {
            RadialSize::Scale(_) => value,
            RadialSize::HalfLight(_) => value / Self::HLR_FACTOR,
            RadialSize::Fwhm(_) => value / (2.0 * std::f64::consts::LN_2),
            RadialSize::Sigma(_) => return Err(size.unsupported("Exponential")),
        };
        Ok(Self {
            scale_radius,
            flux: require_flux(flux)?,
            params: RenderParams::default(),
        })
    }

    pub fn with_params(mut self, params: RenderParams) -> Self {
        self.params = params;
        self
    }

    pub fn scale_radius(&self) -> f64 {
        self.scale_radius
    }

    pub fn half_light_radius(&self) -> f64 {
        self.scale_radius * Self::HLR_FACTOR
    }

    /// Radius (in units of r0) outside which `fraction` of the flux lies.
    fn enclosing_radius(fraction: f64) -> Result<f64, RenderError> {
        let outside = |x: f64| (1.0 + x) * (-x).exp() - fraction;
        let (lo, hi) = bracket_upward(outside, 0.0, 1.0, 2.0, 64)?;
        Ok(bisect(outside, lo, hi, 1e-10, DEFAULT_MAX_ITERATIONS)?)
    }
}

impl SurfaceBrightness for Exponential {
    fn flux(&self) -> f64 {
        self.flux
    }

    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        let r0 = self.scale_radius;
        let r = (x * x + y * y).sqrt();
        Ok(self.flux / (2.0 * PI * r0 * r0) * (-r / r0).exp())
    }

    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError> {
        let kr2 = (kx * kx + ky * ky) * self.scale_radius * self.scale_radius;
        let denom = (1.0 + kr2) * (1.0 + kr2).sqrt();
        Ok(Complex64::new(self.flux / denom, 0.0))
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        let r0 = self.scale_radius;
        // (1 + k²r0²)^-1.5 = maxk_threshold
        let max_k = (self.params.maxk_threshold.powf(-2.0 / 3.0) - 1.0).sqrt() / r0;
        let radius = (Self::enclosing_radius(self.params.folding_threshold)? * r0)
            .max(self.params.stepk_minimum_hlr * self.half_light_radius());
        Ok(SamplingScales::from_radius(radius, max_k))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ANALYTIC_RADIAL
    }

    fn shoot<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
        _allocation: AllocationPolicy,
    ) -> Result<PhotonArray, RenderError> {
        // r dr e^{-r} is Gamma(2, 1) in r / r0
        let gamma = Gamma::new(2.0, 1.0)
            .map_err(|e| RenderError::invalid("gamma shape", 2.0, e.to_string()))?;
        let mut photons = PhotonArray::with_capacity(n);
        if n == 0 {
            return Ok(photons);
        }
        let weight = self.flux / n as f64;
        for _ in 0..n {
            let r = self.scale_radius * gamma.sample(rng);
            let (c, s) = random_direction(rng);
            photons.push(r * c, r * s, weight);
        }
        Ok(photons)
    }
}
