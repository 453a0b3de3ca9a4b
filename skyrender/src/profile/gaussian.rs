//! Circular Gaussian, analytic in both real and Fourier space.

use rand::Rng;
use rand_distr::{Distribution, Normal};
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use super::{Capabilities, RadialSize, SamplingScales, SurfaceBrightness};
use crate::error::{require_flux, require_scale, RenderError};
use crate::params::RenderParams;
use crate::photon::{AllocationPolicy, PhotonArray};

/// Circular Gaussian: `I(r) = flux / (2πσ²) · exp(-r² / 2σ²)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Gaussian {
    sigma: f64,
    flux: f64,
    params: RenderParams,
}

impl Gaussian {
    /// Half-light radius in units of sigma: sqrt(2 ln 2).
    const HLR_FACTOR: f64 = 1.177_410_022_515_474_6;
    /// FWHM in units of sigma: 2 sqrt(2 ln 2).
    const FWHM_FACTOR: f64 = 2.354_820_045_030_949_3;

    /// Size given as `Sigma`/`Scale`, `Fwhm` or `HalfLight`.
    pub fn new(size: RadialSize, flux: f64) -> Result<Self, RenderError> {
        let value = require_scale(size.name(), size.value())?;
        let sigma = match size {
            RadialSize::Sigma(_) | RadialSize::Scale(_) => value,
            RadialSize::Fwhm(_) => value / Self::FWHM_FACTOR,
            RadialSize::HalfLight(_) => value / Self::HLR_FACTOR,
        };
        Ok(Self {
            sigma,
            flux: require_flux(flux)?,
            params: RenderParams::default(),
        })
    }

    pub fn from_sigma(sigma: f64, flux: f64) -> Result<Self, RenderError> {
        Self::new(RadialSize::Sigma(sigma), flux)
    }

    pub fn from_fwhm(fwhm: f64, flux: f64) -> Result<Self, RenderError> {
        Self::new(RadialSize::Fwhm(fwhm), flux)
    }

    pub fn from_half_light_radius(hlr: f64, flux: f64) -> Result<Self, RenderError> {
        Self::new(RadialSize::HalfLight(hlr), flux)
    }

    pub fn with_params(mut self, params: RenderParams) -> Self {
        self.params = params;
        self
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn fwhm(&self) -> f64 {
        self.sigma * Self::FWHM_FACTOR
    }

    pub fn half_light_radius(&self) -> f64 {
        self.sigma * Self::HLR_FACTOR
    }

    pub(crate) fn params(&self) -> &RenderParams {
        &self.params
    }
}

impl SurfaceBrightness for Gaussian {
    fn flux(&self) -> f64 {
        self.flux
    }

    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        let s2 = self.sigma * self.sigma;
        Ok(self.flux / (2.0 * PI * s2) * (-(x * x + y * y) / (2.0 * s2)).exp())
    }

    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError> {
        let s2 = self.sigma * self.sigma;
        Ok(Complex64::new(
            self.flux * (-0.5 * (kx * kx + ky * ky) * s2).exp(),
            0.0,
        ))
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        Ok(SamplingScales::from_radius(
            self.params.gaussian_fold_radius() * self.sigma,
            self.params.gaussian_maxk_radius() / self.sigma,
        ))
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
        let normal = Normal::new(0.0, self.sigma)
            .map_err(|e| RenderError::invalid("sigma", self.sigma, e.to_string()))?;
        let mut photons = PhotonArray::with_capacity(n);
        if n == 0 {
            return Ok(photons);
        }
        let weight = self.flux / n as f64;
        for _ in 0..n {
            photons.push(normal.sample(rng), normal.sample(rng), weight);
        }
        Ok(photons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::test_support::{enclosed_flux, integrate_real_space};
    use crate::profile::Profile;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::LN_2;

    #[test]
    fn test_size_conversions() {
        let g = Gaussian::from_fwhm(2.0 * (2.0 * LN_2).sqrt(), 1.0).unwrap();
        assert_relative_eq!(g.sigma(), 1.0, epsilon = 1e-12);

        let g = Gaussian::from_half_light_radius(1.0, 1.0).unwrap();
        assert_relative_eq!(g.half_light_radius(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_sizes() {
        assert!(matches!(
            Gaussian::from_sigma(0.0, 1.0),
            Err(RenderError::DegenerateProfile(_))
        ));
        assert!(matches!(
            Gaussian::from_sigma(-1.0, 1.0),
            Err(RenderError::DegenerateProfile(_))
        ));
        assert!(Gaussian::from_sigma(1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_real_space_integral_and_half_light() {
        let p: Profile = Gaussian::from_sigma(1.3, 7.0).unwrap().into();
        assert_relative_eq!(integrate_real_space(&p, 10.0, 400), 7.0, max_relative = 1e-6);

        let hlr = Gaussian::from_sigma(1.3, 7.0).unwrap().half_light_radius();
        assert_relative_eq!(enclosed_flux(&p, hlr, 4000), 3.5, max_relative = 1e-5);
    }

    #[test]
    fn test_sampling_scales() {
        let g = Gaussian::from_sigma(2.0, 1.0).unwrap();
        let scales = g.sampling_scales().unwrap();
        // The transform has fallen to maxk_threshold at max_k
        let k = g.k_value(scales.max_k, 0.0).unwrap().re;
        assert_relative_eq!(k, 1e-3, max_relative = 1e-9);
        assert_relative_eq!(scales.step_k, PI / (3.2552 * 2.0), max_relative = 1e-4);
    }

    #[test]
    fn test_shoot_moments() {
        let g = Gaussian::from_sigma(1.5, 10.0).unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let photons = g.shoot(200_000, &mut rng, AllocationPolicy::default()).unwrap();
        assert_eq!(photons.len(), 200_000);
        assert_relative_eq!(photons.total_flux(), 10.0, max_relative = 1e-12);

        let var_x: f64 = photons.x().iter().map(|x| x * x).sum::<f64>() / 200_000.0;
        assert_relative_eq!(var_x.sqrt(), 1.5, max_relative = 0.01);
    }
}
