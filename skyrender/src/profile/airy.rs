//! Airy diffraction pattern of a circular aperture, optionally obscured.

use meter_math::{circle_overlap_area, jinc};
use once_cell::sync::OnceCell;
use rand::Rng;
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;
use std::sync::Arc;

use super::{random_direction, Capabilities, SamplingScales, SurfaceBrightness};
use crate::error::{require_flux, require_scale, RenderError};
use crate::params::RenderParams;
use crate::photon::deviate::RadialDeviate;
use crate::photon::{AllocationPolicy, PhotonArray};

/// Linear grid spacing of the photon table, in units of `π r / (λ/D)`.
const DEVIATE_STEP: f64 = 0.05;
/// End of the linear part of the photon table.
const DEVIATE_LINEAR_END: f64 = 40.0;
/// Growth factor of the logarithmic part of the photon table.
const DEVIATE_GROWTH: f64 = 1.01;

/// Diffraction pattern of a circular aperture with a central obscuration.
///
/// `lam_over_diam` is λ/D in the units of the image plane; `obscuration` is
/// the linear fraction of the aperture diameter that is blocked.
#[derive(Debug, Clone)]
pub struct Airy {
    lam_over_diam: f64,
    obscuration: f64,
    flux: f64,
    params: RenderParams,
    deviate: Arc<OnceCell<RadialDeviate>>,
}

impl Airy {
    pub fn new(lam_over_diam: f64, obscuration: f64, flux: f64) -> Result<Self, RenderError> {
        if !(0.0..1.0).contains(&obscuration) {
            return Err(RenderError::invalid(
                "obscuration",
                obscuration,
                "must lie in [0, 1)",
            ));
        }
        Ok(Self {
            lam_over_diam: require_scale("lam_over_diam", lam_over_diam)?,
            obscuration,
            flux: require_flux(flux)?,
            params: RenderParams::default(),
            deviate: Arc::new(OnceCell::new()),
        })
    }

    pub fn with_params(mut self, params: RenderParams) -> Self {
        if self.params == params {
            return self;
        }
        self.params = params;
        self.deviate = Arc::new(OnceCell::new());
        self
    }

    pub fn lam_over_diam(&self) -> f64 {
        self.lam_over_diam
    }

    pub fn obscuration(&self) -> f64 {
        self.obscuration
    }

    /// Spatial frequency above which the transform vanishes: 2π D/λ.
    pub fn k_cutoff(&self) -> f64 {
        2.0 * PI / self.lam_over_diam
    }

    /// Normalised amplitude at `x = π r / (λ/D)`; 1 at the center.
    fn amplitude(&self, x: f64) -> f64 {
        let eps = self.obscuration;
        (jinc(x) - eps * eps * jinc(eps * x)) / (1.0 - eps * eps)
    }

    /// Radius in units of `x` outside which `fraction` of the flux lies.
    ///
    /// The averaged tail of the pattern falls as `2 / (π x (1 - ε))`.
    fn tail_radius(&self, fraction: f64) -> f64 {
        2.0 / (PI * fraction * (1.0 - self.obscuration))
    }

    fn deviate(&self) -> Result<&RadialDeviate, RenderError> {
        self.deviate.get_or_try_init(|| {
            let x_max = self.tail_radius(self.params.shoot_accuracy).max(DEVIATE_LINEAR_END);
            let linear = (DEVIATE_LINEAR_END / DEVIATE_STEP).round() as usize;
            let mut radii: Vec<f64> = (0..=linear).map(|i| i as f64 * DEVIATE_STEP).collect();
            let mut x = DEVIATE_LINEAR_END;
            while x < x_max {
                x *= DEVIATE_GROWTH;
                radii.push(x);
            }
            log::debug!(
                "Airy photon table: {} radii out to x={:.1}",
                radii.len(),
                x
            );
            // Half a period of the Bessel oscillation per integration piece
            RadialDeviate::build(
                |x| {
                    let a = self.amplitude(x);
                    a * a
                },
                radii,
                0.5 * PI,
            )
        })
    }
}

impl SurfaceBrightness for Airy {
    fn flux(&self) -> f64 {
        self.flux
    }

    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        let eps = self.obscuration;
        let l = self.lam_over_diam;
        let i0 = self.flux * PI * (1.0 - eps * eps) / (4.0 * l * l);
        let a = self.amplitude(PI * (x * x + y * y).sqrt() / l);
        Ok(i0 * a * a)
    }

    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError> {
        // Autocorrelation of the annular pupil (radius 1) at separation s
        let eps = self.obscuration;
        let s = 2.0 * (kx * kx + ky * ky).sqrt() / self.k_cutoff();
        if s >= 2.0 {
            return Ok(Complex64::new(0.0, 0.0));
        }
        let overlap = circle_overlap_area(1.0, 1.0, s) - 2.0 * circle_overlap_area(1.0, eps, s)
            + circle_overlap_area(eps, eps, s);
        Ok(Complex64::new(
            self.flux * overlap / (PI * (1.0 - eps * eps)),
            0.0,
        ))
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        let radius = self.tail_radius(self.params.folding_threshold) * self.lam_over_diam / PI;
        Ok(SamplingScales::from_radius(radius, self.k_cutoff()))
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
        let mut photons = PhotonArray::with_capacity(n);
        if n == 0 {
            return Ok(photons);
        }
        let deviate = self.deviate()?;
        let weight = self.flux / n as f64;
        let to_radius = self.lam_over_diam / PI;
        for _ in 0..n {
            let r = deviate.sample(rng.gen::<f64>()) * to_radius;
            let (c, s) = random_direction(rng);
            photons.push(r * c, r * s, weight);
        }
        Ok(photons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::test_support::enclosed_flux;
    use crate::profile::Profile;
    use approx::assert_relative_eq;
    use meter_math::{bessel_j0, bessel_j1};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// First zero of J1.
    const FIRST_DARK_RING: f64 = 3.831_705_970_207_512;

    #[test]
    fn test_peak_and_first_dark_ring() {
        let a = Airy::new(2.0, 0.0, 3.0).unwrap();
        assert_relative_eq!(a.x_value(0.0, 0.0).unwrap(), 3.0 * PI / 16.0, max_relative = 1e-12);
        let r_dark = FIRST_DARK_RING * 2.0 / PI;
        assert!(a.x_value(r_dark, 0.0).unwrap() < 1e-12);
    }

    #[test]
    fn test_encircled_energy() {
        // Unobstructed: EE(x) = 1 - J0(x)² - J1(x)²
        let a = Airy::new(1.0, 0.0, 1.0).unwrap();
        let p: Profile = a.into();
        let x = 2.0 * PI;
        let expected = 1.0 - bessel_j0(x).powi(2) - bessel_j1(x).powi(2);
        assert_relative_eq!(enclosed_flux(&p, 2.0, 20_000), expected, max_relative = 1e-6);
    }

    #[test]
    fn test_encircled_energy_far_out() {
        // The 1/r³ envelope leaves about 2/(πx) of the flux beyond x
        let p: Profile = Airy::new(1.0, 0.0, 5.0).unwrap().into();
        let r = 200.0;
        let x = PI * r;
        let expected = 5.0 * (1.0 - bessel_j0(x).powi(2) - bessel_j1(x).powi(2));
        let total = enclosed_flux(&p, r, 400_000);
        assert_relative_eq!(total, expected, max_relative = 1e-6);
        assert!(5.0 - total < 5.0 * 2.5 / (PI * x));
    }

    #[test]
    fn test_transform_band_limit() {
        let a = Airy::new(0.5, 0.3, 2.0).unwrap();
        assert_relative_eq!(a.k_value(0.0, 0.0).unwrap().re, 2.0, max_relative = 1e-12);
        assert_eq!(a.k_value(a.k_cutoff(), 0.0).unwrap().re, 0.0);
        assert!(a.k_value(0.9 * a.k_cutoff(), 0.0).unwrap().re > 0.0);
        assert_eq!(a.sampling_scales().unwrap().max_k, a.k_cutoff());
    }

    #[test]
    fn test_unobstructed_transform_closed_form() {
        // MTF of a clear circular pupil: (2/π)(acos(u) - u sqrt(1 - u²)), u = k / k_cut
        let a = Airy::new(1.0, 0.0, 1.0).unwrap();
        for &u in &[0.1f64, 0.4, 0.75] {
            let expected = 2.0 / PI * (u.acos() - u * (1.0 - u * u).sqrt());
            let k = u * a.k_cutoff();
            assert_relative_eq!(a.k_value(k, 0.0).unwrap().re, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_invalid_obscuration() {
        assert!(matches!(
            Airy::new(1.0, 1.0, 1.0),
            Err(RenderError::InvalidParameter {
                name: "obscuration",
                ..
            })
        ));
        assert!(matches!(
            Airy::new(0.0, 0.1, 1.0),
            Err(RenderError::DegenerateProfile(_))
        ));
    }

    #[test]
    fn test_shoot_inside_first_ring() {
        let a = Airy::new(1.0, 0.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let photons = a.shoot(50_000, &mut rng, AllocationPolicy::default()).unwrap();
        let r_dark = FIRST_DARK_RING / PI;
        let inside = photons
            .iter()
            .filter(|(x, y, _)| (x * x + y * y).sqrt() < r_dark)
            .count();
        let expected = 1.0 - bessel_j0(FIRST_DARK_RING).powi(2);
        assert_relative_eq!(inside as f64 / 50_000.0, expected, epsilon = 0.01);
        assert_relative_eq!(photons.total_flux(), 1.0, max_relative = 1e-12);
    }
}
