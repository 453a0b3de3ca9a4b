//! Convolution of two or more profiles.
//!
//! In Fourier space this is a product of the operands' transforms. Photons
//! are shot from every operand and their positions added. Convolving
//! Gaussians collapses to a single Gaussian with summed variances.

use nalgebra::Vector2;
use rand::Rng;
use rustfft::num_complex::Complex64;
use std::sync::Arc;

use super::{
    not_analytic, Capabilities, DeltaFunction, Gaussian, Profile, SamplingScales,
    SurfaceBrightness,
};
use crate::error::{Domain, RenderError};
use crate::photon::{AllocationPolicy, PhotonArray};

/// Convolution of several profiles.
///
/// Only the transform is generally available. Two combinations have an exact
/// real-space form and keep `x_value`: all-Gaussian convolutions, and a
/// single profile convolved with point sources at the origin.
#[derive(Debug, Clone)]
pub struct Convolution {
    operands: Arc<Vec<Profile>>,
    flux: f64,
    capabilities: Capabilities,
    /// Exact real-space equivalent, when one exists.
    equivalent: Option<Arc<Profile>>,
}

impl Convolution {
    /// Nested convolutions are flattened into one node.
    pub fn new(operands: Vec<Profile>) -> Result<Self, RenderError> {
        if operands.is_empty() {
            return Err(RenderError::invalid(
                "operands",
                0.0,
                "a Convolution needs at least one profile",
            ));
        }
        let mut flat = Vec::with_capacity(operands.len());
        for op in operands {
            match op {
                Profile::Convolution(inner) => flat.extend(inner.operands.iter().cloned()),
                other => flat.push(other),
            }
        }

        let flux = flat.iter().map(|p| p.flux()).product();
        let equivalent = Self::real_space_equivalent(&flat)?.map(Arc::new);

        let non_delta: Vec<&Profile> = flat.iter().filter(|p| p.as_delta().is_none()).collect();
        let capabilities = Capabilities {
            real_space: equivalent
                .as_ref()
                .map(|p| p.capabilities().real_space)
                .unwrap_or(false),
            fourier: flat.iter().all(|p| p.capabilities().fourier),
            axisymmetric: flat.iter().all(|p| p.capabilities().axisymmetric),
            // Any smooth operand removes the discontinuities
            hard_edges: non_delta.len() == 1 && non_delta[0].capabilities().hard_edges,
        };

        Ok(Self {
            operands: Arc::new(flat),
            flux,
            capabilities,
            equivalent,
        })
    }

    pub fn operands(&self) -> &[Profile] {
        &self.operands
    }

    fn real_space_equivalent(operands: &[Profile]) -> Result<Option<Profile>, RenderError> {
        if operands.len() == 1 {
            return Ok(Some(operands[0].clone()));
        }

        let gaussians: Vec<&Gaussian> = operands.iter().filter_map(|p| p.as_gaussian()).collect();
        if gaussians.len() == operands.len() {
            let variance: f64 = gaussians.iter().map(|g| g.sigma() * g.sigma()).sum();
            let flux: f64 = gaussians.iter().map(|g| g.flux()).product();
            let combined = Gaussian::from_sigma(variance.sqrt(), flux)?
                .with_params(*gaussians[0].params());
            return Ok(Some(combined.into()));
        }

        let deltas: Vec<&DeltaFunction> = operands.iter().filter_map(|p| p.as_delta()).collect();
        let delta_flux: f64 = deltas.iter().map(|d| d.flux()).product();
        match operands.len() - deltas.len() {
            0 => Ok(Some(DeltaFunction::new(delta_flux)?.into())),
            1 => {
                let remaining = operands
                    .iter()
                    .find(|p| p.as_delta().is_none())
                    .ok_or_else(|| RenderError::degenerate("convolution lost its operand"))?;
                Ok(Some(remaining.scale_flux(delta_flux)?))
            }
            _ => Ok(None),
        }
    }
}

impl SurfaceBrightness for Convolution {
    fn flux(&self) -> f64 {
        self.flux
    }

    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        match &self.equivalent {
            Some(profile) if self.capabilities.real_space => profile.x_value(x, y),
            _ => Err(not_analytic("Convolution", Domain::RealSpace)),
        }
    }

    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError> {
        let mut product = Complex64::new(1.0, 0.0);
        for op in self.operands.iter() {
            product *= op.k_value(kx, ky)?;
        }
        Ok(product)
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        let mut max_k = f64::INFINITY;
        let mut inv_step2 = 0.0;
        for op in self.operands.iter() {
            let scales = op.sampling_scales()?;
            max_k = max_k.min(scales.max_k);
            inv_step2 += 1.0 / (scales.step_k * scales.step_k);
        }
        Ok(SamplingScales {
            step_k: 1.0 / inv_step2.sqrt(),
            max_k,
        })
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn centroid(&self) -> Vector2<f64> {
        self.operands
            .iter()
            .fold(Vector2::zeros(), |acc, op| acc + op.centroid())
    }

    fn abs_flux(&self) -> f64 {
        self.operands.iter().map(|op| op.abs_flux()).product()
    }

    fn shoot<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
        _allocation: AllocationPolicy,
    ) -> Result<PhotonArray, RenderError> {
        // Pairing photons by index needs exactly n from every operand
        let mut operands = self.operands.iter();
        let mut photons = match operands.next() {
            Some(first) => first.shoot(n, rng, AllocationPolicy::Multinomial)?,
            None => return Ok(PhotonArray::zeros(n)),
        };
        for op in operands {
            let mut other = op.shoot(n, rng, AllocationPolicy::Multinomial)?;
            if other.is_correlated() {
                other.shuffle(rng);
            }
            photons.convolve_with(&other)?;
        }
        Ok(photons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Boxcar, Exponential, RadialSize};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_k_value_is_product() {
        let a: Profile = Exponential::new(RadialSize::Scale(0.8), 2.0).unwrap().into();
        let b: Profile = Boxcar::new(1.0, 1.0, 3.0).unwrap().into();
        let conv = Convolution::new(vec![a.clone(), b.clone()]).unwrap();
        assert_relative_eq!(conv.flux(), 6.0);
        for &(kx, ky) in &[(0.0, 0.0), (0.5, -1.2), (3.0, 2.0)] {
            let expected = a.k_value(kx, ky).unwrap() * b.k_value(kx, ky).unwrap();
            assert_relative_eq!(conv.k_value(kx, ky).unwrap().re, expected.re, epsilon = 1e-14);
        }
        assert!(matches!(
            conv.x_value(0.0, 0.0),
            Err(RenderError::NotAnalytic { .. })
        ));
    }

    #[test]
    fn test_gaussian_fast_path() {
        let conv = Convolution::new(vec![
            Gaussian::from_sigma(2.0, 1000.0).unwrap().into(),
            Gaussian::from_sigma(1.0, 1.0).unwrap().into(),
        ])
        .unwrap();
        assert!(conv.capabilities().real_space);
        let expected = Gaussian::from_sigma(5f64.sqrt(), 1000.0).unwrap();
        assert_relative_eq!(
            conv.x_value(0.7, -0.2).unwrap(),
            expected.x_value(0.7, -0.2).unwrap(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_delta_fast_path_and_flattening() {
        let inner = Convolution::new(vec![
            DeltaFunction::new(2.0).unwrap().into(),
            Exponential::new(RadialSize::Scale(1.0), 1.5).unwrap().into(),
        ])
        .unwrap();
        let outer = Convolution::new(vec![inner.into(), DeltaFunction::new(0.5).unwrap().into()])
            .unwrap();
        assert_eq!(outer.operands().len(), 3);
        assert_relative_eq!(outer.flux(), 1.5);
        let e = Exponential::new(RadialSize::Scale(1.0), 1.5).unwrap();
        assert_relative_eq!(
            outer.x_value(0.4, 0.1).unwrap(),
            e.x_value(0.4, 0.1).unwrap(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_sampling_scales_combine() {
        let a = Gaussian::from_sigma(1.0, 1.0).unwrap();
        let b = Gaussian::from_sigma(2.0, 1.0).unwrap();
        let conv = Convolution::new(vec![a.clone().into(), b.clone().into()]).unwrap();
        let (sa, sb) = (a.sampling_scales().unwrap(), b.sampling_scales().unwrap());
        let scales = conv.sampling_scales().unwrap();
        assert_eq!(scales.max_k, sb.max_k);
        let expected = 1.0 / (1.0 / sa.step_k.powi(2) + 1.0 / sb.step_k.powi(2)).sqrt();
        assert_relative_eq!(scales.step_k, expected);
        assert!(matches!(
            Convolution::new(vec![]),
            Err(RenderError::InvalidParameter { name: "operands", .. })
        ));
    }

    #[test]
    fn test_shoot_variance_adds() {
        let conv = Convolution::new(vec![
            Gaussian::from_sigma(1.0, 2.0).unwrap().into(),
            Gaussian::from_sigma(2.0, 3.0).unwrap().into(),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(12);
        let n = 100_000;
        let photons = conv.shoot(n, &mut rng, AllocationPolicy::default()).unwrap();
        assert_eq!(photons.len(), n);
        assert_relative_eq!(photons.total_flux(), 6.0, max_relative = 1e-10);
        let var_x = photons.x().iter().map(|x| x * x).sum::<f64>() / n as f64;
        assert_relative_eq!(var_x, 5.0, max_relative = 0.02);
    }

    fn shifted_gaussian(sigma: f64, dx: f64) -> Profile {
        Profile::from(Gaussian::from_sigma(sigma, 1.0).unwrap())
            .shift(dx, 0.0)
            .unwrap()
    }

    #[test]
    fn test_shoot_with_sum_operand() {
        // A Sum operand's photons are grouped by child and must be shuffled before pairing
        let sum = Profile::sum(vec![shifted_gaussian(0.5, -3.0), shifted_gaussian(0.5, 3.0)])
            .unwrap();
        let conv = Convolution::new(vec![sum.clone(), sum]).unwrap();
        let mut rng = StdRng::seed_from_u64(2);
        let photons = conv.shoot(40_000, &mut rng, AllocationPolicy::default()).unwrap();
        // Half the light lands near x = 0 (one copy from each side)
        let central = photons.iter().filter(|(x, _, _)| x.abs() < 1.5).count();
        assert_relative_eq!(central as f64 / 40_000.0, 0.5, epsilon = 0.02);
    }
}
