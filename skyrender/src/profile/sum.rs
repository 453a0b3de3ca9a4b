//! Linear superposition of profiles.
//!
//! Evaluation and sampling scales come straight from the children; photon
//! shooting splits the budget among them in proportion to absolute flux.

use log::trace;
use meter_math::NeumaierSum;
use nalgebra::Vector2;
use rand::Rng;
use rand_distr::{Binomial, Distribution};
use rustfft::num_complex::Complex64;
use std::sync::Arc;

use super::{not_analytic, Capabilities, Profile, SamplingScales, SurfaceBrightness};
use crate::error::{Domain, RenderError};
use crate::photon::{AllocationPolicy, PhotonArray};

/// Superposition of several profiles.
///
/// Children are kept in ascending order of |flux| so that compensated sums of
/// their values accumulate the faint components first.
#[derive(Debug, Clone)]
pub struct Sum {
    children: Arc<Vec<Profile>>,
    flux: f64,
    capabilities: Capabilities,
}

impl Sum {
    /// Nested sums are flattened into one node.
    pub fn new(children: Vec<Profile>) -> Result<Self, RenderError> {
        if children.is_empty() {
            return Err(RenderError::invalid(
                "children",
                0.0,
                "a Sum needs at least one profile",
            ));
        }
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Profile::Sum(inner) => flat.extend(inner.children.iter().cloned()),
                other => flat.push(other),
            }
        }
        flat.sort_by(|a, b| a.flux().abs().total_cmp(&b.flux().abs()));

        let flux = flat.iter().map(|c| c.flux()).collect::<NeumaierSum>().value();
        let capabilities = flat.iter().map(|c| c.capabilities()).fold(
            Capabilities {
                real_space: true,
                fourier: true,
                axisymmetric: true,
                hard_edges: false,
            },
            |acc, c| Capabilities {
                real_space: acc.real_space && c.real_space,
                fourier: acc.fourier && c.fourier,
                axisymmetric: acc.axisymmetric && c.axisymmetric,
                hard_edges: acc.hard_edges || c.hard_edges,
            },
        );

        Ok(Self {
            children: Arc::new(flat),
            flux,
            capabilities,
        })
    }

    /// Children in ascending order of |flux|.
    pub fn children(&self) -> &[Profile] {
        &self.children
    }

    /// Photon counts per child under `allocation`.
    fn allocate<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
        allocation: AllocationPolicy,
    ) -> Result<Vec<usize>, RenderError> {
        let weights: Vec<f64> = self.children.iter().map(|c| c.abs_flux()).collect();
        let total: f64 = weights.iter().sum();
        let counts = match allocation {
            AllocationPolicy::Multinomial => {
                let mut remaining_n = n as u64;
                let mut remaining_w = total;
                let mut counts = Vec::with_capacity(weights.len());
                for &w in &weights {
                    let p = if remaining_w > 0.0 {
                        (w / remaining_w).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                    let count = Binomial::new(remaining_n, p)
                        .map_err(|e| RenderError::invalid("allocation", p, e.to_string()))?
                        .sample(rng);
                    counts.push(count as usize);
                    remaining_n -= count;
                    remaining_w -= w;
                }
                // Rounding in remaining_w can leave photons unassigned; give them to the brightest
                if remaining_n > 0 {
                    if let Some(last) = counts.last_mut() {
                        *last += remaining_n as usize;
                    }
                }
                counts
            }
            AllocationPolicy::RoundWithFloor => weights
                .iter()
                .map(|&w| {
                    if w > 0.0 {
                        ((n as f64 * w / total).round() as usize).max(1)
                    } else {
                        0
                    }
                })
                .collect(),
            AllocationPolicy::Round => weights
                .iter()
                .map(|&w| (n as f64 * w / total).round() as usize)
                .collect(),
        };
        Ok(counts)
    }
}

impl SurfaceBrightness for Sum {
    fn flux(&self) -> f64 {
        self.flux
    }

    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        if !self.capabilities.real_space {
            return Err(not_analytic("Sum", Domain::RealSpace));
        }
        let mut total = NeumaierSum::new();
        for child in self.children.iter() {
            total.add(child.x_value(x, y)?);
        }
        Ok(total.value())
    }

    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError> {
        let mut re = NeumaierSum::new();
        let mut im = NeumaierSum::new();
        for child in self.children.iter() {
            let value = child.k_value(kx, ky)?;
            re.add(value.re);
            im.add(value.im);
        }
        Ok(Complex64::new(re.value(), im.value()))
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        let mut step_k = f64::INFINITY;
        let mut max_k = 0.0_f64;
        for child in self.children.iter() {
            let scales = child.sampling_scales()?;
            step_k = step_k.min(scales.step_k);
            max_k = max_k.max(scales.max_k);
        }
        Ok(SamplingScales { step_k, max_k })
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn centroid(&self) -> Vector2<f64> {
        if self.flux == 0.0 {
            return Vector2::zeros();
        }
        let weighted = self
            .children
            .iter()
            .fold(Vector2::zeros(), |acc, c| acc + c.centroid() * c.flux());
        weighted / self.flux
    }

    fn abs_flux(&self) -> f64 {
        self.children.iter().map(|c| c.abs_flux()).sum()
    }

    fn shoot<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
        allocation: AllocationPolicy,
    ) -> Result<PhotonArray, RenderError> {
        let total_abs = self.abs_flux();
        if total_abs == 0.0 {
            return Ok(PhotonArray::zeros(n));
        }
        let counts = self.allocate(n, rng, allocation)?;
        trace!("Sum allocation {:?} over {} photons ({:?})", counts, n, allocation);

        let mut photons = PhotonArray::with_capacity(counts.iter().sum());
        let mut contributing = 0;
        for (child, &count) in self.children.iter().zip(&counts) {
            if count == 0 {
                continue;
            }
            let mut part = child.shoot(count, rng, allocation)?;
            if allocation == AllocationPolicy::Multinomial {
                // Normalise by the expected count so that the estimate stays unbiased
                let expected = n as f64 * child.abs_flux() / total_abs;
                part.scale_flux(count as f64 / expected);
            }
            photons.append(part);
            contributing += 1;
        }
        if contributing > 1 {
            photons.set_correlated(true);
        }
        Ok(photons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{DeltaFunction, Gaussian};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn bright_and_faint() -> Sum {
        Sum::new(vec![
            Gaussian::from_sigma(1.0, 1000.0).unwrap().into(),
            Gaussian::from_sigma(2.0, 0.01).unwrap().into(),
            Gaussian::from_sigma(0.5, -3.0).unwrap().into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_children_sorted_by_abs_flux() {
        let sum = bright_and_faint();
        let fluxes: Vec<f64> = sum.children().iter().map(|c| c.flux()).collect();
        assert_eq!(fluxes, vec![0.01, -3.0, 1000.0]);
        assert_relative_eq!(sum.flux(), 997.01, epsilon = 1e-10);
        assert_relative_eq!(sum.abs_flux(), 1003.01, epsilon = 1e-10);
    }

    #[test]
    fn test_values_are_child_sums() {
        let a: Profile = Gaussian::from_sigma(1.0, 2.0).unwrap().into();
        let b: Profile = Gaussian::from_sigma(3.0, 5.0).unwrap().into();
        let sum = Sum::new(vec![a.clone(), b.clone()]).unwrap();
        let (x, y) = (0.3, -1.1);
        assert_relative_eq!(
            sum.x_value(x, y).unwrap(),
            a.x_value(x, y).unwrap() + b.x_value(x, y).unwrap(),
            epsilon = 1e-15
        );
        let k = sum.k_value(0.4, 0.2).unwrap();
        let expected = a.k_value(0.4, 0.2).unwrap() + b.k_value(0.4, 0.2).unwrap();
        assert_relative_eq!(k.re, expected.re, epsilon = 1e-14);

        let scales = sum.sampling_scales().unwrap();
        let sa = a.sampling_scales().unwrap();
        let sb = b.sampling_scales().unwrap();
        assert_eq!(scales.step_k, sb.step_k);
        assert_eq!(scales.max_k, sa.max_k);
    }

    #[test]
    fn test_flattening_and_empty() {
        let inner: Profile = bright_and_faint().into();
        let outer = Sum::new(vec![inner, DeltaFunction::new(1.0).unwrap().into()]).unwrap();
        assert_eq!(outer.children().len(), 4);
        assert!(!outer.capabilities().real_space);
        assert!(matches!(
            outer.x_value(0.0, 0.0),
            Err(RenderError::NotAnalytic { .. })
        ));
        assert!(matches!(
            Sum::new(vec![]),
            Err(RenderError::InvalidParameter { name: "children", .. })
        ));
    }

    #[test]
    fn test_round_with_floor_keeps_faint_child() {
        let sum = bright_and_faint();
        let mut rng = StdRng::seed_from_u64(1);
        let photons = sum.shoot(1000, &mut rng, AllocationPolicy::RoundWithFloor).unwrap();
        // 0.01 / 1003.01 of 1000 photons rounds to zero; the floor keeps one
        assert_eq!(photons.len(), 1000 + 1);
        assert_relative_eq!(photons.total_flux(), 997.01, max_relative = 1e-12);
        assert!(photons.is_correlated());
    }

    #[test]
    fn test_round_drops_faint_child() {
        let sum = bright_and_faint();
        let mut rng = StdRng::seed_from_u64(1);
        let photons = sum.shoot(1000, &mut rng, AllocationPolicy::Round).unwrap();
        assert_eq!(photons.len(), 1000);
        assert_relative_eq!(photons.total_flux(), 997.0, max_relative = 1e-12);
    }

    #[test]
    fn test_multinomial_is_unbiased() {
        let sum = bright_and_faint();
        let mut rng = StdRng::seed_from_u64(8);
        let mut totals = 0.0;
        let trials = 400;
        for _ in 0..trials {
            let photons = sum.shoot(500, &mut rng, AllocationPolicy::Multinomial).unwrap();
            assert_eq!(photons.len(), 500);
            totals += photons.total_flux();
        }
        assert_relative_eq!(totals / trials as f64, 997.01, max_relative = 2e-3);
    }
}
