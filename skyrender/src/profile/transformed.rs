//! Affine distortion of a child profile: linear map, shift and flux ratio.
//!
//! For `x' = M x + c` the surface brightness is `f'(x') = r f(M⁻¹(x' - c)) / |det M|`
//! and the transform picks up the phase `exp(-i k·c)` with `k` mapped by `Mᵀ`.

use meter_math::{checked_determinant, invert_matrix, singular_values, transpose_apply};
use nalgebra::{Matrix2, Vector2};
use rand::Rng;
use rustfft::num_complex::Complex64;
use std::f64::consts::PI;
use std::sync::Arc;

use super::{Capabilities, Profile, SamplingScales, SurfaceBrightness};
use crate::error::RenderError;
use crate::photon::{AllocationPolicy, PhotonArray};

/// Relative tolerance for treating `MᵀM` as a multiple of the identity.
const ISOTROPY_TOLERANCE: f64 = 1e-12;

/// A profile mapped through `x → M x + b` with its flux multiplied by `a`.
///
/// ```text
/// f'(x) = a f(M⁻¹ (x - b)) / |det M|
/// F'(k) = a F(Mᵀ k) exp(-i k·b)
/// ```
///
/// Transforms of transforms collapse into a single node.
#[derive(Debug, Clone)]
pub struct Transformed {
    child: Arc<Profile>,
    matrix: Matrix2<f64>,
    inverse: Matrix2<f64>,
    abs_det: f64,
    offset: Vector2<f64>,
    flux_ratio: f64,
    capabilities: Capabilities,
}

impl Transformed {
    pub fn new(
        child: Profile,
        matrix: Matrix2<f64>,
        offset: Vector2<f64>,
        flux_ratio: f64,
    ) -> Result<Self, RenderError> {
        if !flux_ratio.is_finite() {
            return Err(RenderError::invalid(
                "flux_ratio",
                flux_ratio,
                "must be finite",
            ));
        }
        if !offset.iter().all(|v| v.is_finite()) {
            return Err(RenderError::invalid(
                "offset",
                offset.norm(),
                "must be finite",
            ));
        }
        checked_determinant(&matrix)?;

        let (child, matrix, offset, flux_ratio) = match child {
            Profile::Transformed(inner) => (
                inner.child.clone(),
                matrix * inner.matrix,
                matrix * inner.offset + offset,
                flux_ratio * inner.flux_ratio,
            ),
            other => (Arc::new(other), matrix, offset, flux_ratio),
        };

        // The product of two valid maps can still be numerically singular
        let det = checked_determinant(&matrix)?;
        let inverse = invert_matrix(&matrix)?;

        let child_caps = child.capabilities();
        let mtm = matrix.transpose() * matrix;
        let isotropic = (mtm[(0, 1)].abs() <= ISOTROPY_TOLERANCE * mtm.norm())
            && ((mtm[(0, 0)] - mtm[(1, 1)]).abs() <= ISOTROPY_TOLERANCE * mtm.norm());
        let capabilities = Capabilities {
            axisymmetric: child_caps.axisymmetric && isotropic && offset == Vector2::zeros(),
            ..child_caps
        };

        Ok(Self {
            child,
            matrix,
            inverse,
            abs_det: det.abs(),
            offset,
            flux_ratio,
            capabilities,
        })
    }

    pub fn child(&self) -> &Profile {
        &self.child
    }

    pub fn matrix(&self) -> &Matrix2<f64> {
        &self.matrix
    }

    pub fn offset(&self) -> &Vector2<f64> {
        &self.offset
    }

    pub fn flux_ratio(&self) -> f64 {
        self.flux_ratio
    }
}

impl SurfaceBrightness for Transformed {
    fn flux(&self) -> f64 {
        self.flux_ratio * self.child.flux()
    }

    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        let p = self.inverse * (Vector2::new(x, y) - self.offset);
        Ok(self.flux_ratio * self.child.x_value(p.x, p.y)? / self.abs_det)
    }

    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError> {
        let k = Vector2::new(kx, ky);
        let kp = transpose_apply(&self.matrix, &k);
        let value = self.child.k_value(kp.x, kp.y)? * self.flux_ratio;
        if self.offset == Vector2::zeros() {
            return Ok(value);
        }
        Ok(value * Complex64::from_polar(1.0, -k.dot(&self.offset)))
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        let child = self.child.sampling_scales()?;
        let (sigma_max, sigma_min) = singular_values(&self.matrix);
        // Child extent π/step_k stretches by at most σ_max and moves by |b|
        let radius = sigma_max * PI / child.step_k + self.offset.norm();
        Ok(SamplingScales {
            step_k: PI / radius,
            max_k: child.max_k / sigma_min,
        })
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn centroid(&self) -> Vector2<f64> {
        self.matrix * self.child.centroid() + self.offset
    }

    fn abs_flux(&self) -> f64 {
        self.flux_ratio.abs() * self.child.abs_flux()
    }

    fn shoot<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
        allocation: AllocationPolicy,
    ) -> Result<PhotonArray, RenderError> {
        let mut photons = self.child.shoot(n, rng, allocation)?;
        photons.apply_affine(&self.matrix, &self.offset);
        photons.scale_flux(self.flux_ratio);
        Ok(photons)
    }
}
