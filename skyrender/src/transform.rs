//! Pixel-to-sky coordinate transforms.
//!
//! `sky = J (pixel - pixel_origin) + sky_origin`, where `J` is the 2x2
//! Jacobian in sky units per pixel. Renderers only ever need the local
//! affine approximation at one point, so higher-order maps plug in through
//! [`CoordinateTransform::local_affine`]. [`RadialDistortion`] is one such map.

use meter_math::{checked_determinant, invert_matrix, rotation_matrix, scale_matrix};
use nalgebra::{Matrix2, Vector2};
use std::fmt::Debug;

use crate::error::{require_scale, RenderError};

/// Pixel offset used for the numerical Jacobian of a non-affine map.
const JACOBIAN_STEP: f64 = 1e-3;

/// A map between pixel and sky coordinates.
pub trait CoordinateTransform: Debug + Send + Sync {
    fn to_sky(&self, pixel: Vector2<f64>) -> Vector2<f64>;

    fn to_pixel(&self, sky: Vector2<f64>) -> Vector2<f64>;

    /// Affine approximation of the map in the neighbourhood of `pixel`.
    ///
    /// The default differentiates [`to_sky`](Self::to_sky) with central
    /// differences; the result is anchored at `pixel`. Fails if the map is
    /// locally singular there.
    fn local_affine(&self, pixel: Vector2<f64>) -> Result<AffineTransform, RenderError> {
        let column = |step: Vector2<f64>| {
            (self.to_sky(pixel + step) - self.to_sky(pixel - step)) / (2.0 * JACOBIAN_STEP)
        };
        let jacobian = Matrix2::from_columns(&[
            column(Vector2::new(JACOBIAN_STEP, 0.0)),
            column(Vector2::new(0.0, JACOBIAN_STEP)),
        ]);
        AffineTransform::new(jacobian, pixel, self.to_sky(pixel))
    }
}

/// Affine pixel-to-sky transform with a cached inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    jacobian: Matrix2<f64>,
    inverse: Matrix2<f64>,
    determinant: f64,
    pixel_origin: Vector2<f64>,
    sky_origin: Vector2<f64>,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self {
            jacobian: Matrix2::identity(),
            inverse: Matrix2::identity(),
            determinant: 1.0,
            pixel_origin: Vector2::zeros(),
            sky_origin: Vector2::zeros(),
        }
    }
}

impl AffineTransform {
    /// Build a transform, rejecting singular or non-finite Jacobians.
    pub fn new(
        jacobian: Matrix2<f64>,
        pixel_origin: Vector2<f64>,
        sky_origin: Vector2<f64>,
    ) -> Result<Self, RenderError> {
        let determinant = checked_determinant(&jacobian)?;
        let inverse = invert_matrix(&jacobian)?;
        if !pixel_origin.iter().chain(sky_origin.iter()).all(|v| v.is_finite()) {
            return Err(RenderError::invalid(
                "origin",
                f64::NAN,
                "pixel and sky origins must be finite",
            ));
        }
        Ok(Self {
            jacobian,
            inverse,
            determinant,
            pixel_origin,
            sky_origin,
        })
    }

    /// Square pixels of side `scale` sky units, axes aligned.
    pub fn pixel_scale(scale: f64) -> Result<Self, RenderError> {
        let scale = require_scale("pixel scale", scale)?;
        Self::new(scale_matrix(scale, scale), Vector2::zeros(), Vector2::zeros())
    }

    /// Square pixels of side `scale` rotated by `angle` radians on the sky.
    pub fn rotated_pixel_scale(scale: f64, angle: f64) -> Result<Self, RenderError> {
        let scale = require_scale("pixel scale", scale)?;
        Self::new(
            rotation_matrix(angle) * scale_matrix(scale, scale),
            Vector2::zeros(),
            Vector2::zeros(),
        )
    }

    pub fn with_origins(
        self,
        pixel_origin: Vector2<f64>,
        sky_origin: Vector2<f64>,
    ) -> Result<Self, RenderError> {
        Self::new(self.jacobian, pixel_origin, sky_origin)
    }

    pub fn jacobian(&self) -> &Matrix2<f64> {
        &self.jacobian
    }

    pub fn inverse_jacobian(&self) -> &Matrix2<f64> {
        &self.inverse
    }

    pub fn determinant(&self) -> f64 {
        self.determinant
    }

    /// Sky area of one pixel.
    pub fn pixel_area(&self) -> f64 {
        self.determinant.abs()
    }

    pub fn pixel_origin(&self) -> Vector2<f64> {
        self.pixel_origin
    }

    pub fn sky_origin(&self) -> Vector2<f64> {
        self.sky_origin
    }
}

impl CoordinateTransform for AffineTransform {
    fn to_sky(&self, pixel: Vector2<f64>) -> Vector2<f64> {
        self.jacobian * (pixel - self.pixel_origin) + self.sky_origin
    }

    fn to_pixel(&self, sky: Vector2<f64>) -> Vector2<f64> {
        self.inverse * (sky - self.sky_origin) + self.pixel_origin
    }

    fn local_affine(&self, _pixel: Vector2<f64>) -> Result<AffineTransform, RenderError> {
        Ok(*self)
    }
}

/// Third-order radial (barrel or pincushion) distortion ahead of an affine map.
///
/// A pixel at offset `d` from the base transform's pixel origin is first
/// moved to `d (1 + k |d|²)` and then mapped to the sky by `base`. Positive
/// `k` stretches the field edges (pincushion), negative `k` compresses them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadialDistortion {
    base: AffineTransform,
    k: f64,
}

impl RadialDistortion {
    /// Iterations of the fixed-point inversion in `to_pixel`.
    const INVERSE_ITERATIONS: usize = 100;

    pub fn new(base: AffineTransform, k: f64) -> Result<Self, RenderError> {
        if !k.is_finite() {
            return Err(RenderError::invalid("k", k, "distortion coefficient must be finite"));
        }
        Ok(Self { base, k })
    }

    pub fn base(&self) -> &AffineTransform {
        &self.base
    }

    pub fn coefficient(&self) -> f64 {
        self.k
    }
}

impl CoordinateTransform for RadialDistortion {
    fn to_sky(&self, pixel: Vector2<f64>) -> Vector2<f64> {
        let d = pixel - self.base.pixel_origin;
        let stretched = d * (1.0 + self.k * d.norm_squared());
        self.base.to_sky(self.base.pixel_origin + stretched)
    }

    /// Fixed-point inversion; converges while `|k| r²` stays well below one.
    fn to_pixel(&self, sky: Vector2<f64>) -> Vector2<f64> {
        let target = self.base.to_pixel(sky) - self.base.pixel_origin;
        let mut d = target;
        for _ in 0..Self::INVERSE_ITERATIONS {
            let next = target / (1.0 + self.k * d.norm_squared());
            let settled = (next - d).norm() <= 1e-14 * (1.0 + target.norm());
            d = next;
            if settled {
                break;
            }
        }
        self.base.pixel_origin + d
    }
}
