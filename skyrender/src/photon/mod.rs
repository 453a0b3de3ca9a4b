//! Photon shooting.
//!
//! Profiles draw photons ([`PhotonArray`]) from their own light distribution;
//! a [`Sensor`] deposits them into an image. The renderer in
//! [`renderer`] splits large photon budgets into seeded chunks.

pub(crate) mod deviate;
pub mod renderer;
pub mod sensor;

pub use renderer::{draw_photons, draw_photons_with_sensor, shoot_with_rng, ShootReport};
pub use sensor::{Sensor, SimpleSensor};

use meter_math::NeumaierSum;
use nalgebra::{Matrix2, Vector2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::image::DepositKernel;

/// How a Sum divides its photon budget between children.
///
/// Children are weighted by absolute flux. Each child's photons carry that
/// child's flux divided by its own photon count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AllocationPolicy {
    /// Random multinomial counts; a faint child may receive no photons in a
    /// given realization.
    Multinomial,
    /// Rounded counts with at least one photon per nonzero-flux child. The
    /// total may exceed the request by up to the number of children.
    #[default]
    RoundWithFloor,
    /// Plain rounding. Children rounded to zero photons are dropped together
    /// with their flux, so this policy is biased for faint children.
    Round,
}

/// How many photons to shoot and what each one weighs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PhotonCountPolicy {
    /// Exactly `n` photons of `flux / n` each.
    Fixed(usize),
    /// A Poisson(`n_mean`) count of photons of `flux / n_mean` each.
    Poisson(f64),
    /// One photon per unit of absolute flux (Poisson count), each of weight ±1.
    PhotonCounting,
}

impl Default for PhotonCountPolicy {
    fn default() -> Self {
        PhotonCountPolicy::Fixed(100_000)
    }
}

/// Options for the photon renderer.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ShootOptions {
    pub count: PhotonCountPolicy,
    pub allocation: AllocationPolicy,
    pub kernel: DepositKernel,
    /// Base seed; `None` draws one from the thread RNG (non-reproducible).
    pub seed: Option<u64>,
}

/// Positions and signed fluxes of a batch of photons.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotonArray {
    x: Vec<f64>,
    y: Vec<f64>,
    flux: Vec<f64>,
    /// Photon order depends on which component produced them (set by Sum).
    correlated: bool,
}

impl PhotonArray {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            x: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
            flux: Vec::with_capacity(n),
            correlated: false,
        }
    }

    /// `n` zero-flux photons at the origin.
    pub(crate) fn zeros(n: usize) -> Self {
        Self {
            x: vec![0.0; n],
            y: vec![0.0; n],
            flux: vec![0.0; n],
            correlated: false,
        }
    }

    pub fn push(&mut self, x: f64, y: f64, flux: f64) {
        self.x.push(x);
        self.y.push(y);
        self.flux.push(flux);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.x
            .iter()
            .zip(&self.y)
            .zip(&self.flux)
            .map(|((&x, &y), &f)| (x, y, f))
    }

    pub fn total_flux(&self) -> f64 {
        self.flux.iter().copied().collect::<NeumaierSum>().value()
    }

    pub fn append(&mut self, mut other: PhotonArray) {
        self.x.append(&mut other.x);
        self.y.append(&mut other.y);
        self.flux.append(&mut other.flux);
        self.correlated |= other.correlated;
    }

    pub fn is_correlated(&self) -> bool {
        self.correlated
    }

    pub(crate) fn set_correlated(&mut self, correlated: bool) {
        self.correlated = correlated;
    }

    /// Randomly permute the photons (Fisher-Yates), clearing the correlation flag.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for i in (1..self.len()).rev() {
            let j = rng.gen_range(0..=i);
            self.x.swap(i, j);
            self.y.swap(i, j);
            self.flux.swap(i, j);
        }
        self.correlated = false;
    }

    pub fn scale_flux(&mut self, ratio: f64) {
        self.flux.iter_mut().for_each(|f| *f *= ratio);
    }

    /// Replace each flux by its sign (unit photon weights).
    pub fn set_unit_weights(&mut self) {
        self.flux
            .iter_mut()
            .for_each(|f| *f = if *f < 0.0 { -1.0 } else { 1.0 });
    }

    /// Map positions through `x → M x + b`.
    pub fn apply_affine(&mut self, matrix: &Matrix2<f64>, offset: &Vector2<f64>) {
        for (x, y) in self.x.iter_mut().zip(self.y.iter_mut()) {
            let p = matrix * Vector2::new(*x, *y) + offset;
            *x = p.x;
            *y = p.y;
        }
    }

    /// Combine with photons from another operand of a convolution.
    ///
    /// Positions add; fluxes multiply and are rescaled by the photon count so
    /// that the total stays the product of the operand fluxes. Photons are
    /// paired by index, so both arrays must have the same length.
    pub(crate) fn convolve_with(&mut self, other: &PhotonArray) -> Result<(), RenderError> {
        if other.len() != self.len() {
            return Err(RenderError::invalid(
                "photons",
                other.len() as f64,
                format!(
                    "convolution operand produced {} photons where {} were requested",
                    other.len(),
                    self.len()
                ),
            ));
        }
        let n = self.len() as f64;
        for i in 0..self.len() {
            self.x[i] += other.x[i];
            self.y[i] += other.y[i];
            self.flux[i] *= other.flux[i] * n;
        }
        Ok(())
    }
}
