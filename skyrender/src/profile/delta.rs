//! Point source: all flux at the origin, flat in Fourier space.

use rand::Rng;
use rustfft::num_complex::Complex64;

use super::{not_analytic, Capabilities, SamplingScales, SurfaceBrightness};
use crate::error::{require_flux, Domain, RenderError};
use crate::photon::{AllocationPolicy, PhotonArray};

/// A point source at the origin.
///
/// Only its transform (a constant equal to the flux) exists; it is useful as
/// a convolution operand and as a photon source.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaFunction {
    flux: f64,
}

impl DeltaFunction {
    pub fn new(flux: f64) -> Result<Self, RenderError> {
        Ok(Self {
            flux: require_flux(flux)?,
        })
    }
}

impl SurfaceBrightness for DeltaFunction {
    fn flux(&self) -> f64 {
        self.flux
    }

    fn x_value(&self, _x: f64, _y: f64) -> Result<f64, RenderError> {
        Err(not_analytic("DeltaFunction", Domain::RealSpace))
    }

    fn k_value(&self, _kx: f64, _ky: f64) -> Result<Complex64, RenderError> {
        Ok(Complex64::new(self.flux, 0.0))
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        Ok(SamplingScales {
            step_k: f64::INFINITY,
            max_k: f64::INFINITY,
        })
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            real_space: false,
            fourier: true,
            axisymmetric: true,
            hard_edges: false,
        }
    }

    fn shoot<R: Rng + ?Sized>(
        &self,
        n: usize,
        _rng: &mut R,
        _allocation: AllocationPolicy,
    ) -> Result<PhotonArray, RenderError> {
        let mut photons = PhotonArray::with_capacity(n);
        if n > 0 {
            let weight = self.flux / n as f64;
            (0..n).for_each(|_| photons.push(0.0, 0.0, weight));
        }
        Ok(photons)
    }
}
