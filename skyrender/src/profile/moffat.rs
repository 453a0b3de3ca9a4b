//! Moffat profile `I(r) ∝ (1 + (r/r_d)²)^{-β}` with optional truncation.

use meter_math::{bisect, DEFAULT_MAX_ITERATIONS};
use once_cell::sync::OnceCell;
use rand::Rng;
use rustfft::num_complex::Complex64;
use std::f64::consts::{PI, SQRT_2};
use std::sync::Arc;

use super::radial::HankelTable;
use super::{random_direction, Capabilities, RadialSize, SamplingScales, SurfaceBrightness};
use crate::error::{require_flux, require_scale, RenderError};
use crate::params::RenderParams;
use crate::photon::{AllocationPolicy, PhotonArray};

/// Moffat profile: `I(r) = I0 · (1 + (r / rd)²)^{-β}`, optionally truncated at `trunc`.
///
/// `β ≤ 1` has divergent flux and is only accepted with a truncation radius.
#[derive(Debug, Clone)]
pub struct Moffat {
    beta: f64,
    scale_radius: f64,
    /// Zero when untruncated.
    trunc: f64,
    flux: f64,
    params: RenderParams,
    table: Arc<OnceCell<HankelTable>>,
}

impl Moffat {
    pub fn new(beta: f64, size: RadialSize, flux: f64) -> Result<Self, RenderError> {
        Self::build(beta, size, flux, 0.0)
    }

    /// Moffat truncated at radius `trunc`; `flux` and a `HalfLight` size
    /// refer to the truncated profile.
    pub fn truncated(
        beta: f64,
        size: RadialSize,
        flux: f64,
        trunc: f64,
    ) -> Result<Self, RenderError> {
        let trunc = require_scale("trunc", trunc)?;
        Self::build(beta, size, flux, trunc)
    }

    pub fn with_params(mut self, params: RenderParams) -> Self {
        if self.params == params {
            return self;
        }
        self.params = params;
        self.table = Arc::new(OnceCell::new());
        self
    }

    fn build(beta: f64, size: RadialSize, flux: f64, trunc: f64) -> Result<Self, RenderError> {
        if !beta.is_finite() || beta <= 0.0 {
            return Err(RenderError::invalid("beta", beta, "must be positive and finite"));
        }
        if beta <= 1.0 && trunc == 0.0 {
            return Err(RenderError::invalid(
                "beta",
                beta,
                "Moffat profiles with beta <= 1 need a truncation radius",
            ));
        }
        let value = require_scale(size.name(), size.value())?;
        let scale_radius = match size {
            RadialSize::Scale(_) => value,
            RadialSize::Fwhm(_) => value / (2.0 * (2f64.powf(1.0 / beta) - 1.0).sqrt()),
            RadialSize::HalfLight(_) if trunc == 0.0 => {
                value / (2f64.powf(1.0 / (beta - 1.0)) - 1.0).sqrt()
            }
            RadialSize::HalfLight(_) => Self::scale_for_truncated_hlr(beta, value, trunc)?,
            RadialSize::Sigma(_) => return Err(size.unsupported("Moffat")),
        };

        Ok(Self {
            beta,
            scale_radius,
            trunc,
            flux: require_flux(flux)?,
            params: RenderParams::default(),
            table: Arc::new(OnceCell::new()),
        })
    }

    /// Scale radius giving half-light radius `hlr` once truncated at `trunc`.
    fn scale_for_truncated_hlr(beta: f64, hlr: f64, trunc: f64) -> Result<f64, RenderError> {
        if hlr >= trunc / SQRT_2 {
            return Err(RenderError::invalid(
                "half_light_radius",
                hlr,
                format!("must be below trunc / sqrt(2) = {}", trunc / SQRT_2),
            ));
        }
        // Half-light fraction as a function of ln(rd); tends to (hlr/trunc)² < 1/2 for large rd
        let excess = |ln_rd: f64| {
            let rd = ln_rd.exp();
            enclosed_norm(beta, hlr / rd) / enclosed_norm(beta, trunc / rd) - 0.5
        };
        let lo = (1e-6 * hlr).ln();
        let hi = (1e6 * trunc).ln();
        if excess(lo) <= 0.0 {
            return Err(RenderError::invalid(
                "half_light_radius",
                hlr,
                format!("no Moffat with beta={beta} has this radius inside trunc={trunc}"),
            ));
        }
        Ok(bisect(excess, lo, hi, 1e-12, DEFAULT_MAX_ITERATIONS)?.exp())
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn scale_radius(&self) -> f64 {
        self.scale_radius
    }

    pub fn trunc(&self) -> Option<f64> {
        (self.trunc > 0.0).then_some(self.trunc)
    }

    pub fn fwhm(&self) -> f64 {
        2.0 * self.scale_radius * (2f64.powf(1.0 / self.beta) - 1.0).sqrt()
    }

    pub fn half_light_radius(&self) -> f64 {
        self.radius_enclosing(0.5)
    }

    /// Enclosed-flux normalisation out to the truncation (∞ when untruncated).
    fn total_norm(&self) -> f64 {
        if self.trunc > 0.0 {
            enclosed_norm(self.beta, self.trunc / self.scale_radius)
        } else {
            1.0 / (self.beta - 1.0)
        }
    }

    /// Radius enclosing `fraction` of the (truncated) flux, in closed form.
    fn radius_enclosing(&self, fraction: f64) -> f64 {
        let target = fraction * self.total_norm();
        let one_plus_s2 = if (self.beta - 1.0).abs() < 1e-12 {
            target.exp()
        } else {
            (1.0 - (self.beta - 1.0) * target).powf(1.0 / (1.0 - self.beta))
        };
        self.scale_radius * (one_plus_s2 - 1.0).max(0.0).sqrt()
    }

    fn table(&self) -> Result<&HankelTable, RenderError> {
        self.table.get_or_try_init(|| {
            let beta = self.beta;
            let r_max = if self.trunc > 0.0 {
                self.trunc / self.scale_radius
            } else {
                self.radius_enclosing(1.0 - 1e-2 * self.params.kvalue_accuracy)
                    / self.scale_radius
            };
            HankelTable::build(
                |s: f64| {
                    if s > r_max {
                        0.0
                    } else {
                        (1.0 + s * s).powf(-beta)
                    }
                },
                self.half_light_radius() / self.scale_radius,
                r_max,
                &self.params,
            )
        })
    }
}

/// `∫0^s 2 s' (1 + s'²)^{-β} ds'`: enclosed flux over `π I0 rd²` at radius `s · rd`.
fn enclosed_norm(beta: f64, s: f64) -> f64 {
    let x = 1.0 + s * s;
    if (beta - 1.0).abs() < 1e-12 {
        x.ln()
    } else {
        (1.0 - x.powf(1.0 - beta)) / (beta - 1.0)
    }
}

impl SurfaceBrightness for Moffat {
    fn flux(&self) -> f64 {
        self.flux
    }

    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        let r2 = x * x + y * y;
        if self.trunc > 0.0 && r2 > self.trunc * self.trunc {
            return Ok(0.0);
        }
        let rd2 = self.scale_radius * self.scale_radius;
        let i0 = self.flux / (PI * rd2 * self.total_norm());
        Ok(i0 * (1.0 + r2 / rd2).powf(-self.beta))
    }

    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError> {
        let k = (kx * kx + ky * ky).sqrt() * self.scale_radius;
        Ok(Complex64::new(self.flux * self.table()?.ratio(k), 0.0))
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        let max_k = self.table()?.max_k() / self.scale_radius;
        let radius = self
            .radius_enclosing(1.0 - self.params.folding_threshold)
            .max(self.params.stepk_minimum_hlr * self.half_light_radius());
        Ok(SamplingScales::from_radius(radius, max_k))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            hard_edges: self.trunc > 0.0,
            ..Capabilities::ANALYTIC_RADIAL
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
            let r = self.radius_enclosing(rng.gen::<f64>());
            let (c, s) = random_direction(rng);
            photons.push(r * c, r * s, weight);
        }
        Ok(photons)
    }
}
