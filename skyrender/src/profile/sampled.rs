use meter_math::NeumaierSum;
use ndarray::Array2;
use rand::Rng;
use rustfft::num_complex::Complex64;
use std::sync::Arc;

use super::{not_analytic, Capabilities, Interpolant, SamplingScales, SurfaceBrightness};
use crate::error::{require_flux, require_scale, Domain, RenderError};
use crate::params::RenderParams;
use crate::photon::{AllocationPolicy, PhotonArray};

/// A profile defined by an array of samples and an interpolation kernel.
///
/// Sample `[row, col]` sits at `((col - cx)·s, (row - cy)·s)`, where
/// `(cx, cy)` is the true center of the array, and carries flux `a[row, col]`.
/// Surface brightness is `Σ a_ij K(x/s - i) K(y/s - j) / s²`.
#[derive(Debug, Clone)]
pub struct SampledImage {
    data: Arc<Array2<f64>>,
    scale: f64,
    interpolant: Interpolant,
    flux: f64,
    /// Running sum of |a| in row-major order, for photon pixel selection.
    cumulative: Arc<Vec<f64>>,
    fourier: bool,
    params: RenderParams,
}

impl SampledImage {
    /// Wrap `data` sampled at spacing `scale`. With `flux` given, the samples
    /// are rescaled to sum to it.
    pub fn new(
        data: Array2<f64>,
        scale: f64,
        interpolant: Interpolant,
        flux: Option<f64>,
    ) -> Result<Self, RenderError> {
        let scale = require_scale("scale", scale)?;
        if data.is_empty() {
            return Err(RenderError::degenerate("sampled image has no pixels"));
        }
        if let Some(bad) = data.iter().find(|v| !v.is_finite()) {
            return Err(RenderError::invalid(
                "data",
                *bad,
                "sampled image values must be finite",
            ));
        }

        let mut data = data;
        let sum = data.iter().copied().collect::<NeumaierSum>().value();
        let flux = match flux {
            Some(target) => {
                let target = require_flux(target)?;
                if sum == 0.0 {
                    return Err(RenderError::invalid(
                        "flux",
                        target,
                        "cannot renormalise an image that sums to zero",
                    ));
                }
                let ratio = target / sum;
                data.mapv_inplace(|v| v * ratio);
                target
            }
            None => sum,
        };

        let mut running = 0.0;
        let cumulative = data
            .iter()
            .map(|v| {
                running += v.abs();
                running
            })
            .collect();

        Ok(Self {
            data: Arc::new(data),
            scale,
            interpolant,
            flux,
            cumulative: Arc::new(cumulative),
            fourier: true,
            params: RenderParams::default(),
        })
    }

    pub fn with_params(mut self, params: RenderParams) -> Self {
        self.params = params;
        self
    }

    /// Disable Fourier evaluation; only real-space rendering remains available.
    pub fn real_space_only(mut self) -> Self {
        self.fourier = false;
        self
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn interpolant(&self) -> Interpolant {
        self.interpolant
    }

    /// Array coordinates (col, row) of the profile origin.
    fn center(&self) -> (f64, f64) {
        let (rows, cols) = self.data.dim();
        (0.5 * (cols as f64 - 1.0), 0.5 * (rows as f64 - 1.0))
    }

    fn abs_sum(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Phase factors `exp(-i k (i - c) s)` for every index along one axis.
    fn phases(&self, k: f64, len: usize, center: f64) -> Vec<Complex64> {
        (0..len)
            .map(|i| Complex64::from_polar(1.0, -k * (i as f64 - center) * self.scale))
            .collect()
    }
}

impl SurfaceBrightness for SampledImage {
    fn flux(&self) -> f64 {
        self.flux
    }

    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        let (cx, cy) = self.center();
        let (rows, cols) = self.data.dim();
        let u = x / self.scale + cx;
        let v = y / self.scale + cy;
        let range = self.interpolant.range();

        let col_lo = (u - range).ceil().max(0.0);
        let col_hi = (u + range).floor().min(cols as f64 - 1.0);
        let row_lo = (v - range).ceil().max(0.0);
        let row_hi = (v + range).floor().min(rows as f64 - 1.0);
        if col_lo > col_hi || row_lo > row_hi {
            return Ok(0.0);
        }

        let mut total = 0.0;
        for row in row_lo as usize..=row_hi as usize {
            let ky = self.interpolant.kernel(v - row as f64);
            if ky == 0.0 {
                continue;
            }
            let mut line = 0.0;
            for col in col_lo as usize..=col_hi as usize {
                line += self.data[[row, col]] * self.interpolant.kernel(u - col as f64);
            }
            total += ky * line;
        }
        Ok(total / (self.scale * self.scale))
    }

    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError> {
        if !self.fourier {
            return Err(not_analytic("SampledImage", Domain::Fourier));
        }
        let (cx, cy) = self.center();
        let (rows, cols) = self.data.dim();
        let col_phase = self.phases(kx, cols, cx);
        let row_phase = self.phases(ky, rows, cy);

        let mut total = Complex64::new(0.0, 0.0);
        for (row, line) in self.data.outer_iter().enumerate() {
            let inner: Complex64 = line
                .iter()
                .zip(&col_phase)
                .map(|(&a, &p)| p * a)
                .sum();
            total += inner * row_phase[row];
        }
        let envelope = self.interpolant.u_value(kx * self.scale)
            * self.interpolant.u_value(ky * self.scale);
        Ok(total * envelope)
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        let (rows, cols) = self.data.dim();
        let radius = (0.5 * rows.max(cols) as f64 + self.interpolant.range()) * self.scale;
        let max_k = self.interpolant.max_k(self.params.maxk_threshold) / self.scale;
        Ok(SamplingScales::from_radius(radius, max_k))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            real_space: true,
            fourier: self.fourier,
            axisymmetric: false,
            hard_edges: self.interpolant == Interpolant::Nearest,
        }
    }

    fn centroid(&self) -> nalgebra::Vector2<f64> {
        let (cx, cy) = self.center();
        let mut sx = NeumaierSum::new();
        let mut sy = NeumaierSum::new();
        for ((row, col), &a) in self.data.indexed_iter() {
            sx.add(a * (col as f64 - cx));
            sy.add(a * (row as f64 - cy));
        }
        if self.flux == 0.0 {
            return nalgebra::Vector2::zeros();
        }
        nalgebra::Vector2::new(sx.value(), sy.value()) * (self.scale / self.flux)
    }

    fn abs_flux(&self) -> f64 {
        let norm = self.interpolant.abs_integral();
        self.abs_sum() * norm * norm
    }

    fn shoot<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
        _allocation: AllocationPolicy,
    ) -> Result<PhotonArray, RenderError> {
        let total = self.abs_sum();
        if total == 0.0 {
            return Ok(PhotonArray::zeros(n));
        }
        let mut photons = PhotonArray::with_capacity(n);
        if n == 0 {
            return Ok(photons);
        }
        let (cx, cy) = self.center();
        let cols = self.data.ncols();
        let weight = self.abs_flux() / n as f64;
        let flat = self
            .data
            .as_slice()
            .map(|s| s.to_vec())
            .unwrap_or_else(|| self.data.iter().copied().collect());

        for _ in 0..n {
            let u = rng.gen::<f64>() * total;
            let index = self
                .cumulative
                .partition_point(|&c| c <= u)
                .min(flat.len() - 1);
            let (row, col) = (index / cols, index % cols);
            let dx = self.interpolant.sample_offset(rng);
            let dy = self.interpolant.sample_offset(rng);
            let sign = flat[index].signum()
                * self.interpolant.kernel(dx).signum()
                * self.interpolant.kernel(dy).signum();
            photons.push(
                (col as f64 - cx + dx) * self.scale,
                (row as f64 - cy + dy) * self.scale,
                sign * weight,
            );
        }
        Ok(photons)
    }
}
