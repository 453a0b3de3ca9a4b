//! Sérsic profiles: `I(r) = I0 · exp(-(r / r0)^{1/n})`, optionally truncated.
//!
//! In units of the scale radius the enclosed flux is
//! `F(R) = 2π n I0 r0² Γ(2n) P(2n, (R/r0)^{1/n})`, so most size relations
//! reduce to inverting the regularized incomplete gamma function. The
//! Fourier transform has no closed form and is tabulated once per
//! `(n, truncation, flux convention)` and shared process-wide.

use log::debug;
use meter_math::{
    bisect, bracket_upward, gamma, regularized_lower_gamma, DEFAULT_MAX_ITERATIONS,
};
use once_cell::sync::{Lazy, OnceCell};
use rand::Rng;
use rand_distr::{Distribution, Gamma};
use rustfft::num_complex::Complex64;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};

use super::radial::HankelTable;
use super::{random_direction, Capabilities, RadialSize, SamplingScales, SurfaceBrightness};
use crate::error::{require_flux, require_scale, RenderError};
use crate::params::RenderParams;
use crate::photon::{AllocationPolicy, PhotonArray};

/// Supported range of the Sérsic index.
pub const MIN_INDEX: f64 = 0.5;
pub const MAX_INDEX: f64 = 4.2;

const ROOT_TOLERANCE: f64 = 1e-12;

/// Which size the caller fixed; the other one is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SizeKind {
    HalfLight,
    Scale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SersicKey {
    n: u64,
    kind: SizeKind,
    /// Truncation over the given size, in hundredths; 0 when untruncated.
    trunc_hundredths: i64,
    flux_untruncated: bool,
    params: [u64; 4],
}

/// Shape data shared by every Sérsic with the same key, in units of r0.
#[derive(Debug)]
struct SersicInfo {
    n: f64,
    /// `(R/r0)^{1/n}` at the stated half-light radius (HalfLight sizing only).
    b: Option<f64>,
    z_trunc: f64,
    /// P(2n, z_trunc): the fraction of the untruncated flux that survives.
    truncated_fraction: f64,
    /// `(R/r0)^{1/n}` at the actual half-light radius.
    z_half: f64,
    /// `(R/r0)^{1/n}` enclosing all but `folding_threshold` of the flux.
    z_fold: f64,
    table: OnceCell<HankelTable>,
    params: RenderParams,
}

static SERSIC_CACHE: Lazy<Mutex<HashMap<SersicKey, Arc<SersicInfo>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

impl SersicInfo {
    fn lookup(key: SersicKey, n: f64, trunc_ratio: f64, params: RenderParams) -> Result<Arc<Self>, RenderError> {
        {
            let cache = SERSIC_CACHE.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(info) = cache.get(&key) {
                return Ok(Arc::clone(info));
            }
        }
        let info = Arc::new(Self::solve(key, n, trunc_ratio, params)?);
        let mut cache = SERSIC_CACHE.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(cache.entry(key).or_insert(info)))
    }

    fn solve(key: SersicKey, n: f64, trunc_ratio: f64, params: RenderParams) -> Result<Self, RenderError> {
        let a = 2.0 * n;
        let truncated = trunc_ratio > 0.0;

        let (b, z_trunc) = match key.kind {
            SizeKind::Scale => {
                let z_trunc = if truncated {
                    trunc_ratio.powf(1.0 / n)
                } else {
                    f64::INFINITY
                };
                (None, z_trunc)
            }
            SizeKind::HalfLight => {
                let b_full = solve_gamma_quantile(a, 0.5, f64::INFINITY)?;
                if !truncated {
                    (Some(b_full), f64::INFINITY)
                } else if key.flux_untruncated {
                    (Some(b_full), b_full * trunc_ratio.powf(1.0 / n))
                } else {
                    if trunc_ratio <= std::f64::consts::SQRT_2 {
                        return Err(RenderError::invalid(
                            "trunc",
                            trunc_ratio,
                            "truncation must exceed sqrt(2) half-light radii",
                        ));
                    }
                    // Half of the truncated flux inside the stated radius
                    let x = trunc_ratio.powf(1.0 / n);
                    let b = bisect(
                        |b| regularized_lower_gamma(a, b) - 0.5 * regularized_lower_gamma(a, b * x),
                        1e-4 * b_full,
                        b_full,
                        ROOT_TOLERANCE,
                        DEFAULT_MAX_ITERATIONS,
                    )?;
                    (Some(b), b * x)
                }
            }
        };

        let truncated_fraction = regularized_lower_gamma(a, z_trunc);
        let z_half = solve_gamma_quantile(a, 0.5 * truncated_fraction, z_trunc)?;
        let z_fold = solve_gamma_quantile(
            a,
            (1.0 - params.folding_threshold) * truncated_fraction,
            z_trunc,
        )?;
        debug!(
            "Sersic n={n}: b={b:?}, z_trunc={z_trunc:.4}, kept fraction={truncated_fraction:.6}"
        );

        Ok(Self {
            n,
            b,
            z_trunc,
            truncated_fraction,
            z_half,
            z_fold,
            table: OnceCell::new(),
            params,
        })
    }

    fn table(&self) -> Result<&HankelTable, RenderError> {
        self.table.get_or_try_init(|| {
            let inv_n = 1.0 / self.n;
            let r_max = if self.z_trunc.is_finite() {
                self.z_trunc.powf(self.n)
            } else {
                let tail = 1e-2 * self.params.kvalue_accuracy;
                solve_gamma_quantile(2.0 * self.n, 1.0 - tail, f64::INFINITY)?.powf(self.n)
            };
            let s_trunc = r_max;
            HankelTable::build(
                |s: f64| {
                    if s > s_trunc {
                        0.0
                    } else {
                        (-s.powf(inv_n)).exp()
                    }
                },
                self.z_half.powf(self.n),
                r_max,
                &self.params,
            )
        })
    }
}

/// Solve `P(a, z) = target` for z in `(0, z_max]`.
fn solve_gamma_quantile(a: f64, target: f64, z_max: f64) -> Result<f64, RenderError> {
    let f = |z: f64| regularized_lower_gamma(a, z) - target;
    let (lo, hi) = if z_max.is_finite() {
        (0.0, z_max)
    } else {
        bracket_upward(f, 0.0, a.max(1.0), 2.0, 64)?
    };
    Ok(bisect(f, lo, hi, ROOT_TOLERANCE, DEFAULT_MAX_ITERATIONS)?)
}

fn params_key(params: &RenderParams) -> [u64; 4] {
    [
        params.folding_threshold.to_bits(),
        params.maxk_threshold.to_bits(),
        params.kvalue_accuracy.to_bits(),
        params.stepk_minimum_hlr.to_bits(),
    ]
}

/// Sérsic profile with index `n` in `[0.5, 4.2]`.
#[derive(Debug, Clone)]
pub struct Sersic {
    scale_radius: f64,
    /// Truncation radius; zero when untruncated.
    trunc: f64,
    flux: f64,
    size: RadialSize,
    requested_flux: f64,
    flux_untruncated: bool,
    info: Arc<SersicInfo>,
}

impl Sersic {
    /// Untruncated Sérsic sized by `HalfLight` or `Scale`.
    pub fn new(n: f64, size: RadialSize, flux: f64) -> Result<Self, RenderError> {
        Self::build(n, size, flux, 0.0, false, RenderParams::default())
    }

    /// Sérsic truncated at radius `trunc`.
    ///
    /// With `flux_untruncated` set, `flux` and a `HalfLight` size describe the
    /// profile before truncation and [`SurfaceBrightness::flux`] reports the
    /// smaller flux that remains. Otherwise they describe the truncated
    /// profile itself, which requires `trunc > √2 · half_light_radius`.
    ///
    /// The truncation radius is rounded to two decimals in units of the given
    /// size so that nearby profiles share one Fourier table.
    pub fn truncated(
        n: f64,
        size: RadialSize,
        flux: f64,
        trunc: f64,
        flux_untruncated: bool,
    ) -> Result<Self, RenderError> {
        let trunc = require_scale("trunc", trunc)?;
        Self::build(n, size, flux, trunc, flux_untruncated, RenderParams::default())
    }

    /// Rebuild with different accuracy settings.
    pub fn with_params(self, params: RenderParams) -> Result<Self, RenderError> {
        Self::build(
            self.info.n,
            self.size,
            self.requested_flux,
            self.trunc,
            self.flux_untruncated,
            params,
        )
    }

    fn build(
        n: f64,
        size: RadialSize,
        flux: f64,
        trunc: f64,
        flux_untruncated: bool,
        params: RenderParams,
    ) -> Result<Self, RenderError> {
        if !(MIN_INDEX..=MAX_INDEX).contains(&n) {
            return Err(RenderError::invalid(
                "n",
                n,
                format!("Sersic index must lie in [{MIN_INDEX}, {MAX_INDEX}]"),
            ));
        }
        let requested_flux = require_flux(flux)?;
        let given = require_scale(size.name(), size.value())?;
        let kind = match size {
            RadialSize::HalfLight(_) => SizeKind::HalfLight,
            RadialSize::Scale(_) => SizeKind::Scale,
            _ => return Err(size.unsupported("Sersic")),
        };

        let trunc_hundredths = if trunc > 0.0 {
            let hundredths = (trunc / given * 100.0).round();
            if hundredths < 1.0 {
                return Err(RenderError::invalid(
                    "trunc",
                    trunc,
                    "truncation radius is negligibly small",
                ));
            }
            hundredths as i64
        } else {
            0
        };
        let trunc_ratio = trunc_hundredths as f64 / 100.0;

        let key = SersicKey {
            n: n.to_bits(),
            kind,
            trunc_hundredths,
            flux_untruncated,
            params: params_key(&params),
        };
        let info = SersicInfo::lookup(key, n, trunc_ratio, params)?;

        let scale_radius = match info.b {
            Some(b) => given / b.powf(n),
            None => given,
        };
        let flux = if flux_untruncated {
            requested_flux * info.truncated_fraction
        } else {
            requested_flux
        };

        Ok(Self {
            scale_radius,
            trunc: trunc_ratio * given,
            flux,
            size,
            requested_flux,
            flux_untruncated,
            info,
        })
    }

    pub fn n(&self) -> f64 {
        self.info.n
    }

    pub fn scale_radius(&self) -> f64 {
        self.scale_radius
    }

    /// Radius enclosing half of the actual (possibly truncated) flux.
    pub fn half_light_radius(&self) -> f64 {
        self.scale_radius * self.info.z_half.powf(self.info.n)
    }

    /// Truncation radius, or `None` for an untruncated profile.
    pub fn trunc(&self) -> Option<f64> {
        (self.trunc > 0.0).then_some(self.trunc)
    }

    fn central_intensity(&self) -> f64 {
        let n = self.info.n;
        self.flux
            / (2.0 * PI * n * self.scale_radius * self.scale_radius
                * gamma(2.0 * n)
                * self.info.truncated_fraction)
    }
}

impl SurfaceBrightness for Sersic {
    fn flux(&self) -> f64 {
        self.flux
    }

    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        let r = (x * x + y * y).sqrt();
        if self.trunc > 0.0 && r > self.trunc {
            return Ok(0.0);
        }
        let s = r / self.scale_radius;
        Ok(self.central_intensity() * (-s.powf(1.0 / self.info.n)).exp())
    }

    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError> {
        let k = (kx * kx + ky * ky).sqrt() * self.scale_radius;
        let ratio = self.info.table()?.ratio(k);
        Ok(Complex64::new(self.flux * ratio, 0.0))
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        let max_k = self.info.table()?.max_k() / self.scale_radius;
        let mut radius = self.scale_radius * self.info.z_fold.powf(self.info.n);
        if self.trunc > 0.0 {
            radius = radius.min(self.trunc);
        }
        let radius = radius.max(self.info.params.stepk_minimum_hlr * self.half_light_radius());
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
        let index = self.info.n;
        let a = 2.0 * index;
        let gamma_dist =
            Gamma::new(a, 1.0).map_err(|e| RenderError::invalid("n", index, e.to_string()))?;
        let mut photons = PhotonArray::with_capacity(n);
        if n == 0 {
            return Ok(photons);
        }
        let weight = self.flux / n as f64;
        let z_trunc = self.info.z_trunc;
        // Rejection wastes at most half the draws; beyond that invert the CDF
        let use_rejection = !z_trunc.is_finite() || self.info.truncated_fraction >= 0.5;

        for _ in 0..n {
            let z = if use_rejection {
                loop {
                    let z = gamma_dist.sample(rng);
                    if z <= z_trunc {
                        break z;
                    }
                }
            } else {
                let u = rng.gen::<f64>() * self.info.truncated_fraction;
                solve_gamma_quantile(a, u, z_trunc)?
            };
            let r = self.scale_radius * z.powf(index);
            let (c, s) = random_direction(rng);
            photons.push(r * c, r * s, weight);
        }
        Ok(photons)
    }
}

/// De Vaucouleurs profile: a Sérsic with `n = 4`.
pub struct DeVaucouleurs;

impl DeVaucouleurs {
    pub fn new(size: RadialSize, flux: f64) -> Result<Sersic, RenderError> {
        Sersic::new(4.0, size, flux)
    }

    pub fn truncated(
        size: RadialSize,
        flux: f64,
        trunc: f64,
        flux_untruncated: bool,
    ) -> Result<Sersic, RenderError> {
        Sersic::truncated(4.0, size, flux, trunc, flux_untruncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::test_support::{enclosed_flux, enclosed_flux_log};
    use crate::profile::Profile;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_half_light_radius() {
        let s = Sersic::new(2.5, RadialSize::HalfLight(1.0), 5.0).unwrap();
        assert_relative_eq!(s.half_light_radius(), 1.0, max_relative = 1e-9);
        let p: Profile = s.into();
        assert_relative_eq!(enclosed_flux(&p, 1.0, 100_000), 2.5, max_relative = 1e-4);
    }

    #[test]
    fn test_untruncated_total_flux() {
        // The flux outside 1000 half-light radii is below 1e-10 for n ≤ 4
        for &n in &[0.5_f64, 1.0, 2.5, 4.0] {
            let p: Profile = Sersic::new(n, RadialSize::HalfLight(1.5), 7.0).unwrap().into();
            let total = enclosed_flux_log(&p, 1e-8, 1500.0, 200_000);
            assert_relative_eq!(total, 7.0, max_relative = 1e-6);
        }
        let p: Profile = Sersic::new(4.0, RadialSize::Scale(0.01), 1.0).unwrap().into();
        assert_relative_eq!(enclosed_flux_log(&p, 1e-12, 1e4, 200_000), 1.0, max_relative = 1e-6);
    }

    #[test]
    fn test_index_one_matches_exponential() {
        let s = Sersic::new(1.0, RadialSize::Scale(1.0), 1.0).unwrap();
        assert_relative_eq!(
            s.half_light_radius(),
            super::super::Exponential::HLR_FACTOR,
            max_relative = 1e-8
        );
        for &k in &[0.1_f64, 0.7, 2.0, 5.0] {
            let expected = (1.0 + k * k).powf(-1.5);
            assert_relative_eq!(s.k_value(k, 0.0).unwrap().re, expected, epsilon = 2e-5);
        }
        assert_relative_eq!(
            s.x_value(0.0, 0.0).unwrap(),
            1.0 / (2.0 * PI),
            max_relative = 1e-10
        );
    }

    #[test]
    fn test_truncated_keeps_stated_flux_and_radius() {
        let s = Sersic::truncated(1.5, RadialSize::HalfLight(1.0), 2.0, 3.0, false).unwrap();
        assert_eq!(s.flux(), 2.0);
        assert_eq!(s.trunc(), Some(3.0));
        assert_relative_eq!(s.half_light_radius(), 1.0, max_relative = 1e-8);
        assert_eq!(s.x_value(3.01, 0.0).unwrap(), 0.0);
        assert!(s.capabilities().hard_edges);

        let p: Profile = s.into();
        assert_relative_eq!(enclosed_flux(&p, 1.0, 50_000), 1.0, max_relative = 1e-4);
        assert_relative_eq!(enclosed_flux(&p, 3.0, 150_000), 2.0, max_relative = 1e-4);
    }

    #[test]
    fn test_truncation_inside_sqrt2_rejected() {
        assert!(matches!(
            Sersic::truncated(2.0, RadialSize::HalfLight(1.0), 1.0, 1.2, false),
            Err(RenderError::InvalidParameter { name: "trunc", .. })
        ));
        // The untruncated convention has no such limit
        assert!(Sersic::truncated(2.0, RadialSize::HalfLight(1.0), 1.0, 1.2, true).is_ok());
    }

    #[test]
    fn test_flux_untruncated_reports_remaining_flux() {
        let s = Sersic::truncated(2.0, RadialSize::HalfLight(1.0), 10.0, 2.0, true).unwrap();
        let kept = regularized_lower_gamma(4.0, s.info.b.unwrap() * 2.0_f64.sqrt());
        assert_relative_eq!(s.flux(), 10.0 * kept, max_relative = 1e-12);
        assert!(s.flux() < 10.0);
        assert!(s.half_light_radius() < 1.0);
        assert_relative_eq!(s.k_value(0.0, 0.0).unwrap().re, s.flux());
    }

    #[test]
    fn test_truncation_rounding_and_cache() {
        let a = Sersic::truncated(3.0, RadialSize::HalfLight(2.0), 1.0, 8.004, false).unwrap();
        let b = Sersic::truncated(3.0, RadialSize::HalfLight(2.0), 4.0, 7.996, false).unwrap();
        assert_eq!(a.trunc(), Some(8.0));
        assert!(Arc::ptr_eq(&a.info, &b.info));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            Sersic::new(6.0, RadialSize::HalfLight(1.0), 1.0),
            Err(RenderError::InvalidParameter { name: "n", .. })
        ));
        assert!(matches!(
            Sersic::new(2.0, RadialSize::Fwhm(1.0), 1.0),
            Err(RenderError::InvalidParameter { name: "fwhm", .. })
        ));
        assert!(matches!(
            Sersic::new(2.0, RadialSize::HalfLight(-1.0), 1.0),
            Err(RenderError::DegenerateProfile(_))
        ));
    }

    #[test]
    fn test_de_vaucouleurs() {
        let d = DeVaucouleurs::new(RadialSize::HalfLight(0.5), 3.0).unwrap();
        assert_eq!(d.n(), 4.0);
        let scales = d.sampling_scales().unwrap();
        assert!(scales.step_k <= PI / (5.0 * 0.5));
        assert!(scales.max_k > 10.0);
    }

    #[test]
    fn test_shoot_truncated_within_radius() {
        let mut rng = StdRng::seed_from_u64(3);
        // Mostly truncated away: exercises the inverse-CDF branch
        let s = Sersic::truncated(4.0, RadialSize::HalfLight(1.0), 1.0, 0.5, true).unwrap();
        assert!(s.info.truncated_fraction < 0.5);
        let photons = s.shoot(2_000, &mut rng, AllocationPolicy::default()).unwrap();
        assert!(photons.iter().all(|(x, y, _)| (x * x + y * y).sqrt() <= 0.5 + 1e-9));
        assert_relative_eq!(photons.total_flux(), s.flux(), max_relative = 1e-12);

        let s = Sersic::truncated(1.0, RadialSize::HalfLight(1.0), 1.0, 3.0, false).unwrap();
        let photons = s.shoot(20_000, &mut rng, AllocationPolicy::default()).unwrap();
        let inside = photons
            .iter()
            .filter(|(x, y, _)| (x * x + y * y).sqrt() < 1.0)
            .count();
        assert_relative_eq!(inside as f64 / 20_000.0, 0.5, epsilon = 0.015);
    }
}
