//! Surface-brightness profiles.
//!
//! Every profile is an immutable value exposing its total flux, its
//! real-space surface brightness, its Fourier transform
//! `F(k) = ∫ f(x) exp(-i k·x) d²x` (so `F(0) = flux`), its sampling scales
//! and a photon sampler. Leaves are concrete analytic shapes; [`Sum`],
//! [`Convolution`] and [`Transformed`] compose them into new profiles.

mod airy;
mod boxcar;
mod convolution;
mod delta;
mod exponential;
mod gaussian;
mod interpolant;
mod moffat;
pub(crate) mod radial;
mod sampled;
mod sersic;
mod sum;
mod transformed;

pub use airy::Airy;
pub use boxcar::Boxcar;
pub use convolution::Convolution;
pub use delta::DeltaFunction;
pub use exponential::Exponential;
pub use gaussian::Gaussian;
pub use interpolant::Interpolant;
pub use moffat::Moffat;
pub use sampled::SampledImage;
pub use sersic::{DeVaucouleurs, Sersic};
pub use sum::Sum;
pub use transformed::Transformed;

use nalgebra::{Matrix2, Vector2};
use rand::Rng;
use rustfft::num_complex::Complex64;

use crate::error::RenderError;
use crate::params::RenderParams;
use crate::photon::{AllocationPolicy, PhotonArray};

/// How a radial profile's size is specified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RadialSize {
    /// Radius enclosing half the flux.
    HalfLight(f64),
    /// The profile's natural scale radius.
    Scale(f64),
    /// Full width at half maximum.
    Fwhm(f64),
    /// Gaussian standard deviation.
    Sigma(f64),
}

impl RadialSize {
    pub(crate) fn value(&self) -> f64 {
        match *self {
            RadialSize::HalfLight(v)
            | RadialSize::Scale(v)
            | RadialSize::Fwhm(v)
            | RadialSize::Sigma(v) => v,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            RadialSize::HalfLight(_) => "half_light_radius",
            RadialSize::Scale(_) => "scale_radius",
            RadialSize::Fwhm(_) => "fwhm",
            RadialSize::Sigma(_) => "sigma",
        }
    }

    pub(crate) fn unsupported(&self, profile: &str) -> RenderError {
        RenderError::invalid(
            self.name(),
            self.value(),
            format!("{profile} cannot be sized by {}", self.name()),
        )
    }
}

/// Fourier sampling scales of a profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingScales {
    /// Largest k-spacing that keeps aliased flux below `folding_threshold`.
    pub step_k: f64,
    /// Frequency beyond which |F(k)| stays below `maxk_threshold · flux`.
    pub max_k: f64,
}

impl SamplingScales {
    /// Scales of a profile contained within `radius` whose transform dies out at `max_k`.
    pub(crate) fn from_radius(radius: f64, max_k: f64) -> Self {
        Self {
            step_k: std::f64::consts::PI / radius,
            max_k,
        }
    }
}

/// What a profile can do, decided once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `x_value` is available without approximation.
    pub real_space: bool,
    /// `k_value` is available without approximation.
    pub fourier: bool,
    pub axisymmetric: bool,
    /// Discontinuous surface brightness (slow Fourier convergence).
    pub hard_edges: bool,
}

impl Capabilities {
    pub(crate) const ANALYTIC_RADIAL: Capabilities = Capabilities {
        real_space: true,
        fourier: true,
        axisymmetric: true,
        hard_edges: false,
    };
}

/// Behaviour shared by every profile.
pub trait SurfaceBrightness {
    /// Total flux (may be zero or negative).
    fn flux(&self) -> f64;

    /// Surface brightness at `(x, y)`.
    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError>;

    /// Fourier transform at `(kx, ky)`.
    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError>;

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError>;

    fn capabilities(&self) -> Capabilities;

    fn centroid(&self) -> Vector2<f64> {
        Vector2::zeros()
    }

    /// Total absolute flux carried by photons: positive plus negative parts.
    fn abs_flux(&self) -> f64 {
        self.flux().abs()
    }

    fn positive_flux(&self) -> f64 {
        0.5 * (self.abs_flux() + self.flux())
    }

    fn negative_flux(&self) -> f64 {
        0.5 * (self.abs_flux() - self.flux())
    }

    /// Draw `n` photons whose fluxes sum (in expectation) to `flux()`.
    fn shoot<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
        allocation: AllocationPolicy,
    ) -> Result<PhotonArray, RenderError>;
}

/// A surface-brightness profile: an analytic leaf or a composition of profiles.
#[derive(Debug, Clone)]
pub enum Profile {
    Gaussian(Gaussian),
    Exponential(Exponential),
    Sersic(Sersic),
    Moffat(Moffat),
    Airy(Airy),
    Delta(DeltaFunction),
    Boxcar(Boxcar),
    Sampled(SampledImage),
    Sum(Sum),
    Convolution(Convolution),
    Transformed(Transformed),
}

macro_rules! dispatch {
    ($profile:expr, $inner:ident => $body:expr) => {
        match $profile {
            Profile::Gaussian($inner) => $body,
            Profile::Exponential($inner) => $body,
            Profile::Sersic($inner) => $body,
            Profile::Moffat($inner) => $body,
            Profile::Airy($inner) => $body,
            Profile::Delta($inner) => $body,
            Profile::Boxcar($inner) => $body,
            Profile::Sampled($inner) => $body,
            Profile::Sum($inner) => $body,
            Profile::Convolution($inner) => $body,
            Profile::Transformed($inner) => $body,
        }
    };
}

macro_rules! impl_from_variant {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Profile {
                fn from(value: $ty) -> Self {
                    Profile::$variant(value)
                }
            }
        )*
    };
}

impl_from_variant!(
    Gaussian(Gaussian),
    Exponential(Exponential),
    Sersic(Sersic),
    Moffat(Moffat),
    Airy(Airy),
    Delta(DeltaFunction),
    Boxcar(Boxcar),
    Sampled(SampledImage),
    Sum(Sum),
    Convolution(Convolution),
    Transformed(Transformed),
);

impl SurfaceBrightness for Profile {
    fn flux(&self) -> f64 {
        dispatch!(self, p => p.flux())
    }

    fn x_value(&self, x: f64, y: f64) -> Result<f64, RenderError> {
        dispatch!(self, p => p.x_value(x, y))
    }

    fn k_value(&self, kx: f64, ky: f64) -> Result<Complex64, RenderError> {
        dispatch!(self, p => p.k_value(kx, ky))
    }

    fn sampling_scales(&self) -> Result<SamplingScales, RenderError> {
        dispatch!(self, p => p.sampling_scales())
    }

    fn capabilities(&self) -> Capabilities {
        dispatch!(self, p => p.capabilities())
    }

    fn centroid(&self) -> Vector2<f64> {
        dispatch!(self, p => p.centroid())
    }

    fn abs_flux(&self) -> f64 {
        dispatch!(self, p => p.abs_flux())
    }

    fn shoot<R: Rng + ?Sized>(
        &self,
        n: usize,
        rng: &mut R,
        allocation: AllocationPolicy,
    ) -> Result<PhotonArray, RenderError> {
        dispatch!(self, p => p.shoot(n, rng, allocation))
    }
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Gaussian(_) => "Gaussian",
            Profile::Exponential(_) => "Exponential",
            Profile::Sersic(_) => "Sersic",
            Profile::Moffat(_) => "Moffat",
            Profile::Airy(_) => "Airy",
            Profile::Delta(_) => "DeltaFunction",
            Profile::Boxcar(_) => "Boxcar",
            Profile::Sampled(_) => "SampledImage",
            Profile::Sum(_) => "Sum",
            Profile::Convolution(_) => "Convolution",
            Profile::Transformed(_) => "Transformed",
        }
    }

    /// Sum of several profiles.
    pub fn sum(children: Vec<Profile>) -> Result<Profile, RenderError> {
        Ok(Sum::new(children)?.into())
    }

    /// Convolution of several profiles.
    pub fn convolve(operands: Vec<Profile>) -> Result<Profile, RenderError> {
        Ok(Convolution::new(operands)?.into())
    }

    /// Apply `x → M x + b` with flux ratio `a`, collapsing nested transforms.
    pub fn transformed(
        &self,
        matrix: Matrix2<f64>,
        offset: Vector2<f64>,
        flux_ratio: f64,
    ) -> Result<Profile, RenderError> {
        Ok(Transformed::new(self.clone(), matrix, offset, flux_ratio)?.into())
    }

    /// Move the profile's origin to `(dx, dy)`.
    pub fn shift(&self, dx: f64, dy: f64) -> Result<Profile, RenderError> {
        self.transformed(Matrix2::identity(), Vector2::new(dx, dy), 1.0)
    }

    /// Rotate counter-clockwise by `angle` radians about the origin.
    pub fn rotate(&self, angle: f64) -> Result<Profile, RenderError> {
        if !angle.is_finite() {
            return Err(RenderError::invalid("angle", angle, "must be finite"));
        }
        self.transformed(meter_math::rotation_matrix(angle), Vector2::zeros(), 1.0)
    }

    /// Apply an area-preserving reduced shear; flux is unchanged.
    pub fn shear(&self, g1: f64, g2: f64) -> Result<Profile, RenderError> {
        let matrix = meter_math::shear_matrix(g1, g2)?;
        self.transformed(matrix, Vector2::zeros(), 1.0)
    }

    /// Scale linear size by `scale`, keeping the flux.
    pub fn dilate(&self, scale: f64) -> Result<Profile, RenderError> {
        let scale = crate::error::require_scale("dilation", scale)?;
        self.transformed(Matrix2::identity() * scale, Vector2::zeros(), 1.0)
    }

    /// Scale linear size by `scale`, keeping the surface brightness (flux × scale²).
    pub fn expand(&self, scale: f64) -> Result<Profile, RenderError> {
        let scale = crate::error::require_scale("expansion", scale)?;
        self.transformed(Matrix2::identity() * scale, Vector2::zeros(), scale * scale)
    }

    /// Apply an arbitrary linear map, keeping the flux.
    pub fn transform(&self, matrix: Matrix2<f64>) -> Result<Profile, RenderError> {
        self.transformed(matrix, Vector2::zeros(), 1.0)
    }

    /// Multiply the flux by `ratio`.
    pub fn scale_flux(&self, ratio: f64) -> Result<Profile, RenderError> {
        self.transformed(Matrix2::identity(), Vector2::zeros(), ratio)
    }

    /// Rescale to a total flux of `flux`.
    pub fn with_flux(&self, flux: f64) -> Result<Profile, RenderError> {
        let current = self.flux();
        if current == 0.0 {
            return Err(RenderError::invalid(
                "flux",
                flux,
                "cannot rescale a zero-flux profile",
            ));
        }
        self.scale_flux(flux / current)
    }

    /// Copy of this profile with `params` applied to every leaf.
    ///
    /// Composite profiles are rebuilt around the updated children, keeping
    /// their linear maps, offsets and flux ratios. The renderers call this
    /// with `RenderOptions::params` before placing a profile.
    pub fn with_params(&self, params: RenderParams) -> Result<Profile, RenderError> {
        let rebuild = |profiles: &[Profile]| -> Result<Vec<Profile>, RenderError> {
            profiles.iter().map(|p| p.with_params(params)).collect()
        };
        Ok(match self {
            Profile::Gaussian(p) => p.clone().with_params(params).into(),
            Profile::Exponential(p) => p.clone().with_params(params).into(),
            Profile::Sersic(p) => p.clone().with_params(params)?.into(),
            Profile::Moffat(p) => p.clone().with_params(params).into(),
            Profile::Airy(p) => p.clone().with_params(params).into(),
            Profile::Delta(_) => self.clone(),
            Profile::Boxcar(p) => p.clone().with_params(params).into(),
            Profile::Sampled(p) => p.clone().with_params(params).into(),
            Profile::Sum(p) => Sum::new(rebuild(p.children())?)?.into(),
            Profile::Convolution(p) => Convolution::new(rebuild(p.operands())?)?.into(),
            Profile::Transformed(p) => Transformed::new(
                p.child().with_params(params)?,
                *p.matrix(),
                *p.offset(),
                p.flux_ratio(),
            )?
            .into(),
        })
    }

    pub(crate) fn as_gaussian(&self) -> Option<&Gaussian> {
        match self {
            Profile::Gaussian(g) => Some(g),
            _ => None,
        }
    }

    pub(crate) fn as_delta(&self) -> Option<&DeltaFunction> {
        match self {
            Profile::Delta(d) => Some(d),
            _ => None,
        }
    }
}

/// Error for evaluating a profile in a domain it does not support.
pub(crate) fn not_analytic(profile: &'static str, domain: crate::error::Domain) -> RenderError {
    RenderError::NotAnalytic { profile, domain }
}

/// Uniform random angle helper shared by the radial samplers.
pub(crate) fn random_direction<R: Rng + ?Sized>(rng: &mut R) -> (f64, f64) {
    let theta = rng.gen::<f64>() * std::f64::consts::TAU;
    (theta.cos(), theta.sin())
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_k_value_at_origin_is_flux() {
        let profiles: Vec<Profile> = vec![
            Gaussian::from_sigma(1.5, 3.0).unwrap().into(),
            Exponential::new(RadialSize::Scale(0.7), 2.0).unwrap().into(),
            Sersic::new(2.5, RadialSize::HalfLight(1.0), 5.0).unwrap().into(),
            Moffat::new(3.0, RadialSize::Fwhm(1.0), 4.0).unwrap().into(),
            Airy::new(0.5, 0.2, 6.0).unwrap().into(),
            DeltaFunction::new(-2.0).unwrap().into(),
            Boxcar::new(1.0, 2.0, 1.5).unwrap().into(),
        ];
        for p in profiles {
            let k0 = p.k_value(0.0, 0.0).unwrap();
            assert_relative_eq!(k0.re, p.flux(), max_relative = 1e-6);
            assert_relative_eq!(k0.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_builders_preserve_or_scale_flux() {
        let g: Profile = Gaussian::from_sigma(1.0, 10.0).unwrap().into();
        assert_relative_eq!(g.shift(1.0, -2.0).unwrap().flux(), 10.0);
        assert_relative_eq!(g.rotate(0.4).unwrap().flux(), 10.0);
        assert_relative_eq!(g.shear(0.2, 0.1).unwrap().flux(), 10.0, epsilon = 1e-12);
        assert_relative_eq!(g.dilate(3.0).unwrap().flux(), 10.0);
        assert_relative_eq!(g.expand(3.0).unwrap().flux(), 90.0);
        assert_relative_eq!(g.with_flux(4.0).unwrap().flux(), 4.0);
        assert_relative_eq!(g.scale_flux(-0.5).unwrap().flux(), -5.0);
    }

    #[test]
    fn test_builder_errors() {
        let g: Profile = Gaussian::from_sigma(1.0, 0.0).unwrap().into();
        assert!(g.with_flux(1.0).is_err());
        assert!(matches!(
            g.dilate(0.0),
            Err(RenderError::DegenerateProfile(_))
        ));
        assert!(matches!(
            g.shear(0.9, 0.9),
            Err(RenderError::InvalidParameter { name: "shear", .. })
        ));
        assert!(matches!(
            g.transform(Matrix2::new(1.0, 2.0, 2.0, 4.0)),
            Err(RenderError::SingularTransform { .. })
        ));
    }

    #[test]
    fn test_with_params_reaches_nested_leaves() {
        let tight = RenderParams {
            folding_threshold: 1e-8,
            maxk_threshold: 1e-8,
            ..Default::default()
        };
        let galaxy = Profile::sum(vec![
            Gaussian::from_sigma(1.0, 3.0).unwrap().into(),
            Exponential::new(RadialSize::Scale(2.0), 1.0).unwrap().into(),
        ])
        .unwrap()
        .shear(0.2, 0.1)
        .unwrap()
        .shift(0.5, -1.0)
        .unwrap();
        let psf: Profile = Moffat::new(3.0, RadialSize::Fwhm(1.0), 1.0).unwrap().into();
        let scene = Profile::convolve(vec![galaxy, psf]).unwrap();

        let refined = scene.with_params(tight).unwrap();
        let before = scene.sampling_scales().unwrap();
        let after = refined.sampling_scales().unwrap();
        assert!(after.max_k > before.max_k);
        assert!(after.step_k <= before.step_k);
        assert_relative_eq!(refined.flux(), scene.flux(), max_relative = 1e-12);
        assert_relative_eq!(
            refined.k_value(0.3, -0.2).unwrap().re,
            scene.k_value(0.3, -0.2).unwrap().re,
            max_relative = 1e-4
        );

        let Profile::Convolution(conv) = &refined else {
            panic!("expected a convolution, got {}", refined.name());
        };
        let Profile::Transformed(t) = &conv.operands()[0] else {
            panic!("expected the sheared galaxy first");
        };
        assert_relative_eq!(t.offset().x, 0.5);
        let Profile::Sum(sum) = t.child() else {
            panic!("expected the galaxy sum under the transform");
        };
        let g = sum.children().iter().find_map(|c| c.as_gaussian()).unwrap();
        assert_eq!(*g.params(), tight);
    }

    #[test]
    fn test_positive_and_negative_flux() {
        let p = Profile::sum(vec![
            Gaussian::from_sigma(1.0, 3.0).unwrap().into(),
            Gaussian::from_sigma(2.0, -1.0).unwrap().into(),
        ])
        .unwrap();
        assert_relative_eq!(p.flux(), 2.0);
        assert_relative_eq!(p.abs_flux(), 4.0);
        assert_relative_eq!(p.positive_flux(), 3.0);
        assert_relative_eq!(p.negative_flux(), 1.0);
    }
}
