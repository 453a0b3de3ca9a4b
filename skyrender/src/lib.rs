//! skyrender - Surface-brightness profile rendering
//!
//! Builds astronomical surface-brightness profiles (galaxies, stars, PSFs and
//! their compositions) and draws them into pixel grids:
//!
//! - **Profiles** - Gaussian, Exponential, Sérsic, Moffat, Airy, delta, boxcar
//!   and interpolated images, closed under sum, convolution and affine transforms
//! - **Fourier renderer** - k-space evaluation with alias folding and an inverse FFT
//! - **Photon renderer** - seeded, chunk-parallel photon shooting through a [`Sensor`]
//! - **Real-space renderer** - direct pixel integration, used as the reference
//! - **Image grid** - typed pixel buffer with a pixel-to-sky transform (affine or distorted)
//!
//! # Example
//!
//! ```rust
//! use skyrender::{draw_fft, Gaussian, ImageGrid, Profile, RenderOptions};
//!
//! let galaxy: Profile = Gaussian::from_sigma(2.0, 1000.0).unwrap().into();
//! let psf: Profile = Gaussian::from_sigma(1.0, 1.0).unwrap().into();
//! let observed = Profile::convolve(vec![galaxy, psf]).unwrap();
//!
//! let mut image = ImageGrid::<f64>::new(32, 32).unwrap();
//! draw_fft(&observed, &mut image, &RenderOptions::default()).unwrap();
//! assert!((image.sum() - 1000.0).abs() < 0.1);
//! ```

pub mod error;
pub mod fourier;
pub mod image;
pub mod noise;
pub mod parallel;
pub mod params;
pub mod photon;
pub mod profile;
pub mod real_space;
pub mod render;
pub mod transform;

// Re-export commonly used types
pub use error::{Domain, RenderError};
pub use fourier::{draw_fft, good_fft_size};
pub use image::{Bounds, DepositKernel, EdgePolicy, GridMetadata, ImageGrid, Pixel};
pub use noise::{add_gaussian_noise, apply_poisson_noise};
pub use params::RenderParams;
pub use photon::{
    draw_photons, draw_photons_with_sensor, shoot_with_rng, AllocationPolicy, PhotonArray,
    PhotonCountPolicy, Sensor, ShootOptions, ShootReport, SimpleSensor,
};
pub use profile::{
    Airy, Boxcar, Capabilities, Convolution, DeVaucouleurs, DeltaFunction, Exponential,
    Gaussian, Interpolant, Moffat, Profile, RadialSize, SampledImage, SamplingScales, Sersic,
    Sum, SurfaceBrightness, Transformed,
};
pub use real_space::draw_real_space;
pub use render::{DrawMethod, RenderOptions, RenderReport};
pub use transform::{AffineTransform, CoordinateTransform, RadialDistortion};
