//! Options and profile placement shared by the renderers.
//!
//! A profile is defined in sky coordinates around its own origin. Before
//! drawing, it is mapped into the pixel frame of the target image through the
//! inverse Jacobian of the image's local affine transform, which turns surface
//! brightness into flux per pixel while keeping the total flux. Its origin is
//! then placed at the image center plus an optional pixel offset.

use log::debug;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::image::{ImageGrid, Pixel};
use crate::params::RenderParams;
use crate::profile::{Boxcar, Profile, SurfaceBrightness};

/// How pixels respond to the light falling on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DrawMethod {
    /// Integrate the surface brightness over each pixel (convolve with the
    /// unit top-hat pixel response).
    #[default]
    Auto,
    /// Sample the surface brightness at pixel centers, scaled by pixel area.
    NoPixel,
}

/// Options for drawing a profile into an image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub method: DrawMethod,
    pub params: RenderParams,
    /// Pixel offset of the profile origin from the image center.
    pub offset: [f64; 2],
    /// Center on the geometric center (half-integer for even sizes) rather
    /// than the nearest pixel center.
    pub use_true_center: bool,
    /// Add to the existing pixel values instead of overwriting them.
    pub add_to_image: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            method: DrawMethod::Auto,
            params: RenderParams::default(),
            offset: [0.0, 0.0],
            use_true_center: true,
            add_to_image: false,
        }
    }
}

impl RenderOptions {
    pub fn no_pixel() -> Self {
        Self {
            method: DrawMethod::NoPixel,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        self.params.validate()?;
        if !self.offset.iter().all(|v| v.is_finite()) {
            return Err(RenderError::invalid(
                "offset",
                self.offset[0].max(self.offset[1]),
                "must be finite",
            ));
        }
        Ok(())
    }
}

/// Summary of one Fourier or real-space draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderReport {
    /// Edge of the FFT working grid (0 for the real-space renderer).
    pub working_size: usize,
    /// Alias orders folded on each side of the fundamental band.
    pub aliases: usize,
    /// Flux added to the image by this draw.
    pub flux_drawn: f64,
}

/// A profile expressed in the pixel frame of one image.
pub(crate) struct Placement {
    /// Profile in pixel units around its own origin, including the pixel
    /// response when requested.
    pub centered: Profile,
    /// Pixel coordinates of the profile origin.
    pub center: Vector2<f64>,
}

impl Placement {
    /// The centered profile moved to its pixel position.
    pub fn positioned(&self) -> Result<Profile, RenderError> {
        self.centered.shift(self.center.x, self.center.y)
    }
}

/// Map `profile` into the pixel frame of `image`.
///
/// `with_pixel_response` convolves with the unit pixel under
/// `DrawMethod::Auto`; renderers that integrate over pixels themselves pass
/// `false`.
pub(crate) fn place<T: Pixel>(
    profile: &Profile,
    image: &ImageGrid<T>,
    options: &RenderOptions,
    with_pixel_response: bool,
) -> Result<Placement, RenderError> {
    options.validate()?;
    let local = image.local_affine()?;
    let in_pixels = profile
        .with_params(options.params)?
        .transform(*local.inverse_jacobian())?;

    let centered = match (options.method, with_pixel_response) {
        (DrawMethod::Auto, true) => {
            let pixel = Boxcar::pixel(1.0)?.with_params(options.params);
            Profile::convolve(vec![in_pixels, pixel.into()])?
        }
        _ => in_pixels,
    };

    let base = if options.use_true_center {
        image.true_center()
    } else {
        image.nominal_center()
    };
    let center = base + Vector2::new(options.offset[0], options.offset[1]);
    debug!(
        "Placing {} (flux {:.6e}) at pixel ({:.3}, {:.3}), pixel area {:.6e}",
        profile.name(),
        profile.flux(),
        center.x,
        center.y,
        local.pixel_area()
    );
    Ok(Placement { centered, center })
}

/// Zero the image unless drawing adds to it.
pub(crate) fn prepare_target<T: Pixel>(image: &mut ImageGrid<T>, options: &RenderOptions) {
    if !options.add_to_image {
        image.fill_zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Gaussian;
    use crate::transform::AffineTransform;
    use approx::assert_relative_eq;

    #[test]
    fn test_placement_scales_to_pixels() {
        let g: Profile = Gaussian::from_sigma(0.4, 10.0).unwrap().into();
        let image = ImageGrid::<f64>::with_scale(10, 10, 0.2).unwrap();
        let placement = place(&g, &image, &RenderOptions::no_pixel(), true).unwrap();
        assert_eq!(placement.center, Vector2::new(4.5, 4.5));
        let centered = &placement.centered;
        assert_relative_eq!(centered.flux(), 10.0, max_relative = 1e-12);
        // Peak per pixel is the sky peak times the pixel area
        assert_relative_eq!(
            centered.x_value(0.0, 0.0).unwrap(),
            g.x_value(0.0, 0.0).unwrap() * 0.04,
            max_relative = 1e-12
        );
        let positioned = placement.positioned().unwrap();
        assert_relative_eq!(
            positioned.x_value(4.5, 4.5).unwrap(),
            centered.x_value(0.0, 0.0).unwrap(),
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_offsets_and_nominal_center() {
        let g: Profile = Gaussian::from_sigma(1.0, 1.0).unwrap().into();
        let image = ImageGrid::<f64>::new(8, 8)
            .unwrap()
            .with_transform(AffineTransform::pixel_scale(1.0).unwrap());
        let options = RenderOptions {
            use_true_center: false,
            offset: [0.5, -1.0],
            ..Default::default()
        };
        let placement = place(&g, &image, &options, false).unwrap();
        assert_eq!(placement.center, Vector2::new(4.5, 3.0));
        assert!(matches!(placement.centered, Profile::Transformed(_)));

        let with_pixel = place(&g, &image, &options, true).unwrap();
        assert!(matches!(with_pixel.centered, Profile::Convolution(_)));
    }

    #[test]
    fn test_options_serde_and_validation() {
        let options: RenderOptions = serde_json::from_str(r#"{"method":"NoPixel"}"#).unwrap();
        assert_eq!(options.method, DrawMethod::NoPixel);
        assert!(options.use_true_center);

        let bad = RenderOptions {
            offset: [f64::NAN, 0.0],
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
