//! Real-space reference renderer.
//!
//! Integrates the placed profile's surface brightness over every pixel with
//! a composite 2D Simpson rule, refined until it meets `xvalue_accuracy`
//! (or samples pixel centers with
//! `DrawMethod::NoPixel`). It is slow and exact only for smooth profiles, and
//! serves as the reference the Fourier and photon renderers are checked against.

use log::{debug, info};
use meter_math::simpson_2d;
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use std::cell::Cell;

use crate::error::{Domain, RenderError};
use crate::image::{ImageGrid, Pixel};
use crate::profile::{Profile, SurfaceBrightness};
use crate::render::{place, prepare_target, DrawMethod, RenderOptions, RenderReport};

/// Number of times a pixel's Simpson grid may be doubled.
const MAX_REFINEMENTS: u32 = 4;

/// Simpson estimate of `profile` over the unit pixel centered at `(x, y)`.
fn simpson_pixel(
    profile: &Profile,
    x: f64,
    y: f64,
    subdivisions: usize,
) -> Result<f64, RenderError> {
    let failure: Cell<Option<RenderError>> = Cell::new(None);
    let total = simpson_2d(
        |px, py| match profile.x_value(px, py) {
            Ok(v) => v,
            Err(err) => {
                failure.set(Some(err));
                0.0
            }
        },
        (x - 0.5, x + 0.5),
        (y - 0.5, y + 0.5),
        subdivisions,
    );
    match failure.into_inner() {
        Some(err) => Err(err),
        None => Ok(total),
    }
}

/// Integral of `profile` over the unit pixel centered at `(x, y)`.
///
/// Starts from `subdivisions` intervals per axis and doubles them until two
/// successive estimates differ by at most `tolerance`. The flag is false when
/// the refinement limit was reached first (hard edges crossing the pixel).
fn pixel_integral(
    profile: &Profile,
    x: f64,
    y: f64,
    subdivisions: usize,
    tolerance: f64,
) -> Result<(f64, bool), RenderError> {
    let mut n = subdivisions.max(2);
    let mut estimate = simpson_pixel(profile, x, y, n)?;
    for _ in 0..MAX_REFINEMENTS {
        n *= 2;
        let refined = simpson_pixel(profile, x, y, n)?;
        let change = (refined - estimate).abs();
        estimate = refined;
        if change <= tolerance {
            return Ok((estimate, true));
        }
    }
    Ok((estimate, false))
}

/// Draw `profile` into `image` by direct real-space evaluation.
pub fn draw_real_space<T: Pixel>(
    profile: &Profile,
    image: &mut ImageGrid<T>,
    options: &RenderOptions,
) -> Result<RenderReport, RenderError> {
    if !profile.capabilities().real_space {
        return Err(RenderError::NotAnalytic {
            profile: profile.name(),
            domain: Domain::RealSpace,
        });
    }
    let placed = place(profile, image, options, false)?.positioned()?;
    let bounds = image.bounds();
    let subdivisions = options.params.real_space_subdivisions;
    let tolerance = options.params.xvalue_accuracy * placed.abs_flux();

    let mut values = Array2::<f64>::zeros((image.height(), image.width()));
    let rows: Vec<Result<usize, RenderError>> = values
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .map(|(row, mut line)| {
            let y = (bounds.ymin + row as i64) as f64;
            let mut unconverged = 0;
            for (col, value) in line.iter_mut().enumerate() {
                let x = (bounds.xmin + col as i64) as f64;
                *value = match options.method {
                    DrawMethod::Auto => {
                        let (integral, converged) =
                            pixel_integral(&placed, x, y, subdivisions, tolerance)?;
                        if !converged {
                            unconverged += 1;
                        }
                        integral
                    }
                    DrawMethod::NoPixel => placed.x_value(x, y)?,
                };
            }
            Ok(unconverged)
        })
        .collect();
    let unconverged: usize = rows.into_iter().sum::<Result<usize, RenderError>>()?;
    if unconverged > 0 {
        debug!(
            "{} pixels of {} did not reach xvalue_accuracy {:.1e}",
            unconverged,
            profile.name(),
            options.params.xvalue_accuracy
        );
    }

    prepare_target(image, options);
    let mut flux_drawn = 0.0;
    for ((row, col), &value) in values.indexed_iter() {
        image.add_to_pixel(bounds.xmin + col as i64, bounds.ymin + row as i64, value)?;
        flux_drawn += value;
    }
    info!(
        "Real-space draw of {}: {:.6e} of {:.6e} flux on a {}x{} image",
        profile.name(),
        flux_drawn,
        profile.flux(),
        image.width(),
        image.height()
    );
    Ok(RenderReport {
        working_size: 0,
        aliases: 0,
        flux_drawn,
    })
}
