//! Fourier renderer.
//!
//! The placed profile is point-sampled at pixel centers by evaluating its
//! transform on an N×N frequency grid with unit pixel spacing and inverting
//! it with a 2D FFT. Frequencies beyond the Nyquist band are folded in
//! explicitly (`k + 2π m`), so the samples are exact up to the profile's
//! `max_k` without oversampling. The working size N keeps every periodic
//! copy at least `π / step_k` away from the image.

use log::{debug, info};
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use rustfft::num_complex::Complex64;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

use crate::error::{Domain, RenderError};
use crate::image::{ImageGrid, Pixel};
use crate::profile::{Profile, SurfaceBrightness};
use crate::render::{place, prepare_target, RenderOptions, RenderReport};

/// Smallest `2^a 3^b` at least `n`.
pub fn good_fft_size(n: usize) -> usize {
    let n = n.max(2);
    let mut best = usize::MAX;
    let mut pow3 = 1usize;
    while pow3 < best {
        let mut size = pow3;
        while size < n {
            size *= 2;
        }
        best = best.min(size);
        match pow3.checked_mul(3) {
            Some(next) => pow3 = next,
            None => break,
        }
    }
    best
}

/// Grid geometry chosen for one draw.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WorkingGrid {
    size: usize,
    aliases: usize,
}

/// Pick the working size and alias order for a profile centered at `center`.
fn working_grid<T: Pixel>(
    profile: &Profile,
    image: &ImageGrid<T>,
    center: nalgebra::Vector2<f64>,
    max_fft_size: usize,
) -> Result<WorkingGrid, RenderError> {
    let scales = profile.sampling_scales()?;
    let bounds = image.bounds();
    let dmax = [
        (bounds.xmin as f64 - center.x).abs(),
        (bounds.xmax as f64 - center.x).abs(),
        (bounds.ymin as f64 - center.y).abs(),
        (bounds.ymax as f64 - center.y).abs(),
    ]
    .into_iter()
    .fold(0.0_f64, f64::max);
    let radius = PI / scales.step_k;

    let needed = (radius + dmax)
        .max(image.width() as f64)
        .max(image.height() as f64);
    let aliases = if scales.max_k > PI {
        ((scales.max_k - PI) / (2.0 * PI)).ceil()
    } else {
        0.0
    };
    let limit = max_fft_size as f64;
    // Bail out before casting: an unbounded max_k or radius would overflow
    if !needed.is_finite() || !aliases.is_finite() || needed * (2.0 * aliases + 1.0) > limit {
        return Err(RenderError::GridTooLarge {
            required: (needed.min(limit * 4.0) * (2.0 * aliases.min(limit) + 1.0)) as usize,
            limit: max_fft_size,
        });
    }
    let aliases = aliases as usize;
    let size = good_fft_size(needed.ceil() as usize);
    let required = size * (2 * aliases + 1);
    if required > max_fft_size {
        return Err(RenderError::GridTooLarge {
            required,
            limit: max_fft_size,
        });
    }
    Ok(WorkingGrid { size, aliases })
}

/// Frequency index `a` of an N-point grid mapped into `[-N/2, N/2)`.
fn signed_index(a: usize, n: usize) -> i64 {
    if a < n - n / 2 {
        a as i64
    } else {
        a as i64 - n as i64
    }
}

/// Aliased transform times the phase that puts the origin at `shift`.
///
/// `Σ_m F(k + 2π m) exp(i (k + 2π m)·shift)` over `|m_x|, |m_y| <= aliases`.
fn folded_value(
    profile: &Profile,
    kx: f64,
    ky: f64,
    shift: (f64, f64),
    aliases: i64,
) -> Result<Complex64, RenderError> {
    let mut total = Complex64::new(0.0, 0.0);
    for my in -aliases..=aliases {
        let qy = ky + 2.0 * PI * my as f64;
        for mx in -aliases..=aliases {
            let qx = kx + 2.0 * PI * mx as f64;
            let value = profile.k_value(qx, qy)?;
            total += value * Complex64::from_polar(1.0, qx * shift.0 + qy * shift.1);
        }
    }
    Ok(total)
}

/// In-place FFT of every row of a square standard-layout array.
fn fft_rows(data: &mut Array2<Complex64>, fft: &Arc<dyn Fft<f64>>) -> Result<(), RenderError> {
    let n = data.ncols();
    let slice = data.as_slice_mut().ok_or_else(|| {
        RenderError::invalid("layout", n as f64, "FFT buffer must be contiguous")
    })?;
    slice.par_chunks_mut(n).for_each(|row| fft.process(row));
    Ok(())
}

/// Draw `profile` into `image` with the Fourier renderer.
///
/// The profile must have an analytic transform. With `DrawMethod::Auto` it is
/// convolved with the pixel response first.
pub fn draw_fft<T: Pixel>(
    profile: &Profile,
    image: &mut ImageGrid<T>,
    options: &RenderOptions,
) -> Result<RenderReport, RenderError> {
    if !profile.capabilities().fourier {
        return Err(RenderError::NotAnalytic {
            profile: profile.name(),
            domain: Domain::Fourier,
        });
    }
    let placement = place(profile, image, options, true)?;
    let centered = &placement.centered;
    let grid = working_grid(
        centered,
        image,
        placement.center,
        options.params.max_fft_size,
    )?;
    let n = grid.size;
    debug!(
        "FFT working grid {n}x{n} with {} alias orders for a {}x{} image",
        grid.aliases,
        image.width(),
        image.height()
    );

    // Sample (i, j) of the inverse transform lies at pixel (xmin + i, ymin + j)
    let bounds = image.bounds();
    let shift = (
        bounds.xmin as f64 - placement.center.x,
        bounds.ymin as f64 - placement.center.y,
    );
    let dk = 2.0 * PI / n as f64;
    let aliases = grid.aliases as i64;

    let mut kgrid = Array2::<Complex64>::zeros((n, n));
    let rows: Vec<Result<(), RenderError>> = kgrid
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .map(|(row, mut line)| {
            let ky = dk * signed_index(row, n) as f64;
            for (col, value) in line.iter_mut().enumerate() {
                let kx = dk * signed_index(col, n) as f64;
                *value = folded_value(centered, kx, ky, shift, aliases)?;
            }
            Ok(())
        })
        .collect();
    rows.into_iter().collect::<Result<Vec<()>, RenderError>>()?;

    // Row-column inverse FFT: rows along x, transpose, rows along y
    let mut planner = FftPlanner::<f64>::new();
    let inverse = planner.plan_fft_inverse(n);
    fft_rows(&mut kgrid, &inverse)?;
    let mut transposed = kgrid.t().as_standard_layout().into_owned();
    fft_rows(&mut transposed, &inverse)?;
    // transposed[[i, j]] now holds the sample at x index i, y index j
    let norm = 1.0 / (n * n) as f64;

    prepare_target(image, options);
    let mut flux_drawn = 0.0;
    for j in 0..image.height() {
        for i in 0..image.width() {
            let value = transposed[[i, j]].re * norm;
            image.add_to_pixel(bounds.xmin + i as i64, bounds.ymin + j as i64, value)?;
            flux_drawn += value;
        }
    }

    info!(
        "FFT draw of {}: {:.6e} of {:.6e} flux on a {}x{} image (N={n}, aliases={})",
        profile.name(),
        flux_drawn,
        profile.flux(),
        image.width(),
        image.height(),
        grid.aliases
    );
    Ok(RenderReport {
        working_size: n,
        aliases: grid.aliases,
        flux_drawn,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::RenderParams;
    use crate::profile::{DeltaFunction, Gaussian};
    use crate::render::DrawMethod;
    use approx::assert_relative_eq;

    #[test]
    fn test_good_fft_size() {
        assert_eq!(good_fft_size(1), 2);
        assert_eq!(good_fft_size(32), 32);
        assert_eq!(good_fft_size(33), 36);
        assert_eq!(good_fft_size(100), 108);
        assert_eq!(good_fft_size(129), 144);
        for n in 2..300 {
            let size = good_fft_size(n);
            assert!(size >= n);
            let mut m = size;
            for p in [2, 3] {
                while m % p == 0 {
                    m /= p;
                }
            }
            assert_eq!(m, 1);
        }
    }

    #[test]
    fn test_signed_index() {
        let n = 6;
        let indices: Vec<i64> = (0..n).map(|a| signed_index(a, n)).collect();
        assert_eq!(indices, vec![0, 1, 2, -3, -2, -1]);
        let indices: Vec<i64> = (0..5).map(|a| signed_index(a, 5)).collect();
        assert_eq!(indices, vec![0, 1, 2, -2, -1]);
    }

    #[test]
    fn test_point_samples_match_real_space() {
        let g: Profile = Gaussian::from_sigma(1.5, 100.0).unwrap().into();
        let mut image = ImageGrid::<f64>::new(20, 16).unwrap();
        let options = RenderOptions {
            offset: [0.3, -0.2],
            ..RenderOptions::no_pixel()
        };
        draw_fft(&g, &mut image, &options).unwrap();
        let center = image.true_center();
        for &(x, y) in &[(9i64, 7i64), (12, 7), (3, 10)] {
            let dx = x as f64 - center.x - 0.3;
            let dy = y as f64 - center.y + 0.2;
            let expected = g.x_value(dx, dy).unwrap();
            // Modes beyond the Nyquist band are below maxk_threshold and dropped
            assert_relative_eq!(image.get(x, y).unwrap(), expected, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_aliasing_for_narrow_profile() {
        // Narrower than a pixel: max_k well above π, so aliases are folded in
        let g: Profile = Gaussian::from_sigma(0.3, 1.0).unwrap().into();
        let mut image = ImageGrid::<f64>::new(9, 9).unwrap();
        let report = draw_fft(&g, &mut image, &RenderOptions::no_pixel()).unwrap();
        assert!(report.aliases >= 1);
        assert_relative_eq!(
            image.get(4, 4).unwrap(),
            g.x_value(0.0, 0.0).unwrap(),
            max_relative = 2e-5
        );
        assert_relative_eq!(
            image.get(5, 4).unwrap(),
            g.x_value(1.0, 0.0).unwrap(),
            epsilon = 2e-5
        );
    }

    #[test]
    fn test_pixel_response_integrates() {
        let g: Profile = Gaussian::from_sigma(1.0, 1.0).unwrap().into();
        let mut image = ImageGrid::<f64>::new(16, 16).unwrap();
        let options = RenderOptions {
            use_true_center: false,
            ..Default::default()
        };
        let report = draw_fft(&g, &mut image, &options).unwrap();
        assert_relative_eq!(report.flux_drawn, 1.0, max_relative = 1e-5);
        // Central pixel holds erf(0.5/√2)² of the flux
        let frac = meter_math::erf(0.5 / 2f64.sqrt());
        assert_relative_eq!(image.get(8, 8).unwrap(), frac * frac, max_relative = 2e-4);
    }

    #[test]
    fn test_grid_too_large() {
        // A bare point source never dies out in k
        let d: Profile = DeltaFunction::new(1.0).unwrap().into();
        let mut image = ImageGrid::<f64>::new(8, 8).unwrap();
        assert!(matches!(
            draw_fft(&d, &mut image, &RenderOptions::no_pixel()),
            Err(RenderError::GridTooLarge { .. })
        ));

        let g: Profile = Gaussian::from_sigma(50.0, 1.0).unwrap().into();
        let options = RenderOptions {
            method: DrawMethod::NoPixel,
            params: RenderParams {
                max_fft_size: 64,
                ..Default::default()
            },
            ..Default::default()
        };
        let err = draw_fft(&g, &mut image, &options).unwrap_err();
        assert!(matches!(err, RenderError::GridTooLarge { limit: 64, .. }));
    }

    #[test]
    fn test_render_params_reach_the_profile() {
        let tight = RenderParams {
            folding_threshold: 1e-8,
            maxk_threshold: 1e-8,
            ..Default::default()
        };
        let draw = |profile: &Profile, params: RenderParams| {
            let mut image = ImageGrid::<f64>::new(16, 16).unwrap();
            let options = RenderOptions {
                params,
                ..Default::default()
            };
            draw_fft(profile, &mut image, &options).unwrap()
        };

        let g: Profile = Gaussian::from_sigma(3.0, 1.0).unwrap().into();
        let coarse = draw(&g, RenderParams::default());
        let fine = draw(&g, tight);
        assert!(fine.working_size > coarse.working_size);

        // Same grid as when the leaf carries the settings itself
        let leaf: Profile = Gaussian::from_sigma(3.0, 1.0)
            .unwrap()
            .with_params(tight)
            .into();
        assert_eq!(draw(&leaf, tight).working_size, fine.working_size);
    }

    #[test]
    fn test_add_to_image() {
        let g: Profile = Gaussian::from_sigma(1.0, 2.0).unwrap().into();
        let mut image = ImageGrid::<f64>::new(16, 16).unwrap();
        draw_fft(&g, &mut image, &RenderOptions::default()).unwrap();
        let options = RenderOptions {
            add_to_image: true,
            ..Default::default()
        };
        draw_fft(&g, &mut image, &options).unwrap();
        assert_relative_eq!(image.sum(), 4.0, max_relative = 1e-4);
    }
}
