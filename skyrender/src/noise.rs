//! Photon statistics for rendered mean images.
//!
//! The Fourier and real-space renderers produce expected flux per pixel.
//! [`apply_poisson_noise`] turns such a mean image into one realization of
//! photon counts; [`add_gaussian_noise`] adds a read-noise style floor.
//! Both process the image in row blocks of [`DEFAULT_ROW_CHUNK`] with one
//! seeded RNG per block, so a seeded call is reproducible on any thread count.

use log::{debug, warn};
use rand_distr::{Distribution, Normal, Poisson};

use crate::error::RenderError;
use crate::image::ImageGrid;
use crate::parallel::{process_rows_in_parallel_chunks, resolve_seed, DEFAULT_ROW_CHUNK};

/// Replace every pixel by a Poisson draw with that pixel's value as the mean.
///
/// Pixels with a non-positive mean become zero. Returns the seed actually used.
///
/// # Arguments
/// * `image` - Mean counts per pixel; overwritten with the realization
/// * `seed` - Base seed, or `None` to draw one (non-reproducible)
pub fn apply_poisson_noise(
    image: &mut ImageGrid<f64>,
    seed: Option<u64>,
) -> Result<u64, RenderError> {
    if let Some(bad) = image.array().iter().find(|v| !v.is_finite()) {
        return Err(RenderError::invalid(
            "mean",
            *bad,
            "Poisson means must be finite",
        ));
    }
    let (seed, seeded) = resolve_seed(seed);
    if !seeded {
        warn!("Poisson noise drawn without a seed; the realization is not reproducible");
    }
    let negative = image.array().iter().filter(|&&v| v < 0.0).count();
    if negative > 0 {
        debug!("{negative} pixels with negative mean set to zero before Poisson sampling");
    }

    process_rows_in_parallel_chunks(
        &mut image.array_mut().view_mut(),
        seed,
        Some(DEFAULT_ROW_CHUNK),
        |chunk, rng| {
            chunk.iter_mut().for_each(|pixel| {
                let mean = *pixel;
                *pixel = match Poisson::new(mean) {
                    Ok(poisson) if mean > 0.0 => poisson.sample(rng),
                    _ => 0.0,
                };
            });
        },
    );
    Ok(seed)
}

/// Add zero-mean Gaussian noise of standard deviation `sigma` to every pixel.
///
/// Returns the seed actually used.
pub fn add_gaussian_noise(
    image: &mut ImageGrid<f64>,
    sigma: f64,
    seed: Option<u64>,
) -> Result<u64, RenderError> {
    let normal = Normal::new(0.0, sigma)
        .ok()
        .filter(|_| sigma.is_finite() && sigma >= 0.0)
        .ok_or_else(|| RenderError::invalid("sigma", sigma, "must be finite and >= 0"))?;
    let (seed, seeded) = resolve_seed(seed);
    if !seeded {
        warn!("Gaussian noise drawn without a seed; the realization is not reproducible");
    }
    process_rows_in_parallel_chunks(
        &mut image.array_mut().view_mut(),
        seed,
        Some(DEFAULT_ROW_CHUNK),
        |chunk, rng| {
            chunk
                .iter_mut()
                .for_each(|pixel| *pixel += normal.sample(rng));
        },
    );
    Ok(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat(value: f64, size: usize) -> ImageGrid<f64> {
        let mut image = ImageGrid::<f64>::new(size, size).unwrap();
        image.array_mut().fill(value);
        image
    }

    #[test]
    fn test_poisson_statistics() {
        let mut image = flat(50.0, 200);
        apply_poisson_noise(&mut image, Some(11)).unwrap();
        let values = image.array();
        assert!(values.iter().all(|v| v.fract() == 0.0 && *v >= 0.0));
        let mean = values.mean().unwrap();
        let var = values.var(0.0);
        assert_relative_eq!(mean, 50.0, max_relative = 0.01);
        assert_relative_eq!(var, 50.0, max_relative = 0.05);
    }

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let mut a = flat(3.0, 130);
        let mut b = flat(3.0, 130);
        apply_poisson_noise(&mut a, Some(99)).unwrap();
        apply_poisson_noise(&mut b, Some(99)).unwrap();
        assert_eq!(a.array(), b.array());

        let mut c = flat(3.0, 130);
        apply_poisson_noise(&mut c, Some(100)).unwrap();
        assert_ne!(a.array(), c.array());
    }

    #[test]
    fn test_non_positive_means() {
        let mut image = flat(-1.0, 4);
        image.add_to_pixel(0, 0, 1.0).unwrap();
        apply_poisson_noise(&mut image, Some(1)).unwrap();
        assert_eq!(image.sum(), 0.0);

        let mut bad = flat(f64::NAN, 2);
        assert!(matches!(
            apply_poisson_noise(&mut bad, Some(1)),
            Err(RenderError::InvalidParameter { name: "mean", .. })
        ));
    }

    #[test]
    fn test_gaussian_noise() {
        let mut image = flat(10.0, 200);
        add_gaussian_noise(&mut image, 2.0, Some(5)).unwrap();
        assert_relative_eq!(image.array().mean().unwrap(), 10.0, epsilon = 0.05);
        assert_relative_eq!(image.array().std(0.0), 2.0, max_relative = 0.03);
        assert!(add_gaussian_noise(&mut image, -1.0, None).is_err());
    }
}
