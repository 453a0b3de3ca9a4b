//! Photon-shooting renderer.
//!
//! The photon budget is split into chunks of `RenderParams::photon_chunk_size`.
//! Chunk `i` shoots with `StdRng::seed_from_u64(seed + i)` into a private
//! partial image; partial images are summed in chunk order. A seeded draw is
//! therefore bit-identical however rayon schedules the chunks.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};

use super::{AllocationPolicy, PhotonCountPolicy, Sensor, ShootOptions, SimpleSensor};
use crate::error::RenderError;
use crate::image::{ImageGrid, Pixel};
use crate::parallel::{map_seeded_chunks, resolve_seed};
use crate::profile::{Profile, SurfaceBrightness};
use crate::render::{place, prepare_target, DrawMethod, RenderOptions};

/// Mixed into the seed of the stream that draws Poisson photon counts, so it
/// never coincides with a chunk stream.
const COUNT_STREAM: u64 = 0x9E37_79B9_7F4A_7C15;

/// Summary of one photon-shooting draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShootReport {
    /// Photons requested from the profile (after the count policy).
    pub photons: usize,
    /// Number of chunks the photons were shot in.
    pub chunks: usize,
    /// Seed the draw used; replaying it reproduces the image.
    pub seed: u64,
    /// Flux that landed inside the image.
    pub flux_added: f64,
}

/// Photon count and the factor applied to each chunk's photon fluxes.
///
/// A chunk of `m` photons from `profile.shoot(m)` carries the full flux; the
/// factor rescales it to the share the policy assigns.
#[derive(Debug, Clone, Copy)]
struct Budget {
    photons: usize,
    /// Divisor for per-chunk flux: each chunk carries `flux · m / per_flux`.
    per_flux: f64,
    unit_weights: bool,
}

fn budget<R: Rng + ?Sized>(
    profile: &Profile,
    count: PhotonCountPolicy,
    rng: &mut R,
) -> Result<Budget, RenderError> {
    match count {
        PhotonCountPolicy::Fixed(n) => {
            if n == 0 {
                return Err(RenderError::invalid(
                    "photons",
                    0.0,
                    "a fixed photon count must be positive",
                ));
            }
            Ok(Budget {
                photons: n,
                per_flux: n as f64,
                unit_weights: false,
            })
        }
        PhotonCountPolicy::Poisson(mean) => {
            if !(mean.is_finite() && mean > 0.0) {
                return Err(RenderError::invalid(
                    "photons",
                    mean,
                    "Poisson mean must be positive and finite",
                ));
            }
            let poisson =
                Poisson::new(mean).map_err(|e| RenderError::invalid("photons", mean, e.to_string()))?;
            Ok(Budget {
                photons: poisson.sample(rng) as usize,
                per_flux: mean,
                unit_weights: false,
            })
        }
        PhotonCountPolicy::PhotonCounting => {
            let mean = profile.abs_flux();
            let photons = if mean > 0.0 {
                Poisson::new(mean)
                    .map_err(|e| RenderError::invalid("flux", mean, e.to_string()))?
                    .sample(rng) as usize
            } else {
                0
            };
            Ok(Budget {
                photons,
                per_flux: 1.0,
                unit_weights: true,
            })
        }
    }
}

/// Shoot `count` photons from an already placed profile into `image`.
fn shoot_chunk<T: Pixel, S: Sensor, R: Rng + ?Sized>(
    placed: &Profile,
    count: usize,
    budget: &Budget,
    allocation: AllocationPolicy,
    sensor: &S,
    image: &mut ImageGrid<T>,
    rng: &mut R,
) -> Result<f64, RenderError> {
    if count == 0 {
        return Ok(0.0);
    }
    // Unit weights need exactly `count` photons, which only multinomial splits guarantee
    let allocation = if budget.unit_weights {
        AllocationPolicy::Multinomial
    } else {
        allocation
    };
    let mut photons = placed.shoot(count, rng, allocation)?;
    if budget.unit_weights {
        photons.set_unit_weights();
    } else {
        photons.scale_flux(count as f64 / budget.per_flux);
    }
    sensor.accumulate(&photons, image)
}

fn check_method(options: &RenderOptions) -> Result<(), RenderError> {
    if options.method == DrawMethod::NoPixel {
        // Deposition already integrates over pixels; there are no centers to sample
        return Err(RenderError::invalid(
            "method",
            0.0,
            "photon shooting integrates over pixels; use DrawMethod::Auto",
        ));
    }
    Ok(())
}

/// Draw `profile` into `image` by photon shooting, in parallel seeded chunks.
pub fn draw_photons<T: Pixel>(
    profile: &Profile,
    image: &mut ImageGrid<T>,
    render: &RenderOptions,
    shoot: &ShootOptions,
) -> Result<ShootReport, RenderError> {
    draw_photons_with_sensor(profile, image, render, shoot, &SimpleSensor::new(shoot.kernel))
}

/// [`draw_photons`] with a caller-supplied [`Sensor`].
pub fn draw_photons_with_sensor<T: Pixel, S: Sensor>(
    profile: &Profile,
    image: &mut ImageGrid<T>,
    render: &RenderOptions,
    shoot: &ShootOptions,
    sensor: &S,
) -> Result<ShootReport, RenderError> {
    check_method(render)?;
    let placed = place(profile, image, render, false)?.positioned()?;
    let (seed, seeded) = resolve_seed(shoot.seed);
    if !seeded {
        warn!("Shooting {} without a seed (drew {seed}); the image is not reproducible", profile.name());
    }

    let mut count_rng = StdRng::seed_from_u64(seed ^ COUNT_STREAM);
    let budget = budget(&placed, shoot.count, &mut count_rng)?;
    let template = image.zeros_like();
    let partials = map_seeded_chunks(
        budget.photons,
        render.params.photon_chunk_size,
        seed,
        |_, count, rng| -> Result<(ImageGrid<T>, f64), RenderError> {
            let mut partial = template.clone();
            let added = shoot_chunk(&placed, count, &budget, shoot.allocation, sensor, &mut partial, rng)?;
            Ok((partial, added))
        },
    )?;

    prepare_target(image, render);
    let mut flux_added = 0.0;
    for (partial, added) in &partials {
        image.accumulate(partial)?;
        flux_added += added;
    }
    image.warn_if_clipped(profile.flux(), "photon shooting");
    info!(
        "Shot {} photons of {} in {} chunks (seed {seed}): {:.6e} of {:.6e} flux landed",
        budget.photons,
        profile.name(),
        partials.len(),
        flux_added,
        profile.flux()
    );
    Ok(ShootReport {
        photons: budget.photons,
        chunks: partials.len(),
        seed,
        flux_added,
    })
}

/// Draw `profile` into `image` sequentially with a caller-owned generator.
///
/// `shoot.seed` is ignored; the photon count (for the Poisson policies) and
/// every photon come from `rng`.
pub fn shoot_with_rng<T: Pixel, R: Rng + ?Sized>(
    profile: &Profile,
    image: &mut ImageGrid<T>,
    render: &RenderOptions,
    shoot: &ShootOptions,
    rng: &mut R,
) -> Result<ShootReport, RenderError> {
    check_method(render)?;
    let placed = place(profile, image, render, false)?.positioned()?;
    let budget = budget(&placed, shoot.count, rng)?;
    let sensor = SimpleSensor::new(shoot.kernel);

    let mut partial = image.zeros_like();
    let flux_added = shoot_chunk(
        &placed,
        budget.photons,
        &budget,
        shoot.allocation,
        &sensor,
        &mut partial,
        rng,
    )?;
    prepare_target(image, render);
    image.accumulate(&partial)?;
    Ok(ShootReport {
        photons: budget.photons,
        chunks: 1,
        seed: 0,
        flux_added,
    })
}
