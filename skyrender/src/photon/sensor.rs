use crate::error::RenderError;
use crate::image::{DepositKernel, ImageGrid, Pixel};

use super::PhotonArray;

/// Converts photons arriving at the focal plane into pixel values.
///
/// Photon positions are in pixel coordinates of `image`.
pub trait Sensor: Send + Sync {
    /// Deposit every photon into `image` and return the flux that landed inside it.
    fn accumulate<T: Pixel>(
        &self,
        photons: &PhotonArray,
        image: &mut ImageGrid<T>,
    ) -> Result<f64, RenderError>;
}

/// A sensor that puts each photon into the pixel (or pixels) under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimpleSensor {
    pub kernel: DepositKernel,
}

impl SimpleSensor {
    pub fn new(kernel: DepositKernel) -> Self {
        Self { kernel }
    }
}

impl Sensor for SimpleSensor {
    fn accumulate<T: Pixel>(
        &self,
        photons: &PhotonArray,
        image: &mut ImageGrid<T>,
    ) -> Result<f64, RenderError> {
        let discarded_before = image.discarded_flux();
        let mut total = 0.0;
        for (x, y, flux) in photons.iter() {
            image.deposit(x, y, flux, self.kernel)?;
            total += flux;
        }
        Ok(total - (image.discarded_flux() - discarded_before))
    }
}
