//! Pixel accumulator.
//!
//! An [`ImageGrid`] owns a row-major `Array2` indexed `[row, col]` = `[y, x]`
//! with an integer origin, so that pixel `(x, y)` lives at
//! `data[[y - y0, x - x0]]`. Pixel centers lie at integer coordinates and
//! pixel `(x, y)` covers `[x - 0.5, x + 0.5) × [y - 0.5, y + 0.5)`.

use log::warn;
use nalgebra::{Matrix2, Vector2};
use ndarray::Array2;
use num_traits::{NumCast, Zero};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::ops::AddAssign;
use std::sync::Arc;

use crate::error::RenderError;
use crate::transform::{AffineTransform, CoordinateTransform};

/// Element types an [`ImageGrid`] can hold.
pub trait Pixel:
    Copy + Debug + Default + PartialEq + Send + Sync + Zero + NumCast + AddAssign + 'static
{
    /// Integer count types accept only integral deposits.
    const INTEGRAL: bool;
}

impl Pixel for f64 {
    const INTEGRAL: bool = false;
}

impl Pixel for f32 {
    const INTEGRAL: bool = false;
}

impl Pixel for i32 {
    const INTEGRAL: bool = true;
}

impl Pixel for i64 {
    const INTEGRAL: bool = true;
}

impl Pixel for u32 {
    const INTEGRAL: bool = true;
}

/// What happens to flux deposited outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgePolicy {
    /// Drop it and keep a running total in [`ImageGrid::discarded_flux`].
    #[default]
    Clip,
    /// Fail with `RenderError::OutOfBounds`.
    Reject,
}

/// How a point deposit is spread over pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DepositKernel {
    /// All weight into the pixel containing the point.
    #[default]
    Nearest,
    /// Weight split over the four pixels whose centers surround the point.
    Bilinear,
}

/// Inclusive pixel bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub xmin: i64,
    pub xmax: i64,
    pub ymin: i64,
    pub ymax: i64,
}

impl Bounds {
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }
}

/// Everything needed to rebuild a grid from a flat buffer.
///
/// Non-affine transforms are recorded as their local affine approximation at
/// the grid's true center, which is what the renderers use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridMetadata {
    pub width: usize,
    pub height: usize,
    /// Pixel coordinates of `data[[0, 0]]`.
    pub origin: [i64; 2],
    /// Row-major Jacobian `[[dsky_x/dx, dsky_x/dy], [dsky_y/dx, dsky_y/dy]]`.
    pub jacobian: [[f64; 2]; 2],
    pub pixel_origin: [f64; 2],
    pub sky_origin: [f64; 2],
    pub edge_policy: EdgePolicy,
}

/// A fixed-size image with an integer origin and a pixel-to-sky transform.
///
/// The transform is shared, so clones and [`zeros_like`](Self::zeros_like)
/// grids refer to the same map.
#[derive(Debug, Clone)]
pub struct ImageGrid<T: Pixel> {
    data: Array2<T>,
    origin: (i64, i64),
    transform: Arc<dyn CoordinateTransform>,
    edge_policy: EdgePolicy,
    discarded_flux: f64,
}

impl<T: Pixel> ImageGrid<T> {
    /// Zero-filled grid with unit pixel scale and origin (0, 0).
    pub fn new(width: usize, height: usize) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::invalid(
                "shape",
                (width * height) as f64,
                format!("image must be non-empty, got {width}x{height}"),
            ));
        }
        Ok(Self {
            data: Array2::zeros((height, width)),
            origin: (0, 0),
            transform: Arc::new(AffineTransform::default()),
            edge_policy: EdgePolicy::Clip,
            discarded_flux: 0.0,
        })
    }

    /// Zero-filled grid with square pixels of side `scale`.
    pub fn with_scale(width: usize, height: usize, scale: f64) -> Result<Self, RenderError> {
        Ok(Self::new(width, height)?.with_transform(AffineTransform::pixel_scale(scale)?))
    }

    /// Replace the pixel-to-sky map; any [`CoordinateTransform`] is accepted.
    pub fn with_transform<C: CoordinateTransform + 'static>(mut self, transform: C) -> Self {
        self.transform = Arc::new(transform);
        self
    }

    pub fn with_origin(mut self, x0: i64, y0: i64) -> Self {
        self.origin = (x0, y0);
        self
    }

    pub fn with_edge_policy(mut self, edge_policy: EdgePolicy) -> Self {
        self.edge_policy = edge_policy;
        self
    }

    /// An empty grid with the same geometry and edge policy.
    pub fn zeros_like(&self) -> Self {
        Self {
            data: Array2::zeros(self.data.raw_dim()),
            origin: self.origin,
            transform: Arc::clone(&self.transform),
            edge_policy: self.edge_policy,
            discarded_flux: 0.0,
        }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn origin(&self) -> (i64, i64) {
        self.origin
    }

    pub fn transform(&self) -> &dyn CoordinateTransform {
        self.transform.as_ref()
    }

    /// Affine approximation of the transform at the true center.
    pub fn local_affine(&self) -> Result<AffineTransform, RenderError> {
        self.transform.local_affine(self.true_center())
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        self.edge_policy
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            xmin: self.origin.0,
            xmax: self.origin.0 + self.width() as i64 - 1,
            ymin: self.origin.1,
            ymax: self.origin.1 + self.height() as i64 - 1,
        }
    }

    /// Geometric center, possibly at a half-integer position.
    pub fn true_center(&self) -> Vector2<f64> {
        let b = self.bounds();
        Vector2::new(
            0.5 * (b.xmin + b.xmax) as f64,
            0.5 * (b.ymin + b.ymax) as f64,
        )
    }

    /// Integer center: the true center rounded up to a pixel center.
    pub fn nominal_center(&self) -> Vector2<f64> {
        let b = self.bounds();
        Vector2::new(
            (b.xmin + b.xmax + 1).div_euclid(2) as f64,
            (b.ymin + b.ymax + 1).div_euclid(2) as f64,
        )
    }

    pub fn array(&self) -> &Array2<T> {
        &self.data
    }

    pub(crate) fn array_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    pub fn into_array(self) -> Array2<T> {
        self.data
    }

    /// Flux deposited outside the grid under `EdgePolicy::Clip`.
    pub fn discarded_flux(&self) -> f64 {
        self.discarded_flux
    }

    /// Pixel value at integer coordinates, `None` outside the bounds.
    pub fn get(&self, x: i64, y: i64) -> Option<T> {
        let (row, col) = self.index_of(x, y)?;
        Some(self.data[[row, col]])
    }

    pub fn sum(&self) -> f64 {
        self.data.iter().filter_map(|v| v.to_f64()).sum()
    }

    /// Reset every pixel and the discarded-flux tally.
    pub fn fill_zero(&mut self) {
        self.data.fill(T::zero());
        self.discarded_flux = 0.0;
    }

    fn index_of(&self, x: i64, y: i64) -> Option<(usize, usize)> {
        let col = x - self.origin.0;
        let row = y - self.origin.1;
        if col < 0 || row < 0 || col >= self.width() as i64 || row >= self.height() as i64 {
            None
        } else {
            Some((row as usize, col as usize))
        }
    }

    fn convert(weight: f64) -> Result<T, RenderError> {
        if T::INTEGRAL && weight.fract() != 0.0 {
            return Err(RenderError::invalid(
                "weight",
                weight,
                "integer grids accept only integral weights",
            ));
        }
        <T as NumCast>::from(weight).ok_or_else(|| {
            RenderError::invalid("weight", weight, "not representable in the pixel type")
        })
    }

    /// Add `weight` to pixel `(x, y)`, applying the edge policy if it is outside.
    pub fn add_to_pixel(&mut self, x: i64, y: i64, weight: f64) -> Result<(), RenderError> {
        match self.index_of(x, y) {
            Some((row, col)) => {
                self.data[[row, col]] += Self::convert(weight)?;
                Ok(())
            }
            None => self.outside(x as f64, y as f64, weight),
        }
    }

    fn outside(&mut self, x: f64, y: f64, weight: f64) -> Result<(), RenderError> {
        match self.edge_policy {
            EdgePolicy::Clip => {
                self.discarded_flux += weight;
                Ok(())
            }
            EdgePolicy::Reject => Err(RenderError::OutOfBounds { x, y }),
        }
    }

    /// Deposit `weight` at fractional pixel coordinates.
    pub fn deposit(
        &mut self,
        x: f64,
        y: f64,
        weight: f64,
        kernel: DepositKernel,
    ) -> Result<(), RenderError> {
        if !x.is_finite() || !y.is_finite() || !weight.is_finite() {
            return Err(RenderError::invalid(
                "deposit",
                weight,
                format!("non-finite deposit at ({x}, {y})"),
            ));
        }
        match kernel {
            DepositKernel::Nearest => {
                let ix = (x + 0.5).floor() as i64;
                let iy = (y + 0.5).floor() as i64;
                match self.index_of(ix, iy) {
                    Some((row, col)) => {
                        self.data[[row, col]] += Self::convert(weight)?;
                        Ok(())
                    }
                    None => self.outside(x, y, weight),
                }
            }
            DepositKernel::Bilinear => {
                if T::INTEGRAL {
                    return Err(RenderError::invalid(
                        "kernel",
                        weight,
                        "integer grids accept only the Nearest kernel",
                    ));
                }
                let fx = x.floor();
                let fy = y.floor();
                let tx = x - fx;
                let ty = y - fy;
                let (ix, iy) = (fx as i64, fy as i64);
                let parts = [
                    (ix, iy, (1.0 - tx) * (1.0 - ty)),
                    (ix + 1, iy, tx * (1.0 - ty)),
                    (ix, iy + 1, (1.0 - tx) * ty),
                    (ix + 1, iy + 1, tx * ty),
                ];
                for (px, py, frac) in parts {
                    if frac == 0.0 {
                        continue;
                    }
                    match self.index_of(px, py) {
                        Some((row, col)) => {
                            self.data[[row, col]] += Self::convert(weight * frac)?;
                        }
                        None => self.outside(x, y, weight * frac)?,
                    }
                }
                Ok(())
            }
        }
    }

    /// Add another grid with identical geometry into this one.
    pub fn accumulate(&mut self, other: &ImageGrid<T>) -> Result<(), RenderError> {
        if self.data.dim() != other.data.dim() || self.origin != other.origin {
            return Err(RenderError::invalid(
                "accumulate",
                other.data.len() as f64,
                format!(
                    "grid geometry mismatch: {:?}@{:?} vs {:?}@{:?}",
                    self.data.dim(),
                    self.origin,
                    other.data.dim(),
                    other.origin
                ),
            ));
        }
        self.data.zip_mut_with(&other.data, |a, &b| *a += b);
        self.discarded_flux += other.discarded_flux;
        Ok(())
    }

    pub fn metadata(&self) -> Result<GridMetadata, RenderError> {
        let local = self.local_affine()?;
        let j = local.jacobian();
        let p0 = local.pixel_origin();
        let s0 = local.sky_origin();
        Ok(GridMetadata {
            width: self.width(),
            height: self.height(),
            origin: [self.origin.0, self.origin.1],
            jacobian: [[j[(0, 0)], j[(0, 1)]], [j[(1, 0)], j[(1, 1)]]],
            pixel_origin: [p0.x, p0.y],
            sky_origin: [s0.x, s0.y],
            edge_policy: self.edge_policy,
        })
    }

    /// Row-major pixel buffer plus the metadata needed to rebuild the grid.
    pub fn to_flat(&self) -> Result<(Vec<T>, GridMetadata), RenderError> {
        Ok((self.data.iter().copied().collect(), self.metadata()?))
    }

    pub fn from_flat(data: Vec<T>, metadata: &GridMetadata) -> Result<Self, RenderError> {
        let expected = metadata.width * metadata.height;
        if data.len() != expected || expected == 0 {
            return Err(RenderError::invalid(
                "data",
                data.len() as f64,
                format!(
                    "expected {} values for {}x{}",
                    expected, metadata.width, metadata.height
                ),
            ));
        }
        let [[a, b], [c, d]] = metadata.jacobian;
        let transform = AffineTransform::new(
            Matrix2::new(a, b, c, d),
            Vector2::new(metadata.pixel_origin[0], metadata.pixel_origin[1]),
            Vector2::new(metadata.sky_origin[0], metadata.sky_origin[1]),
        )?;
        let array = Array2::from_shape_vec((metadata.height, metadata.width), data)
            .map_err(|e| RenderError::invalid("data", expected as f64, e.to_string()))?;
        Ok(Self {
            data: array,
            origin: (metadata.origin[0], metadata.origin[1]),
            transform: Arc::new(transform),
            edge_policy: metadata.edge_policy,
            discarded_flux: 0.0,
        })
    }

    /// Log a warning when a noticeable share of `total` fell off the grid.
    pub(crate) fn warn_if_clipped(&self, total: f64, context: &str) {
        if total != 0.0 && (self.discarded_flux / total).abs() > 1e-3 {
            warn!(
                "{context}: {:.3}% of the flux fell outside the {}x{} image",
                100.0 * self.discarded_flux / total,
                self.width(),
                self.height()
            );
        }
    }
}
