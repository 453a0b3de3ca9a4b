//! Numerical accuracy settings shared by profiles and renderers.

use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Accuracy and resource limits for rendering.
///
/// Defaults follow the conventional values used for survey image simulation:
/// 0.5% of the flux may fold back into the image from periodic copies, and
/// Fourier modes below 0.1% of the total flux are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderParams {
    /// Fraction of flux allowed to alias from outside the working grid; sets step_k.
    pub folding_threshold: f64,
    /// Fourier amplitude (relative to flux) below which modes are dropped; sets max_k.
    pub maxk_threshold: f64,
    /// Relative accuracy of tabulated Fourier values.
    pub kvalue_accuracy: f64,
    /// Accuracy of real-space values relative to the total absolute flux. The
    /// real-space renderer refines each pixel integral until two successive
    /// estimates agree to this level.
    pub xvalue_accuracy: f64,
    /// Fraction of flux that may be misplaced when tabulating photon deviates.
    pub shoot_accuracy: f64,
    /// Working radius is at least this many half-light radii.
    pub stepk_minimum_hlr: f64,
    /// Largest FFT edge (including alias folding) the Fourier renderer will attempt.
    pub max_fft_size: usize,
    /// Photons per parallel chunk in the photon renderer.
    pub photon_chunk_size: usize,
    /// Initial Simpson intervals per pixel axis in the real-space reference renderer.
    pub real_space_subdivisions: usize,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            folding_threshold: 5e-3,
            maxk_threshold: 1e-3,
            kvalue_accuracy: 1e-5,
            xvalue_accuracy: 1e-5,
            shoot_accuracy: 1e-5,
            stepk_minimum_hlr: 5.0,
            max_fft_size: 8192,
            photon_chunk_size: 100_000,
            real_space_subdivisions: 6,
        }
    }
}

impl RenderParams {
    /// Check every field is inside its domain.
    pub fn validate(&self) -> Result<(), RenderError> {
        let fractions = [
            ("folding_threshold", self.folding_threshold),
            ("maxk_threshold", self.maxk_threshold),
            ("kvalue_accuracy", self.kvalue_accuracy),
            ("xvalue_accuracy", self.xvalue_accuracy),
            ("shoot_accuracy", self.shoot_accuracy),
        ];
        for (name, value) in fractions {
            if !(value > 0.0 && value < 1.0) {
                return Err(RenderError::invalid(name, value, "must lie in (0, 1)"));
            }
        }
        if !self.stepk_minimum_hlr.is_finite() || self.stepk_minimum_hlr < 0.0 {
            return Err(RenderError::invalid(
                "stepk_minimum_hlr",
                self.stepk_minimum_hlr,
                "must be finite and non-negative",
            ));
        }
        if self.max_fft_size < 2 {
            return Err(RenderError::invalid(
                "max_fft_size",
                self.max_fft_size as f64,
                "must be at least 2",
            ));
        }
        if self.photon_chunk_size == 0 {
            return Err(RenderError::invalid(
                "photon_chunk_size",
                0.0,
                "must be at least 1",
            ));
        }
        if self.real_space_subdivisions < 2 {
            return Err(RenderError::invalid(
                "real_space_subdivisions",
                self.real_space_subdivisions as f64,
                "must be at least 2",
            ));
        }
        Ok(())
    }

    /// Radius in units of a Gaussian sigma beyond which `folding_threshold` of the flux lies.
    pub(crate) fn gaussian_fold_radius(&self) -> f64 {
        (-2.0 * self.folding_threshold.ln()).sqrt()
    }

    /// Radius in units of 1/sigma beyond which a Gaussian transform drops below `maxk_threshold`.
    pub(crate) fn gaussian_maxk_radius(&self) -> f64 {
        (-2.0 * self.maxk_threshold.ln()).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(RenderParams::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range() {
        let params = RenderParams {
            folding_threshold: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(RenderError::InvalidParameter {
                name: "folding_threshold",
                ..
            })
        ));

        let params = RenderParams {
            maxk_threshold: 1.5,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = RenderParams {
            max_fft_size: 1,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = RenderParams {
            kvalue_accuracy: f64::NAN,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip_with_partial_input() {
        let params: RenderParams = serde_json::from_str(r#"{"max_fft_size": 4096}"#).unwrap();
        assert_eq!(params.max_fft_size, 4096);
        assert_eq!(params.folding_threshold, 5e-3);

        let text = serde_json::to_string(&params).unwrap();
        let back: RenderParams = serde_json::from_str(&text).unwrap();
        assert_eq!(back, params);
    }

    #[test]
    fn test_gaussian_radii() {
        let params = RenderParams::default();
        assert!((params.gaussian_fold_radius() - 3.255).abs() < 1e-3);
        assert!((params.gaussian_maxk_radius() - 3.717).abs() < 1e-3);
    }
}
