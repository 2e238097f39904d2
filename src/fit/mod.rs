//! Spot fitting strategies.
//!
//! A fitter looks at one camera frame, tries to localise one laser spot in the
//! left half and one in the right half, and reports how far each spot sits
//! from the centre column. Two strategies implement [`SpotFitter`]:
//!
//! - [`GaussianFitter`]: seed on the brightest pixel, then least-squares fit a
//!   fixed-width 2D gaussian in a small window around it
//! - [`MomentFitter`]: intensity-weighted centroid of a horizontal band
//!
//! The strategy is chosen from configuration once at startup and can be
//! swapped at runtime with [`build_fitter`].

pub mod gaussian;
pub mod moments;
pub mod peak;

pub use gaussian::GaussianFitter;
pub use moments::MomentFitter;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AppResult;
use crate::frame::Frame;

/// Brightest pixel below this is treated as "no spot".
pub const DETECTION_FLOOR: u16 = 25;

/// Exclusive access to the numeric peak-fit routine.
///
/// Held only around the fit call itself. Share one lock between every fitter
/// that must not run the routine concurrently.
pub type FitLock = Arc<Mutex<()>>;

/// Create a fresh, unshared fit lock.
pub fn new_fit_lock() -> FitLock {
    Arc::new(Mutex::new(()))
}

/// Fit strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Fixed-width gaussian peak fit
    #[default]
    Gaussian,
    /// Intensity moments
    Moments,
}

impl FitMode {
    /// Decode the lock controller's integer mode: `1` is gaussian, anything
    /// else selects moments.
    pub fn from_code(code: i32) -> Self {
        if code == 1 {
            FitMode::Gaussian
        } else {
            FitMode::Moments
        }
    }
}

/// Result of fitting both halves of one frame.
///
/// `dist1`/`dist2` are the absolute horizontal distances of the left and right
/// spot from the centre column. Offsets of a spot that was not found are 0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FitIntermediate {
    /// Number of spots localised (0, 1 or 2)
    pub total_good: u8,
    pub dist1: f64,
    pub dist2: f64,
    pub x_off1: f64,
    pub y_off1: f64,
    pub x_off2: f64,
    pub y_off2: f64,
}

/// Strategy that localises the two laser spots in a frame.
pub trait SpotFitter: Send {
    /// Which strategy this is
    fn mode(&self) -> FitMode;

    /// Fit the left and right half of `frame` independently.
    ///
    /// Failing to find a spot is reported through `total_good`; errors are
    /// reserved for numerical faults.
    fn do_fit(&self, frame: &Frame) -> AppResult<FitIntermediate>;
}

/// Build the fitter for `mode`.
///
/// `sigma` is the expected spot width; the gaussian strategy takes
/// `fit_lock` to serialise its peak fits.
pub fn build_fitter(mode: FitMode, sigma: f64, fit_lock: FitLock) -> Box<dyn SpotFitter> {
    match mode {
        FitMode::Gaussian => Box::new(GaussianFitter::new(sigma, fit_lock)),
        FitMode::Moments => Box::new(MomentFitter::new()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_mode_codes() {
        assert_eq!(FitMode::from_code(1), FitMode::Gaussian);
        assert_eq!(FitMode::from_code(0), FitMode::Moments);
        assert_eq!(FitMode::from_code(2), FitMode::Moments);
    }

    #[test]
    fn test_build_fitter_selects_strategy() {
        let lock = new_fit_lock();
        assert_eq!(
            build_fitter(FitMode::Gaussian, 5.0, lock.clone()).mode(),
            FitMode::Gaussian
        );
        assert_eq!(
            build_fitter(FitMode::Moments, 5.0, lock).mode(),
            FitMode::Moments
        );
    }
}
