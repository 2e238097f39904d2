//! Intensity-moment spot estimator.
//!
//! Averages a horizontal band around the vertical midline into a column
//! profile and takes the intensity-weighted mean column of each half. Much
//! cheaper than the gaussian fit and insensitive to spot shape, but biased by
//! any background left in the band.

use ndarray::{s, ArrayView1, Axis};
use std::time::Duration;

use super::{FitIntermediate, FitMode, SpotFitter};
use crate::error::AppResult;
use crate::frame::Frame;

/// Rows above and below the midline included in the band.
pub const BAND_HALF_HEIGHT: usize = 15;

const DEFAULT_THROTTLE: Duration = Duration::from_millis(20);

/// Spot estimator based on first moments of a column profile
pub struct MomentFitter {
    throttle: Duration,
}

impl MomentFitter {
    pub fn new() -> Self {
        Self {
            throttle: DEFAULT_THROTTLE,
        }
    }

    /// Sleep `throttle` after every fit (default 20 ms).
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }
}

impl Default for MomentFitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Summed intensity and first moment of a profile.
fn moments(profile: ArrayView1<f64>) -> (f64, f64) {
    profile
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(power, first), (x, &p)| {
            (power + p, first + x as f64 * p)
        })
}

impl SpotFitter for MomentFitter {
    fn mode(&self) -> FitMode {
        FitMode::Moments
    }

    fn do_fit(&self, frame: &Frame) -> AppResult<FitIntermediate> {
        let pixels = frame.view();
        let (rows, cols) = pixels.dim();
        let half_rows = rows / 2;
        let half_cols = cols / 2;

        let band_start = half_rows.saturating_sub(BAND_HALF_HEIGHT);
        let band_end = (half_rows + BAND_HALF_HEIGHT).min(rows);
        let mut result = FitIntermediate::default();

        let band = pixels.slice(s![band_start..band_end, ..]).mapv(f64::from);
        if let Some(profile) = band.mean_axis(Axis(0)) {
            let (power1, first1) = moments(profile.slice(s![..half_cols]));
            if power1 > 0.0 {
                result.total_good += 1;
                result.y_off1 = first1 / power1 - half_cols as f64;
                result.dist1 = result.y_off1.abs();
            }

            let (power2, first2) = moments(profile.slice(s![cols - half_cols..]));
            if power2 > 0.0 {
                result.total_good += 1;
                result.y_off2 = first2 / power2;
                result.dist2 = result.y_off2.abs();
            }
        }

        if !self.throttle.is_zero() {
            std::thread::sleep(self.throttle);
        }
        Ok(result)
    }
}
