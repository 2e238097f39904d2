//! Gaussian peak fitter.
//!
//! For each half of the frame: find the brightest pixel, reject it if it is
//! too dim or too close to an edge, then fit a fixed-width gaussian in a
//! `2 * fit_size` square window around it.

use ndarray::{s, ArrayView2};
use tracing::trace;

use super::peak::fit_fixed_gaussian;
use super::{FitIntermediate, FitLock, FitMode, SpotFitter, DETECTION_FLOOR};
use crate::error::AppResult;
use crate::frame::Frame;

/// Sub-pixel spot centre in the coordinates of the half image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotCentre {
    pub row: f64,
    pub col: f64,
}

/// Spot fitter based on a fixed-width gaussian peak fit
pub struct GaussianFitter {
    sigma: f64,
    fit_size: usize,
    fit_lock: FitLock,
}

impl GaussianFitter {
    /// Fitter for spots of width `sigma`; peak fits are serialised on `fit_lock`.
    pub fn new(sigma: f64, fit_lock: FitLock) -> Self {
        Self {
            sigma,
            fit_size: (1.5 * sigma).floor() as usize,
            fit_lock,
        }
    }

    /// Half-size of the fit window, `floor(1.5 * sigma)`.
    pub fn fit_size(&self) -> usize {
        self.fit_size
    }

    /// Localise a single spot in `half`.
    ///
    /// `Ok(None)` means no usable spot: the brightest pixel is below
    /// [`DETECTION_FLOOR`], it lies within `fit_size` of an edge, or the
    /// peak fit did not converge.
    pub fn fit_half(&self, half: ArrayView2<u16>) -> AppResult<Option<SpotCentre>> {
        let (rows, cols) = half.dim();
        let Some(((max_r, max_c), max)) = brightest_pixel(&half) else {
            return Ok(None);
        };
        if max < DETECTION_FLOOR {
            return Ok(None);
        }

        let fs = self.fit_size;
        let clear_of_edges =
            fs > 0 && max_r >= fs && max_r + fs < rows && max_c >= fs && max_c + fs < cols;
        if !clear_of_edges {
            trace!(max_r, max_c, fs, "Spot seed too close to the edge");
            return Ok(None);
        }

        let window = half
            .slice(s![max_r - fs..max_r + fs, max_c - fs..max_c + fs])
            .mapv(f64::from);
        let peak = {
            let _guard = self.fit_lock.lock();
            fit_fixed_gaussian(window.view(), self.sigma)?
        };

        Ok(peak.map(|p| SpotCentre {
            row: max_r as f64 + p.row - fs as f64,
            col: max_c as f64 + p.col - fs as f64,
        }))
    }
}

/// Position and value of the first maximum in row-major order.
fn brightest_pixel(data: &ArrayView2<u16>) -> Option<((usize, usize), u16)> {
    data.indexed_iter()
        .fold(None, |best, (idx, &v)| match best {
            Some((_, bv)) if bv >= v => best,
            _ => Some((idx, v)),
        })
}

impl SpotFitter for GaussianFitter {
    fn mode(&self) -> FitMode {
        FitMode::Gaussian
    }

    fn do_fit(&self, frame: &Frame) -> AppResult<FitIntermediate> {
        let pixels = frame.view();
        let (rows, cols) = pixels.dim();
        let half_rows = (rows / 2) as f64;
        let half_cols = cols / 2;

        let mut result = FitIntermediate::default();

        if let Some(spot) = self.fit_half(pixels.slice(s![.., ..half_cols]))? {
            result.total_good += 1;
            result.x_off1 = spot.row - half_rows;
            result.y_off1 = spot.col - half_cols as f64;
            result.dist1 = result.y_off1.abs();
        }

        if let Some(spot) = self.fit_half(pixels.slice(s![.., cols - half_cols..]))? {
            result.total_good += 1;
            result.x_off2 = spot.row - half_rows;
            result.y_off2 = spot.col;
            result.dist2 = result.y_off2.abs();
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::new_fit_lock;
    use crate::fit::test_frames::spots;
    use ndarray::Array2;

    fn fitter(sigma: f64) -> GaussianFitter {
        GaussianFitter::new(sigma, new_fit_lock())
    }

    #[test]
    fn test_fit_size() {
        assert_eq!(fitter(5.0).fit_size(), 7);
        assert_eq!(fitter(2.0).fit_size(), 3);
    }

    #[test]
    fn test_two_spots() {
        let frame = spots(200, 200, 5.0, 200.0, &[(50.0, 50.0), (50.0, 150.0)]);
        let fit = fitter(5.0).do_fit(&frame).unwrap();

        assert_eq!(fit.total_good, 2);
        assert!((fit.dist1 - 50.0).abs() < 0.05, "dist1 {}", fit.dist1);
        assert!((fit.dist2 - 50.0).abs() < 0.05, "dist2 {}", fit.dist2);
        assert!((fit.x_off1 + 50.0).abs() < 0.05);
        assert!((fit.y_off1 + 50.0).abs() < 0.05);
        assert!((fit.x_off2 + 50.0).abs() < 0.05);
        assert!((fit.y_off2 - 50.0).abs() < 0.05);
    }

    #[test]
    fn test_dim_frame_has_no_good_fits() {
        let frame = spots(100, 100, 4.0, 24.0, &[(50.0, 25.0), (50.0, 75.0)]);
        assert_eq!(fitter(4.0).do_fit(&frame).unwrap().total_good, 0);
    }

    #[test]
    fn test_spot_at_edge_is_rejected() {
        // Left spot hugging the top edge, right spot well inside.
        let frame = spots(100, 100, 4.0, 200.0, &[(2.0, 25.0), (50.0, 75.0)]);
        let fit = fitter(4.0).do_fit(&frame).unwrap();

        assert_eq!(fit.total_good, 1);
        assert_eq!(fit.dist1, 0.0);
        assert_eq!(fit.y_off1, 0.0);
        assert!((fit.dist2 - 25.0).abs() < 0.05);
    }

    #[test]
    fn test_fit_half_sub_pixel() {
        let frame = spots(60, 60, 3.0, 150.0, &[(30.3, 20.6)]);
        let spot = fitter(3.0).fit_half(frame.view()).unwrap().unwrap();

        assert!((spot.row - 30.3).abs() < 0.05, "row {}", spot.row);
        assert!((spot.col - 20.6).abs() < 0.05, "col {}", spot.col);
    }

    #[test]
    fn test_brightest_pixel_prefers_first() {
        let mut data = Array2::<u16>::zeros((3, 3));
        data[[0, 2]] = 9;
        data[[2, 0]] = 9;
        assert_eq!(brightest_pixel(&data.view()), Some(((0, 2), 9)));
        assert_eq!(brightest_pixel(&Array2::<u16>::zeros((0, 0)).view()), None);
    }

    #[test]
    fn test_fit_lock_is_released() {
        let lock = new_fit_lock();
        let fitter = GaussianFitter::new(5.0, lock.clone());
        let frame = spots(200, 200, 5.0, 200.0, &[(100.0, 50.0), (100.0, 150.0)]);

        fitter.do_fit(&frame).unwrap();
        assert!(lock.try_lock().is_some());
    }
}
