//! QPD scanning: turning camera frames into focus-offset measurements.
//!
//! [`QpdScanner`] owns the camera and the active [`SpotFitter`] and implements
//! the two synchronous stages of the pipeline:
//!
//! - **single scan**: one frame becomes one [`ScanSample`] (power, quality
//!   weight, offset), with duplicate-frame suppression and the single/double
//!   fit weighting policy applied
//! - **aggregate**: `reps` single scans become one [`AggregatedResult`]
//!
//! The background polling loop that drives the scanner lives in [`thread`].
//!
//! # Quality weights
//!
//! | spots found | weight | offset |
//! |---|---|---|
//! | 0 | 0.0 | 0.0 |
//! | 1, single fits allowed | 1.0 | `dist1 + dist2 - 0.5 * zero_dist` |
//! | 1, single fits not allowed | 0.0 | 0.0 |
//! | 2 | 2.0 | `2 * (dist1 + dist2 - zero_dist)` |
//!
//! A zero-weight offset is never a measurement.

pub mod thread;

pub use thread::ScanThread;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::camera::Camera;
use crate::config::QpdConfig;
use crate::error::{AppResult, QpdError};
use crate::fit::{build_fitter, FitIntermediate, FitLock, FitMode, SpotFitter};
use crate::frame::Frame;

/// Pause after a duplicate frame before giving up on the sample.
pub const DUPLICATE_PAUSE: Duration = Duration::from_millis(50);

/// Runtime parameters of the scanner
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    /// Expected spot width in pixels
    pub sigma: f64,
    /// Subtracted from the frame sum to give the power
    pub background: f64,
    /// Spot separation at perfect focus
    pub zero_dist: f64,
    /// Give single-spot samples a weight of 1 instead of 0
    pub allow_single_fits: bool,
    /// Treat a power identical to the previous one as a stuck frame
    pub reject_duplicate_frames: bool,
    /// Single scans per aggregation
    pub reps: usize,
    /// Pixel offset to micron conversion applied on publication
    pub units_to_microns: f64,
}

impl ScanSettings {
    pub fn from_config(config: &QpdConfig) -> Self {
        Self {
            sigma: config.fit.sigma,
            background: config.fit.background,
            zero_dist: config.fit.zero_dist,
            allow_single_fits: config.fit.allow_single_fits,
            reject_duplicate_frames: config.fit.reject_duplicate_frames,
            reps: config.scan.reps,
            units_to_microns: config.scan.units_to_microns,
        }
    }
}

/// Outcome of one single scan.
#[derive(Debug, Clone)]
pub struct ScanSample {
    /// Background-subtracted frame sum
    pub power: f64,
    /// 0.0, 1.0 or 2.0, see the module docs
    pub quality_weight: f64,
    /// Weighted offset in pixels; 0.0 whenever `quality_weight` is 0.0
    pub offset: f64,
    /// The fit behind this sample; all zero for a duplicate frame
    pub fit: FitIntermediate,
    /// True if the frame was rejected as a duplicate
    pub duplicate: bool,
    pub frame: Arc<Frame>,
}

/// Reduction of `reps` samples into one measurement.
#[derive(Debug, Clone)]
pub struct AggregatedResult {
    /// Mean power over all samples
    pub power: f64,
    /// Sum of the quality weights
    pub quality_total: f64,
    /// Sum of the weighted offsets, in pixels
    pub offset: f64,
    pub dist1: f64,
    pub dist2: f64,
    pub x_off1: f64,
    pub y_off1: f64,
    pub x_off2: f64,
    pub y_off2: f64,
    pub sigma: f64,
    /// Frame of the most recent sample
    pub frame: Arc<Frame>,
}

impl AggregatedResult {
    /// At least one sample carried a usable fit.
    pub fn is_good(&self) -> bool {
        self.quality_total > 0.0
    }
}

/// One published measurement, in consumer units.
#[derive(Debug, Clone, Serialize)]
pub struct QpdUpdate {
    pub is_good: bool,
    /// Focus offset in microns
    pub offset: f64,
    pub sigma: f64,
    /// Mean power
    pub sum: f64,
    pub x_off1: f64,
    pub y_off1: f64,
    pub x_off2: f64,
    pub y_off2: f64,
    pub quality_total: f64,
    pub frame_number: u64,
    pub timestamp: DateTime<Utc>,
    /// Most recent camera frame, for display
    #[serde(skip)]
    pub image: Arc<Frame>,
}

impl QpdUpdate {
    /// Convert `result` to consumer units.
    pub fn from_result(result: &AggregatedResult, units_to_microns: f64) -> Self {
        Self {
            is_good: result.is_good(),
            offset: result.offset * units_to_microns,
            sigma: result.sigma,
            sum: result.power,
            x_off1: result.x_off1,
            y_off1: result.y_off1,
            x_off2: result.x_off2,
            y_off2: result.y_off2,
            quality_total: result.quality_total,
            frame_number: result.frame.frame_number,
            timestamp: result.frame.timestamp,
            image: Arc::clone(&result.frame),
        }
    }
}

/// Weight and offset for one fit under the single/double fit policy.
pub fn weigh_fit(fit: &FitIntermediate, zero_dist: f64, allow_single_fits: bool) -> (f64, f64) {
    let separation = fit.dist1 + fit.dist2;
    match fit.total_good {
        2 => (2.0, 2.0 * (separation - zero_dist)),
        1 if allow_single_fits => (1.0, separation - 0.5 * zero_dist),
        _ => (0.0, 0.0),
    }
}

/// Single-scan evaluator and repeated-scan aggregator
pub struct QpdScanner {
    camera: Box<dyn Camera>,
    fitter: Box<dyn SpotFitter>,
    fit_lock: FitLock,
    settings: ScanSettings,
    last_power: Option<f64>,
}

impl QpdScanner {
    /// Scanner driving `camera` with `fitter`.
    ///
    /// `fit_lock` is handed to any fitter built later by
    /// [`set_fit_mode`](Self::set_fit_mode).
    pub fn new(
        camera: Box<dyn Camera>,
        fitter: Box<dyn SpotFitter>,
        fit_lock: FitLock,
        settings: ScanSettings,
    ) -> Self {
        Self {
            camera,
            fitter,
            fit_lock,
            settings,
            last_power: None,
        }
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    pub fn camera(&self) -> &dyn Camera {
        self.camera.as_ref()
    }

    pub fn camera_mut(&mut self) -> &mut dyn Camera {
        self.camera.as_mut()
    }

    pub fn fit_mode(&self) -> FitMode {
        self.fitter.mode()
    }

    /// Use `mode` for every following sample.
    pub fn set_fit_mode(&mut self, mode: FitMode) {
        if mode != self.fitter.mode() {
            self.fitter = build_fitter(mode, self.settings.sigma, Arc::clone(&self.fit_lock));
        }
    }

    pub fn zero_dist(&self) -> f64 {
        self.settings.zero_dist
    }

    /// Shift the zero distance by `inc`, returning the new value.
    pub fn adjust_zero_dist(&mut self, inc: f64) -> f64 {
        self.settings.zero_dist += inc;
        self.settings.zero_dist
    }

    /// Power of the last accepted frame, `None` before the first one.
    pub fn last_power(&self) -> Option<f64> {
        self.last_power
    }

    /// Acquire one frame and turn it into a sample.
    ///
    /// # Errors
    ///
    /// Camera failures and numerical fit failures propagate unchanged.
    pub fn single_scan(&mut self) -> AppResult<ScanSample> {
        let frame = Arc::new(self.camera.get_image()?);
        let power = frame.total_intensity() as f64 - self.settings.background;

        if self.settings.reject_duplicate_frames && self.last_power == Some(power) {
            warn!(
                frame_number = frame.frame_number,
                power, "Duplicate frame, no new information"
            );
            std::thread::sleep(DUPLICATE_PAUSE);
            return Ok(ScanSample {
                power,
                quality_weight: 0.0,
                offset: 0.0,
                fit: FitIntermediate::default(),
                duplicate: true,
                frame,
            });
        }
        self.last_power = Some(power);

        let fit = self.fitter.do_fit(&frame)?;
        if fit.total_good == 1 && !self.settings.allow_single_fits {
            warn!(
                frame_number = frame.frame_number,
                "Only one spot found and single fits are not allowed"
            );
        }
        let (quality_weight, offset) =
            weigh_fit(&fit, self.settings.zero_dist, self.settings.allow_single_fits);

        Ok(ScanSample {
            power,
            quality_weight,
            offset,
            fit,
            duplicate: false,
            frame,
        })
    }

    /// Run `reps` single scans and reduce them.
    ///
    /// # Errors
    ///
    /// `InvalidReps` if `reps` is 0; otherwise the first failing single scan
    /// ends the aggregation and its error is returned.
    pub fn aggregate(&mut self, reps: usize) -> AppResult<AggregatedResult> {
        if reps == 0 {
            return Err(QpdError::InvalidReps);
        }

        let mut power_sum = 0.0;
        let mut quality_total = 0.0;
        let mut offset = 0.0;
        let mut last = None;
        for _ in 0..reps {
            let sample = self.single_scan()?;
            power_sum += sample.power;
            quality_total += sample.quality_weight;
            offset += sample.offset;
            last = Some(sample);
        }
        let last = last.ok_or(QpdError::InvalidReps)?;

        let fit = if quality_total > 0.0 {
            last.fit
        } else {
            FitIntermediate::default()
        };
        let result = AggregatedResult {
            power: power_sum / reps as f64,
            quality_total,
            offset: if quality_total > 0.0 { offset } else { 0.0 },
            dist1: fit.dist1,
            dist2: fit.dist2,
            x_off1: fit.x_off1,
            y_off1: fit.y_off1,
            x_off2: fit.x_off2,
            y_off2: fit.y_off2,
            sigma: self.settings.sigma,
            frame: last.frame,
        };
        debug!(
            power = result.power,
            quality_total, offset = result.offset, "Aggregated {reps} scans"
        );
        Ok(result)
    }

    /// Aggregate the configured number of repetitions.
    pub fn scan(&mut self) -> AppResult<AggregatedResult> {
        self.aggregate(self.settings.reps)
    }
}
