//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use ndarray::Array2;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use qpd_lock::camera::{Camera, SyntheticCamera};
use qpd_lock::config::QpdConfig;
use qpd_lock::fit::{new_fit_lock, GaussianFitter};
use qpd_lock::frame::{Aoi, Frame};
use qpd_lock::scan::{QpdScanner, ScanSettings};
use qpd_lock::AppResult;

/// Frame with gaussian spots of height `peak` at `(row, col)` centres.
pub fn spot_frame(
    frame_number: u64,
    shape: (usize, usize),
    sigma: f64,
    peak: f64,
    centres: &[(f64, f64)],
) -> Frame {
    let two_sigma_sq = 2.0 * sigma * sigma;
    let pixels = Array2::from_shape_fn(shape, |(r, c)| {
        let value: f64 = centres
            .iter()
            .map(|&(r0, c0)| {
                let dr = r as f64 - r0;
                let dc = c as f64 - c0;
                peak * (-(dr * dr + dc * dc) / two_sigma_sq).exp()
            })
            .sum();
        value.round() as u16
    });
    Frame::new(frame_number, pixels)
}

/// Scan settings of the reference scenario: sigma 5, no background,
/// zero distance 100, 4 reps, single fits allowed.
pub fn reference_settings() -> ScanSettings {
    ScanSettings {
        sigma: 5.0,
        background: 0.0,
        zero_dist: 100.0,
        allow_single_fits: true,
        reject_duplicate_frames: false,
        reps: 4,
        units_to_microns: 1.0,
    }
}

/// Gaussian-fitting scanner around `camera`.
pub fn gaussian_scanner(camera: Box<dyn Camera>, settings: ScanSettings) -> QpdScanner {
    let lock = new_fit_lock();
    let fitter = Box::new(GaussianFitter::new(settings.sigma, lock.clone()));
    QpdScanner::new(camera, fitter, lock, settings)
}

/// Configuration for a 200x200 synthetic camera with its offset file at
/// `offset_file`.
pub fn config_toml(offset_file: &Path) -> String {
    format!(
        r#"
        offset_file = "{}"

        [camera]
        aoi_width = 200
        aoi_height = 200
        sensor_width = 640
        sensor_height = 480
        frame_period_ms = 2
        noise = 3

        [fit]
        sigma = 5.0
        background = 0.0
        zero_dist = 100.0

        [scan]
        reps = 2
        units_to_microns = 0.1
        "#,
        offset_file.display()
    )
}

/// Write an offset file and load the matching configuration.
pub fn load_config(dir: &Path, origin: &str) -> QpdConfig {
    let offset_file = dir.join("qpd_offset.txt");
    std::fs::write(&offset_file, origin).unwrap();
    QpdConfig::from_toml_str(&config_toml(&offset_file)).unwrap()
}

/// Camera wrapper counting frames delivered, shared with the test.
pub struct CountingCamera {
    inner: SyntheticCamera,
    frames: Arc<AtomicU64>,
}

impl CountingCamera {
    pub fn new(inner: SyntheticCamera) -> (Self, Arc<AtomicU64>) {
        let frames = Arc::new(AtomicU64::new(0));
        (
            Self {
                inner,
                frames: Arc::clone(&frames),
            },
            frames,
        )
    }
}

impl Camera for CountingCamera {
    fn name(&self) -> &str {
        "counting"
    }

    fn get_image(&mut self) -> AppResult<Frame> {
        let frame = self.inner.get_image()?;
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(frame)
    }

    fn aoi(&self) -> Aoi {
        self.inner.aoi()
    }

    fn set_aoi(&mut self, aoi: Aoi) -> AppResult<()> {
        self.inner.set_aoi(aoi)
    }

    fn timeout(&self) -> Duration {
        self.inner.timeout()
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.inner.set_timeout(timeout)
    }

    fn shutdown(&mut self) -> AppResult<()> {
        self.inner.shutdown()
    }
}
