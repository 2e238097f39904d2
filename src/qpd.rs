//! Camera-based QPD: the control surface seen by the focus-lock controller.
//!
//! [`CameraQpd`] wires a camera, a spot fitter and the polling loop together
//! and exposes the operations the lock controller needs:
//!
//! - loop control: `start_scan`, `stop_scan`, `is_running`, `get_offset`
//! - alignment: `adjust_aoi`, `adjust_zero_dist`, `change_fit_mode`
//! - output: `subscribe` for the stream of [`QpdUpdate`]s
//!
//! Collaborators are injected through [`CameraQpd::new`]; [`CameraQpd::from_config`]
//! resolves them once from configuration.
//!
//! # Example
//!
//! ```no_run
//! use qpd_lock::config::QpdConfig;
//! use qpd_lock::qpd::CameraQpd;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = QpdConfig::load_from("config/qpd.toml")?;
//! let qpd = CameraQpd::from_config(&config)?;
//! let mut updates = qpd.subscribe();
//!
//! qpd.start_scan()?;
//! let update = updates.recv().await?;
//! println!("offset {:.3} um (good: {})", update.offset, update.is_good);
//!
//! qpd.shutdown()?;
//! # Ok(())
//! # }
//! ```

use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::camera::build_camera;
use crate::config::QpdConfig;
use crate::error::AppResult;
use crate::fit::{build_fitter, new_fit_lock, FitMode};
use crate::frame::Aoi;
use crate::offset_file::{read_offset_file, write_offset_file};
use crate::scan::{QpdScanner, ScanSettings, ScanThread};

pub use crate::scan::QpdUpdate;

/// Sensor dimensions in pixels, used to keep AOI moves on the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSize {
    pub width: usize,
    pub height: usize,
}

/// Camera-based quadrant photodiode emulation
pub struct CameraQpd {
    scanner: Arc<Mutex<QpdScanner>>,
    thread: ScanThread,
    offset_file: PathBuf,
    sensor: SensorSize,
}

impl CameraQpd {
    /// Build the QPD described by `config`.
    ///
    /// Reads the persisted AOI origin from `config.offset_file`.
    ///
    /// # Errors
    ///
    /// `OffsetFile` if the offset file is missing or malformed.
    pub fn from_config(config: &QpdConfig) -> AppResult<Self> {
        let origin = read_offset_file(&config.offset_file)?;
        let camera = build_camera(&config.camera, origin);
        let fit_lock = new_fit_lock();
        let fitter = build_fitter(config.fit.mode, config.fit.sigma, Arc::clone(&fit_lock));
        info!(
            camera = camera.name(),
            fit_mode = ?config.fit.mode,
            x = origin.x,
            y = origin.y,
            "QPD configured"
        );

        let scanner = QpdScanner::new(camera, fitter, fit_lock, ScanSettings::from_config(config));
        Ok(Self::new(
            scanner,
            config.offset_file.clone(),
            SensorSize {
                width: config.camera.sensor_width,
                height: config.camera.sensor_height,
            },
            config.scan.update_capacity,
        ))
    }

    /// Assemble a QPD from an already built scanner.
    pub fn new(
        scanner: QpdScanner,
        offset_file: PathBuf,
        sensor: SensorSize,
        update_capacity: usize,
    ) -> Self {
        let scanner = Arc::new(Mutex::new(scanner));
        Self {
            thread: ScanThread::new(Arc::clone(&scanner), update_capacity),
            scanner,
            offset_file,
            sensor,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QpdUpdate> {
        self.thread.subscribe()
    }

    pub fn start_scan(&self) -> AppResult<()> {
        self.thread.start_scan()
    }

    /// Stop the loop; see [`ScanThread::stop_scan`].
    pub fn stop_scan(&self) -> AppResult<()> {
        self.thread.stop_scan()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    /// Request a measurement. Starts the loop if it is not running; the
    /// result arrives on the update channel.
    pub fn get_offset(&self) -> AppResult<()> {
        if !self.is_running() {
            self.start_scan()?;
        }
        Ok(())
    }

    /// Move the AOI by `(dx, dy)` pixels, clamped to the sensor.
    ///
    /// Takes effect from the next frame. Returns the AOI now in use.
    pub fn adjust_aoi(&self, dx: i64, dy: i64) -> AppResult<Aoi> {
        let mut scanner = self.scanner.lock();
        let camera = scanner.camera_mut();
        let aoi = camera
            .aoi()
            .shifted(dx, dy, self.sensor.width, self.sensor.height);
        camera.set_aoi(aoi)?;
        info!(x = aoi.x, y = aoi.y, "AOI moved");
        Ok(aoi)
    }

    /// Shift the zero distance by `inc`, returning the new value.
    pub fn adjust_zero_dist(&self, inc: f64) -> f64 {
        let zero_dist = self.scanner.lock().adjust_zero_dist(inc);
        info!(zero_dist, "Zero distance adjusted");
        zero_dist
    }

    /// Switch fit strategy; `mode` uses the integer codes of
    /// [`FitMode::from_code`].
    pub fn change_fit_mode(&self, mode: i32) -> FitMode {
        self.set_fit_mode(FitMode::from_code(mode))
    }

    /// Switch fit strategy for every following sample.
    pub fn set_fit_mode(&self, mode: FitMode) -> FitMode {
        self.scanner.lock().set_fit_mode(mode);
        info!(?mode, "Fit mode changed");
        mode
    }

    pub fn zero_dist(&self) -> f64 {
        self.scanner.lock().zero_dist()
    }

    pub fn fit_mode(&self) -> FitMode {
        self.scanner.lock().fit_mode()
    }

    pub fn aoi(&self) -> Aoi {
        self.scanner.lock().camera().aoi()
    }

    pub fn offset_file(&self) -> &Path {
        &self.offset_file
    }

    /// Stop the loop, persist the AOI origin and release the camera.
    ///
    /// The origin is written even if the loop had died; that loop error is
    /// returned after the camera is shut down.
    pub fn shutdown(self) -> AppResult<()> {
        let stopped = self.thread.stop_scan();
        if let Err(e) = &stopped {
            warn!(error = %e, "Scan loop had failed before shutdown");
        }

        let mut scanner = self.scanner.lock();
        let origin = scanner.camera().aoi().origin();
        write_offset_file(&self.offset_file, origin)?;
        scanner.camera_mut().shutdown()?;
        info!(x = origin.x, y = origin.y, "QPD shut down, AOI origin saved");
        stopped
    }
}
