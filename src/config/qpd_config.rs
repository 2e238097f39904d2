//! QPD Configuration using Figment
//!
//! This module provides strongly-typed configuration loading for the QPD pipeline.
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. Environment variables (prefixed with `QPD_`, `__` separated)
//!
//! After extraction the configuration is validated; any failure is fatal at startup.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppResult, QpdError};
use crate::fit::FitMode;

/// Top-level QPD configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QpdConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Camera and AOI geometry
    pub camera: CameraConfig,
    /// Spot fitting parameters
    pub fit: FitConfig,
    /// Polling loop parameters
    pub scan: ScanConfig,
    /// File holding the persisted AOI origin as `x,y`
    pub offset_file: PathBuf,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

/// Camera implementations that can be selected from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraKind {
    /// Two rendered gaussian spots, no hardware required
    #[default]
    Synthetic,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Which camera implementation to build
    #[serde(default)]
    pub kind: CameraKind,
    /// AOI width in pixels
    pub aoi_width: usize,
    /// AOI height in pixels
    pub aoi_height: usize,
    /// Full sensor width, used to clamp AOI moves
    #[serde(default = "default_sensor_width")]
    pub sensor_width: usize,
    /// Full sensor height, used to clamp AOI moves
    #[serde(default = "default_sensor_height")]
    pub sensor_height: usize,
    /// Frame acquisition timeout in seconds
    #[serde(default = "default_timeout_s")]
    pub timeout_s: f64,
    /// Synthetic camera: simulated readout time per frame in milliseconds
    #[serde(default)]
    pub frame_period_ms: u64,
    /// Synthetic camera: spot-to-spot distance in pixels (default: half the AOI width)
    #[serde(default)]
    pub spot_separation: Option<f64>,
    /// Synthetic camera: gaussian width of the rendered spots
    #[serde(default = "default_spot_sigma")]
    pub spot_sigma: f64,
    /// Synthetic camera: peak intensity of the rendered spots
    #[serde(default = "default_spot_peak")]
    pub spot_peak: u16,
    /// Synthetic camera: maximum additive noise in counts (0 = static frames)
    #[serde(default)]
    pub noise: u16,
}

impl CameraConfig {
    /// Acquisition timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_s)
    }
}

/// Spot fitting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Initial fit strategy
    #[serde(default)]
    pub mode: FitMode,
    /// Gaussian width of the laser spots in pixels
    pub sigma: f64,
    /// Background level subtracted from the frame sum
    pub background: f64,
    /// Expected spot separation at perfect focus
    pub zero_dist: f64,
    /// Trust samples where only one spot could be fit
    #[serde(default)]
    pub allow_single_fits: bool,
    /// Treat frames with an unchanged power as stuck
    #[serde(default = "default_reject_duplicates")]
    pub reject_duplicate_frames: bool,
}

/// Polling loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Single scans aggregated per published update
    pub reps: usize,
    /// Conversion from pixel offset to microns
    pub units_to_microns: f64,
    /// Capacity of the update broadcast channel
    #[serde(default = "default_update_capacity")]
    pub update_capacity: usize,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "qpd_lock".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sensor_width() -> usize {
    1440
}

fn default_sensor_height() -> usize {
    1080
}

fn default_timeout_s() -> f64 {
    0.5
}

fn default_spot_sigma() -> f64 {
    5.0
}

fn default_spot_peak() -> u16 {
    200
}

fn default_reject_duplicates() -> bool {
    true
}

fn default_update_capacity() -> usize {
    16
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl QpdConfig {
    /// Load configuration from `config/qpd.toml` and environment variables.
    pub fn load() -> AppResult<Self> {
        Self::load_from("config/qpd.toml")
    }

    /// Load configuration from a specific file path
    ///
    /// Environment variables (`QPD_` prefix) take precedence over the file.
    ///
    /// # Errors
    ///
    /// Returns `QpdError::Config` if the sources cannot be extracted and
    /// `QpdError::Configuration` if validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed("QPD_").split("__")),
        )
    }

    /// Parse configuration from a TOML string, without environment overrides.
    pub fn from_toml_str(toml: &str) -> AppResult<Self> {
        Self::from_figment(Figment::new().merge(Toml::string(toml)))
    }

    fn from_figment(figment: Figment) -> AppResult<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - `sigma`, `timeout_s` and `update_capacity` are positive
    /// - `reps` is at least 1
    /// - The AOI is at least 2x2 and fits on the sensor
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(QpdError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if !(self.fit.sigma > 0.0) {
            return Err(QpdError::Configuration(format!(
                "Invalid sigma {}. Must be > 0",
                self.fit.sigma
            )));
        }

        if self.scan.reps == 0 {
            return Err(QpdError::Configuration(
                "Invalid reps 0. Must be > 0".to_string(),
            ));
        }

        if self.scan.update_capacity == 0 {
            return Err(QpdError::Configuration(
                "Invalid update_capacity 0. Must be > 0".to_string(),
            ));
        }

        let camera = &self.camera;
        if !(camera.timeout_s > 0.0) || !camera.timeout_s.is_finite() {
            return Err(QpdError::Configuration(format!(
                "Invalid camera timeout_s {}. Must be > 0",
                camera.timeout_s
            )));
        }

        if camera.aoi_width < 2 || camera.aoi_height < 2 {
            return Err(QpdError::Configuration(format!(
                "Invalid AOI {}x{}. Must be at least 2x2",
                camera.aoi_width, camera.aoi_height
            )));
        }

        if camera.aoi_width > camera.sensor_width || camera.aoi_height > camera.sensor_height {
            return Err(QpdError::Configuration(format!(
                "AOI {}x{} does not fit on the {}x{} sensor",
                camera.aoi_width, camera.aoi_height, camera.sensor_width, camera.sensor_height
            )));
        }

        if !(camera.spot_sigma > 0.0) {
            return Err(QpdError::Configuration(format!(
                "Invalid camera spot_sigma {}. Must be > 0",
                camera.spot_sigma
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
        offset_file = "qpd_offset.txt"

        [application]
        log_level = "debug"

        [camera]
        aoi_width = 200
        aoi_height = 200

        [fit]
        mode = "moments"
        sigma = 5.0
        background = 10.0
        zero_dist = 100.0
        allow_single_fits = true

        [scan]
        reps = 4
        units_to_microns = 0.05
    "#;

    #[test]
    fn test_config_valid_with_defaults() {
        let config = QpdConfig::from_toml_str(VALID).unwrap();

        assert_eq!(config.application.name, "qpd_lock");
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.camera.kind, CameraKind::Synthetic);
        assert_eq!(config.camera.sensor_width, 1440);
        assert_eq!(config.camera.timeout(), Duration::from_millis(500));
        assert_eq!(config.fit.mode, FitMode::Moments);
        assert!(config.fit.allow_single_fits);
        assert!(config.fit.reject_duplicate_frames);
        assert_eq!(config.scan.reps, 4);
        assert_eq!(config.scan.update_capacity, 16);
        assert_eq!(config.offset_file, PathBuf::from("qpd_offset.txt"));
    }

    #[test]
    fn test_missing_required_setting() {
        let without_sigma = VALID.replace("sigma = 5.0", "");
        let err = QpdConfig::from_toml_str(&without_sigma).unwrap_err();
        assert!(matches!(err, QpdError::Config(_)));
        assert!(err.to_string().contains("sigma"));
    }

    #[test]
    fn test_invalid_log_level() {
        let config = VALID.replace("log_level = \"debug\"", "log_level = \"chatty\"");
        let err = QpdConfig::from_toml_str(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid log_level"));
    }

    #[test]
    fn test_zero_reps_rejected() {
        let config = VALID.replace("reps = 4", "reps = 0");
        let err = QpdConfig::from_toml_str(&config).unwrap_err();
        assert!(matches!(err, QpdError::Configuration(_)));
        assert!(err.to_string().contains("reps"));
    }

    #[test]
    fn test_non_positive_sigma_rejected() {
        let config = VALID.replace("sigma = 5.0", "sigma = 0.0");
        let err = QpdConfig::from_toml_str(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid sigma"));
    }

    #[test]
    fn test_aoi_larger_than_sensor() {
        let config = VALID.replace(
            "aoi_height = 200",
            "aoi_height = 200\n        sensor_width = 100",
        );
        let err = QpdConfig::from_toml_str(&config).unwrap_err();
        assert!(err.to_string().contains("does not fit"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qpd.toml");
        std::fs::write(&path, VALID).unwrap();

        let config = QpdConfig::load_from(&path).unwrap();
        assert_eq!(config.fit.zero_dist, 100.0);
    }
}
