//! QPD Configuration System
//!
//! This module provides configuration management for the focus-lock QPD using Figment.
//!
//! # Configuration Sources
//!
//! Configuration is loaded from (in order of precedence):
//! 1. Environment variables prefixed with `QPD_`
//! 2. TOML configuration file (default: `config/qpd.toml`)
//!
//! # Example
//!
//! ```no_run
//! use qpd_lock::config::QpdConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = QpdConfig::load_from("config/qpd.toml")?;
//!
//!     println!("Log level: {}", config.application.log_level);
//!     println!("Reps per scan: {}", config.scan.reps);
//!     Ok(())
//! }
//! ```
//!
//! # Environment Variables
//!
//! Any configuration value can be overridden via environment variables with the
//! `QPD_` prefix and the key path separated by double underscores, so that keys
//! containing a single underscore (`zero_dist`, `log_level`) stay intact:
//!
//! ```text
//! QPD_APPLICATION__LOG_LEVEL=debug
//! QPD_SCAN__REPS=8
//! QPD_FIT__ZERO_DIST=96.5
//! ```

pub mod qpd_config;

pub use qpd_config::{
    ApplicationConfig, CameraConfig, CameraKind, FitConfig, QpdConfig, ScanConfig,
};
