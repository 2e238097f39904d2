//! Camera-based quadrant photodiode emulation for a microscope focus lock.
//!
//! A focus-lock camera images two reflections of an IR laser. Their
//! horizontal separation changes with the distance between objective and
//! coverslip, so tracking it gives a focus-offset signal for a feedback loop.
//! This crate turns camera frames into that signal:
//!
//! ```text
//! Camera -> SpotFitter -> QpdScanner (single scan, aggregate) -> ScanThread -> QpdUpdate
//! ```
//!
//! - [`camera`]: the camera capability plus hardware-free implementations
//! - [`fit`]: gaussian-peak and intensity-moment spot localisation
//! - [`scan`]: sample weighting, aggregation and the background polling loop
//! - [`qpd`]: the control surface used by the lock controller
//! - [`config`], [`offset_file`], [`tracing_init`]: startup plumbing

pub mod camera;
pub mod config;
pub mod error;
pub mod fit;
pub mod frame;
pub mod offset_file;
pub mod qpd;
pub mod scan;
pub mod tracing_init;

pub use error::{AppResult, QpdError};
