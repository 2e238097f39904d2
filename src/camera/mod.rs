//! Camera capability used for QPD emulation.
//!
//! Hardware-agnostic interface for the focus-lock camera. Vendor SDK bindings
//! live outside this crate and only need to implement [`Camera`]; the crate
//! ships two implementations that need no hardware:
//!
//! - [`SyntheticCamera`] - renders two gaussian laser spots
//! - [`ReplayCamera`] - plays back a recorded sequence of frames
//!
//! ## Ownership
//!
//! The polling loop owns its camera exclusively while running, so the trait
//! takes `&mut self` and only requires `Send`. Calls block: `get_image` waits
//! up to [`Camera::timeout`] for a frame and fails with
//! [`QpdError::FrameTimeout`](crate::error::QpdError::FrameTimeout) otherwise.

pub mod replay;
pub mod synthetic;

pub use replay::ReplayCamera;
pub use synthetic::SyntheticCamera;

use std::time::Duration;

use crate::config::{CameraConfig, CameraKind};
use crate::error::AppResult;
use crate::frame::{Aoi, Frame};
use crate::offset_file::AoiOrigin;

/// Camera capability contract
pub trait Camera: Send {
    /// Short identifier used in log messages
    fn name(&self) -> &str;

    /// Wait for the next frame and return it.
    ///
    /// # Errors
    /// - `FrameTimeout` if no frame arrives within the configured timeout
    /// - `Camera` for any other device fault, including use after `shutdown`
    fn get_image(&mut self) -> AppResult<Frame>;

    /// Area of interest currently being captured
    fn aoi(&self) -> Aoi;

    /// Capture a different area of interest from the next frame on
    fn set_aoi(&mut self, aoi: Aoi) -> AppResult<()>;

    /// Frame acquisition timeout
    fn timeout(&self) -> Duration;

    /// Change the frame acquisition timeout
    fn set_timeout(&mut self, timeout: Duration);

    /// Release the device. The camera is unusable afterwards.
    fn shutdown(&mut self) -> AppResult<()>;
}

/// Build the camera selected in configuration, positioned at `origin`.
pub fn build_camera(config: &CameraConfig, origin: AoiOrigin) -> Box<dyn Camera> {
    let aoi = Aoi::new(origin, config.aoi_width, config.aoi_height);
    match config.kind {
        CameraKind::Synthetic => Box::new(SyntheticCamera::from_config(config, aoi)),
    }
}
