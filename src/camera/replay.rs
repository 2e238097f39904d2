//! Playback of recorded frames.
//!
//! `ReplayCamera` hands out a fixed sequence of frames in order. Once the
//! sequence is exhausted it behaves like a camera that stopped delivering:
//! it waits for its timeout and then fails with `FrameTimeout`.

use std::collections::VecDeque;
use std::time::Duration;
use tracing::warn;

use super::Camera;
use crate::error::{AppResult, QpdError};
use crate::frame::{Aoi, Frame};

/// Camera returning pre-recorded frames
pub struct ReplayCamera {
    frames: VecDeque<Frame>,
    cycle: bool,
    aoi: Aoi,
    timeout: Duration,
    delivered: u64,
}

impl ReplayCamera {
    /// Replay `frames` once, in order.
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        let frames: VecDeque<Frame> = frames.into_iter().collect();
        let (width, height) = frames
            .front()
            .map(|f| (f.width(), f.height()))
            .unwrap_or_default();
        Self {
            frames,
            cycle: false,
            aoi: Aoi {
                x: 0,
                y: 0,
                width,
                height,
            },
            timeout: Duration::from_millis(500),
            delivered: 0,
        }
    }

    /// Start over from the first frame when the sequence runs out.
    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Use `timeout` when waiting for frames that never come.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Frames still queued for playback
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// Frames handed out so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

impl Camera for ReplayCamera {
    fn name(&self) -> &str {
        "replay"
    }

    fn get_image(&mut self) -> AppResult<Frame> {
        match self.frames.pop_front() {
            Some(frame) => {
                if self.cycle {
                    self.frames.push_back(frame.clone());
                }
                self.delivered += 1;
                Ok(frame)
            }
            None => {
                std::thread::sleep(self.timeout);
                warn!(delivered = self.delivered, "Replay camera out of frames");
                Err(QpdError::FrameTimeout {
                    timeout: self.timeout,
                })
            }
        }
    }

    fn aoi(&self) -> Aoi {
        self.aoi
    }

    fn set_aoi(&mut self, aoi: Aoi) -> AppResult<()> {
        self.aoi = aoi;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    fn shutdown(&mut self) -> AppResult<()> {
        self.frames.clear();
        Ok(())
    }
}
