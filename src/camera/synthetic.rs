//! Synthetic two-spot camera.
//!
//! Renders the image a well-aligned focus lock would produce: two gaussian
//! laser spots on a black background, on the middle row of the AOI and
//! symmetric about the centre column. No hardware is touched.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;
use tracing::{debug, info};

use super::Camera;
use crate::config::CameraConfig;
use crate::error::{AppResult, QpdError};
use crate::frame::{Aoi, Frame};

/// Camera returning two rendered gaussian spots
pub struct SyntheticCamera {
    aoi: Aoi,
    timeout: Duration,
    frame_period: Duration,
    spot_separation: Option<f64>,
    spot_sigma: f64,
    spot_peak: u16,
    noise: u16,
    frame_count: u64,
    rng: StdRng,
    shut_down: bool,
}

impl SyntheticCamera {
    /// Create a noiseless camera with `sigma`-wide spots of height 200.
    pub fn new(width: usize, height: usize, sigma: f64) -> Self {
        Self {
            aoi: Aoi {
                x: 0,
                y: 0,
                width,
                height,
            },
            timeout: Duration::from_millis(500),
            frame_period: Duration::ZERO,
            spot_separation: None,
            spot_sigma: sigma,
            spot_peak: 200,
            noise: 0,
            frame_count: 0,
            rng: StdRng::from_entropy(),
            shut_down: false,
        }
    }

    /// Create a camera from configuration, capturing `aoi`.
    pub fn from_config(config: &CameraConfig, aoi: Aoi) -> Self {
        Self {
            aoi,
            timeout: config.timeout(),
            frame_period: Duration::from_millis(config.frame_period_ms),
            spot_separation: config.spot_separation,
            spot_sigma: config.spot_sigma,
            spot_peak: config.spot_peak,
            noise: config.noise,
            ..Self::new(aoi.width, aoi.height, config.spot_sigma)
        }
    }

    /// Place the spots `separation` pixels apart.
    pub fn with_separation(mut self, separation: f64) -> Self {
        self.spot_separation = Some(separation);
        self
    }

    /// Add up to `noise` counts of uniform noise to every pixel.
    pub fn with_noise(mut self, noise: u16) -> Self {
        self.noise = noise;
        self
    }

    /// Number of frames produced so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Column positions of the left and right spot centres.
    pub fn spot_columns(&self) -> (f64, f64) {
        let centre = 0.5 * self.aoi.width as f64;
        let half_sep = 0.5 * self.spot_separation.unwrap_or(centre);
        (centre - half_sep, centre + half_sep)
    }

    fn render(&mut self) -> Array2<u16> {
        let row0 = (self.aoi.height / 2) as f64;
        let (left, right) = self.spot_columns();
        let two_sigma_sq = 2.0 * self.spot_sigma * self.spot_sigma;
        let peak = f64::from(self.spot_peak);
        let noise = self.noise;
        let rng = &mut self.rng;

        Array2::from_shape_fn((self.aoi.height, self.aoi.width), |(r, c)| {
            let dr = r as f64 - row0;
            let spot = |c0: f64| {
                let dc = c as f64 - c0;
                peak * (-(dr * dr + dc * dc) / two_sigma_sq).exp()
            };
            let value = (spot(left) + spot(right)).round() as u16;
            if noise > 0 {
                value.saturating_add(rng.gen_range(0..=noise))
            } else {
                value
            }
        })
    }
}

impl Camera for SyntheticCamera {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn get_image(&mut self) -> AppResult<Frame> {
        if self.shut_down {
            return Err(QpdError::Camera(
                "synthetic camera used after shutdown".to_string(),
            ));
        }
        if !self.frame_period.is_zero() {
            std::thread::sleep(self.frame_period);
        }

        let pixels = self.render();
        self.frame_count += 1;
        Ok(Frame::new(self.frame_count, pixels))
    }

    fn aoi(&self) -> Aoi {
        self.aoi
    }

    fn set_aoi(&mut self, aoi: Aoi) -> AppResult<()> {
        if aoi.width == 0 || aoi.height == 0 {
            return Err(QpdError::Camera(format!(
                "empty AOI {}x{}",
                aoi.width, aoi.height
            )));
        }
        debug!(?aoi, "Synthetic camera AOI set");
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
        info!(frames = self.frame_count, "Synthetic camera shut down");
        self.shut_down = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spots_on_middle_row() {
        let mut camera = SyntheticCamera::new(200, 200, 5.0);
        let frame = camera.get_image().unwrap();

        assert_eq!((frame.height(), frame.width()), (200, 200));
        assert_eq!(frame.pixels[[100, 50]], 200);
        assert_eq!(frame.pixels[[100, 150]], 200);
        assert_eq!(frame.pixels[[10, 10]], 0);
        assert_eq!(frame.frame_number, 1);
    }

    #[test]
    fn test_custom_separation() {
        let camera = SyntheticCamera::new(200, 100, 5.0).with_separation(60.0);
        assert_eq!(camera.spot_columns(), (70.0, 130.0));
    }

    #[test]
    fn test_static_frames_are_identical_without_noise() {
        let mut camera = SyntheticCamera::new(64, 64, 3.0);
        let a = camera.get_image().unwrap();
        let b = camera.get_image().unwrap();
        assert_eq!(a.pixels, b.pixels);
        assert_eq!(camera.frame_count(), 2);
    }

    #[test]
    fn test_aoi_change_resizes_frames() {
        let mut camera = SyntheticCamera::new(64, 64, 3.0);
        camera
            .set_aoi(Aoi {
                x: 4,
                y: 8,
                width: 80,
                height: 40,
            })
            .unwrap();
        let frame = camera.get_image().unwrap();
        assert_eq!((frame.height(), frame.width()), (40, 80));
    }

    #[test]
    fn test_unusable_after_shutdown() {
        let mut camera = SyntheticCamera::new(32, 32, 3.0);
        camera.shutdown().unwrap();
        assert!(matches!(camera.get_image(), Err(QpdError::Camera(_))));
    }
}
