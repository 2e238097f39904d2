//! Camera frames and the area of interest they are captured from.

use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};

use crate::offset_file::AoiOrigin;

/// Area of interest on the sensor, `(x, y, width, height)` in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aoi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Aoi {
    /// AOI of the given size at `origin`.
    pub fn new(origin: AoiOrigin, width: usize, height: usize) -> Self {
        Self {
            x: origin.x,
            y: origin.y,
            width,
            height,
        }
    }

    /// Top-left corner of the AOI.
    pub fn origin(&self) -> AoiOrigin {
        AoiOrigin {
            x: self.x,
            y: self.y,
        }
    }

    /// Move the origin by `(dx, dy)`, keeping the AOI plus a two pixel
    /// margin on the sensor.
    pub fn shifted(&self, dx: i64, dy: i64, sensor_width: usize, sensor_height: usize) -> Self {
        let clamp = |start: usize, delta: i64, extent: usize, sensor: usize| -> usize {
            let max_start = sensor.saturating_sub(extent + 2) as i64;
            (start as i64 + delta).min(max_start).max(0) as usize
        };
        Self {
            x: clamp(self.x, dx, self.width, sensor_width),
            y: clamp(self.y, dy, self.height, sensor_height),
            ..*self
        }
    }
}

/// One grayscale image from the camera.
///
/// Pixels are stored row-major; `pixels[[row, col]]`, rows run along the
/// vertical axis of the AOI.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Frame counter assigned by the camera
    pub frame_number: u64,
    /// Software timestamp at acquisition
    pub timestamp: DateTime<Utc>,
    /// Intensities
    pub pixels: Array2<u16>,
}

impl Frame {
    /// Wrap a pixel array, stamping it with the current time.
    pub fn new(frame_number: u64, pixels: Array2<u16>) -> Self {
        Self {
            frame_number,
            timestamp: Utc::now(),
            pixels,
        }
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    /// Sum of all pixel intensities.
    pub fn total_intensity(&self) -> u64 {
        self.pixels.iter().map(|&v| u64::from(v)).sum()
    }

    /// Borrowed view of the pixels.
    pub fn view(&self) -> ArrayView2<'_, u16> {
        self.pixels.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_intensity_does_not_overflow() {
        let frame = Frame::new(0, Array2::from_elem((300, 300), u16::MAX));
        assert_eq!(frame.total_intensity(), 300 * 300 * u64::from(u16::MAX));
        assert_eq!((frame.height(), frame.width()), (300, 300));
    }

    #[test]
    fn test_aoi_shift_clamps_to_sensor() {
        let aoi = Aoi {
            x: 10,
            y: 10,
            width: 200,
            height: 100,
        };

        let moved = aoi.shifted(5, -3, 1440, 1080);
        assert_eq!((moved.x, moved.y), (15, 7));

        let low = aoi.shifted(-50, -50, 1440, 1080);
        assert_eq!((low.x, low.y), (0, 0));

        let high = aoi.shifted(5000, 5000, 1440, 1080);
        assert_eq!((high.x, high.y), (1440 - 202, 1080 - 102));
        assert_eq!((high.width, high.height), (200, 100));
    }
}
