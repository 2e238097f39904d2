//! Persisted AOI origin.
//!
//! The focus-lock camera AOI is moved by hand (`adjust_aoi`) until both laser
//! spots sit inside it. The resulting origin is stored as a single line
//! `x_start,y_start` and read back at startup.

use std::fs;
use std::path::Path;

use crate::error::{AppResult, QpdError};

/// Top-left corner of the AOI on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AoiOrigin {
    pub x: usize,
    pub y: usize,
}

/// Read the AOI origin from `path`.
///
/// Only the first line is used; anything after the second comma-separated
/// field is ignored.
pub fn read_offset_file(path: &Path) -> AppResult<AoiOrigin> {
    let contents = fs::read_to_string(path).map_err(|e| QpdError::OffsetFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    parse_origin(contents.lines().next().unwrap_or_default()).map_err(|reason| {
        QpdError::OffsetFile {
            path: path.to_path_buf(),
            reason,
        }
    })
}

/// Write the AOI origin to `path` as `x,y`.
pub fn write_offset_file(path: &Path, origin: AoiOrigin) -> AppResult<()> {
    fs::write(path, format!("{},{}", origin.x, origin.y)).map_err(|e| QpdError::OffsetFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn parse_origin(line: &str) -> Result<AoiOrigin, String> {
    let mut fields = line.split(',').map(str::trim);
    let mut next = |name: &str| -> Result<usize, String> {
        let field = fields
            .next()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| format!("expected 'x,y', missing {name}"))?;
        field
            .parse()
            .map_err(|e| format!("invalid {name} '{field}': {e}"))
    };
    let x = next("x")?;
    let y = next("y")?;
    Ok(AoiOrigin { x, y })
}
