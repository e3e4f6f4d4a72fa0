use super::geotiff;
use super::{GeoRaster, Pixels, NODATA};
use crate::error::{EtlError, EtlResult};
use std::path::Path;

const LOW_PERCENTILE: f64 = 0.02;
const HIGH_PERCENTILE: f64 = 0.98;

/// Contrast stretch of one band onto `1..=255`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Stretch {
    low: u16,
    high: u16,
}

impl Stretch {
    fn from_band(band: &[u16]) -> Self {
        let mut valid = band.iter().copied().filter(|v| *v != NODATA).collect::<Vec<_>>();
        if valid.is_empty() {
            return Self { low: 0, high: 0 };
        }
        valid.sort_unstable();
        let at = |q: f64| valid[((valid.len() - 1) as f64 * q).round() as usize];
        Self {
            low: at(LOW_PERCENTILE),
            high: at(HIGH_PERCENTILE),
        }
    }

    fn apply(&self, value: u16) -> u8 {
        if self.high <= self.low {
            return 255;
        }
        let scaled = (value.clamp(self.low, self.high) - self.low) as f64
            / (self.high - self.low) as f64;
        (1.0 + scaled * 254.0).round() as u8
    }
}

/// Builds an 8-bit RGB image from merged red, green and blue bands.
///
/// A pixel missing in any band is black in the composite; every other pixel
/// has all channels in `1..=255`.
pub fn true_color(red: &Path, green: &Path, blue: &Path, destination: &Path) -> EtlResult<GeoRaster> {
    let bands = [red, green, blue]
        .into_iter()
        .map(geotiff::read)
        .collect::<EtlResult<Vec<_>>>()?;
    let grid = bands[0].grid;
    if bands.iter().any(|b| b.grid != grid) {
        return Err(EtlError::raster(destination, "band grids do not match"));
    }
    let values = bands
        .iter()
        .map(|b| b.band().ok_or_else(|| EtlError::raster(destination, "expected single band inputs")))
        .collect::<EtlResult<Vec<_>>>()?;
    let stretches = values.iter().map(|v| Stretch::from_band(v)).collect::<Vec<_>>();

    let mut rgb = Vec::with_capacity(grid.pixel_count() * 3);
    for i in 0..grid.pixel_count() {
        if values.iter().any(|v| v[i] == NODATA) {
            rgb.extend_from_slice(&[0, 0, 0]);
        } else {
            rgb.extend(values.iter().zip(stretches.iter()).map(|(v, s)| s.apply(v[i])));
        }
    }

    let composite = GeoRaster {
        grid,
        pixels: Pixels::Rgb8(rgb),
    };
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EtlError::raster(destination, e))?;
    }
    geotiff::write(destination, &composite)?;
    Ok(composite)
}
