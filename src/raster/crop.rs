use super::geotiff;
use super::{GeoRaster, Grid, PixelWindow, Pixels, NODATA};
use crate::error::{EtlError, EtlResult};
use crate::footprint::AreaOfInterest;
use crate::projection::{Projector, EPSG_WGS84};
use geo::{BoundingRect, Contains, MultiPolygon, Point};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Pixel window of the AOI on one raster grid, with the pixels inside the AOI.
#[derive(Debug, Clone, PartialEq)]
pub struct CropWindow {
    pub window: PixelWindow,
    /// Row-major over `window`; true where the pixel centre lies in the AOI.
    pub mask: Vec<bool>,
}

impl CropWindow {
    fn compute(aoi: &MultiPolygon<f64>, grid: &Grid) -> anyhow::Result<Option<Self>> {
        let projector = Projector::new(EPSG_WGS84, grid.epsg)?;
        let projected = projector.multi_polygon(aoi)?;
        let Some(bounds) = projected.bounding_rect() else {
            return Ok(None);
        };

        let t = &grid.transform;
        let (left, top) = t.world_to_pixel(bounds.min().x, bounds.max().y);
        let (right, bottom) = t.world_to_pixel(bounds.max().x, bounds.min().y);
        let clamp_col = |v: f64| v.clamp(0.0, grid.width as f64) as u32;
        let clamp_row = |v: f64| v.clamp(0.0, grid.height as f64) as u32;
        let (col_start, col_end) = (clamp_col(left.floor()), clamp_col(right.ceil()));
        let (row_start, row_end) = (clamp_row(top.floor()), clamp_row(bottom.ceil()));
        if col_start >= col_end || row_start >= row_end {
            return Ok(None);
        }

        let window = PixelWindow {
            col_off: col_start,
            row_off: row_start,
            width: col_end - col_start,
            height: row_end - row_start,
        };
        let mut mask = Vec::with_capacity(window.width as usize * window.height as usize);
        for row in row_start..row_end {
            for col in col_start..col_end {
                let (x, y) = t.pixel_center(col, row);
                mask.push(projected.contains(&Point::new(x, y)));
            }
        }
        if !mask.iter().any(|inside| *inside) {
            return Ok(None);
        }
        Ok(Some(Self { window, mask }))
    }
}

/// Crops rasters to an AOI.
///
/// The window computed for the first raster on a grid is reused for every
/// later raster on the same grid, so all bands of a product line up.
pub struct Cropper {
    aoi: MultiPolygon<f64>,
    windows: HashMap<[u64; 7], Option<CropWindow>>,
}

impl Cropper {
    pub fn new(aoi: &AreaOfInterest) -> Self {
        Self {
            aoi: aoi.geometry.clone(),
            windows: HashMap::new(),
        }
    }

    fn window_for(&mut self, grid: &Grid, source: &Path) -> EtlResult<Option<CropWindow>> {
        if let Some(window) = self.windows.get(&grid.key()) {
            return Ok(window.clone());
        }
        let window = CropWindow::compute(&self.aoi, grid).map_err(|e| EtlError::raster(source, e))?;
        self.windows.insert(grid.key(), window.clone());
        Ok(window)
    }

    pub fn cached_windows(&self) -> usize {
        self.windows.len()
    }

    /// Writes the part of `source` inside the AOI to `destination`.
    ///
    /// Returns `Ok(None)` without writing anything when the raster does not
    /// overlap the AOI.
    pub fn crop(&mut self, source: &Path, destination: &Path) -> EtlResult<Option<GeoRaster>> {
        let grid = geotiff::read_grid(source)?;
        let Some(crop) = self.window_for(&grid, source)? else {
            debug!(source = %source.display(), "Raster does not overlap the AOI");
            return Ok(None);
        };

        let mut raster = geotiff::read_window(source, &crop.window)?;
        let band = match &mut raster.pixels {
            Pixels::Gray16(band) => band,
            Pixels::Rgb8(_) => return Err(EtlError::raster(source, "expected a single band raster")),
        };
        for (value, inside) in band.iter_mut().zip(crop.mask.iter()) {
            if !inside {
                *value = NODATA;
            }
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| EtlError::raster(destination, e))?;
        }
        geotiff::write(destination, &raster)?;
        Ok(Some(raster))
    }
}
