use super::geotiff;
use super::{GeoRaster, GeoTransform, Grid, NODATA};
use crate::error::{EtlError, EtlResult};
use crate::footprint::{pixel_dimensions, AreaOfInterest};
use crate::projection::{utm_epsg_for, Projector, EPSG_WGS84};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Grid covering the AOI bounding box in `epsg`, at about `resolution` units
/// per pixel and never more than the per-axis pixel limit.
pub fn target_grid(aoi: &AreaOfInterest, epsg: u16, resolution: f64) -> anyhow::Result<Grid> {
    let bbox = Projector::new(EPSG_WGS84, epsg)?.rect(&aoi.bounding_box()?)?;
    let (width, height) = pixel_dimensions(&bbox, resolution);
    Ok(Grid {
        width,
        height,
        transform: GeoTransform {
            origin_x: bbox.min().x,
            origin_y: bbox.max().y,
            pixel_width: bbox.width() / width as f64,
            pixel_height: bbox.height() / height as f64,
        },
        epsg,
    })
}

/// Grid shared by every band of one AOI: the UTM zone of the AOI centre.
pub fn aoi_grid(aoi: &AreaOfInterest, resolution: f64) -> anyhow::Result<Grid> {
    let center = aoi.bounding_box()?.center();
    target_grid(aoi, utm_epsg_for(center.x, center.y), resolution)
}

/// Mosaics the cropped rasters of one band onto `grid`.
///
/// Crops are taken in order and the first one holding data at a pixel wins,
/// so earlier (better ranked) products are never painted over. Crops in
/// another CRS are sampled at the reprojected pixel centres. Returns
/// `Ok(None)` when there is nothing to merge.
pub fn merge_band(crops: &[PathBuf], grid: &Grid, destination: &Path) -> EtlResult<Option<GeoRaster>> {
    if crops.is_empty() {
        return Ok(None);
    }
    let sources = crops
        .iter()
        .map(geotiff::read)
        .collect::<EtlResult<Vec<_>>>()?;
    let grid = *grid;
    let epsg = grid.epsg;
    debug!(
        width = grid.width,
        height = grid.height,
        epsg,
        sources = sources.len(),
        "Merging band"
    );

    let mut projectors = HashMap::new();
    for source in sources.iter().filter(|s| s.grid.epsg != epsg) {
        if !projectors.contains_key(&source.grid.epsg) {
            let projector = Projector::new(epsg, source.grid.epsg)
                .map_err(|e| EtlError::raster(destination, e))?;
            projectors.insert(source.grid.epsg, projector);
        }
    }

    let mut band = vec![NODATA; grid.pixel_count()];
    for row in 0..grid.height {
        for col in 0..grid.width {
            let (x, y) = grid.transform.pixel_center(col, row);
            let index = row as usize * grid.width as usize + col as usize;
            for source in sources.iter() {
                let (sx, sy) = match projectors.get(&source.grid.epsg) {
                    Some(projector) => match projector.point(x, y) {
                        Ok(point) => point,
                        Err(_) => continue,
                    },
                    None => (x, y),
                };
                match source.sample(sx, sy) {
                    Some(value) if value != NODATA => {
                        band[index] = value;
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    let merged = GeoRaster::gray(grid, band);
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EtlError::raster(destination, e))?;
    }
    geotiff::write(destination, &merged)?;
    Ok(Some(merged))
}
