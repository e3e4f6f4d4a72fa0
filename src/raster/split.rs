use super::geotiff;
use super::{GeoRaster, PixelWindow, Pixels};
use crate::error::{EtlError, EtlResult};
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_SQUARE_SIZE: u32 = 25;

/// Copies `window` of a row-major image into a `size` x `size` buffer,
/// zero padding whatever falls outside the image.
fn padded<T: Copy + Default>(
    pixels: &[T],
    image_width: u32,
    window: &PixelWindow,
    size: u32,
    samples: usize,
) -> Vec<T> {
    let mut tile = vec![T::default(); size as usize * size as usize * samples];
    let row_len = window.width as usize * samples;
    for row in 0..window.height as usize {
        let src = ((window.row_off as usize + row) * image_width as usize
            + window.col_off as usize)
            * samples;
        let dst = row * size as usize * samples;
        tile[dst..dst + row_len].copy_from_slice(&pixels[src..src + row_len]);
    }
    tile
}

/// Splits an image into `square_size` squares named `<col>_<row>.tif`.
///
/// Squares along the right and bottom edges are padded with zeros to the full
/// size. Each square keeps the georeferencing of its place in the image.
pub fn split_into_tiles(image: &Path, out_dir: &Path, square_size: u32) -> EtlResult<Vec<PathBuf>> {
    if square_size == 0 {
        return Err(EtlError::Configuration("square size must be positive".to_string()));
    }
    let raster = geotiff::read(image)?;
    let grid = raster.grid;
    std::fs::create_dir_all(out_dir).map_err(|e| EtlError::raster(out_dir, e))?;

    let columns = grid.width.div_ceil(square_size);
    let rows = grid.height.div_ceil(square_size);
    let mut written = Vec::with_capacity(columns as usize * rows as usize);
    for i in 0..columns {
        for j in 0..rows {
            let window = PixelWindow {
                col_off: i * square_size,
                row_off: j * square_size,
                width: square_size.min(grid.width - i * square_size),
                height: square_size.min(grid.height - j * square_size),
            };
            let tile_grid = grid.window(&PixelWindow {
                width: square_size,
                height: square_size,
                ..window
            });
            let pixels = match &raster.pixels {
                Pixels::Gray16(p) => Pixels::Gray16(padded(p, grid.width, &window, square_size, 1)),
                Pixels::Rgb8(p) => Pixels::Rgb8(padded(p, grid.width, &window, square_size, 3)),
            };

            let path = out_dir.join(format!("{i}_{j}.tif"));
            geotiff::write(
                &path,
                &GeoRaster {
                    grid: tile_grid,
                    pixels,
                },
            )?;
            written.push(path);
        }
    }
    info!(image = %image.display(), tiles = written.len(), "Split image");
    Ok(written)
}
