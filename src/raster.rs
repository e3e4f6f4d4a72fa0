//! Georeferenced rasters and the processing steps applied to downloaded bands.
//!
//! Rasters are north-up grids: `origin` is the top left corner of the top left
//! pixel and rows run southwards. Band pixels are `u16` with 0 as nodata.

pub mod composite;
pub mod crop;
pub mod geotiff;
pub mod merge;
pub mod split;

pub use composite::true_color;
pub use crop::Cropper;
pub use merge::{aoi_grid, merge_band};
pub use split::split_into_tiles;

use geo::Rect;

/// Value of pixels outside the imaged or requested area.
pub const NODATA: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    /// Positive; rows go from north to south.
    pub pixel_height: f64,
}

impl GeoTransform {
    /// World coordinates of the centre of pixel `(col, row)`.
    pub fn pixel_center(&self, col: u32, row: u32) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.pixel_width,
            self.origin_y - (row as f64 + 0.5) * self.pixel_height,
        )
    }

    /// Fractional pixel position of a world coordinate.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.origin_x) / self.pixel_width,
            (self.origin_y - y) / self.pixel_height,
        )
    }

    /// Transform of a window whose top left pixel is `(col_off, row_off)`.
    pub fn shifted(&self, col_off: u32, row_off: u32) -> Self {
        Self {
            origin_x: self.origin_x + col_off as f64 * self.pixel_width,
            origin_y: self.origin_y - row_off as f64 * self.pixel_height,
            ..*self
        }
    }
}

/// Size, placement and CRS of a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub width: u32,
    pub height: u32,
    pub transform: GeoTransform,
    pub epsg: u16,
}

impl Grid {
    pub fn bounds(&self) -> Rect<f64> {
        let t = &self.transform;
        Rect::new(
            (t.origin_x, t.origin_y - self.height as f64 * t.pixel_height),
            (t.origin_x + self.width as f64 * t.pixel_width, t.origin_y),
        )
    }

    pub fn window(&self, window: &PixelWindow) -> Self {
        Self {
            width: window.width,
            height: window.height,
            transform: self.transform.shifted(window.col_off, window.row_off),
            epsg: self.epsg,
        }
    }

    pub fn full_window(&self) -> PixelWindow {
        PixelWindow {
            col_off: 0,
            row_off: 0,
            width: self.width,
            height: self.height,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Identity of the grid, used to share crop windows between bands.
    pub(crate) fn key(&self) -> [u64; 7] {
        let t = &self.transform;
        [
            self.width as u64,
            self.height as u64,
            self.epsg as u64,
            t.origin_x.to_bits(),
            t.origin_y.to_bits(),
            t.pixel_width.to_bits(),
            t.pixel_height.to_bits(),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_off: u32,
    pub row_off: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelWindow {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pixels {
    Gray16(Vec<u16>),
    Rgb8(Vec<u8>),
}

impl Pixels {
    pub fn samples_per_pixel(&self) -> usize {
        match self {
            Pixels::Gray16(_) => 1,
            Pixels::Rgb8(_) => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoRaster {
    pub grid: Grid,
    pub pixels: Pixels,
}

impl GeoRaster {
    pub fn gray(grid: Grid, pixels: Vec<u16>) -> Self {
        Self {
            grid,
            pixels: Pixels::Gray16(pixels),
        }
    }

    pub fn band(&self) -> Option<&[u16]> {
        match &self.pixels {
            Pixels::Gray16(p) => Some(p),
            Pixels::Rgb8(_) => None,
        }
    }

    /// Band value at a world coordinate, `None` outside the raster.
    pub fn sample(&self, x: f64, y: f64) -> Option<u16> {
        let band = self.band()?;
        let (col, row) = self.grid.transform.world_to_pixel(x, y);
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col.floor() as u64, row.floor() as u64);
        if col >= self.grid.width as u64 || row >= self.grid.height as u64 {
            return None;
        }
        band.get((row * self.grid.width as u64 + col) as usize).copied()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn utm_grid(width: u32, height: u32, origin: (f64, f64), pixel: f64) -> Grid {
        Grid {
            width,
            height,
            transform: GeoTransform {
                origin_x: origin.0,
                origin_y: origin.1,
                pixel_width: pixel,
                pixel_height: pixel,
            },
            epsg: 32634,
        }
    }

    #[test]
    fn test_pixel_centres_and_inverse() {
        let grid = utm_grid(10, 10, (500_000.0, 5_300_000.0), 10.0);
        let (x, y) = grid.transform.pixel_center(2, 3);
        assert_eq!((x, y), (500_025.0, 5_299_965.0));
        assert_eq!(grid.transform.world_to_pixel(x, y), (2.5, 3.5));
    }

    #[test]
    fn test_window_grid_and_bounds() {
        let grid = utm_grid(10, 20, (0.0, 200.0), 10.0);
        let bounds = grid.bounds();
        assert_eq!((bounds.min().x, bounds.min().y), (0.0, 0.0));
        assert_eq!((bounds.max().x, bounds.max().y), (100.0, 200.0));

        let window = grid.window(&PixelWindow {
            col_off: 2,
            row_off: 5,
            width: 3,
            height: 4,
        });
        assert_eq!(window.transform.origin_x, 20.0);
        assert_eq!(window.transform.origin_y, 150.0);
        assert_eq!(window.pixel_count(), 12);
    }

    #[test]
    fn test_sample() {
        let grid = utm_grid(2, 2, (0.0, 20.0), 10.0);
        let raster = GeoRaster::gray(grid, vec![1, 2, 3, 4]);
        assert_eq!(raster.sample(15.0, 15.0), Some(2));
        assert_eq!(raster.sample(5.0, 5.0), Some(3));
        assert_eq!(raster.sample(25.0, 5.0), None);
        assert_eq!(raster.sample(-1.0, 5.0), None);
    }
}
