//! GeoTIFF reading and writing on top of the `tiff` crate.
//!
//! Only north-up rasters described by ModelPixelScale and ModelTiepoint are
//! supported, which covers the Sentinel-2 COGs and every file this crate writes.

use super::{GeoRaster, GeoTransform, Grid, PixelWindow, Pixels};
use crate::error::{EtlError, EtlResult};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::compression::Lzw;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::ColorType;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;
const GDAL_NODATA: u16 = 42113;

type TiffDecoder = Decoder<BufReader<File>>;

fn open(path: &Path) -> EtlResult<TiffDecoder> {
    let file = File::open(path).map_err(|e| EtlError::raster(path, e))?;
    Decoder::new(BufReader::new(file)).map_err(|e| EtlError::raster(path, e))
}

/// EPSG code from a GeoKeyDirectory, preferring the projected CRS key.
fn epsg_from_geokeys(keys: &[u16]) -> Option<u16> {
    let entries = keys.get(4..)?.chunks_exact(4);
    let mut geographic = None;
    for entry in entries {
        // Location 0 means the value is stored inline
        match (entry[0], entry[1]) {
            (PROJECTED_CS_TYPE, 0) => return Some(entry[3]),
            (GEOGRAPHIC_TYPE, 0) => geographic = Some(entry[3]),
            _ => {}
        }
    }
    geographic
}

fn geokeys_for(epsg: u16) -> Vec<u16> {
    let (model_type, crs_key) = if epsg == crate::projection::EPSG_WGS84 {
        (MODEL_TYPE_GEOGRAPHIC, GEOGRAPHIC_TYPE)
    } else {
        (MODEL_TYPE_PROJECTED, PROJECTED_CS_TYPE)
    };
    #[rustfmt::skip]
    let keys = vec![
        1, 1, 0, 3,
        GT_MODEL_TYPE, 0, 1, model_type,
        GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA,
        crs_key, 0, 1, epsg,
    ];
    keys
}

fn read_grid_from(path: &Path, decoder: &mut TiffDecoder) -> EtlResult<Grid> {
    let (width, height) = decoder.dimensions().map_err(|e| EtlError::raster(path, e))?;
    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|e| EtlError::raster(path, format!("missing pixel scale: {e}")))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|e| EtlError::raster(path, format!("missing tiepoint: {e}")))?;
    let geokeys = decoder
        .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
        .map_err(|e| EtlError::raster(path, format!("missing geokeys: {e}")))?;

    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(EtlError::raster(path, "malformed georeferencing tags"));
    }
    let epsg = epsg_from_geokeys(&geokeys).ok_or(EtlError::raster(path, "unknown CRS"))?;

    let (pixel_width, pixel_height) = (scale[0], scale[1]);
    let transform = GeoTransform {
        origin_x: tiepoint[3] - tiepoint[0] * pixel_width,
        origin_y: tiepoint[4] + tiepoint[1] * pixel_height,
        pixel_width,
        pixel_height,
    };
    Ok(Grid {
        width,
        height,
        transform,
        epsg,
    })
}

pub fn read_grid<P: AsRef<Path>>(path: P) -> EtlResult<Grid> {
    let path = path.as_ref();
    let mut decoder = open(path)?;
    read_grid_from(path, &mut decoder)
}

/// Copies the part of a decoded chunk that falls inside `window`.
fn copy_chunk<T: Copy>(
    dst: &mut [T],
    window: &PixelWindow,
    chunk: &[T],
    chunk_origin: (u32, u32),
    chunk_size: (u32, u32),
    tile_width: u32,
    samples: usize,
) {
    let (chunk_col, chunk_row) = chunk_origin;
    let (chunk_width, chunk_height) = chunk_size;
    // Edge tiles come back either clipped to the image or padded to full size
    let stride = if chunk.len() == chunk_width as usize * chunk_height as usize * samples {
        chunk_width as usize * samples
    } else {
        tile_width as usize * samples
    };

    let col_start = chunk_col.max(window.col_off);
    let col_end = (chunk_col + chunk_width).min(window.col_off + window.width);
    let row_start = chunk_row.max(window.row_off);
    let row_end = (chunk_row + chunk_height).min(window.row_off + window.height);
    if col_start >= col_end || row_start >= row_end {
        return;
    }
    let run = (col_end - col_start) as usize * samples;

    for row in row_start..row_end {
        let src = (row - chunk_row) as usize * stride + (col_start - chunk_col) as usize * samples;
        let dst_start = ((row - window.row_off) as usize * window.width as usize
            + (col_start - window.col_off) as usize)
            * samples;
        dst[dst_start..dst_start + run].copy_from_slice(&chunk[src..src + run]);
    }
}

enum Layout {
    Gray8,
    Gray16,
    Rgb8,
}

/// Reads `window` of a raster, decoding only the tiles or strips it touches.
pub fn read_window<P: AsRef<Path>>(path: P, window: &PixelWindow) -> EtlResult<GeoRaster> {
    let path = path.as_ref();
    let mut decoder = open(path)?;
    let grid = read_grid_from(path, &mut decoder)?;

    if window.col_off + window.width > grid.width || window.row_off + window.height > grid.height {
        return Err(EtlError::raster(path, "window exceeds raster bounds"));
    }

    let layout = match decoder.colortype().map_err(|e| EtlError::raster(path, e))? {
        ColorType::Gray(8) => Layout::Gray8,
        ColorType::Gray(16) => Layout::Gray16,
        ColorType::RGB(8) => Layout::Rgb8,
        other => return Err(EtlError::raster(path, format!("unsupported pixel type {other:?}"))),
    };
    let pixel_count = window.width as usize * window.height as usize;
    let mut gray = vec![0u16; if matches!(layout, Layout::Rgb8) { 0 } else { pixel_count }];
    let mut rgb = vec![0u8; if matches!(layout, Layout::Rgb8) { pixel_count * 3 } else { 0 }];

    if !window.is_empty() {
        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let chunks_across = grid.width.div_ceil(chunk_width);

        for chunk_y in window.row_off / chunk_height..=(window.row_off + window.height - 1) / chunk_height {
            for chunk_x in window.col_off / chunk_width..=(window.col_off + window.width - 1) / chunk_width {
                let index = chunk_y * chunks_across + chunk_x;
                let size = decoder.chunk_data_dimensions(index);
                let origin = (chunk_x * chunk_width, chunk_y * chunk_height);
                let chunk = decoder
                    .read_chunk(index)
                    .map_err(|e| EtlError::raster(path, e))?;
                match (&layout, chunk) {
                    (Layout::Gray16, DecodingResult::U16(data)) => {
                        copy_chunk(&mut gray, window, &data, origin, size, chunk_width, 1)
                    }
                    (Layout::Gray8, DecodingResult::U8(data)) => {
                        let data = data.into_iter().map(u16::from).collect::<Vec<_>>();
                        copy_chunk(&mut gray, window, &data, origin, size, chunk_width, 1)
                    }
                    (Layout::Rgb8, DecodingResult::U8(data)) => {
                        copy_chunk(&mut rgb, window, &data, origin, size, chunk_width, 3)
                    }
                    _ => return Err(EtlError::raster(path, "unexpected chunk sample type")),
                }
            }
        }
    }

    let pixels = match layout {
        Layout::Rgb8 => Pixels::Rgb8(rgb),
        _ => Pixels::Gray16(gray),
    };
    Ok(GeoRaster {
        grid: grid.window(window),
        pixels,
    })
}

pub fn read<P: AsRef<Path>>(path: P) -> EtlResult<GeoRaster> {
    let path = path.as_ref();
    let grid = read_grid(path)?;
    read_window(path, &grid.full_window())
}

/// Writes an LZW compressed GeoTIFF.
pub fn write<P: AsRef<Path>>(path: P, raster: &GeoRaster) -> EtlResult<()> {
    let path = path.as_ref();
    let grid = &raster.grid;
    let expected = grid.pixel_count() * raster.pixels.samples_per_pixel();
    let actual = match &raster.pixels {
        Pixels::Gray16(p) => p.len(),
        Pixels::Rgb8(p) => p.len(),
    };
    if expected != actual {
        return Err(EtlError::raster(
            path,
            format!("expected {expected} samples, got {actual}"),
        ));
    }

    let write_tiff = || -> tiff::TiffResult<()> {
        let file = BufWriter::new(File::create(path)?);
        let mut encoder = TiffEncoder::new(file)?;

        let t = &grid.transform;
        let scale = [t.pixel_width, t.pixel_height, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
        let geokeys = geokeys_for(grid.epsg);

        match &raster.pixels {
            Pixels::Gray16(data) => {
                let mut image = encoder.new_image_with_compression::<colortype::Gray16, _>(
                    grid.width,
                    grid.height,
                    Lzw::default(),
                )?;
                image.encoder().write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
                image.encoder().write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
                image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;
                image.encoder().write_tag(Tag::Unknown(GDAL_NODATA), "0")?;
                image.write_data(data)
            }
            Pixels::Rgb8(data) => {
                let mut image = encoder.new_image_with_compression::<colortype::RGB8, _>(
                    grid.width,
                    grid.height,
                    Lzw::default(),
                )?;
                image.encoder().write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
                image.encoder().write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
                image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;
                image.write_data(data)
            }
        }
    };
    write_tiff().map_err(|e| EtlError::raster(path, e))
}
