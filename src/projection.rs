//! Coordinate transforms between WGS84 and the UTM zones Sentinel-2 tiles use.

use anyhow::{anyhow, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon, Rect};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

pub const EPSG_WGS84: u16 = 4326;

/// EPSG code of the WGS84 UTM zone containing `(lon, lat)`.
pub fn utm_epsg_for(lon: f64, lat: f64) -> u16 {
    let zone = (((lon + 180.0) / 6.0).floor() as i32).clamp(0, 59) + 1;
    let base = if lat >= 0.0 { 32600 } else { 32700 };
    (base + zone) as u16
}

fn proj_string(epsg: u16) -> Option<String> {
    match epsg {
        EPSG_WGS84 => Some("+proj=longlat +datum=WGS84 +no_defs".to_string()),
        32601..=32660 => Some(format!(
            "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
            epsg - 32600
        )),
        32701..=32760 => Some(format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
            epsg - 32700
        )),
        _ => None,
    }
}

fn is_geographic(epsg: u16) -> bool {
    epsg == EPSG_WGS84
}

pub struct Projector {
    source: Proj,
    target: Proj,
    source_epsg: u16,
    target_epsg: u16,
}

impl std::fmt::Debug for Projector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projector")
            .field("source_epsg", &self.source_epsg)
            .field("target_epsg", &self.target_epsg)
            .finish_non_exhaustive()
    }
}

impl Projector {
    pub fn new(source_epsg: u16, target_epsg: u16) -> Result<Self> {
        let source = Self::build(source_epsg)?;
        let target = Self::build(target_epsg)?;
        Ok(Self {
            source,
            target,
            source_epsg,
            target_epsg,
        })
    }

    fn build(epsg: u16) -> Result<Proj> {
        let definition = proj_string(epsg).ok_or(anyhow!("EPSG:{epsg} is not supported"))?;
        Proj::from_proj_string(&definition)
            .map_err(|e| anyhow!("Invalid projection EPSG:{epsg}: {e:?}"))
    }

    pub fn is_identity(&self) -> bool {
        self.source_epsg == self.target_epsg
    }

    pub fn point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if self.is_identity() {
            return Ok((x, y));
        }
        let mut point = if is_geographic(self.source_epsg) {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&self.source, &self.target, &mut point)
            .map_err(|e| anyhow!("Transform of ({x}, {y}) failed: {e:?}"))?;
        if is_geographic(self.target_epsg) {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }

    fn line_string(&self, line: &LineString<f64>) -> Result<LineString<f64>> {
        line.coords()
            .map(|c| self.point(c.x, c.y).map(|(x, y)| Coord { x, y }))
            .collect::<Result<Vec<_>>>()
            .map(LineString::new)
    }

    pub fn multi_polygon(&self, geometry: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        if self.is_identity() {
            return Ok(geometry.clone());
        }
        let polygons = geometry
            .iter()
            .map(|polygon| {
                let exterior = self.line_string(polygon.exterior())?;
                let interiors = polygon
                    .interiors()
                    .iter()
                    .map(|ring| self.line_string(ring))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Polygon::new(exterior, interiors))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(MultiPolygon::new(polygons))
    }

    /// Bounds of the projected rectangle, sampling edge midpoints as well as
    /// corners since straight edges bend under projection.
    pub fn rect(&self, rect: &Rect<f64>) -> Result<Rect<f64>> {
        if self.is_identity() {
            return Ok(*rect);
        }
        let (min, max) = (rect.min(), rect.max());
        let (mid_x, mid_y) = ((min.x + max.x) / 2.0, (min.y + max.y) / 2.0);
        let samples = [
            (min.x, min.y),
            (max.x, min.y),
            (max.x, max.y),
            (min.x, max.y),
            (mid_x, min.y),
            (mid_x, max.y),
            (min.x, mid_y),
            (max.x, mid_y),
        ];
        let projected = samples
            .iter()
            .map(|&(x, y)| self.point(x, y))
            .collect::<Result<Vec<_>>>()?;

        let (mut lo_x, mut lo_y) = (f64::INFINITY, f64::INFINITY);
        let (mut hi_x, mut hi_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in projected {
            lo_x = lo_x.min(x);
            lo_y = lo_y.min(y);
            hi_x = hi_x.max(x);
            hi_y = hi_y.max(y);
        }
        Ok(Rect::new((lo_x, lo_y), (hi_x, hi_y)))
    }
}
