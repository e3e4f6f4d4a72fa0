//! Planar geometry capability used by the coverage selector.
//!
//! The selector only needs intersection, difference and area, so it is written
//! against [`PlanarGeometry`] rather than a concrete geometry engine.

use geo::{Area, BooleanOps, MultiPolygon, Polygon};

/// Areas at or below this fraction of the reference area count as zero.
///
/// Boolean operations on polygons leave slivers of the order of the
/// floating point error of the input coordinates.
pub const AREA_TOLERANCE: f64 = 1e-9;

pub trait PlanarGeometry: Clone {
    fn intersection(&self, other: &Self) -> Self;

    fn difference(&self, other: &Self) -> Self;

    fn area(&self) -> f64;
}

impl PlanarGeometry for MultiPolygon<f64> {
    fn intersection(&self, other: &Self) -> Self {
        BooleanOps::intersection(self, other)
    }

    fn difference(&self, other: &Self) -> Self {
        BooleanOps::difference(self, other)
    }

    fn area(&self) -> f64 {
        Area::unsigned_area(self)
    }
}

/// True when `area` is indistinguishable from zero relative to `reference`.
pub fn is_negligible(area: f64, reference: f64) -> bool {
    area <= AREA_TOLERANCE * reference.abs()
}

/// Drops interior rings, keeping only the exterior of every polygon.
pub fn outer_boundary(geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    geometry
        .iter()
        .map(|polygon| Polygon::new(polygon.exterior().clone(), vec![]))
        .collect::<Vec<_>>()
        .into()
}

/// Axis aligned rectangle `(min_x, min_y)-(max_x, max_y)` as a multi-polygon.
pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> MultiPolygon<f64> {
    let polygon = geo::Rect::new((min_x, min_y), (max_x, max_y)).to_polygon();
    MultiPolygon::new(vec![polygon])
}
