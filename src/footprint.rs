//! Areas of interest and the GeoJSON files they are stored in.

use crate::error::{EtlError, EtlResult};
use crate::geometry::{outer_boundary, PlanarGeometry};
use crate::projection::{utm_epsg_for, Projector, EPSG_WGS84};
use geo::{BooleanOps, BoundingRect, LineString, MultiPolygon, Polygon, Rect};
use geojson::{Feature, FeatureCollection, GeoJson, JsonObject, JsonValue};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Hard limit of the imagery services on the size of a single raster request.
pub const MAX_PIXELS_PER_AXIS: u32 = 2500;

const FOOTPRINT_EXTENSION: &str = "geojson";

/// A named polygon in WGS84 longitude/latitude.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaOfInterest {
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

impl AreaOfInterest {
    pub fn new(name: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self {
            name: name.into(),
            geometry,
        }
    }

    pub fn area(&self) -> f64 {
        self.geometry.area()
    }

    pub fn bounding_box(&self) -> EtlResult<Rect<f64>> {
        bounding_box(&self.geometry)
    }
}

fn read_geojson(path: &Path) -> EtlResult<GeoJson> {
    let content = fs::read_to_string(path).map_err(|e| EtlError::geometry_load(path, e))?;
    content
        .parse::<GeoJson>()
        .map_err(|e| EtlError::geometry_load(path, e))
}

fn polygons_of(geometry: geo::Geometry<f64>, polygons: &mut Vec<Polygon<f64>>) {
    match geometry {
        geo::Geometry::Polygon(p) => polygons.push(p),
        geo::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
        geo::Geometry::Rect(r) => polygons.push(r.to_polygon()),
        geo::Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                polygons_of(g, polygons);
            }
        }
        _ => {}
    }
}

fn collect_polygons(path: &Path, geometries: Vec<geojson::Geometry>) -> EtlResult<Vec<Polygon<f64>>> {
    let mut polygons = vec![];
    for geometry in geometries {
        let geometry = geo::Geometry::<f64>::try_from(geometry)
            .map_err(|e| EtlError::geometry_load(path, e))?;
        polygons_of(geometry, &mut polygons);
    }
    Ok(polygons)
}

/// Union of all polygons with interior rings removed.
fn reduce_to_outer_boundary(path: &Path, polygons: Vec<Polygon<f64>>) -> EtlResult<MultiPolygon<f64>> {
    if polygons.is_empty() {
        return Err(EtlError::geometry_load(path, "no polygon geometries found"));
    }
    let merged = polygons
        .into_iter()
        .map(|p| MultiPolygon::new(vec![p]))
        .reduce(|acc, next| acc.union(&next))
        .unwrap_or_else(|| MultiPolygon::new(vec![]));

    let reduced = outer_boundary(&merged);
    let area = reduced.area();
    if !area.is_finite() || area <= 0.0 {
        return Err(EtlError::geometry_load(path, "geometry has no area"));
    }
    Ok(reduced)
}

fn feature_geometries(geojson: GeoJson) -> Vec<geojson::Geometry> {
    match geojson {
        GeoJson::FeatureCollection(fc) => fc.features.into_iter().filter_map(|f| f.geometry).collect(),
        GeoJson::Feature(f) => f.geometry.into_iter().collect(),
        GeoJson::Geometry(g) => vec![g],
    }
}

fn name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Loads the area of interest stored in a GeoJSON file, named after the file stem.
pub fn load_aoi<P: AsRef<Path>>(path: P) -> EtlResult<AreaOfInterest> {
    let path = path.as_ref();
    let geojson = read_geojson(path)?;
    let polygons = collect_polygons(path, feature_geometries(geojson))?;
    let geometry = reduce_to_outer_boundary(path, polygons)?;
    Ok(AreaOfInterest::new(name_from_path(path), geometry))
}

/// Loads the feature named `name` from a catalog of named footprints.
pub fn load_aoi_from_catalog<P: AsRef<Path>>(path: P, name: &str) -> EtlResult<AreaOfInterest> {
    let path = path.as_ref();
    let geometries = read_feature_collection(path)?
        .features
        .into_iter()
        .filter(|f| f.property("name").and_then(JsonValue::as_str) == Some(name))
        .filter_map(|f| f.geometry)
        .collect::<Vec<_>>();
    if geometries.is_empty() {
        return Err(EtlError::geometry_load(path, format!("no feature named '{name}'")));
    }
    let polygons = collect_polygons(path, geometries)?;
    let geometry = reduce_to_outer_boundary(path, polygons)?;
    Ok(AreaOfInterest::new(name, geometry))
}

/// Every footprint file in `dir`, sorted by path.
pub fn discover_aois<P: AsRef<Path>>(dir: P) -> EtlResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| {
        EtlError::Configuration(format!("Unable to read footprint directory {}: {e}", dir.display()))
    })?;

    let mut paths = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(FOOTPRINT_EXTENSION))
        .collect::<Vec<_>>();
    paths.sort();
    Ok(paths)
}

/// Path of the footprint file for the AOI called `name`.
pub fn footprint_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.{FOOTPRINT_EXTENSION}"))
}

pub fn bounding_box(geometry: &MultiPolygon<f64>) -> EtlResult<Rect<f64>> {
    geometry
        .bounding_rect()
        .ok_or(EtlError::InvalidGeometry("empty geometry has no bounds".to_string()))
}

/// Raster size covering `bbox` (in metres) at `resolution` metres per pixel.
pub fn pixel_dimensions(bbox: &Rect<f64>, resolution: f64) -> (u32, u32) {
    let to_pixels = |extent: f64| {
        let pixels = (extent / resolution).round();
        if pixels.is_finite() {
            (pixels as u32).clamp(1, MAX_PIXELS_PER_AXIS)
        } else {
            MAX_PIXELS_PER_AXIS
        }
    };
    (to_pixels(bbox.width()), to_pixels(bbox.height()))
}

/// Same as [`pixel_dimensions`] for a longitude/latitude box, measured in the
/// UTM zone of its centre.
pub fn bbox_to_dimensions(bbox: &Rect<f64>, resolution: f64) -> anyhow::Result<(u32, u32)> {
    let center = bbox.center();
    let projector = Projector::new(EPSG_WGS84, utm_epsg_for(center.x, center.y))?;
    let metres = projector.rect(bbox)?;
    Ok(pixel_dimensions(&metres, resolution))
}

fn read_feature_collection(path: &Path) -> EtlResult<FeatureCollection> {
    match read_geojson(path)? {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        GeoJson::Feature(f) => Ok(FeatureCollection {
            bbox: None,
            features: vec![f],
            foreign_members: None,
        }),
        GeoJson::Geometry(_) => Err(EtlError::geometry_load(path, "expected a feature collection")),
    }
}

fn feature_id(feature: &Feature) -> Option<i64> {
    match feature.property("id")? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Appends a rectangular footprint to a catalog file, creating it if needed.
///
/// `bbox` is `(lng_1, lat_1, lng_2, lat_2)` with the first corner at the top left.
pub fn add_footprint<P: AsRef<Path>>(
    path: P,
    name: &str,
    bbox: (f64, f64, f64, f64),
) -> EtlResult<i64> {
    let path = path.as_ref();
    let mut collection = if path.exists() {
        read_feature_collection(path)?
    } else {
        FeatureCollection {
            bbox: None,
            features: vec![],
            foreign_members: None,
        }
    };

    let next_id = collection.features.iter().filter_map(feature_id).max().unwrap_or(0) + 1;

    let (lng_1, lat_1, lng_2, lat_2) = bbox;
    let ring = LineString::from(vec![
        (lng_1, lat_1),
        (lng_2, lat_1),
        (lng_2, lat_2),
        (lng_1, lat_2),
        (lng_1, lat_1),
    ]);
    let polygon = Polygon::new(ring, vec![]);

    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), JsonValue::from(next_id));
    properties.insert("name".to_string(), JsonValue::from(name));

    collection.features.push(Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&polygon))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    });

    let content = serde_json::to_string_pretty(&collection).map_err(|e| EtlError::geometry_load(path, e))?;
    fs::write(path, content).map_err(|e| EtlError::geometry_load(path, e))?;
    Ok(next_id)
}

#[derive(Debug, Default)]
pub struct CatalogSummary {
    pub properties: Vec<JsonObject>,
    pub labels: Vec<String>,
}

/// Feature properties of a GeoJSON file and the distinct values of `label`.
pub fn describe_catalog<P: AsRef<Path>>(path: P) -> EtlResult<CatalogSummary> {
    let collection = read_feature_collection(path.as_ref())?;
    let mut labels = BTreeSet::new();
    let mut properties = vec![];
    for feature in collection.features {
        if let Some(label) = feature.property("label") {
            labels.insert(match label {
                JsonValue::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        properties.push(feature.properties.unwrap_or_default());
    }
    Ok(CatalogSummary {
        properties,
        labels: labels.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SQUARE: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"name": "square"},
            "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}
        }]
    }"#;

    #[test]
    fn test_load_single_polygon() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("budapest.geojson");
        fs::write(&path, SQUARE).unwrap();

        let aoi = load_aoi(&path).unwrap();
        assert_eq!(aoi.name, "budapest");
        assert!((aoi.area() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_load_multi_polygon_merges_and_drops_holes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("city.geojson");
        let content = r#"{
            "type": "MultiPolygon",
            "coordinates": [
                [[[0,0],[2,0],[2,2],[0,2],[0,0]], [[0.5,0.5],[1,0.5],[1,1],[0.5,1],[0.5,0.5]]],
                [[[1,0],[3,0],[3,1],[1,1],[1,0]]]
            ]
        }"#;
        fs::write(&path, content).unwrap();

        let aoi = load_aoi(&path).unwrap();
        assert!((aoi.area() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_aoi("/nonexistent/footprint.geojson").unwrap_err();
        assert!(matches!(err, EtlError::GeometryLoad { .. }));
    }

    #[test]
    fn test_load_unparseable_and_empty() {
        let dir = tempdir().unwrap();
        let broken = dir.path().join("broken.geojson");
        fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(load_aoi(&broken), Err(EtlError::GeometryLoad { .. })));

        let empty = dir.path().join("empty.geojson");
        fs::write(&empty, r#"{"type": "FeatureCollection", "features": []}"#).unwrap();
        assert!(matches!(load_aoi(&empty), Err(EtlError::GeometryLoad { .. })));
    }

    #[test]
    fn test_bounding_box_and_dimensions() {
        let geometry = crate::geometry::rectangle(100.0, 200.0, 5100.0, 1200.0);
        let bbox = bounding_box(&geometry).unwrap();
        assert_eq!(bbox.min().x, 100.0);
        assert_eq!(bbox.max().y, 1200.0);
        assert_eq!(pixel_dimensions(&bbox, 10.0), (500, 100));
    }

    #[test]
    fn test_dimensions_are_clamped() {
        let bbox = Rect::new((0.0, 0.0), (100_000.0, 10.0));
        assert_eq!(pixel_dimensions(&bbox, 10.0), (MAX_PIXELS_PER_AXIS, 1));
    }

    #[test]
    fn test_bbox_to_dimensions_in_metres() {
        // Centred on the zone 34 central meridian, so the box does not rotate
        let bbox = Rect::new((20.995, 47.4), (21.005, 47.5));
        let (width, height) = bbox_to_dimensions(&bbox, 10.0).unwrap();
        assert_eq!(width, 75);
        assert!((1110..=1112).contains(&height), "height {height}");

        // Off the central meridian the projected box widens with grid convergence
        let bbox = Rect::new((19.0, 47.4), (19.01, 47.5));
        let (width, _) = bbox_to_dimensions(&bbox, 10.0).unwrap();
        assert!((100..=108).contains(&width), "width {width}");
    }

    #[test]
    fn test_catalog_add_and_load() {
        let dir = tempdir().unwrap();
        let catalog = dir.path().join("footprints.geojson");

        let first = add_footprint(&catalog, "Budapest", (18.9, 47.6, 19.3, 47.35)).unwrap();
        let second = add_footprint(&catalog, "Szeged", (20.0, 46.3, 20.2, 46.2)).unwrap();
        assert_eq!((first, second), (1, 2));

        let aoi = load_aoi_from_catalog(&catalog, "Szeged").unwrap();
        assert_eq!(aoi.name, "Szeged");
        assert!((aoi.area() - 0.02).abs() < 1e-9);

        let missing = load_aoi_from_catalog(&catalog, "Debrecen");
        assert!(matches!(missing, Err(EtlError::GeometryLoad { .. })));

        let summary = describe_catalog(&catalog).unwrap();
        assert_eq!(summary.properties.len(), 2);
        assert!(summary.labels.is_empty());
    }

    #[test]
    fn test_discover_sorts_footprints() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("vienna.geojson"), SQUARE).unwrap();
        fs::write(dir.path().join("budapest.geojson"), SQUARE).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let found = discover_aois(dir.path()).unwrap();
        let names = found.iter().map(|p| name_from_path(p)).collect::<Vec<_>>();
        assert_eq!(names, vec!["budapest", "vienna"]);
    }
}
