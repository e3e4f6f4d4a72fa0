//! Conversion of ESRI shapefiles into GeoJSON footprints.

use crate::error::{EtlError, EtlResult};
use geojson::{Feature, FeatureCollection, JsonObject, JsonValue};
use shapefile::dbase::FieldValue;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SHAPEFILE_EXTENSION: &str = "shp";

fn is_shapefile(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(SHAPEFILE_EXTENSION))
}

fn collect_shapefiles(dir: &Path, found: &mut Vec<PathBuf>) -> EtlResult<()> {
    let entries = fs::read_dir(dir).map_err(|e| EtlError::geometry_load(dir, e))?;
    for path in entries.filter_map(|entry| entry.ok().map(|e| e.path())) {
        if path.is_dir() {
            collect_shapefiles(&path, found)?;
        } else if is_shapefile(&path) {
            found.push(path);
        }
    }
    Ok(())
}

/// Shapefiles at `path`: the file itself, or every `.shp` below a directory.
pub fn find_shapefiles(path: &Path) -> EtlResult<Vec<PathBuf>> {
    if path.is_dir() {
        let mut found = vec![];
        collect_shapefiles(path, &mut found)?;
        found.sort();
        Ok(found)
    } else if is_shapefile(path) {
        Ok(vec![path.to_path_buf()])
    } else {
        Err(EtlError::geometry_load(path, "not a shapefile or a directory"))
    }
}

fn property_value(value: FieldValue) -> JsonValue {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => JsonValue::from(s.trim_end()),
        FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => JsonValue::from(n),
        FieldValue::Float(Some(f)) => JsonValue::from(f as f64),
        FieldValue::Integer(i) => JsonValue::from(i),
        FieldValue::Logical(Some(b)) => JsonValue::from(b),
        FieldValue::Date(Some(date)) => JsonValue::from(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            date.month(),
            date.day()
        )),
        FieldValue::Character(None)
        | FieldValue::Numeric(None)
        | FieldValue::Float(None)
        | FieldValue::Logical(None)
        | FieldValue::Date(None) => JsonValue::Null,
        other => JsonValue::from(format!("{other:?}")),
    }
}

/// Reads every shape of a shapefile, with its attributes as properties.
pub fn read_shapefile(path: &Path) -> EtlResult<FeatureCollection> {
    let mut reader = shapefile::Reader::from_path(path).map_err(|e| EtlError::geometry_load(path, e))?;
    let mut features = vec![];
    for item in reader.iter_shapes_and_records() {
        let (shape, record) = item.map_err(|e| EtlError::geometry_load(path, e))?;
        let geometry = match geo::Geometry::<f64>::try_from(shape) {
            Ok(geometry) => geometry,
            Err(e) => {
                warn!(path = %path.display(), "Skipping shape: {e}");
                continue;
            }
        };
        let properties = HashMap::<String, FieldValue>::from(record)
            .into_iter()
            .map(|(name, value)| (name, property_value(value)))
            .collect::<JsonObject>();
        features.push(Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&geometry))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        });
    }
    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

/// Writes `<stem>.geojson` next to each shapefile found at `path`.
///
/// Shapefiles whose GeoJSON already exists are left alone. Coordinates are
/// copied as they are, so the shapefiles must already be in longitude and
/// latitude. Returns the files written.
pub fn convert_shapefiles(path: &Path) -> EtlResult<Vec<PathBuf>> {
    let shapefiles = find_shapefiles(path)?;
    info!(path = %path.display(), shapefiles = shapefiles.len(), "Converting shapefiles");

    let mut written = vec![];
    for shp in shapefiles {
        let geojson = shp.with_extension("geojson");
        if geojson.exists() {
            info!(path = %geojson.display(), "GeoJSON already exists");
            continue;
        }
        let collection = read_shapefile(&shp)?;
        let content = serde_json::to_string_pretty(&collection).map_err(|e| EtlError::geometry_load(&shp, e))?;
        fs::write(&geojson, content).map_err(|e| EtlError::geometry_load(&geojson, e))?;
        info!(
            from = %shp.display(),
            to = %geojson.display(),
            features = collection.features.len(),
            "Converted shapefile"
        );
        written.push(geojson);
    }
    Ok(written)
}
