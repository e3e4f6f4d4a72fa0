use crate::candidate::CandidateProduct;
use crate::catalog::{Catalog, SearchWindow};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use geo::MultiPolygon;
use serde_json::Value;
use stac::{Item, ItemCollection};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};
use url::Url;

pub const SEARCH_API: &str = "https://earth-search.aws.element84.com/v1/search";
pub const COLLECTION_ID: &str = "sentinel-2-c1-l2a";

/// STAC item search against Element84 Earth Search.
pub struct EarthSearch {
    client: reqwest::Client,
    search_url: Url,
    collection: String,
    bands: Vec<String>,
    limit: usize,
}

impl EarthSearch {
    pub fn new(search_url: Url, collection: &str, bands: &[String], limit: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            search_url,
            collection: collection.to_owned(),
            bands: bands.to_vec(),
            limit,
        }
    }

    fn request_body(&self, footprint: &MultiPolygon<f64>, window: &SearchWindow) -> Value {
        let intersects = geojson::Geometry::new(geojson::Value::from(footprint));
        let (min_cloud_cover, max_cloud_cover) = window.cloud_cover;
        serde_json::json!({
            "collections": vec![self.collection.as_str()],
            "intersects": intersects,
            "datetime": window.datetime_interval(),
            "query": {
                "eo:cloud_cover": {"gte": min_cloud_cover, "lte": max_cloud_cover}
            },
            "limit": self.limit,
        })
    }
}

impl Catalog for EarthSearch {
    async fn query(
        &self,
        footprint: &MultiPolygon<f64>,
        window: &SearchWindow,
    ) -> Result<Vec<CandidateProduct>> {
        let item_collection: ItemCollection = self
            .client
            .post(self.search_url.clone())
            .json(&self.request_body(footprint, window))
            .send()
            .await?
            .error_for_status()
            .context("Catalog search failed")?
            .json()
            .await?;

        debug!(items = item_collection.items.len(), "Catalog search returned");
        if item_collection.items.len() >= self.limit {
            warn!(limit = self.limit, "Catalog search hit the result limit");
        }

        Ok(candidates_from_items(&item_collection.items, &self.bands))
    }
}

/// Converts catalog items to candidates, keeping the first of duplicated ids
/// and skipping items that cannot be placed or ranked.
pub fn candidates_from_items(items: &[Item], bands: &[String]) -> Vec<CandidateProduct> {
    let mut seen = HashSet::new();
    let mut candidates = vec![];
    for item in items {
        if !seen.insert(item.id.clone()) {
            continue;
        }
        match candidate_from_item(item, bands) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => warn!(item = %item.id, "Skipping catalog item: {e}"),
        }
    }
    candidates
}

fn candidate_from_item(item: &Item, bands: &[String]) -> Result<CandidateProduct> {
    let footprint = extract_footprint(item)?;

    let properties = serde_json::to_value(&item.properties)?;
    let cloud_cover = properties
        .get("eo:cloud_cover")
        .and_then(Value::as_f64)
        .ok_or(anyhow!("Missing eo:cloud_cover"))?;
    let acquired = properties
        .get("datetime")
        .and_then(Value::as_str)
        .ok_or(anyhow!("Missing datetime"))?;
    let acquired = DateTime::parse_from_rfc3339(acquired)?.with_timezone(&Utc);

    let mut assets = BTreeMap::new();
    let mut size_bytes = 0;
    for band in bands {
        if let Some(asset) = item.assets.get(band.as_str()) {
            size_bytes += asset
                .additional_fields
                .get("file:size")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            assets.insert(band.clone(), asset.href.to_string());
        }
    }

    Ok(CandidateProduct {
        id: item.id.clone(),
        acquired,
        footprint,
        cloud_cover,
        size_bytes,
        assets,
    })
}

fn extract_footprint(item: &Item) -> Result<MultiPolygon<f64>> {
    let geometry: Option<geojson::Geometry> =
        serde_json::from_value(serde_json::to_value(&item.geometry)?)?;
    let geometry = geometry.ok_or(anyhow!("Item has no geometry"))?;
    match geo::Geometry::<f64>::try_from(geometry)? {
        geo::Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        _ => Err(anyhow!("Item geometry is not polygonal")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::Footprint;
    use crate::geometry::{rectangle, PlanarGeometry};
    use chrono::NaiveDate;

    fn item_json(id: &str, cloud_cover: Option<f64>) -> Value {
        let mut properties = serde_json::json!({"datetime": "2024-05-29T09:52:59.024000Z"});
        if let Some(cc) = cloud_cover {
            properties["eo:cloud_cover"] = serde_json::json!(cc);
        }
        serde_json::json!({
            "type": "Feature",
            "stac_version": "1.0.0",
            "id": id,
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[18.0, 47.0], [19.5, 47.0], [19.5, 48.0], [18.0, 48.0], [18.0, 47.0]]]
            },
            "bbox": [18.0, 47.0, 19.5, 48.0],
            "properties": properties,
            "links": [],
            "assets": {
                "red": {
                    "href": format!("https://sentinel-cogs.s3.us-west-2.amazonaws.com/cogs/{id}/B04.tif"),
                    "file:size": 1000
                },
                "blue": {
                    "href": format!("https://sentinel-cogs.s3.us-west-2.amazonaws.com/cogs/{id}/B02.tif"),
                    "file:size": 500
                }
            }
        })
    }

    fn item(id: &str, cloud_cover: Option<f64>) -> Item {
        serde_json::from_value(item_json(id, cloud_cover)).unwrap()
    }

    #[test]
    fn test_item_to_candidate() {
        let bands = vec!["red".to_string(), "blue".to_string(), "nir".to_string()];
        let candidates = candidates_from_items(&[item("S2A_34TCT", Some(12.5))], &bands);
        assert_eq!(candidates.len(), 1);

        let candidate = &candidates[0];
        assert_eq!(candidate.id, "S2A_34TCT");
        assert_eq!(candidate.cloud_cover(), 12.5);
        assert_eq!(candidate.size_bytes, 1500);
        assert_eq!(candidate.assets.len(), 2);
        assert!(candidate.assets["red"].ends_with("B04.tif"));
        assert_eq!(
            candidate.acquired.date_naive(),
            NaiveDate::from_ymd_opt(2024, 5, 29).unwrap()
        );
        assert!((candidate.footprint.area() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_skips_incomplete_and_duplicate_items() {
        let bands = vec!["red".to_string()];
        let items = vec![
            item("a", Some(3.0)),
            item("no-cloud-cover", None),
            item("a", Some(90.0)),
            item("b", Some(1.0)),
        ];
        let candidates = candidates_from_items(&items, &bands);
        let ids = candidates.iter().map(|c| c.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(candidates[0].cloud_cover, 3.0);
    }

    #[test]
    fn test_request_body() {
        let search = EarthSearch::new(
            Url::parse(SEARCH_API).unwrap(),
            COLLECTION_ID,
            &["red".to_string()],
            50,
        );
        let window = SearchWindow::new(
            NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            (0.0, 30.0),
        )
        .unwrap();
        let body = search.request_body(&rectangle(0.0, 0.0, 1.0, 1.0), &window);

        assert_eq!(body["collections"][0], COLLECTION_ID);
        assert_eq!(body["intersects"]["type"], "MultiPolygon");
        assert_eq!(body["query"]["eo:cloud_cover"]["lte"], 30.0);
        assert_eq!(body["limit"], 50);
        assert_eq!(body["datetime"], "2024-04-01T00:00:00Z/2024-05-01T23:59:59Z");
    }
}
