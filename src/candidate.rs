use crate::error::{EtlError, EtlResult};
use crate::geometry::PlanarGeometry;
use chrono::{DateTime, Utc};
use geo::MultiPolygon;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Anything the coverage selector can rank and select.
pub trait Footprint {
    type Geometry: PlanarGeometry;

    fn footprint(&self) -> &Self::Geometry;

    fn cloud_cover(&self) -> f64;
}

/// A product returned by the catalog for an area of interest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateProduct {
    pub id: String,
    pub acquired: DateTime<Utc>,
    #[serde(skip)]
    pub footprint: MultiPolygon<f64>,
    pub cloud_cover: f64,
    pub size_bytes: u64,
    /// Download location of each band, keyed by band name.
    pub assets: BTreeMap<String, String>,
}

impl Footprint for CandidateProduct {
    type Geometry = MultiPolygon<f64>;

    fn footprint(&self) -> &MultiPolygon<f64> {
        &self.footprint
    }

    fn cloud_cover(&self) -> f64 {
        self.cloud_cover
    }
}

/// Candidates ordered by ascending cloud cover.
#[derive(Debug, Clone)]
pub struct RankedCandidates<P> {
    products: Vec<P>,
}

impl<P> Default for RankedCandidates<P> {
    fn default() -> Self {
        Self { products: vec![] }
    }
}

impl<P> RankedCandidates<P> {
    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, P> {
        self.products.iter()
    }
}

fn by_cloud_cover(a: f64, b: f64) -> Ordering {
    // NaN cloud cover sorts after every real value
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.total_cmp(&b),
    }
}

/// Stable sort by ascending cloud cover; ties keep the catalog order.
pub fn rank_candidates<P: Footprint>(mut products: Vec<P>) -> EtlResult<RankedCandidates<P>> {
    if products.is_empty() {
        return Err(EtlError::EmptyCandidateSet(
            "the catalog returned no products".to_string(),
        ));
    }
    products.sort_by(|a, b| by_cloud_cover(a.cloud_cover(), b.cloud_cover()));
    Ok(RankedCandidates { products })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rectangle;

    fn product(id: &str, cloud_cover: f64) -> CandidateProduct {
        CandidateProduct {
            id: id.to_string(),
            acquired: Utc::now(),
            footprint: rectangle(0.0, 0.0, 1.0, 1.0),
            cloud_cover,
            size_bytes: 0,
            assets: BTreeMap::new(),
        }
    }

    fn ids(ranked: &RankedCandidates<CandidateProduct>) -> Vec<&str> {
        ranked.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_sorts_by_cloud_cover() {
        let ranked = rank_candidates(vec![
            product("c", 25.0),
            product("a", 1.5),
            product("b", 12.0),
        ])
        .unwrap();
        assert_eq!(ids(&ranked), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ties_keep_catalog_order() {
        let ranked = rank_candidates(vec![
            product("first", 10.0),
            product("clear", 0.0),
            product("second", 10.0),
            product("third", 10.0),
        ])
        .unwrap();
        assert_eq!(ids(&ranked), vec!["clear", "first", "second", "third"]);
    }

    #[test]
    fn test_nan_sorts_last() {
        let ranked = rank_candidates(vec![product("unknown", f64::NAN), product("known", 80.0)]).unwrap();
        assert_eq!(ids(&ranked), vec!["known", "unknown"]);
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let result = rank_candidates(Vec::<CandidateProduct>::new());
        assert!(matches!(result, Err(EtlError::EmptyCandidateSet(_))));
        assert!(RankedCandidates::<CandidateProduct>::default().is_empty());
    }
}
