//! Greedy selection of the products that cover an area of interest.
//!
//! Candidates are consumed in ranked order (clearest first). A product is kept
//! only if it covers some part of the AOI that no earlier product covered, and
//! the search stops as soon as nothing is left uncovered. This is a set cover
//! heuristic: the result is minimal in the sense that every selected product
//! contributes new area, not necessarily the smallest possible selection.

use crate::candidate::{Footprint, RankedCandidates};
use crate::error::{EtlError, EtlResult};
use crate::geometry::{is_negligible, PlanarGeometry};
use serde::Serialize;
use tracing::debug;

/// One accepted product and its effect on the uncovered area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoverageStep {
    /// Position of the product in the ranked list.
    pub rank: usize,
    pub contributed_area: f64,
    pub remaining_area: f64,
}

/// Part of the AOI left uncovered after all candidates were tried.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoverageGapWarning {
    pub uncovered_area: f64,
    pub uncovered_fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageResult<P> {
    pub selected: Vec<P>,
    pub fully_covered: bool,
    pub steps: Vec<CoverageStep>,
    /// Candidates examined before the search stopped.
    pub candidates_considered: usize,
    pub aoi_area: f64,
    pub remaining_area: f64,
}

impl<P> CoverageResult<P> {
    pub fn coverage_gap(&self) -> Option<CoverageGapWarning> {
        if self.fully_covered {
            return None;
        }
        let uncovered_fraction = if self.aoi_area > 0.0 {
            (self.remaining_area / self.aoi_area).clamp(0.0, 1.0)
        } else {
            1.0
        };
        Some(CoverageGapWarning {
            uncovered_area: self.remaining_area,
            uncovered_fraction,
        })
    }
}

fn checked_area<G: PlanarGeometry>(geometry: &G, what: &str) -> EtlResult<f64> {
    let area = geometry.area();
    if area.is_finite() {
        Ok(area)
    } else {
        Err(EtlError::InvalidGeometry(format!("{what} has non-finite area {area}")))
    }
}

/// Picks, in ranked order, the products needed to cover `aoi`.
///
/// Incomplete coverage is reported through [`CoverageResult::fully_covered`]
/// and [`CoverageResult::coverage_gap`], never as an error. Errors are reserved
/// for geometry that cannot be measured.
pub fn select_covering_products<P>(
    aoi: &P::Geometry,
    ranked: &RankedCandidates<P>,
) -> EtlResult<CoverageResult<P>>
where
    P: Footprint + Clone,
{
    let aoi_area = checked_area(aoi, "area of interest")?;

    let mut remaining = aoi.clone();
    let mut remaining_area = aoi_area;
    let mut selected = vec![];
    let mut steps = vec![];
    let mut candidates_considered = 0;

    for (rank, product) in ranked.iter().enumerate() {
        candidates_considered += 1;

        let intersection = remaining.intersection(product.footprint());
        let contributed_area = checked_area(&intersection, "footprint intersection")?;
        if is_negligible(contributed_area, aoi_area) {
            continue;
        }

        remaining = remaining.difference(&intersection);
        let next_area = checked_area(&remaining, "remaining area")?;
        // Boolean operations may round up by a hair; the uncovered area never grows.
        remaining_area = next_area.min(remaining_area);

        debug!(rank, contributed_area, remaining_area, "Selected product");
        selected.push(product.clone());
        steps.push(CoverageStep {
            rank,
            contributed_area,
            remaining_area,
        });

        if is_negligible(remaining_area, aoi_area) {
            break;
        }
    }

    let fully_covered = !selected.is_empty() && is_negligible(remaining_area, aoi_area);

    Ok(CoverageResult {
        selected,
        fully_covered,
        steps,
        candidates_considered,
        aoi_area,
        remaining_area,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::rank_candidates;
    use crate::geometry::rectangle;
    use geo::MultiPolygon;

    #[derive(Debug, Clone, PartialEq)]
    struct Tile {
        id: &'static str,
        footprint: MultiPolygon<f64>,
        cloud_cover: f64,
    }

    impl Footprint for Tile {
        type Geometry = MultiPolygon<f64>;

        fn footprint(&self) -> &MultiPolygon<f64> {
            &self.footprint
        }

        fn cloud_cover(&self) -> f64 {
            self.cloud_cover
        }
    }

    fn tile(id: &'static str, bounds: (f64, f64, f64, f64), cloud_cover: f64) -> Tile {
        let (min_x, min_y, max_x, max_y) = bounds;
        Tile {
            id,
            footprint: rectangle(min_x, min_y, max_x, max_y),
            cloud_cover,
        }
    }

    fn unit_square() -> MultiPolygon<f64> {
        rectangle(0.0, 0.0, 1.0, 1.0)
    }

    fn select(tiles: Vec<Tile>) -> CoverageResult<Tile> {
        let ranked = rank_candidates(tiles).unwrap();
        select_covering_products(&unit_square(), &ranked).unwrap()
    }

    fn selected_ids(result: &CoverageResult<Tile>) -> Vec<&'static str> {
        result.selected.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_disjoint_candidates_select_nothing() {
        let result = select(vec![tile("far", (2.0, 2.0, 3.0, 3.0), 10.0)]);
        assert!(result.selected.is_empty());
        assert!(!result.fully_covered);
        assert_eq!(result.coverage_gap().unwrap().uncovered_fraction, 1.0);
    }

    #[test]
    fn test_single_exact_footprint_covers() {
        let result = select(vec![tile("exact", (0.0, 0.0, 1.0, 1.0), 5.0)]);
        assert_eq!(selected_ids(&result), vec!["exact"]);
        assert!(result.fully_covered);
        assert!(result.coverage_gap().is_none());
    }

    #[test]
    fn test_overlapping_pair_covers() {
        let result = select(vec![
            tile("left", (0.0, 0.0, 0.6, 1.0), 5.0),
            tile("right", (0.5, 0.0, 1.0, 1.0), 20.0),
        ]);
        assert_eq!(selected_ids(&result), vec!["left", "right"]);
        assert!(result.fully_covered);
        assert!((result.steps[1].contributed_area - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_half_coverage_reports_gap() {
        let result = select(vec![tile("half", (0.0, 0.0, 0.5, 1.0), 5.0)]);
        assert_eq!(selected_ids(&result), vec!["half"]);
        assert!(!result.fully_covered);
        let gap = result.coverage_gap().unwrap();
        assert!((gap.uncovered_fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_candidates() {
        let ranked = RankedCandidates::<Tile>::default();
        let result = select_covering_products(&unit_square(), &ranked).unwrap();
        assert!(result.selected.is_empty());
        assert!(!result.fully_covered);
        assert_eq!(result.candidates_considered, 0);
    }

    #[test]
    fn test_stops_once_covered() {
        let result = select(vec![
            tile("whole", (-1.0, -1.0, 2.0, 2.0), 1.0),
            tile("also-whole", (0.0, 0.0, 1.0, 1.0), 2.0),
            tile("part", (0.0, 0.0, 0.5, 0.5), 3.0),
        ]);
        assert_eq!(selected_ids(&result), vec!["whole"]);
        assert!(result.fully_covered);
        assert_eq!(result.candidates_considered, 1);
    }

    #[test]
    fn test_redundant_footprint_is_skipped() {
        let result = select(vec![
            tile("left", (0.0, 0.0, 0.5, 1.0), 1.0),
            tile("left-again", (0.0, 0.0, 0.5, 1.0), 2.0),
            tile("left-inner", (0.1, 0.1, 0.4, 0.9), 3.0),
            tile("right", (0.5, 0.0, 1.0, 1.0), 4.0),
        ]);
        assert_eq!(selected_ids(&result), vec!["left", "right"]);
        assert_eq!(result.candidates_considered, 4);
        assert!(result.fully_covered);
    }

    #[test]
    fn test_lower_cloud_cover_wins() {
        let result = select(vec![
            tile("cloudy", (0.0, 0.0, 1.0, 1.0), 40.0),
            tile("clear", (0.0, 0.0, 1.0, 1.0), 2.0),
        ]);
        assert_eq!(selected_ids(&result), vec!["clear"]);
    }

    #[test]
    fn test_remaining_area_never_grows() {
        let result = select(vec![
            tile("a", (0.0, 0.0, 0.3, 1.0), 1.0),
            tile("b", (0.2, 0.0, 0.55, 0.7), 2.0),
            tile("c", (0.5, 0.5, 1.5, 1.5), 3.0),
            tile("d", (0.25, 0.0, 1.0, 0.6), 4.0),
            tile("e", (0.0, 0.0, 1.0, 1.0), 5.0),
        ]);
        let mut previous = result.aoi_area;
        for step in &result.steps {
            assert!(step.remaining_area <= previous);
            assert!(step.contributed_area > 0.0);
            previous = step.remaining_area;
        }
        assert!(result.fully_covered);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let tiles = vec![
            tile("a", (0.0, 0.0, 0.7, 0.7), 3.0),
            tile("b", (0.3, 0.3, 1.0, 1.0), 3.0),
            tile("c", (0.0, 0.5, 0.5, 1.0), 1.0),
        ];
        let ranked = rank_candidates(tiles).unwrap();
        let first = select_covering_products(&unit_square(), &ranked).unwrap();
        let second = select_covering_products(&unit_square(), &ranked).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_finite_geometry_is_an_error() {
        let ranked = rank_candidates(vec![tile("a", (0.0, 0.0, 1.0, 1.0), 1.0)]).unwrap();
        let broken = rectangle(0.0, 0.0, f64::INFINITY, 1.0);
        let result = select_covering_products(&broken, &ranked);
        assert!(matches!(result, Err(EtlError::InvalidGeometry(_))));
    }
}
