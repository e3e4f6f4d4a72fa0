//! Per-AOI extraction: search, select, download, crop, merge and composite.

use crate::candidate::{rank_candidates, CandidateProduct};
use crate::catalog::{Catalog, SearchWindow};
use crate::config::{RunConfig, BLUE, GREEN, RED};
use crate::coverage::{select_covering_products, CoverageGapWarning, CoverageResult, CoverageStep};
use crate::download_plan::{DownloadItemFailure, DownloadPlan};
use crate::error::EtlError;
use crate::footprint::{load_aoi, AreaOfInterest};
use crate::raster::{self, Cropper};
use crate::s3::S3ObjOps;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Directory tree of one AOI inside the output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    pub fn new(output_dir: &Path, aoi_name: &str) -> Self {
        Self {
            root: output_dir.join(aoi_name),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn cropped(&self, band: &str) -> PathBuf {
        self.root.join("cropped").join(band)
    }

    pub fn merged(&self, band: &str) -> PathBuf {
        self.root.join("merged").join(format!("{band}.tif"))
    }

    pub fn results(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn download_plan(&self) -> PathBuf {
        self.root.join("download_plan.json")
    }

    pub fn coverage(&self) -> PathBuf {
        self.root.join("coverage.json")
    }

    /// Removes the downloaded and cropped rasters.
    pub fn remove_intermediate(&self) -> Result<()> {
        for dir in [self.raw(), self.root.join("cropped")] {
            if dir.exists() {
                fs::remove_dir_all(&dir)
                    .with_context(|| format!("Unable to remove {}", dir.display()))?;
            }
        }
        Ok(())
    }
}

/// Contents of `coverage.json`.
#[derive(Serialize)]
struct CoverageSummary<'a> {
    aoi: &'a str,
    fully_covered: bool,
    aoi_area: f64,
    remaining_area: f64,
    candidates_considered: usize,
    coverage_gap: Option<CoverageGapWarning>,
    steps: &'a [CoverageStep],
    selected: &'a [CandidateProduct],
}

impl<'a> CoverageSummary<'a> {
    fn new(aoi: &'a str, result: &'a CoverageResult<CandidateProduct>) -> Self {
        Self {
            aoi,
            fully_covered: result.fully_covered,
            aoi_area: result.aoi_area,
            remaining_area: result.remaining_area,
            candidates_considered: result.candidates_considered,
            coverage_gap: result.coverage_gap(),
            steps: &result.steps,
            selected: &result.selected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AoiReport {
    pub name: String,
    pub selected: Vec<String>,
    pub fully_covered: bool,
    pub coverage_gap: Option<CoverageGapWarning>,
    pub download_failures: Vec<DownloadItemFailure>,
    /// Files written to the results directory.
    pub results: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AoiFailure {
    pub aoi: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub completed: Vec<AoiReport>,
    pub failures: Vec<AoiFailure>,
}

pub struct Pipeline<C, S> {
    catalog: C,
    store: S,
    config: RunConfig,
    window: SearchWindow,
}

impl<C: Catalog, S: S3ObjOps> Pipeline<C, S> {
    pub fn new(catalog: C, store: S, config: RunConfig, window: SearchWindow) -> Self {
        Self {
            catalog,
            store,
            config,
            window,
        }
    }

    pub async fn process_aoi(&self, aoi: &AreaOfInterest) -> Result<AoiReport> {
        info!(aoi = %aoi.name, "Searching catalog");
        let products = self.catalog.query(&aoi.geometry, &self.window).await?;
        if products.is_empty() {
            return Err(EtlError::EmptyCandidateSet(aoi.name.clone()).into());
        }
        let ranked = rank_candidates(products)?;
        let coverage = select_covering_products(&aoi.geometry, &ranked)?;
        info!(
            aoi = %aoi.name,
            candidates = ranked.len(),
            selected = coverage.selected.len(),
            "Selected products"
        );
        let coverage_gap = coverage.coverage_gap();
        if let Some(gap) = coverage_gap {
            warn!(
                aoi = %aoi.name,
                uncovered_fraction = gap.uncovered_fraction,
                "Available products do not fully cover the AOI"
            );
        }

        let layout = RunLayout::new(&self.config.output_dir, &aoi.name);
        fs::create_dir_all(layout.root())?;
        let summary = serde_json::to_string_pretty(&CoverageSummary::new(&aoi.name, &coverage))?;
        fs::write(layout.coverage(), summary)?;

        let plan = DownloadPlan::for_products(&coverage.selected, &self.config.bands, &layout.raw());
        plan.write(layout.download_plan())?;
        let downloads = plan.execute(&self.store).await;

        let results_dir = layout.results();
        fs::create_dir_all(&results_dir)?;
        let mut results = vec![];
        let mut cropper = Cropper::new(aoi);
        let grid = raster::aoi_grid(aoi, self.config.resolution)
            .map_err(|e| EtlError::raster(layout.root(), e))?;
        debug!(aoi = %aoi.name, epsg = grid.epsg, "Mosaic grid");
        for band in self.config.bands.iter() {
            let mut crops = vec![];
            for task in downloads.files_for_band(band) {
                let destination = layout.cropped(band).join(format!("{}.tif", task.product_id));
                if cropper.crop(&task.output, &destination)?.is_some() {
                    crops.push(destination);
                }
            }
            debug!(band = %band, crops = crops.len(), "Cropped band");

            let merged = layout.merged(band);
            if raster::merge_band(&crops, &grid, &merged)?.is_none() {
                warn!(aoi = %aoi.name, band = %band, "No data for band");
                continue;
            }
            let result = results_dir.join(format!("{band}.tif"));
            fs::copy(&merged, &result)?;
            results.push(result);
        }

        if self.config.tci {
            let [red, green, blue] = [RED, GREEN, BLUE].map(|band| layout.merged(band));
            if red.exists() && green.exists() && blue.exists() {
                let tci = results_dir.join("tci.tif");
                raster::true_color(&red, &green, &blue, &tci)?;
                results.push(tci);
            } else {
                warn!(aoi = %aoi.name, "Skipping true color image, a colour band is missing");
            }
        }

        if !self.config.keep_intermediate {
            layout.remove_intermediate()?;
        }
        info!(aoi = %aoi.name, results = results.len(), "Finished AOI");

        Ok(AoiReport {
            name: aoi.name.clone(),
            selected: coverage.selected.iter().map(|p| p.id.clone()).collect(),
            fully_covered: coverage.fully_covered,
            coverage_gap,
            download_failures: downloads.failures,
            results,
        })
    }

    async fn process_path(&self, path: &Path) -> Result<AoiReport> {
        let aoi = load_aoi(path)?;
        self.process_aoi(&aoi).await
    }

    /// Processes every AOI file in turn.
    ///
    /// A single AOI's failure is returned as the error of the batch. With
    /// several AOIs, failures are logged and collected and the batch goes on.
    pub async fn run_batch(&self, aois: &[PathBuf]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        if let [single] = aois {
            report.completed.push(self.process_path(single).await?);
            return Ok(report);
        }

        for path in aois {
            match self.process_path(path).await {
                Ok(aoi_report) => report.completed.push(aoi_report),
                Err(e) => {
                    error!(aoi = %path.display(), "Processing failed: {e:#}");
                    report.failures.push(AoiFailure {
                        aoi: path.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
        info!(
            completed = report.completed.len(),
            failed = report.failures.len(),
            "Batch finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let layout = RunLayout::new(Path::new("data"), "budapest");
        assert_eq!(layout.root(), Path::new("data/budapest"));
        assert_eq!(layout.raw(), PathBuf::from("data/budapest/raw"));
        assert_eq!(layout.cropped("red"), PathBuf::from("data/budapest/cropped/red"));
        assert_eq!(layout.merged("red"), PathBuf::from("data/budapest/merged/red.tif"));
        assert_eq!(layout.results(), PathBuf::from("data/budapest/results"));
    }

    #[test]
    fn test_remove_intermediate() {
        let dir = tempfile::tempdir().unwrap();
        let layout = RunLayout::new(dir.path(), "aoi");
        fs::create_dir_all(layout.raw().join("p")).unwrap();
        fs::create_dir_all(layout.cropped("red")).unwrap();
        fs::create_dir_all(layout.results()).unwrap();

        layout.remove_intermediate().unwrap();
        assert!(!layout.raw().exists());
        assert!(!layout.root().join("cropped").exists());
        assert!(layout.results().exists());
    }
}
