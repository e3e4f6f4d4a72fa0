use crate::candidate::CandidateProduct;
use crate::s3::{S3ObjOps, S3Object};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DownloadTask {
    pub product_id: String,
    pub band: String,
    bucket: String,
    key: String,
    pub output: PathBuf,
}

impl DownloadTask {
    pub fn new(product_id: &str, band: &str, object: S3Object, output: PathBuf) -> Self {
        DownloadTask {
            product_id: product_id.to_string(),
            band: band.to_string(),
            bucket: object.bucket,
            key: object.key,
            output,
        }
    }
}

/// A task that could not be completed. Failures never abort the plan.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DownloadItemFailure {
    pub product_id: String,
    pub band: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub completed: Vec<DownloadTask>,
    pub failures: Vec<DownloadItemFailure>,
}

impl DownloadReport {
    /// Downloaded files of `band`, in plan order.
    pub fn files_for_band(&self, band: &str) -> Vec<&DownloadTask> {
        self.completed.iter().filter(|t| t.band == band).collect()
    }
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct DownloadPlan {
    tasks: Vec<DownloadTask>,
}

impl DownloadPlan {
    /// One task per product and band, written to `<raw_dir>/<product>/<band>.tif`.
    ///
    /// Bands a product does not offer are logged and left out.
    pub fn for_products(products: &[CandidateProduct], bands: &[String], raw_dir: &Path) -> Self {
        let mut tasks = vec![];
        for product in products {
            for band in bands {
                let Some(href) = product.assets.get(band) else {
                    warn!(product = %product.id, band = %band, "Product has no asset for band");
                    continue;
                };
                match S3Object::from_url(href) {
                    Ok(object) => {
                        let output = raw_dir.join(&product.id).join(format!("{band}.tif"));
                        tasks.push(DownloadTask::new(&product.id, band, object, output));
                    }
                    Err(e) => warn!(product = %product.id, band = %band, "Unusable asset href: {e}"),
                }
            }
        }
        Self { tasks }
    }

    pub fn tasks(&self) -> &[DownloadTask] {
        &self.tasks
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Runs every task, collecting failures instead of stopping at the first one.
    pub async fn execute(&self, provider: &impl S3ObjOps) -> DownloadReport {
        let mut report = DownloadReport::default();
        for task in self.tasks.iter() {
            debug!(product = %task.product_id, band = %task.band, "Current task");
            match try_download(provider, &task.bucket, &task.key, &task.output).await {
                Ok(()) => report.completed.push(task.clone()),
                Err(e) => {
                    warn!(product = %task.product_id, band = %task.band, "Download failed: {e:#}");
                    report.failures.push(DownloadItemFailure {
                        product_id: task.product_id.clone(),
                        band: task.band.clone(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }
        info!(
            completed = report.completed.len(),
            failed = report.failures.len(),
            "Downloads finished"
        );
        report
    }
}

pub async fn try_download(
    provider: &impl S3ObjOps,
    bucket: &str,
    key: &str,
    output: &Path,
) -> Result<()> {
    // Check if the output file already exists; return early if so
    if output.exists() {
        debug!(output = %output.display(), "Output file already exists");
        return Ok(());
    }

    // Make parent directories as necessary
    let parent_dir = output
        .parent()
        .ok_or(anyhow!("Output path has no parent: {}", output.display()))?;
    if !parent_dir.exists() {
        fs::create_dir_all(parent_dir)?;
    }

    // Check if partial file exists and get its size
    let mut partial = output.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);
    let mut partial_file = OpenOptions::new()
        .read(true)
        .create(true)
        .append(true)
        .open(&partial)?;
    let mut byte_count = partial_file.metadata()?.len();

    // Get object details from S3
    let head_object = provider.head_object(bucket, key).await?;

    let total_size = head_object
        .content_length()
        .ok_or(anyhow!("Error reading size of remote object"))? as u64;

    // A partial larger than the object belongs to a different version of it
    if byte_count > total_size {
        warn!(
            key,
            partial_bytes = byte_count,
            total_size,
            "Discarding stale partial download"
        );
        partial_file.set_len(0)?;
        byte_count = 0;
    }

    let progress = (byte_count as f64 / total_size as f64) * 100.;
    if progress > 0.0 {
        info!("Resuming download from {:.2}% completion", progress);
    }

    if byte_count < total_size {
        debug!(key, "Downloading...");

        let mut response = provider
            .get_object_range(bucket, key, byte_count, total_size - 1)
            .await?;

        while let Some(bytes) = response.body.try_next().await? {
            let bytes_len = bytes.len() as u64;
            partial_file.write_all(&bytes)?;
            byte_count += bytes_len;
        }
    }

    if byte_count != total_size {
        return Err(anyhow!(
            "Incomplete download of {key}: {byte_count} of {total_size} bytes"
        ));
    }

    // Rename the file to remove .partial suffix
    fs::rename(partial, output)?;

    Ok(())
}
