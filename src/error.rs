use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Unable to load geometry from {path}: {reason}")]
    GeometryLoad { path: PathBuf, reason: String },

    #[error("No candidate products found for '{0}'")]
    EmptyCandidateSet(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Raster processing failed for {path}: {reason}")]
    RasterProcessing { path: PathBuf, reason: String },
}

impl EtlError {
    pub fn geometry_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::GeometryLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn raster(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::RasterProcessing {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type EtlResult<T> = std::result::Result<T, EtlError>;
