#![allow(async_fn_in_trait)]
pub mod candidate;
pub mod catalog;
pub mod config;
pub mod coverage;
pub mod download_plan;
pub mod element84;
pub mod error;
pub mod footprint;
pub mod geometry;
pub mod logging;
pub mod pipeline;
pub mod projection;
pub mod publish;
pub mod raster;
pub mod s3;
pub mod shp;

pub use candidate::{rank_candidates, CandidateProduct, Footprint, RankedCandidates};
pub use coverage::{select_covering_products, CoverageGapWarning, CoverageResult};
pub use error::{EtlError, EtlResult};
