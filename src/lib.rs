//! Converts paginated documents into multi-resolution quadtree tile pyramids.
//!
//! Each page is rasterized at halving densities, every raster is cut into
//! square tiles, every tile becomes a textured glTF quad, and tiles are
//! bundled into group assets keyed by address prefix so a viewer can load
//! coarse detail first and refine on demand.

pub mod asset;
pub mod config;
pub mod error;
pub mod manifest;
pub mod panic_handler;
pub mod pipeline;
pub mod pyramid;
pub mod raster;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{Args, TilerConfig};
pub use error::{RasterizationError, SerializationError, TilerError};
pub use pipeline::{PipelineReport, run_pipeline, run_pipeline_with_sink};
