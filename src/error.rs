//! Error types for the tiling pipeline

use std::path::PathBuf;

/// Errors from the rasterization engine
#[derive(Debug, thiserror::Error)]
pub enum RasterizationError {
    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[error("page {page} does not exist (document has {page_count} pages)")]
    PageOutOfRange { page: usize, page_count: usize },

    #[error("resize: {0}")]
    Resize(String),

    #[error("{detail}")]
    Generic { detail: String },
}

impl RasterizationError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Errors from the asset serializer
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("texture encoding: {0}")]
    Texture(#[from] image::ImageError),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("asset {address:?} was committed without geometry")]
    EmptyAsset { address: String },
}

/// Top-level pipeline error
#[derive(Debug, thiserror::Error)]
pub enum TilerError {
    #[error("configuration: {0}")]
    Configuration(String),

    #[error("rasterizing page {page} at density {density}: {source}")]
    Rasterization {
        page: usize,
        density: f64,
        #[source]
        source: RasterizationError,
    },

    #[error("serialization: {0}")]
    Serialization(#[from] SerializationError),

    /// Two tiles mapped to one address. Never expected on valid input.
    #[error("address collision at {address:?}: {detail}")]
    AddressCollision { address: String, detail: String },

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TilerError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

pub type Result<T, E = TilerError> = std::result::Result<T, E>;
