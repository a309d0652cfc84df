use crate::pipeline::PipelineStage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PansharpenError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Shape mismatch in {context}: expected {expected:?} (rows, cols), found {found:?}")]
    ShapeMismatch {
        context: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid kernel: {0}")]
    InvalidKernel(String),

    #[error("Invalid clamp bounds: [{0}, {1}] (min must be below max, both finite)")]
    InvalidClampBounds(f64, f64),

    #[error("Invalid nodata value: {0}")]
    InvalidNodata(String),

    #[error("Invalid filter mode: {0} (expected 'high' or 'low')")]
    InvalidFilterMode(String),

    #[error("Input raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Band {0} does not exist (raster has {1} bands)")]
    InvalidBandIndex(usize, usize),

    #[error("Multispectral raster has no bands")]
    NoBands,

    #[error("Mosaic assembly failed: {0}")]
    AssemblyFailure(String),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid tile size: {0} (must be multiple of 16)")]
    InvalidTileSize(usize),

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),

    #[error("Run cancelled before completion")]
    Cancelled,

    #[error("Pansharpening failed while {stage}: {source}")]
    StageFailed {
        stage: PipelineStage,
        #[source]
        source: Box<PansharpenError>,
    },
}

impl PansharpenError {
    /// Stage a failed run stopped at, if the error carries one
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PansharpenError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Innermost error, skipping stage wrappers
    pub fn root_cause(&self) -> &PansharpenError {
        match self {
            PansharpenError::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, PansharpenError>;
