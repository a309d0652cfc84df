// Library exports for testing and reuse

pub mod cli;
pub mod cog;
pub mod error;
pub mod filter;
pub mod fuse;
pub mod io;
pub mod kernel;
pub mod mask;
pub mod mosaic;
pub mod pipeline;
pub mod raster;
pub mod spill;

// Re-export commonly used types
pub use error::{PansharpenError, Result};
pub use filter::{extract_spatial_component, SpatialFilter};
pub use fuse::{BandFuser, ClampBounds};
pub use kernel::Kernel;
pub use mask::NoDataMask;
pub use mosaic::{FusedBand, Mosaic, MosaicAssembler};
pub use pipeline::{
    BandStorage, CancellationToken, MosaicSummary, PansharpenConfig, Pansharpener, PipelineStage,
};
pub use raster::Band;
