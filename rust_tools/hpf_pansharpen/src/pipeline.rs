use crate::cog::OutputOptions;
use crate::error::{PansharpenError, Result};
use crate::filter::SpatialFilter;
use crate::fuse::{BandFuser, ClampBounds};
use crate::io::{self, RasterMetadata};
use crate::kernel::Kernel;
use crate::mosaic::{FusedBand, MosaicAssembler};
use crate::raster::{ensure_same_shape, Band};
use crate::spill::SpillArena;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Where a run currently is; errors report the stage they happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    LoadingPan,
    ComputingSpatial,
    /// 1-based band index
    FusingBand(usize),
    Assembling,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Idle => write!(f, "idle"),
            PipelineStage::LoadingPan => write!(f, "loading the panchromatic raster"),
            PipelineStage::ComputingSpatial => write!(f, "computing the spatial component"),
            PipelineStage::FusingBand(k) => write!(f, "fusing band {}", k),
            PipelineStage::Assembling => write!(f, "assembling the mosaic"),
            PipelineStage::Done => write!(f, "done"),
            PipelineStage::Failed => write!(f, "failed"),
        }
    }
}

/// Cooperative cancellation, checked between bands
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Where fused bands wait until the mosaic is written
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BandStorage {
    #[default]
    InMemory,
    /// One intermediate GeoTIFF per band in this directory
    Spill(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PansharpenConfig {
    pub filter: SpatialFilter,
    /// Overrides the filter's default kernel
    pub kernel: Option<Kernel>,
    /// Sentinel honored on input and written on output; None uses each
    /// input's declared value and writes NaN
    pub nodata: Option<f64>,
    pub clamp: ClampBounds,
    pub storage: BandStorage,
    pub output: OutputOptions,
}

impl Default for PansharpenConfig {
    fn default() -> Self {
        Self {
            filter: SpatialFilter::HighPass,
            kernel: None,
            nodata: None,
            clamp: ClampBounds::default(),
            storage: BandStorage::InMemory,
            output: OutputOptions::default(),
        }
    }
}

impl PansharpenConfig {
    pub fn kernel(&self) -> Kernel {
        self.kernel
            .clone()
            .unwrap_or_else(|| self.filter.default_kernel())
    }
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq)]
pub struct MosaicSummary {
    pub path: PathBuf,
    pub band_count: usize,
    pub width: usize,
    pub height: usize,
    pub invalid_pixels: Vec<usize>,
}

/// Panchromatic raster and its spatial component, shared read-only by every band
struct PanInputs {
    pan: Band,
    spatial: Band,
    metadata: RasterMetadata,
}

pub struct Pansharpener {
    config: PansharpenConfig,
    cancel: CancellationToken,
    stage: PipelineStage,
}

impl Pansharpener {
    pub fn new(config: PansharpenConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            stage: PipelineStage::Idle,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Pansharpen `mul_path` with `pan_path` into `output_path`.
    ///
    /// Errors are wrapped in `StageFailed` naming the stage that failed.
    /// Spilled intermediates are deleted only after the mosaic is written.
    pub fn run(
        &mut self,
        pan_path: &Path,
        mul_path: &Path,
        output_path: &Path,
    ) -> Result<MosaicSummary> {
        match self.execute(pan_path, mul_path, output_path) {
            Ok(summary) => {
                self.transition(PipelineStage::Done);
                Ok(summary)
            }
            Err(e) => {
                let error = match e {
                    e @ PansharpenError::StageFailed { .. } => e,
                    other => PansharpenError::StageFailed {
                        stage: self.stage,
                        source: Box::new(other),
                    },
                };
                warn!("{}", error);
                self.stage = PipelineStage::Failed;
                Err(error)
            }
        }
    }

    fn transition(&mut self, stage: PipelineStage) {
        debug!("Pipeline stage: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn execute(
        &mut self,
        pan_path: &Path,
        mul_path: &Path,
        output_path: &Path,
    ) -> Result<MosaicSummary> {
        self.transition(PipelineStage::LoadingPan);
        info!("Reading panchromatic raster: {}", pan_path.display());
        let (pan, pan_meta) = io::read_band(pan_path, 1, self.config.nodata)?;
        info!(
            "Raster size: {}x{}, pixel size {}x{}",
            pan_meta.width, pan_meta.height, pan_meta.pixel_width, pan_meta.pixel_height
        );
        debug!("Panchromatic bbox: {:?}", pan_meta.bbox());

        self.transition(PipelineStage::ComputingSpatial);
        let spatial = self.config.filter.extract(&pan, &self.config.kernel())?;

        let inputs = PanInputs {
            pan,
            spatial,
            metadata: pan_meta,
        };

        self.transition(PipelineStage::FusingBand(1));
        let mul_meta = io::read_metadata(mul_path)?;
        ensure_same_shape(
            "multispectral vs panchromatic",
            inputs.metadata.dim(),
            mul_meta.dim(),
        )?;
        if !inputs.metadata.same_geotransform(&mul_meta) {
            warn!(
                "Geotransforms differ (pan {:?}, mul {:?}); assuming inputs are co-registered",
                inputs.metadata.geotransform, mul_meta.geotransform
            );
        }
        debug!("Multispectral bbox: {:?}", mul_meta.bbox());

        let arena = match &self.config.storage {
            BandStorage::InMemory => None,
            BandStorage::Spill(dir) => Some(SpillArena::new(dir, output_path)?),
        };

        let band_count = mul_meta.band_count;
        info!(
            "Start pansharpening {} ({} bands)",
            mul_path.display(),
            band_count
        );

        // Collect keeps input order whatever order workers finish in
        let this = &*self;
        let fused: Vec<FusedBand> = (1..=band_count)
            .into_par_iter()
            .map(|band_index| {
                this.fuse_band(mul_path, band_index, band_count, &inputs, arena.as_ref())
                    .map_err(|e| PansharpenError::StageFailed {
                        stage: PipelineStage::FusingBand(band_index),
                        source: Box::new(e),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        self.transition(PipelineStage::Assembling);
        if self.cancel.is_cancelled() {
            return Err(PansharpenError::Cancelled);
        }

        let assembler = MosaicAssembler::new(self.config.nodata);
        let mosaic = assembler.assemble(fused)?;
        assembler.persist(&mosaic, output_path, &inputs.metadata, &self.config.output)?;
        mosaic.release_intermediates();

        let (height, width) = mosaic.dim();
        Ok(MosaicSummary {
            path: output_path.to_path_buf(),
            band_count: mosaic.band_count(),
            width,
            height,
            invalid_pixels: mosaic.invalid_counts(),
        })
    }

    /// Load, fuse and store one multispectral band
    fn fuse_band(
        &self,
        mul_path: &Path,
        band_index: usize,
        band_count: usize,
        inputs: &PanInputs,
        arena: Option<&SpillArena>,
    ) -> Result<FusedBand> {
        if self.cancel.is_cancelled() {
            return Err(PansharpenError::Cancelled);
        }

        let (mul, _) = io::read_band(mul_path, band_index, self.config.nodata)?;
        info!(
            "..Band {}/{}, shape {:?}",
            band_index,
            band_count,
            mul.dim()
        );

        let fused = BandFuser::new(self.config.clamp).fuse(&mul, &inputs.pan, &inputs.spatial)?;
        drop(mul);

        match arena {
            None => Ok(FusedBand::InMemory(fused)),
            Some(arena) => {
                let path = arena.spill(band_index, &fused, &inputs.metadata)?;
                Ok(FusedBand::Spilled {
                    path,
                    dim: fused.dim(),
                    invalid: fused.invalid_count(),
                })
            }
        }
    }
}
