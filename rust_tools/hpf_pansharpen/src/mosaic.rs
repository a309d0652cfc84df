use crate::cog::{self, OutputOptions};
use crate::error::{PansharpenError, Result};
use crate::io::{self, RasterMetadata};
use crate::raster::{ensure_same_shape, Band};
use crate::spill::{self, SpillArena};
use log::{debug, info, warn};
use ndarray::{Array2, Array3, Axis};
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

/// A fused band waiting to be assembled
#[derive(Debug, Clone)]
pub enum FusedBand {
    InMemory(Band),
    /// Written to an intermediate file; shape and invalid count recorded at spill time
    Spilled {
        path: PathBuf,
        dim: (usize, usize),
        invalid: usize,
    },
}

impl FusedBand {
    pub fn dim(&self) -> (usize, usize) {
        match self {
            FusedBand::InMemory(band) => band.dim(),
            FusedBand::Spilled { dim, .. } => *dim,
        }
    }

    pub fn invalid_count(&self) -> usize {
        match self {
            FusedBand::InMemory(band) => band.invalid_count(),
            FusedBand::Spilled { invalid, .. } => *invalid,
        }
    }

    pub fn load(&self) -> Result<Cow<'_, Band>> {
        match self {
            FusedBand::InMemory(band) => Ok(Cow::Borrowed(band)),
            FusedBand::Spilled { path, .. } => SpillArena::load(path).map(Cow::Owned),
        }
    }

    pub fn intermediate_path(&self) -> Option<&Path> {
        match self {
            FusedBand::InMemory(_) => None,
            FusedBand::Spilled { path, .. } => Some(path.as_path()),
        }
    }
}

/// Ordered stack of fused bands sharing one grid
#[derive(Debug)]
pub struct Mosaic {
    bands: Vec<FusedBand>,
    nodata: Option<f64>,
}

impl Mosaic {
    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn dim(&self) -> (usize, usize) {
        self.bands[0].dim()
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Band at 0-based `index`, loaded from disk if it was spilled
    pub fn band(&self, index: usize) -> Result<Cow<'_, Band>> {
        self.bands
            .get(index)
            .ok_or(PansharpenError::InvalidBandIndex(index + 1, self.bands.len()))?
            .load()
    }

    /// Band samples with invalid pixels written as the mosaic's no-data value
    pub fn encoded_band(&self, index: usize) -> Result<Array2<f32>> {
        Ok(self.band(index)?.encoded(self.nodata))
    }

    /// All bands encoded and stacked as (band, row, col)
    pub fn to_array3(&self) -> Result<Array3<f32>> {
        let encoded = (0..self.bands.len())
            .map(|i| self.encoded_band(i))
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<_> = encoded.iter().map(|band| band.view()).collect();
        Ok(ndarray::stack(Axis(0), &views)?)
    }

    pub fn invalid_counts(&self) -> Vec<usize> {
        self.bands.iter().map(FusedBand::invalid_count).collect()
    }

    pub fn intermediate_paths(&self) -> Vec<&Path> {
        self.bands
            .iter()
            .filter_map(FusedBand::intermediate_path)
            .collect()
    }

    /// Delete every spilled band file and its sidecar. Call only after the
    /// mosaic has been persisted. A file that cannot be removed is logged and
    /// skipped; returns how many were removed.
    pub fn release_intermediates(&self) -> usize {
        let paths = self.intermediate_paths();
        let mut removed = 0;
        for path in &paths {
            match spill::remove_artifact(path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not remove intermediate {}: {}", path.display(), e),
            }
        }
        if !paths.is_empty() {
            info!("Removed {}/{} intermediate band files", removed, paths.len());
        }
        removed
    }
}

/// Stacks fused bands into a mosaic and writes it out
#[derive(Debug, Clone, Copy, Default)]
pub struct MosaicAssembler {
    nodata: Option<f64>,
}

impl MosaicAssembler {
    /// `nodata` is the sentinel written for invalid pixels; None writes NaN
    pub fn new(nodata: Option<f64>) -> Self {
        Self { nodata }
    }

    /// Keep the given order; every band must have the first band's shape
    pub fn assemble(&self, bands: Vec<FusedBand>) -> Result<Mosaic> {
        let first = bands
            .first()
            .ok_or_else(|| PansharpenError::AssemblyFailure("no bands to assemble".to_string()))?
            .dim();

        for (i, band) in bands.iter().enumerate() {
            ensure_same_shape(&format!("mosaic band {}", i + 1), first, band.dim())?;
        }

        debug!("Assembled {} bands of {}x{}", bands.len(), first.1, first.0);
        Ok(Mosaic {
            bands,
            nodata: self.nodata,
        })
    }

    /// Write the mosaic as a multi-band GTiff. On failure the partial output
    /// file is removed and intermediates are left untouched.
    pub fn persist(
        &self,
        mosaic: &Mosaic,
        path: &Path,
        metadata: &RasterMetadata,
        output: &OutputOptions,
    ) -> Result<()> {
        ensure_same_shape("mosaic vs output grid", metadata.dim(), mosaic.dim())?;

        match write_mosaic(mosaic, path, metadata, output) {
            Ok(()) => {
                info!(
                    "Successfully wrote {} bands to {}",
                    mosaic.band_count(),
                    path.display()
                );
                Ok(())
            }
            Err(e) => {
                if path.exists() {
                    warn!("Removing partially written mosaic {}", path.display());
                    if let Err(rm) = fs::remove_file(path) {
                        warn!("Could not remove {}: {}", path.display(), rm);
                    }
                }
                Err(PansharpenError::AssemblyFailure(format!(
                    "writing {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
}

fn write_mosaic(
    mosaic: &Mosaic,
    path: &Path,
    metadata: &RasterMetadata,
    output: &OutputOptions,
) -> Result<()> {
    let mut dataset = io::create_output_dataset(
        path,
        metadata,
        mosaic.band_count(),
        &output.creation_options(),
    )?;

    for i in 0..mosaic.band_count() {
        let band_index = i + 1;
        info!("..Write band {}/{}", band_index, mosaic.band_count());
        let encoded = mosaic.encoded_band(i)?;
        io::write_band(
            &mut dataset,
            band_index,
            &encoded,
            mosaic.nodata(),
            &format!("band_{:02}", band_index),
        )?;
    }

    if output.overviews {
        cog::build_overviews(&mut dataset)?;
    }

    // Deferred strip writes surface here; closing on drop would swallow them
    dataset.flush_cache()?;
    Ok(())
}
