use crate::error::{PansharpenError, Result};
use gdal::Dataset;
use log::{debug, info};

/// GeoTIFF layout of the written mosaic
#[derive(Debug, Clone, PartialEq)]
pub struct OutputOptions {
    pub compression: String,
    /// Tiled output with square blocks of this size; striped when None
    pub tile_size: Option<usize>,
    pub overviews: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            compression: "DEFLATE".to_string(),
            tile_size: None,
            overviews: false,
        }
    }
}

impl OutputOptions {
    pub fn new(compression: &str, tile_size: Option<usize>, overviews: bool) -> Result<Self> {
        let compression = compression.to_ascii_uppercase();
        validate_compression(&compression)?;
        if let Some(size) = tile_size {
            validate_tile_size(size)?;
        }
        Ok(Self {
            compression,
            tile_size,
            overviews,
        })
    }

    pub fn creation_options(&self) -> Vec<String> {
        create_dataset_options(&self.compression, self.tile_size)
    }
}

/// Validate compression type
pub fn validate_compression(compression: &str) -> Result<()> {
    let valid_types = ["DEFLATE", "LZW", "ZSTD", "NONE"];
    if !valid_types.contains(&compression) {
        return Err(PansharpenError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

/// Validate tile size (must be multiple of 16)
pub fn validate_tile_size(tile_size: usize) -> Result<()> {
    if tile_size == 0 || tile_size % 16 != 0 {
        return Err(PansharpenError::InvalidTileSize(tile_size));
    }
    Ok(())
}

/// GTiff creation options for Float32 output
pub fn create_dataset_options(compression: &str, tile_size: Option<usize>) -> Vec<String> {
    let mut options = vec![format!("COMPRESS={}", compression)];

    // Floating point predictor
    if compression != "NONE" {
        options.push("PREDICTOR=3".to_string());
    }

    if let Some(size) = tile_size {
        options.push("TILED=YES".to_string());
        options.push(format!("BLOCKXSIZE={}", size));
        options.push(format!("BLOCKYSIZE={}", size));
    }

    options.push("BIGTIFF=IF_SAFER".to_string());
    options
}

/// Power-of-two overview factors, stopping once the smaller side drops below 256
pub fn overview_levels(width: usize, height: usize) -> Vec<i32> {
    let min_dim = width.min(height);
    let mut levels = Vec::new();
    let mut level = 2;

    while (min_dim / level) >= 256 {
        levels.push(level as i32);
        level *= 2;
    }
    levels
}

/// Build internal overviews with AVERAGE resampling
pub fn build_overviews(dataset: &mut Dataset) -> Result<()> {
    let (width, height) = dataset.raster_size();
    let levels = overview_levels(width as usize, height as usize);

    if levels.is_empty() {
        debug!("Raster too small for overviews ({}x{}), skipping", width, height);
        return Ok(());
    }

    info!("Creating {} overview levels: {:?}", levels.len(), levels);

    // Empty bands list means build for all bands
    dataset.build_overviews("AVERAGE", &levels, &[]).map_err(|e| {
        PansharpenError::AssemblyFailure(format!("Failed to build overviews: {}", e))
    })?;

    Ok(())
}
