use crate::cog::OutputOptions;
use crate::error::{PansharpenError, Result};
use crate::filter::SpatialFilter;
use crate::fuse::ClampBounds;
use crate::kernel::Kernel;
use crate::pipeline::{BandStorage, PansharpenConfig};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hpf-pansharpen")]
#[command(about = "Fuse a multispectral raster with a panchromatic band using High-Pass Filter pansharpening")]
#[command(version)]
pub struct Args {
    /// Panchromatic GeoTIFF path (band 1 is used)
    #[arg(short, long, value_name = "FILE")]
    pub pan: String,

    /// Multispectral GeoTIFF path, already resampled to the panchromatic grid
    #[arg(short, long, value_name = "FILE")]
    pub mul: String,

    /// Output GeoTIFF path (multi-band float32)
    #[arg(short, long, value_name = "FILE")]
    pub output: String,

    /// Nodata value to honor and emit, or "unknown" to use each input's own
    #[arg(long, value_name = "VALUE", default_value = "unknown", allow_hyphen_values = true)]
    pub nodata: String,

    /// Spatial component filter: "high" (5x5 high-pass) or "low" (3x3 mean minus pan)
    #[arg(short, long, value_name = "MODE", default_value = "high")]
    pub filter_mode: String,

    /// Kernel override, rows separated by ';' with optional "/divisor", e.g. "1,1,1;1,1,1;1,1,1/9"
    #[arg(short, long, value_name = "WEIGHTS")]
    pub kernel: Option<String>,

    /// Fused values at or below this are set to nodata
    #[arg(long, value_name = "VALUE", default_value_t = 0.0, allow_hyphen_values = true)]
    pub clamp_min: f64,

    /// Fused values above this are set to nodata
    #[arg(long, value_name = "VALUE", default_value_t = 1.0, allow_hyphen_values = true)]
    pub clamp_max: f64,

    /// Spill fused bands to this directory instead of keeping them in memory
    #[arg(long, value_name = "DIR")]
    pub spill_dir: Option<String>,

    /// Output compression (DEFLATE, LZW, ZSTD, NONE)
    #[arg(long, value_name = "TYPE", default_value = "DEFLATE")]
    pub compression: String,

    /// Write tiled output with this block size (multiple of 16)
    #[arg(long, value_name = "PIXELS")]
    pub tile_size: Option<usize>,

    /// Build internal overviews
    #[arg(long)]
    pub overviews: bool,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Validate the flags and turn them into a run configuration
    pub fn to_config(&self) -> Result<PansharpenConfig> {
        let kernel = self
            .kernel
            .as_deref()
            .map(str::parse::<Kernel>)
            .transpose()?;

        let storage = match &self.spill_dir {
            Some(dir) => BandStorage::Spill(PathBuf::from(dir)),
            None => BandStorage::InMemory,
        };

        Ok(PansharpenConfig {
            filter: self.filter_mode.parse::<SpatialFilter>()?,
            kernel,
            nodata: parse_nodata(&self.nodata)?,
            clamp: ClampBounds::new(self.clamp_min, self.clamp_max)?,
            storage,
            output: OutputOptions::new(&self.compression, self.tile_size, self.overviews)?,
        })
    }
}

/// "unknown" (any case) means no explicit sentinel
pub fn parse_nodata(value: &str) -> Result<Option<f64>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("unknown") {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|_| PansharpenError::InvalidNodata(value.to_string()))
}
