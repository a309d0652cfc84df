use crate::error::Result;
use crate::io::{self, RasterMetadata};
use crate::raster::Band;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk home for fused bands while a run is in progress, one GeoTIFF per
/// band index. Files are only removed through [`remove_artifact`] once the
/// mosaic is persisted; a failed run leaves them in place.
#[derive(Debug, Clone)]
pub struct SpillArena {
    dir: PathBuf,
    stem: String,
}

impl SpillArena {
    /// Arena in `dir`, naming files after the output's file stem
    pub fn new(dir: &Path, output_path: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pansharpened".to_string());

        Ok(Self {
            dir: dir.to_path_buf(),
            stem,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of band `band_index` (1-based)
    pub fn band_path(&self, band_index: usize) -> PathBuf {
        self.dir
            .join(format!("{}_band{}.tif", self.stem, band_index))
    }

    /// Write band `band_index` to its arena file and return the path
    pub fn spill(
        &self,
        band_index: usize,
        band: &Band,
        metadata: &RasterMetadata,
    ) -> Result<PathBuf> {
        let path = self.band_path(band_index);
        debug!("Spilling band {} to {}", band_index, path.display());
        io::write_single_band(&path, band, metadata, &[])?;
        Ok(path)
    }

    /// Read a spilled band back; NaN marks invalid pixels
    pub fn load(path: &Path) -> Result<Band> {
        let (band, _) = io::read_band(path, 1, None)?;
        Ok(band)
    }
}

/// Delete an intermediate file and its `.aux.xml` sidecar, if present
pub fn remove_artifact(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    let sidecar = io::sidecar_path(path);
    if sidecar.exists() {
        if let Err(e) = fs::remove_file(&sidecar) {
            warn!("Could not remove sidecar {}: {}", sidecar.display(), e);
        }
    }
    Ok(())
}
