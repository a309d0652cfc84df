use crate::error::{PansharpenError, Result};
use crate::kernel::Kernel;
use crate::mask::NoDataMask;
use crate::raster::Band;
use log::{debug, info};
use ndarray::{Array2, Zip};
use std::fmt;
use std::str::FromStr;

/// How the spatial (detail) component is extracted from the panchromatic band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpatialFilter {
    /// Convolve with a high-pass kernel; the result is the component itself
    #[default]
    HighPass,
    /// Convolve with a low-pass kernel, then subtract the panchromatic band
    /// (`lowpass - pan`, Amro et al., 2011)
    LowPassDifference,
}

impl SpatialFilter {
    /// Kernel used when no override is configured
    pub fn default_kernel(&self) -> Kernel {
        match self {
            SpatialFilter::HighPass => Kernel::high_pass(),
            SpatialFilter::LowPassDifference => Kernel::low_pass(),
        }
    }

    pub fn extract(&self, pan: &Band, kernel: &Kernel) -> Result<Band> {
        info!(
            "Extracting spatial component ({}, {}x{} kernel)",
            self,
            kernel.size(),
            kernel.size()
        );

        let spatial = match self {
            SpatialFilter::HighPass => convolve(pan, kernel)?,
            SpatialFilter::LowPassDifference => {
                let low_pass = convolve(pan, kernel)?;
                subtract(&low_pass, pan)?
            }
        };

        debug!(
            "Spatial component has {} invalid pixels of {}",
            spatial.invalid_count(),
            spatial.data().len()
        );
        Ok(spatial)
    }
}

impl fmt::Display for SpatialFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialFilter::HighPass => write!(f, "high"),
            SpatialFilter::LowPassDifference => write!(f, "low"),
        }
    }
}

impl FromStr for SpatialFilter {
    type Err = PansharpenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(SpatialFilter::HighPass),
            "low" => Ok(SpatialFilter::LowPassDifference),
            other => Err(PansharpenError::InvalidFilterMode(other.to_string())),
        }
    }
}

/// Extract the spatial component of `pan`, falling back to the mode's default kernel
pub fn extract_spatial_component(
    pan: &Band,
    kernel: Option<&Kernel>,
    mode: SpatialFilter,
) -> Result<Band> {
    match kernel {
        Some(kernel) => mode.extract(pan, kernel),
        None => mode.extract(pan, &mode.default_kernel()),
    }
}

/// 2D convolution of `band` with `kernel`.
///
/// A pixel is invalid when any pixel of its window is invalid or falls
/// outside the raster, so a border of `kernel.radius()` pixels is always
/// invalid. Weighted sums are accumulated in f64.
pub fn convolve(band: &Band, kernel: &Kernel) -> Result<Band> {
    let dim = band.dim();
    let mut data = Array2::<f32>::from_elem(dim, f32::NAN);
    let mut valid = Array2::<bool>::from_elem(dim, false);

    Zip::indexed(&mut data)
        .and(&mut valid)
        .par_for_each(|(row, col), out, ok| {
            if let Some(value) = convolve_pixel(band, kernel, row, col) {
                *out = value;
                *ok = true;
            }
        });

    Band::new(data, NoDataMask::from_validity(valid))
}

/// Weighted sum of the window centered at (row, col); None if the window is
/// not fully inside the raster or holds an invalid pixel
fn convolve_pixel(band: &Band, kernel: &Kernel, row: usize, col: usize) -> Option<f32> {
    let (nrows, ncols) = band.dim();
    let radius = kernel.radius();

    if row < radius || col < radius || row + radius >= nrows || col + radius >= ncols {
        return None;
    }

    let data = band.data();
    let mask = band.mask();
    let weights = kernel.weights();
    let size = kernel.size();
    let mut acc = 0.0f64;

    // Kernel is flipped: weight (kr, kc) meets sample (row + r - kr, col + r - kc)
    for kr in 0..size {
        for kc in 0..size {
            let r = row + radius - kr;
            let c = col + radius - kc;
            if !mask.is_valid(r, c) {
                return None;
            }
            acc += weights[[kr, kc]] * data[[r, c]] as f64;
        }
    }

    Some(acc as f32)
}

/// Pointwise `a - b`, invalid wherever either side is invalid
fn subtract(a: &Band, b: &Band) -> Result<Band> {
    crate::raster::ensure_same_shape("low-pass difference", a.dim(), b.dim())?;

    let mask = a.mask().and(b.mask());
    let data = Zip::from(a.data())
        .and(b.data())
        .and(mask.validity())
        .map_collect(|&x, &y, &valid| if valid { x - y } else { f32::NAN });

    Band::new(data, mask)
}
