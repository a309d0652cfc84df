use crate::error::{PansharpenError, Result};
use crate::mask::NoDataMask;
use ndarray::Array2;

/// A single raster band: Float32 samples plus the validity of each pixel
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    data: Array2<f32>,
    mask: NoDataMask,
}

impl Band {
    pub fn new(data: Array2<f32>, mask: NoDataMask) -> Result<Self> {
        if data.dim() != mask.dim() {
            return Err(PansharpenError::ShapeMismatch {
                context: "band mask".to_string(),
                expected: data.dim(),
                found: mask.dim(),
            });
        }
        Ok(Self { data, mask })
    }

    /// Derive validity from the samples themselves (sentinel and NaN)
    pub fn from_samples(data: Array2<f32>, nodata: Option<f64>) -> Self {
        let mask = NoDataMask::from_samples(&data, nodata);
        Self { data, mask }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn mask(&self) -> &NoDataMask {
        &self.mask
    }

    /// Sample at (row, col), or None where the pixel is invalid
    pub fn value(&self, row: usize, col: usize) -> Option<f32> {
        if self.mask.is_valid(row, col) {
            Some(self.data[[row, col]])
        } else {
            None
        }
    }

    pub fn invalid_count(&self) -> usize {
        self.mask.invalid_count()
    }

    /// Samples with invalid pixels written as `nodata` (NaN when None)
    pub fn encoded(&self, nodata: Option<f64>) -> Array2<f32> {
        self.mask.encode(&self.data, nodata)
    }
}

/// Fail with ShapeMismatch unless `found` matches `expected`
pub fn ensure_same_shape(
    context: &str,
    expected: (usize, usize),
    found: (usize, usize),
) -> Result<()> {
    if expected != found {
        return Err(PansharpenError::ShapeMismatch {
            context: context.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}
