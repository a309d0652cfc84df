use ndarray::{Array2, Zip};

/// Per-pixel validity of a raster, kept apart from how samples are encoded
#[derive(Debug, Clone, PartialEq)]
pub struct NoDataMask {
    valid: Array2<bool>,
}

impl NoDataMask {
    pub fn all_valid(dim: (usize, usize)) -> Self {
        Self {
            valid: Array2::from_elem(dim, true),
        }
    }

    pub fn from_validity(valid: Array2<bool>) -> Self {
        Self { valid }
    }

    /// Build the mask from raw samples. NaN is always invalid; when a sentinel
    /// is given, samples equal to it (compared as f32) are invalid too.
    pub fn from_samples(data: &Array2<f32>, nodata: Option<f64>) -> Self {
        let sentinel = nodata.map(|nd| nd as f32);
        let valid = data.mapv(|value| {
            if value.is_nan() {
                return false;
            }
            match sentinel {
                Some(nd) => value != nd,
                None => true,
            }
        });
        Self { valid }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.valid.dim()
    }

    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid[[row, col]]
    }

    pub fn invalidate(&mut self, row: usize, col: usize) {
        self.valid[[row, col]] = false;
    }

    pub fn validity(&self) -> &Array2<bool> {
        &self.valid
    }

    pub fn validity_mut(&mut self) -> &mut Array2<bool> {
        &mut self.valid
    }

    pub fn invalid_count(&self) -> usize {
        self.valid.iter().filter(|v| !**v).count()
    }

    /// Pixel is valid only where both masks are valid
    pub fn and(&self, other: &NoDataMask) -> NoDataMask {
        let valid = Zip::from(&self.valid)
            .and(&other.valid)
            .map_collect(|&a, &b| a && b);
        NoDataMask { valid }
    }

    /// Write invalid pixels back as a sentinel, or NaN when no sentinel is known
    pub fn encode(&self, data: &Array2<f32>, nodata: Option<f64>) -> Array2<f32> {
        let fill = nodata.map_or(f32::NAN, |nd| nd as f32);
        Zip::from(data)
            .and(&self.valid)
            .map_collect(|&value, &valid| if valid { value } else { fill })
    }
}
