use crate::error::{PansharpenError, Result};
use crate::raster::{ensure_same_shape, Band};
use ndarray::{Array2, Zip};

/// Range a fused value must fall in to be kept: `min < v <= max`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampBounds {
    min: f32,
    max: f32,
}

impl Default for ClampBounds {
    fn default() -> Self {
        Self { min: 0.0, max: 1.0 }
    }
}

impl ClampBounds {
    /// Bounds are checked after narrowing to f32, the type fused values have
    pub fn new(min: f64, max: f64) -> Result<Self> {
        let (lo, hi) = (min as f32, max as f32);
        if !lo.is_finite() || !hi.is_finite() || lo >= hi {
            return Err(PansharpenError::InvalidClampBounds(min, max));
        }
        Ok(Self { min: lo, max: hi })
    }

    pub fn min(&self) -> f32 {
        self.min
    }

    pub fn max(&self) -> f32 {
        self.max
    }

    /// Lower bound exclusive, upper bound inclusive; NaN and infinities fail
    pub fn accepts(&self, value: f32) -> bool {
        value > self.min && value <= self.max
    }
}

/// Combines one multispectral band with the panchromatic band and its spatial
/// component: `fused = mul + (pan - spatial)`
#[derive(Debug, Clone, Copy, Default)]
pub struct BandFuser {
    clamp: ClampBounds,
}

impl BandFuser {
    pub fn new(clamp: ClampBounds) -> Self {
        Self { clamp }
    }

    /// Out-of-range values are marked invalid, not clipped to the bounds
    pub fn fuse(&self, mul: &Band, pan: &Band, spatial: &Band) -> Result<Band> {
        ensure_same_shape("multispectral band vs panchromatic", pan.dim(), mul.dim())?;
        ensure_same_shape("spatial component vs panchromatic", pan.dim(), spatial.dim())?;

        let mut mask = mul.mask().and(pan.mask()).and(spatial.mask());
        let mut data = Array2::<f32>::zeros(pan.dim());
        let clamp = self.clamp;

        Zip::from(&mut data)
            .and(mask.validity_mut())
            .and(mul.data())
            .and(pan.data())
            .and(spatial.data())
            .par_for_each(|out, valid, &m, &p, &s| {
                if !*valid {
                    *out = f32::NAN;
                    return;
                }
                let value = m + (p - s);
                if clamp.accepts(value) {
                    *out = value;
                } else {
                    *valid = false;
                    *out = f32::NAN;
                }
            });

        Band::new(data, mask)
    }
}
