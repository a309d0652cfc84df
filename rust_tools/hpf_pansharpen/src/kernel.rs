use crate::error::{PansharpenError, Result};
use ndarray::Array2;
use std::str::FromStr;

/// Square, odd-sized convolution weights
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    weights: Array2<f64>,
}

impl Kernel {
    pub fn new(weights: Array2<f64>) -> Result<Self> {
        let (rows, cols) = weights.dim();
        if rows == 0 || cols == 0 {
            return Err(PansharpenError::InvalidKernel("kernel is empty".to_string()));
        }
        if rows != cols {
            return Err(PansharpenError::InvalidKernel(format!(
                "kernel must be square, got {}x{}",
                rows, cols
            )));
        }
        if rows % 2 == 0 {
            return Err(PansharpenError::InvalidKernel(format!(
                "kernel size must be odd, got {}",
                rows
            )));
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(PansharpenError::InvalidKernel(
                "kernel weights must be finite".to_string(),
            ));
        }
        Ok(Self { weights })
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let size = rows.len();
        if rows.iter().any(|row| row.len() != size) {
            return Err(PansharpenError::InvalidKernel(
                "every kernel row must have as many values as there are rows".to_string(),
            ));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let weights = Array2::from_shape_vec((size, size), flat)?;
        Self::new(weights)
    }

    /// 5x5 high-pass kernel (Gangkofner et al., 2007): center 24, others -1, all / 25
    pub fn high_pass() -> Self {
        let mut weights = Array2::from_elem((5, 5), -1.0 / 25.0);
        weights[[2, 2]] = 24.0 / 25.0;
        Self { weights }
    }

    /// 3x3 mean, every weight 1/9
    pub fn low_pass() -> Self {
        Self {
            weights: Array2::from_elem((3, 3), 1.0 / 9.0),
        }
    }

    /// Uniform averaging kernel, every weight 1 / size^2
    pub fn box_mean(size: usize) -> Result<Self> {
        let weight = 1.0 / (size * size) as f64;
        Self::new(Array2::from_elem((size, size), weight))
    }

    pub fn size(&self) -> usize {
        self.weights.nrows()
    }

    /// Cells from the center to the window edge
    pub fn radius(&self) -> usize {
        self.size() / 2
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn sum(&self) -> f64 {
        self.weights.sum()
    }
}

/// Parses `"-1,-1,-1; -1,8,-1; -1,-1,-1"` with an optional `/divisor` suffix,
/// e.g. `"1,1,1;1,1,1;1,1,1/9"`.
impl FromStr for Kernel {
    type Err = PansharpenError;

    fn from_str(s: &str) -> Result<Self> {
        let (body, divisor) = match s.rsplit_once('/') {
            Some((body, divisor)) => {
                let divisor: f64 = divisor.trim().parse().map_err(|_| {
                    PansharpenError::InvalidKernel(format!("invalid divisor '{}'", divisor.trim()))
                })?;
                if divisor == 0.0 || !divisor.is_finite() {
                    return Err(PansharpenError::InvalidKernel(
                        "divisor must be finite and non-zero".to_string(),
                    ));
                }
                (body, divisor)
            }
            None => (s, 1.0),
        };

        let rows = body
            .split(';')
            .map(str::trim)
            .filter(|row| !row.is_empty())
            .map(|row| {
                row.split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|v| !v.is_empty())
                    .map(|v| {
                        v.parse::<f64>()
                            .map(|w| w / divisor)
                            .map_err(|_| {
                                PansharpenError::InvalidKernel(format!("invalid weight '{}'", v))
                            })
                    })
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<Vec<f64>>>>()?;

        Self::from_rows(&rows)
    }
}
