//! Column standardization (zero mean, unit variance) with batch statistics.

use serde::{Deserialize, Serialize};

use super::{check_matrix, check_row, ModelError};

/// Scales below this are treated as constant columns and left unscaled.
const MIN_SCALE: f64 = 10.0 * f64::EPSILON;

/// Per-column standardizer fitted on one batch.
///
/// Uses the population standard deviation. Constant columns get a scale of 1
/// so they map to zero instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, ModelError> {
        let width = check_matrix(rows)?;
        let n = rows.len() as f64;

        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut mean {
            *m /= n;
        }

        let mut var = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in var.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2);
            }
        }
        let scale = var
            .into_iter()
            .map(|s| {
                let std = (s / n).sqrt();
                if std < MIN_SCALE {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    pub fn fit_transform(rows: &[Vec<f64>]) -> Result<(Self, Vec<Vec<f64>>), ModelError> {
        let scaler = Self::fit(rows)?;
        let scaled = scaler.transform(rows)?;
        Ok((scaler, scaled))
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ModelError> {
        rows.iter()
            .enumerate()
            .map(|(r, row)| {
                self.transform_row(row).map_err(|e| match e {
                    ModelError::NonFiniteInput { column, .. } => {
                        ModelError::NonFiniteInput { row: r, column }
                    }
                    other => other,
                })
            })
            .collect()
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        check_row(row, self.mean.len())?;
        Ok(row
            .iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .map(|((v, m), s)| (v - m) / s)
            .collect())
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }
}
