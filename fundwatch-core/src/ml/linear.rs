//! Ordinary least squares with an intercept.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{check_matrix, check_row, ModelError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearRegression {
    /// Least-squares fit on centered data.
    ///
    /// Rank-deficient designs (more features than rows, collinear columns)
    /// get the minimum-norm solution.
    pub fn fit(rows: &[Vec<f64>], target: &[f64]) -> Result<Self, ModelError> {
        let width = check_matrix(rows)?;
        let n = rows.len();
        if target.len() != n {
            return Err(ModelError::DimensionMismatch {
                expected: n,
                actual: target.len(),
            });
        }
        if let Some(row) = target.iter().position(|v| !v.is_finite()) {
            return Err(ModelError::NonFiniteInput { row, column: width });
        }

        let x_mean = DVector::from_fn(width, |j, _| {
            rows.iter().map(|r| r[j]).sum::<f64>() / n as f64
        });
        let y = DVector::from_column_slice(target);
        let y_mean = y.mean();

        let xc = DMatrix::from_fn(n, width, |i, j| rows[i][j] - x_mean[j]);
        let yc = y.add_scalar(-y_mean);

        let svd = xc.svd(true, true);
        let max_sv = svd.singular_values.max();
        let eps = max_sv * n.max(width) as f64 * f64::EPSILON;
        let coef = svd
            .solve(&yc, eps)
            .map_err(|e| ModelError::Solve(e.to_string()))?;

        let intercept = y_mean - x_mean.dot(&coef);
        tracing::debug!(rows = n, features = width, intercept, "least squares fitted");

        Ok(Self {
            coefficients: coef.iter().copied().collect(),
            intercept,
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> Result<f64, ModelError> {
        check_row(row, self.coefficients.len())?;
        Ok(self.intercept
            + row
                .iter()
                .zip(&self.coefficients)
                .map(|(x, c)| x * c)
                .sum::<f64>())
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        rows.iter()
            .enumerate()
            .map(|(r, row)| {
                self.predict_row(row).map_err(|e| match e {
                    ModelError::NonFiniteInput { column, .. } => {
                        ModelError::NonFiniteInput { row: r, column }
                    }
                    other => other,
                })
            })
            .collect()
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_linear_relation() {
        let rows: Vec<Vec<f64>> = (0..8)
            .map(|i| {
                let i = i as f64;
                vec![i, (i * 0.7).sin()]
            })
            .collect();
        let target: Vec<f64> = rows.iter().map(|r| 3.0 + 2.0 * r[0] - 1.5 * r[1]).collect();

        let model = LinearRegression::fit(&rows, &target).unwrap();
        assert!((model.intercept() - 3.0).abs() < 1e-9);
        assert!((model.coefficients()[0] - 2.0).abs() < 1e-9);
        assert!((model.coefficients()[1] + 1.5).abs() < 1e-9);

        let predicted = model.predict(&rows).unwrap();
        for (p, t) in predicted.iter().zip(&target) {
            assert!((p - t).abs() < 1e-9);
        }
    }

    #[test]
    fn residuals_are_centered() {
        let rows = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let target = vec![1.0, 3.0, 2.0, 5.0];
        let model = LinearRegression::fit(&rows, &target).unwrap();
        let predicted = model.predict(&rows).unwrap();
        let residual_sum: f64 = predicted.iter().zip(&target).map(|(p, t)| t - p).sum();
        assert!(residual_sum.abs() < 1e-12);
    }

    #[test]
    fn collinear_columns_get_minimum_norm_split() {
        let rows = vec![vec![1.0, 1.0], vec![2.0, 2.0], vec![3.0, 3.0]];
        let target = vec![2.0, 4.0, 6.0];
        let model = LinearRegression::fit(&rows, &target).unwrap();
        let c = model.coefficients();
        assert!((c[0] - 1.0).abs() < 1e-9);
        assert!((c[1] - 1.0).abs() < 1e-9);
        assert!(model.intercept().abs() < 1e-9);
    }

    #[test]
    fn refit_is_identical() {
        let rows = vec![vec![1.0, 0.5], vec![2.0, 0.1], vec![3.0, 0.9], vec![5.0, 0.3]];
        let target = vec![0.2, -1.0, 0.7, -2.5];
        let a = LinearRegression::fit(&rows, &target).unwrap();
        let b = LinearRegression::fit(&rows, &target).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_mismatched_target() {
        let rows = vec![vec![1.0], vec![2.0]];
        assert!(matches!(
            LinearRegression::fit(&rows, &[1.0]),
            Err(ModelError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            LinearRegression::fit(&rows, &[1.0, f64::NAN]),
            Err(ModelError::NonFiniteInput { row: 1, .. })
        ));
    }
}
