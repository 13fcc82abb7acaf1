//! Statistical models used by the supervision pipelines.
//!
//! All models take row-major feature matrices (`&[Vec<f64>]`), reject
//! non-finite input, and are deterministic for a fixed seed.

pub mod isolation_forest;
pub mod linear;
pub mod logistic;
pub mod metrics;
pub mod scaler;
pub mod split;

pub use isolation_forest::{IsolationForest, IsolationForestParams};
pub use linear::LinearRegression;
pub use logistic::{LogisticParams, MultinomialLogistic};
pub use metrics::{mean_squared_error, Averages, ClassMetrics, ClassificationReport};
pub use scaler::StandardScaler;
pub use split::{train_test_split, TrainTestSplit};

use thiserror::Error;

/// Errors from model fitting and prediction.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("input has no rows")]
    EmptyInput,

    #[error("input has no feature columns")]
    NoFeatures,

    #[error("expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("non-finite value at row {row}, column {column}")]
    NonFiniteInput { row: usize, column: usize },

    #[error("need at least {needed} samples, got {got}")]
    NotEnoughSamples { needed: usize, got: usize },

    #[error("need at least 2 classes to fit a classifier, got {found}")]
    TooFewClasses { found: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("linear solve failed: {0}")]
    Solve(String),
}

/// Validate a row-major matrix: non-empty, rectangular, finite.
///
/// Returns the number of feature columns.
pub fn check_matrix(rows: &[Vec<f64>]) -> Result<usize, ModelError> {
    let first = rows.first().ok_or(ModelError::EmptyInput)?;
    let width = first.len();
    if width == 0 {
        return Err(ModelError::NoFeatures);
    }
    for (r, row) in rows.iter().enumerate() {
        check_row(row, width).map_err(|e| match e {
            ModelError::NonFiniteInput { column, .. } => ModelError::NonFiniteInput { row: r, column },
            other => other,
        })?;
    }
    Ok(width)
}

/// Validate a single row against an expected width.
pub fn check_row(row: &[f64], width: usize) -> Result<(), ModelError> {
    if row.len() != width {
        return Err(ModelError::DimensionMismatch {
            expected: width,
            actual: row.len(),
        });
    }
    if let Some(column) = row.iter().position(|v| !v.is_finite()) {
        return Err(ModelError::NonFiniteInput { row: 0, column });
    }
    Ok(())
}
