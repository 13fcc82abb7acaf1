//! Multinomial logistic regression with an L2 penalty.
//!
//! Minimizes `Σᵢ −log softmax(W·x̃ᵢ)[yᵢ] + ‖W‖² / (2C)` where `x̃` is the feature
//! row with a trailing 1 for the intercept and the penalty skips intercepts.
//! The problem is small (a handful of features, a few classes), so each
//! iteration forms the full Hessian and takes a damped Newton step with a
//! backtracking line search.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::{check_matrix, check_row, ModelError};

/// Diagonal damping keeping the Hessian positive definite along the
/// unpenalized intercept direction.
const HESSIAN_DAMPING: f64 = 1e-8;
const ARMIJO: f64 = 1e-4;
const MAX_HALVINGS: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    /// Inverse regularization strength.
    pub c: f64,
    pub max_iter: usize,
    /// Convergence threshold on the largest gradient component.
    pub tol: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-6,
        }
    }
}

impl LogisticParams {
    pub fn validate(&self) -> Result<(), ModelError> {
        if !(self.c.is_finite() && self.c > 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "C must be positive, got {}",
                self.c
            )));
        }
        if self.max_iter == 0 {
            return Err(ModelError::InvalidParameter(
                "max_iter must be at least 1".into(),
            ));
        }
        if !(self.tol.is_finite() && self.tol > 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "tol must be positive, got {}",
                self.tol
            )));
        }
        Ok(())
    }
}

/// Fitted softmax classifier over the labels seen during training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultinomialLogistic {
    classes: Vec<i64>,
    /// Row-major `classes × (n_features + 1)`; the last entry of each row is the intercept.
    weights: Vec<f64>,
    n_features: usize,
    iterations: usize,
    converged: bool,
}

struct Problem<'a> {
    rows: &'a [Vec<f64>],
    targets: Vec<usize>,
    n_classes: usize,
    n_features: usize,
    lambda: f64,
}

impl Problem<'_> {
    fn stride(&self) -> usize {
        self.n_features + 1
    }

    fn dim(&self) -> usize {
        self.n_classes * self.stride()
    }

    fn loss(&self, weights: &[f64]) -> f64 {
        let stride = self.stride();
        let data: f64 = self
            .rows
            .iter()
            .zip(&self.targets)
            .map(|(x, &y)| {
                let z = logits(weights, self.n_classes, x);
                log_sum_exp(&z) - z[y]
            })
            .sum();
        let penalty: f64 = weights
            .chunks(stride)
            .flat_map(|w| &w[..self.n_features])
            .map(|w| w * w)
            .sum();
        data + 0.5 * self.lambda * penalty
    }

    /// Loss, gradient and Hessian at `weights`.
    fn evaluate(&self, weights: &[f64]) -> (f64, Vec<f64>, DMatrix<f64>) {
        let stride = self.stride();
        let dim = self.dim();
        let mut grad = vec![0.0; dim];
        let mut hess = DMatrix::<f64>::zeros(dim, dim);

        let mut xt = vec![1.0; stride];
        for (x, &y) in self.rows.iter().zip(&self.targets) {
            xt[..self.n_features].copy_from_slice(x);
            let p = softmax(&logits(weights, self.n_classes, x));

            for k in 0..self.n_classes {
                let residual = p[k] - if k == y { 1.0 } else { 0.0 };
                for (j, xj) in xt.iter().enumerate() {
                    grad[k * stride + j] += residual * xj;
                }
                for l in 0..self.n_classes {
                    let delta = if k == l { 1.0 } else { 0.0 };
                    let coef = p[k] * (delta - p[l]);
                    for (j, xj) in xt.iter().enumerate() {
                        for (m, xm) in xt.iter().enumerate() {
                            hess[(k * stride + j, l * stride + m)] += coef * xj * xm;
                        }
                    }
                }
            }
        }

        for k in 0..self.n_classes {
            for j in 0..self.n_features {
                let i = k * stride + j;
                grad[i] += self.lambda * weights[i];
                hess[(i, i)] += self.lambda;
            }
        }
        for i in 0..dim {
            hess[(i, i)] += HESSIAN_DAMPING;
        }

        (self.loss(weights), grad, hess)
    }
}

impl MultinomialLogistic {
    pub fn fit(
        rows: &[Vec<f64>],
        labels: &[i64],
        params: &LogisticParams,
    ) -> Result<Self, ModelError> {
        params.validate()?;
        let n_features = check_matrix(rows)?;
        if labels.len() != rows.len() {
            return Err(ModelError::DimensionMismatch {
                expected: rows.len(),
                actual: labels.len(),
            });
        }

        let mut classes = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        if classes.len() < 2 {
            return Err(ModelError::TooFewClasses {
                found: classes.len(),
            });
        }
        let targets = labels
            .iter()
            .map(|l| classes.binary_search(l).unwrap_or_default())
            .collect();

        let problem = Problem {
            rows,
            targets,
            n_classes: classes.len(),
            n_features,
            lambda: 1.0 / params.c,
        };

        let mut weights = vec![0.0; problem.dim()];
        let mut iterations = 0;
        let mut converged = false;
        loop {
            let (loss, grad, hess) = problem.evaluate(&weights);
            let max_grad = grad.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
            if max_grad < params.tol {
                converged = true;
                break;
            }
            if iterations == params.max_iter {
                break;
            }
            iterations += 1;

            let g = DVector::from_vec(grad);
            let step = newton_step(hess, &g)?;
            let mut direction = -step;
            let mut slope = g.dot(&direction);
            if !(slope < 0.0) {
                direction = -g.clone();
                slope = -g.norm_squared();
            }

            let mut t = 1.0;
            let mut accepted = false;
            for _ in 0..MAX_HALVINGS {
                let candidate: Vec<f64> = weights
                    .iter()
                    .zip(direction.iter())
                    .map(|(w, d)| w + t * d)
                    .collect();
                if problem.loss(&candidate) <= loss + ARMIJO * t * slope {
                    weights = candidate;
                    accepted = true;
                    break;
                }
                t *= 0.5;
            }
            if !accepted {
                // No further decrease is representable; the optimum is reached
                // to machine precision.
                converged = true;
                break;
            }
        }

        if converged {
            tracing::debug!(iterations, classes = classes.len(), "logistic regression converged");
        } else {
            tracing::warn!(
                max_iter = params.max_iter,
                "logistic regression did not converge; increase max_iter"
            );
        }

        Ok(Self {
            classes,
            weights,
            n_features,
            iterations,
            converged,
        })
    }

    /// Labels seen during training, ascending.
    pub fn classes(&self) -> &[i64] {
        &self.classes
    }

    /// Class probabilities for one row, in the order of [`Self::classes`].
    pub fn predict_proba_row(&self, row: &[f64]) -> Result<Vec<f64>, ModelError> {
        check_row(row, self.n_features)?;
        Ok(softmax(&logits(&self.weights, self.classes.len(), row)))
    }

    /// Most probable label; ties resolve to the lowest label.
    pub fn predict_row(&self, row: &[f64]) -> Result<i64, ModelError> {
        let proba = self.predict_proba_row(row)?;
        let best = proba
            .iter()
            .enumerate()
            .fold(0, |best, (i, p)| if *p > proba[best] { i } else { best });
        Ok(self.classes[best])
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>, ModelError> {
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

    /// Feature weights of one class (intercept excluded).
    pub fn coefficients(&self, class_index: usize) -> Option<&[f64]> {
        let stride = self.n_features + 1;
        self.weights
            .get(class_index * stride..(class_index + 1) * stride)
            .map(|w| &w[..self.n_features])
    }

    pub fn intercept(&self, class_index: usize) -> Option<f64> {
        self.weights
            .get(class_index * (self.n_features + 1) + self.n_features)
            .copied()
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

fn newton_step(hess: DMatrix<f64>, grad: &DVector<f64>) -> Result<DVector<f64>, ModelError> {
    match hess.clone().cholesky() {
        Some(chol) => Ok(chol.solve(grad)),
        None => hess
            .lu()
            .solve(grad)
            .ok_or_else(|| ModelError::Solve("Hessian is singular".into())),
    }
}

fn logits(weights: &[f64], n_classes: usize, x: &[f64]) -> Vec<f64> {
    let stride = x.len() + 1;
    (0..n_classes)
        .map(|k| {
            let w = &weights[k * stride..(k + 1) * stride];
            w[..x.len()].iter().zip(x).map(|(a, b)| a * b).sum::<f64>() + w[x.len()]
        })
        .collect()
}

fn log_sum_exp(z: &[f64]) -> f64 {
    let max = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    max + z.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn softmax(z: &[f64]) -> Vec<f64> {
    let lse = log_sum_exp(z);
    z.iter().map(|v| (v - lse).exp()).collect()
}
