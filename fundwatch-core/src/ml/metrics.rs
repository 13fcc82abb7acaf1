//! Evaluation metrics: regression error and per-class classification scores.

use serde::{Deserialize, Serialize};

use super::ModelError;

pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> Result<f64, ModelError> {
    if actual.len() != predicted.len() {
        return Err(ModelError::DimensionMismatch {
            expected: actual.len(),
            actual: predicted.len(),
        });
    }
    if actual.is_empty() {
        return Err(ModelError::EmptyInput);
    }
    let sse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    Ok(sse / actual.len() as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: i64,
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Averages {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Precision, recall and F1 per requested label plus aggregate rows.
///
/// Scores with an empty denominator are 0. When every prediction falls inside
/// the requested labels the micro average equals accuracy and is reported as
/// such; otherwise a separate micro-average row is shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub micro_avg: Averages,
    /// `Some` when the micro average is plain accuracy.
    pub accuracy: Option<f64>,
    pub macro_avg: Averages,
    pub weighted_avg: Averages,
    /// Support summed over the requested labels.
    pub total: usize,
}

impl ClassificationReport {
    /// Score `y_pred` against `y_true` over `labels` (value, display name).
    pub fn compute(
        y_true: &[i64],
        y_pred: &[i64],
        labels: &[(i64, &str)],
    ) -> Result<Self, ModelError> {
        if y_true.len() != y_pred.len() {
            return Err(ModelError::DimensionMismatch {
                expected: y_true.len(),
                actual: y_pred.len(),
            });
        }
        if labels.is_empty() {
            return Err(ModelError::InvalidParameter(
                "classification report needs at least one label".into(),
            ));
        }

        let mut classes = Vec::with_capacity(labels.len());
        let (mut tp_sum, mut pred_sum, mut true_sum) = (0usize, 0usize, 0usize);
        for &(label, name) in labels {
            let tp = y_true
                .iter()
                .zip(y_pred)
                .filter(|(t, p)| **t == label && **p == label)
                .count();
            let predicted = y_pred.iter().filter(|p| **p == label).count();
            let support = y_true.iter().filter(|t| **t == label).count();
            tp_sum += tp;
            pred_sum += predicted;
            true_sum += support;

            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            classes.push(ClassMetrics {
                label,
                name: name.to_string(),
                precision,
                recall,
                f1: f1(precision, recall),
                support,
            });
        }

        let micro_precision = ratio(tp_sum, pred_sum);
        let micro_recall = ratio(tp_sum, true_sum);
        let micro_avg = Averages {
            precision: micro_precision,
            recall: micro_recall,
            f1: f1(micro_precision, micro_recall),
        };

        let k = classes.len() as f64;
        let macro_avg = Averages {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / k,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / k,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / k,
        };

        let weighted = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if true_sum == 0 {
                0.0
            } else {
                classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / true_sum as f64
            }
        };
        let weighted_avg = Averages {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
        };

        let covers_everything = y_true
            .iter()
            .chain(y_pred)
            .all(|v| labels.iter().any(|(l, _)| l == v));

        Ok(Self {
            classes,
            micro_avg,
            accuracy: covers_everything.then_some(micro_avg.f1),
            macro_avg,
            weighted_avg,
            total: true_sum,
        })
    }

    /// Fixed-width text table, two decimals.
    pub fn render(&self) -> String {
        let width = self
            .classes
            .iter()
            .map(|c| c.name.chars().count())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or_default();

        let mut out = format!(
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}\n\n",
            "", "precision", "recall", "f1-score", "support"
        );
        for c in &self.classes {
            out.push_str(&metrics_line(&c.name, c.precision, c.recall, c.f1, c.support, width));
        }
        out.push('\n');

        match self.accuracy {
            Some(accuracy) => out.push_str(&format!(
                "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}\n",
                "accuracy", "", "", accuracy, self.total
            )),
            None => out.push_str(&averages_line("micro avg", &self.micro_avg, self.total, width)),
        }
        out.push_str(&averages_line("macro avg", &self.macro_avg, self.total, width));
        out.push_str(&averages_line("weighted avg", &self.weighted_avg, self.total, width));
        out
    }
}

fn metrics_line(name: &str, p: f64, r: f64, f: f64, support: usize, width: usize) -> String {
    format!("{name:>width$}  {p:>9.2} {r:>9.2} {f:>9.2} {support:>9}\n")
}

fn averages_line(name: &str, avg: &Averages, support: usize, width: usize) -> String {
    metrics_line(name, avg.precision, avg.recall, avg.f1, support, width)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEVELS: [(i64, &str); 3] = [(0, "Thấp"), (1, "Trung bình"), (2, "Cao")];

    #[test]
    fn mse_matches_hand_computation() {
        let mse = mean_squared_error(&[1.0, 2.0, 3.0], &[1.5, 2.0, 2.0]).unwrap();
        assert!((mse - (0.25 + 0.0 + 1.0) / 3.0).abs() < 1e-12);
        assert_eq!(mean_squared_error(&[], &[]), Err(ModelError::EmptyInput));
    }

    #[test]
    fn per_class_scores() {
        let y_true = [0, 0, 1, 1, 2, 2];
        let y_pred = [0, 1, 1, 1, 2, 0];
        let report = ClassificationReport::compute(&y_true, &y_pred, &LEVELS).unwrap();

        let low = &report.classes[0];
        assert_eq!(low.support, 2);
        assert!((low.precision - 0.5).abs() < 1e-12);
        assert!((low.recall - 0.5).abs() < 1e-12);

        let mid = &report.classes[1];
        assert!((mid.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((mid.recall - 1.0).abs() < 1e-12);
        assert!((mid.f1 - 0.8).abs() < 1e-12);

        assert!((report.accuracy.unwrap() - 4.0 / 6.0).abs() < 1e-12);
        assert_eq!(report.total, 6);
    }

    #[test]
    fn missing_class_scores_zero() {
        let y_true = [0, 0, 1];
        let y_pred = [0, 0, 1];
        let report = ClassificationReport::compute(&y_true, &y_pred, &LEVELS).unwrap();
        let high = &report.classes[2];
        assert_eq!(high.support, 0);
        assert_eq!(high.precision, 0.0);
        assert_eq!(high.f1, 0.0);
        assert!((report.macro_avg.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.weighted_avg.precision - 1.0).abs() < 1e-12);
    }

    #[test]
    fn predictions_outside_labels_switch_to_micro_average() {
        let y_true = [0, 0, 1];
        let y_pred = [0, 2, 1];
        let report =
            ClassificationReport::compute(&y_true, &y_pred, &[(0, "Thấp"), (1, "Trung bình")])
                .unwrap();
        assert!(report.accuracy.is_none());
        assert!((report.micro_avg.precision - 1.0).abs() < 1e-12);
        assert!((report.micro_avg.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!(report.render().contains("micro avg"));
    }

    #[test]
    fn render_aligns_unicode_names() {
        let y_true = [0, 1, 2, 2];
        let y_pred = [0, 1, 2, 1];
        let text = ClassificationReport::compute(&y_true, &y_pred, &LEVELS)
            .unwrap()
            .render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "              precision    recall  f1-score   support"
        );
        assert_eq!(
            lines[2],
            "        Thấp       1.00      1.00      1.00         1"
        );
        assert_eq!(
            lines[3],
            "  Trung bình       0.50      1.00      0.67         1"
        );
        assert!(lines[6].starts_with("    accuracy"));
        assert!(lines[6].ends_with("0.75         4"));
        assert!(lines[8].starts_with("weighted avg"));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        assert!(matches!(
            ClassificationReport::compute(&[0, 1], &[0], &LEVELS),
            Err(ModelError::DimensionMismatch { .. })
        ));
    }
}
