//! Closed-form feature helpers shared by the supervision pipelines.
//!
//! Every helper is plain IEEE arithmetic: a zero denominator yields NaN or ±inf
//! rather than an error, and callers decide whether such rows survive.

/// `numerator / denominator · 100`.
pub fn ratio_pct(numerator: f64, denominator: f64) -> f64 {
    numerator / denominator * 100.0
}

/// `(value − reference) / reference · 100`.
pub fn deviation_pct(value: f64, reference: f64) -> f64 {
    (value - reference) / reference * 100.0
}

/// Period-over-period percentage change.
///
/// Output has the same length as the input; the first element has no prior
/// period and is NaN.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(f64::NAN);
    out.extend(values.windows(2).map(|w| deviation_pct(w[1], w[0])));
    out
}

/// True when no value is NaN. Infinite values count as defined.
pub fn all_defined(values: &[f64]) -> bool {
    values.iter().all(|v| !v.is_nan())
}
