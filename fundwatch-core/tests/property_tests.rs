//! Property tests for model and feature invariants.
//!
//! Uses proptest to verify:
//! 1. Feature helpers match their closed forms
//! 2. Standardized columns have zero mean
//! 3. Isolation-forest scores lie in [-1, 0) and are seed-deterministic
//! 4. Contamination bounds the share of predicted outliers
//! 5. Train/test splits partition the index range
//! 6. Logistic probabilities form a distribution

use std::collections::HashSet;

use fundwatch_core::features::{all_defined, deviation_pct, pct_change, ratio_pct};
use fundwatch_core::ml::{
    train_test_split, IsolationForest, IsolationForestParams, LogisticParams, MultinomialLogistic,
    StandardScaler,
};
use fundwatch_core::rng::RngHierarchy;
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_positive() -> impl Strategy<Value = f64> {
    (0.5..500.0_f64).prop_map(|v| (v * 100.0).round() / 100.0)
}

fn arb_matrix(rows: std::ops::Range<usize>, width: usize) -> impl Strategy<Value = Vec<Vec<f64>>> {
    prop::collection::vec(prop::collection::vec(-100.0..100.0_f64, width), rows)
}

// ── 1. Feature helpers ───────────────────────────────────────────────

proptest! {
    #[test]
    fn pct_change_matches_closed_form(values in prop::collection::vec(arb_positive(), 1..20)) {
        let change = pct_change(&values);
        prop_assert_eq!(change.len(), values.len());
        prop_assert!(change[0].is_nan());
        for i in 1..values.len() {
            let expected = (values[i] - values[i - 1]) / values[i - 1] * 100.0;
            prop_assert!((change[i] - expected).abs() < 1e-9);
        }
        prop_assert!(all_defined(&change[1..]));
    }

    #[test]
    fn ratio_and_deviation_agree(a in arb_positive(), b in arb_positive()) {
        prop_assert!((deviation_pct(a, b) - (ratio_pct(a, b) - 100.0)).abs() < 1e-9);
    }
}

// ── 2. Standard scaler ───────────────────────────────────────────────

proptest! {
    #[test]
    fn standardized_columns_have_zero_mean(rows in arb_matrix(2..30, 3)) {
        let (scaler, scaled) = StandardScaler::fit_transform(&rows).unwrap();
        prop_assert_eq!(scaler.mean().len(), 3);
        for j in 0..3 {
            let mean: f64 = scaled.iter().map(|r| r[j]).sum::<f64>() / scaled.len() as f64;
            prop_assert!(mean.abs() < 1e-9);
        }
    }
}

// ── 3–4. Isolation forest ────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn forest_scores_in_range_and_deterministic(rows in arb_matrix(2..40, 4), seed in 0u64..1000) {
        let params = IsolationForestParams { n_estimators: 25, seed, ..Default::default() };
        let a = IsolationForest::fit(&rows, &params).unwrap().score_samples(&rows).unwrap();
        let b = IsolationForest::fit(&rows, &params).unwrap().score_samples(&rows).unwrap();
        prop_assert_eq!(&a, &b);
        for s in a {
            prop_assert!((-1.0..0.0).contains(&s), "score {}", s);
        }
    }

    #[test]
    fn contamination_bounds_outlier_share(rows in arb_matrix(10..60, 3), contamination in 0.05..=0.5_f64) {
        let params = IsolationForestParams { n_estimators: 25, contamination, ..Default::default() };
        let forest = IsolationForest::fit(&rows, &params).unwrap();
        let outliers = forest.predict(&rows).unwrap().into_iter().filter(|&p| p == -1).count();
        // Strictly below the interpolated percentile: at most ceil(c·n) rows.
        prop_assert!(outliers <= (contamination * rows.len() as f64).ceil() as usize);
    }
}

// ── 5. Train/test split ──────────────────────────────────────────────

proptest! {
    #[test]
    fn split_partitions_indices(n in 2usize..200, fraction in 0.05..0.95_f64, seed in any::<u64>()) {
        let mut rng = RngHierarchy::new(seed).rng_for("train_test_split", 0);
        let expected_test = (fraction * n as f64).ceil() as usize;
        match train_test_split(n, fraction, &mut rng) {
            Ok(split) => {
                prop_assert_eq!(split.test.len(), expected_test);
                let all: HashSet<usize> = split.train.iter().chain(&split.test).copied().collect();
                prop_assert_eq!(all.len(), n);
                prop_assert!(all.iter().all(|&i| i < n));
            }
            Err(_) => prop_assert!(expected_test == 0 || expected_test >= n),
        }
    }
}

// ── 6. Logistic regression ───────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn probabilities_form_distribution(rows in arb_matrix(9..30, 2)) {
        let labels: Vec<i64> = (0..rows.len()).map(|i| (i % 3) as i64).collect();
        let model = MultinomialLogistic::fit(&rows, &labels, &LogisticParams::default()).unwrap();
        for row in &rows {
            let p = model.predict_proba_row(row).unwrap();
            prop_assert_eq!(p.len(), 3);
            prop_assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
            prop_assert!(p.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }
}
