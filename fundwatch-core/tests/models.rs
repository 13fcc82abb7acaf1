//! End-to-end model tests: ingest a CSV, derive features, fit, score.

use fundwatch_core::data::{ColumnSpec, DataIngestor, TableSchema};
use fundwatch_core::features::{pct_change, ratio_pct};
use fundwatch_core::ml::{
    train_test_split, ClassificationReport, IsolationForest, IsolationForestParams,
    LinearRegression, LogisticParams, ModelError, MultinomialLogistic, StandardScaler,
};
use fundwatch_core::rng::RngHierarchy;

static LIQUIDITY: TableSchema = TableSchema {
    name: "liquidity",
    columns: &[
        ColumnSpec::text("Quỹ", "fund"),
        ColumnSpec::float("Tiền mặt", "cash"),
        ColumnSpec::float("Nợ ngắn hạn", "short_term_debt"),
    ],
};

const LIQUIDITY_CSV: &str = "Quỹ,Tiền mặt,Nợ ngắn hạn\n\
    Quỹ 1,12,50\nQuỹ 2,8,60\nQuỹ 3,15,45\nQuỹ 4,3,80\nQuỹ 5,10,55\n\
    Quỹ 6,20,40\nQuỹ 7,5,70\nQuỹ 8,18,50\nQuỹ 9,7,65\nQuỹ 10,2,400\n";

#[test]
fn ingested_table_feeds_isolation_forest() {
    let table = DataIngestor::new(&LIQUIDITY)
        .ingest_bytes(LIQUIDITY_CSV.as_bytes().to_vec())
        .unwrap();
    assert_eq!(table.len(), 10);

    let cash = table.floats("Tiền mặt").unwrap();
    let debt = table.floats("Nợ ngắn hạn").unwrap();
    let rows: Vec<Vec<f64>> = cash
        .iter()
        .zip(debt)
        .map(|(&c, &d)| vec![ratio_pct(c, d), d])
        .collect();

    let (_, scaled) = StandardScaler::fit_transform(&rows).unwrap();
    let forest = IsolationForest::fit(&scaled, &IsolationForestParams::default()).unwrap();
    let scores = forest.decision_function(&scaled).unwrap();

    // Quỹ 10 carries five times the usual debt.
    let lowest = scores
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(lowest, 9);
    assert_eq!(forest.sample_size(), 10);
}

#[test]
fn forest_ignores_thread_count() {
    let rows: Vec<Vec<f64>> = (0..40)
        .map(|i| vec![(i as f64 * 0.7).sin(), (i as f64 * 1.3).cos()])
        .collect();
    let params = IsolationForestParams::default();

    let single = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap()
        .install(|| IsolationForest::fit(&rows, &params).unwrap().score_samples(&rows).unwrap());
    let many = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap()
        .install(|| IsolationForest::fit(&rows, &params).unwrap().score_samples(&rows).unwrap());

    assert_eq!(single, many);
}

#[test]
fn split_scale_classify_report() {
    let rows: Vec<Vec<f64>> = (0..30)
        .map(|i| {
            let level = (i % 3) as f64;
            vec![level * 3.0 + (i as f64 * 0.1).sin(), 90.0 + level * 10.0]
        })
        .collect();
    let labels: Vec<i64> = (0..30).map(|i| (i % 3) as i64).collect();

    let mut rng = RngHierarchy::new(42).rng_for("train_test_split", 0);
    let split = train_test_split(rows.len(), 0.3, &mut rng).unwrap();
    assert_eq!(split.test.len(), 9);
    assert_eq!(split.train.len(), 21);

    let train_x: Vec<Vec<f64>> = split.train.iter().map(|&i| rows[i].clone()).collect();
    let train_y: Vec<i64> = split.train.iter().map(|&i| labels[i]).collect();
    let test_x: Vec<Vec<f64>> = split.test.iter().map(|&i| rows[i].clone()).collect();
    let test_y: Vec<i64> = split.test.iter().map(|&i| labels[i]).collect();

    let scaler = StandardScaler::fit(&train_x).unwrap();
    let model = MultinomialLogistic::fit(
        &scaler.transform(&train_x).unwrap(),
        &train_y,
        &LogisticParams::default(),
    )
    .unwrap();
    let predicted = model.predict(&scaler.transform(&test_x).unwrap()).unwrap();

    let report = ClassificationReport::compute(
        &test_y,
        &predicted,
        &[(0, "Thấp"), (1, "Trung bình"), (2, "Cao")],
    )
    .unwrap();
    assert_eq!(report.accuracy, Some(1.0));
    assert_eq!(report.total, 9);
    assert!(report.render().contains("Trung bình"));
}

#[test]
fn ols_on_period_changes() {
    let actual = [250.0, 254.0, 258.0, 260.0, 255.0, 260.0, 265.0, 270.0];
    let change = pct_change(&actual);
    let rows: Vec<Vec<f64>> = change[1..].iter().map(|&c| vec![c]).collect();
    let target: Vec<f64> = change[1..].iter().map(|c| 2.0 * c - 1.0).collect();

    let model = LinearRegression::fit(&rows, &target).unwrap();
    assert!((model.coefficients()[0] - 2.0).abs() < 1e-9);
    assert!((model.intercept() + 1.0).abs() < 1e-9);
}

#[test]
fn undefined_change_is_rejected_by_models() {
    let change = pct_change(&[100.0, 110.0]);
    let rows = vec![vec![change[0]], vec![change[1]]];
    let err = LinearRegression::fit(&rows, &[1.0, 2.0]).unwrap_err();
    assert!(matches!(err, ModelError::NonFiniteInput { row: 0, column: 0 }));
}
