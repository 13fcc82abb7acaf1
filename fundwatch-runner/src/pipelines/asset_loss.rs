//! Page 4: months at risk of asset loss.
//!
//! The deviation between actual and book assets is regressed (ordinary least
//! squares, full dataset, no split) on management cost, related-party
//! transactions, the doubtful-debt ratio and the month-over-month change in
//! actual assets. Both the predicted and the observed deviation are compared
//! with the threshold; the configured [`LossBasis`] decides which comparison
//! drives the summary listing.

use std::fmt;
use std::str::FromStr;

use fundwatch_core::data::{ColumnSpec, DataError, RawTable, TableSchema};
use fundwatch_core::features::{all_defined, deviation_pct, pct_change};
use fundwatch_core::ml::{mean_squared_error, LinearRegression};
use serde::{Deserialize, Serialize};

use crate::config::{ensure, ConfigError};
use crate::pipeline::{Formula, Outcome, Pipeline, PipelineError, PipelineKind};
use crate::report::{num, push_kv_table, push_listing, push_table, yes_no};

pub const PERIOD: &str = "Tháng";
pub const BOOK_ASSETS: &str = "Tài sản sổ sách";
pub const ACTUAL_ASSETS: &str = "Tài sản thực tế";
pub const MANAGEMENT_COST: &str = "Chi phí quản lý";
pub const RELATED_PARTY: &str = "Giao dịch bên liên quan";
pub const DOUBTFUL_DEBT_RATIO: &str = "Tỷ lệ nợ khó đòi";

pub static SCHEMA: TableSchema = TableSchema {
    name: "asset-loss",
    columns: &[
        ColumnSpec::text(PERIOD, "period"),
        ColumnSpec::float(BOOK_ASSETS, "book_assets"),
        ColumnSpec::float(ACTUAL_ASSETS, "actual_assets"),
        ColumnSpec::float(MANAGEMENT_COST, "management_cost"),
        ColumnSpec::float(RELATED_PARTY, "related_party_transactions"),
        ColumnSpec::float(DOUBTFUL_DEBT_RATIO, "doubtful_debt_ratio"),
    ],
};

/// Regressors in model order.
pub const FEATURES: [&str; 4] = [MANAGEMENT_COST, RELATED_PARTY, DOUBTFUL_DEBT_RATIO, "cash_change_pct"];

static FORMULAS: [Formula; 2] = [
    Formula {
        column: "asset_deviation_pct",
        expression: "(Tài sản thực tế - Tài sản sổ sách) / Tài sản sổ sách * 100",
        meaning: "Shortfall of actual assets against the books.",
    },
    Formula {
        column: "cash_change_pct",
        expression: "(Tài sản thực tế[t] - Tài sản thực tế[t-1]) / Tài sản thực tế[t-1] * 100",
        meaning: "Month-over-month change in actual assets.",
    },
];

/// Which deviation is compared with the loss threshold for the summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossBasis {
    /// The regression's fitted deviation.
    #[default]
    Predicted,
    /// The deviation computed from the books.
    Observed,
}

impl fmt::Display for LossBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LossBasis::Predicted => "predicted",
            LossBasis::Observed => "observed",
        })
    }
}

impl FromStr for LossBasis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "predicted" => Ok(LossBasis::Predicted),
            "observed" => Ok(LossBasis::Observed),
            other => Err(format!(
                "unknown loss basis '{other}' (expected 'predicted' or 'observed')"
            )),
        }
    }
}

/// One month of asset figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyAssets {
    #[serde(rename = "Tháng")]
    pub period: String,
    #[serde(rename = "Tài sản sổ sách")]
    pub book_assets: f64,
    #[serde(rename = "Tài sản thực tế")]
    pub actual_assets: f64,
    #[serde(rename = "Chi phí quản lý")]
    pub management_cost: f64,
    #[serde(rename = "Giao dịch bên liên quan")]
    pub related_party_transactions: f64,
    #[serde(rename = "Tỷ lệ nợ khó đòi")]
    pub doubtful_debt_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetLossRow {
    #[serde(rename = "Tháng")]
    pub period: String,
    #[serde(rename = "Tài sản sổ sách")]
    pub book_assets: f64,
    #[serde(rename = "Tài sản thực tế")]
    pub actual_assets: f64,
    #[serde(rename = "Chi phí quản lý")]
    pub management_cost: f64,
    #[serde(rename = "Giao dịch bên liên quan")]
    pub related_party_transactions: f64,
    #[serde(rename = "Tỷ lệ nợ khó đòi")]
    pub doubtful_debt_ratio: f64,
    pub asset_deviation_pct: f64,
    pub cash_change_pct: f64,
    pub predicted_deviation_pct: f64,
    pub at_risk_predicted: bool,
    pub at_risk_observed: bool,
    /// The flag selected by the configured basis.
    pub at_risk: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetLossConfig {
    /// Loss threshold in percent; deviations strictly below it are flagged.
    pub threshold: f64,
    pub basis: LossBasis,
}

impl Default for AssetLossConfig {
    fn default() -> Self {
        Self {
            threshold: -5.0,
            basis: LossBasis::Predicted,
        }
    }
}

impl AssetLossConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            "asset_loss.threshold",
            self.threshold,
            (-10.0..=0.0).contains(&self.threshold),
            "[-10, 0]",
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    pub feature: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetLossSummary {
    pub input_rows: usize,
    pub fitted_rows: usize,
    pub dropped_rows: usize,
    pub intercept: f64,
    pub coefficients: Vec<Coefficient>,
    pub mse: f64,
    pub threshold: f64,
    pub basis: LossBasis,
    pub at_risk_periods: Vec<String>,
    /// Months flagged under the other basis, for comparison.
    pub alternate_at_risk_periods: Vec<String>,
}

/// `(asset_deviation_pct, cash_change_pct)` per month; the first change is NaN.
pub fn derive_features(records: &[MonthlyAssets]) -> Vec<(f64, f64)> {
    let actual: Vec<f64> = records.iter().map(|r| r.actual_assets).collect();
    records
        .iter()
        .zip(pct_change(&actual))
        .map(|(r, change)| (deviation_pct(r.actual_assets, r.book_assets), change))
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssetLossRegression;

impl Pipeline for AssetLossRegression {
    const KIND: PipelineKind = PipelineKind::AssetLoss;

    type Record = MonthlyAssets;
    type Row = AssetLossRow;
    type Summary = AssetLossSummary;
    type Config = AssetLossConfig;

    fn schema() -> &'static TableSchema {
        &SCHEMA
    }

    fn sample() -> Vec<MonthlyAssets> {
        let actual = [250.0, 254.0, 258.0, 260.0, 255.0, 260.0, 265.0, 270.0, 275.0, 280.0, 285.0, 290.0];
        let cost = [6.0, 7.0, 8.0, 9.0, 18.0, 15.0, 12.0, 10.0, 9.0, 8.0, 7.0, 6.0];
        let related = [3.0, 4.0, 5.0, 6.0, 15.0, 12.0, 10.0, 8.0, 7.0, 6.0, 5.0, 4.0];
        let doubtful = [1.0, 1.2, 1.5, 1.8, 3.0, 3.5, 4.0, 4.5, 5.0, 5.5, 6.0, 6.5];

        (0..12)
            .map(|i| MonthlyAssets {
                period: format!("Tháng {}", i + 1),
                book_assets: 250.0 + 5.0 * i as f64,
                actual_assets: actual[i],
                management_cost: cost[i],
                related_party_transactions: related[i],
                doubtful_debt_ratio: doubtful[i],
            })
            .collect()
    }

    fn from_table(table: &RawTable) -> Result<Vec<MonthlyAssets>, DataError> {
        let period = table.text(PERIOD)?;
        let book = table.floats(BOOK_ASSETS)?;
        let actual = table.floats(ACTUAL_ASSETS)?;
        let cost = table.floats(MANAGEMENT_COST)?;
        let related = table.floats(RELATED_PARTY)?;
        let doubtful = table.floats(DOUBTFUL_DEBT_RATIO)?;

        Ok((0..table.len())
            .map(|i| MonthlyAssets {
                period: period[i].clone(),
                book_assets: book[i],
                actual_assets: actual[i],
                management_cost: cost[i],
                related_party_transactions: related[i],
                doubtful_debt_ratio: doubtful[i],
            })
            .collect())
    }

    fn formulas() -> &'static [Formula] {
        &FORMULAS
    }

    fn validate_config(config: &AssetLossConfig) -> Result<(), ConfigError> {
        config.validate()
    }

    fn run(
        records: &[MonthlyAssets],
        config: &AssetLossConfig,
    ) -> Result<Outcome<AssetLossRow, AssetLossSummary>, PipelineError> {
        let kept: Vec<(&MonthlyAssets, (f64, f64))> = records
            .iter()
            .zip(derive_features(records))
            .filter(|(r, (deviation, change))| {
                all_defined(&[
                    r.book_assets,
                    r.actual_assets,
                    r.management_cost,
                    r.related_party_transactions,
                    r.doubtful_debt_ratio,
                    *deviation,
                    *change,
                ])
            })
            .collect();

        let dropped_rows = records.len() - kept.len();
        if dropped_rows > 1 {
            tracing::warn!(
                dropped_rows,
                "months with undefined ratios were dropped beyond the first period"
            );
        }

        let x: Vec<Vec<f64>> = kept
            .iter()
            .map(|(r, (_, change))| {
                vec![
                    r.management_cost,
                    r.related_party_transactions,
                    r.doubtful_debt_ratio,
                    *change,
                ]
            })
            .collect();
        let y: Vec<f64> = kept.iter().map(|(_, (deviation, _))| *deviation).collect();

        let model = LinearRegression::fit(&x, &y)?;
        let predicted = model.predict(&x)?;
        let mse = mean_squared_error(&y, &predicted)?;

        let rows: Vec<AssetLossRow> = kept
            .iter()
            .zip(&predicted)
            .map(|((r, (deviation, change)), &prediction)| {
                let at_risk_predicted = prediction < config.threshold;
                let at_risk_observed = *deviation < config.threshold;
                AssetLossRow {
                    period: r.period.clone(),
                    book_assets: r.book_assets,
                    actual_assets: r.actual_assets,
                    management_cost: r.management_cost,
                    related_party_transactions: r.related_party_transactions,
                    doubtful_debt_ratio: r.doubtful_debt_ratio,
                    asset_deviation_pct: *deviation,
                    cash_change_pct: *change,
                    predicted_deviation_pct: prediction,
                    at_risk_predicted,
                    at_risk_observed,
                    at_risk: match config.basis {
                        LossBasis::Predicted => at_risk_predicted,
                        LossBasis::Observed => at_risk_observed,
                    },
                }
            })
            .collect();

        let periods = |flag: fn(&AssetLossRow) -> bool| -> Vec<String> {
            rows.iter().filter(|r| flag(r)).map(|r| r.period.clone()).collect()
        };
        let (at_risk_periods, alternate_at_risk_periods) = match config.basis {
            LossBasis::Predicted => (periods(|r| r.at_risk_predicted), periods(|r| r.at_risk_observed)),
            LossBasis::Observed => (periods(|r| r.at_risk_observed), periods(|r| r.at_risk_predicted)),
        };

        tracing::info!(
            months = rows.len(),
            mse,
            at_risk = at_risk_periods.len(),
            basis = %config.basis,
            "asset loss regression finished"
        );

        let summary = AssetLossSummary {
            input_rows: records.len(),
            fitted_rows: rows.len(),
            dropped_rows,
            intercept: model.intercept(),
            coefficients: FEATURES
                .iter()
                .zip(model.coefficients())
                .map(|(feature, &value)| Coefficient {
                    feature: feature.to_string(),
                    value,
                })
                .collect(),
            mse,
            threshold: config.threshold,
            basis: config.basis,
            at_risk_periods,
            alternate_at_risk_periods,
        };
        Ok(Outcome { rows, summary })
    }

    fn is_flagged(row: &AssetLossRow) -> bool {
        row.at_risk
    }

    fn write_report(outcome: &Outcome<AssetLossRow, AssetLossSummary>, md: &mut String) {
        let s = &outcome.summary;
        md.push_str("## Model\n\n");
        push_kv_table(
            md,
            &[
                ("Model", "Ordinary least squares".to_string()),
                ("Fitted Months", s.fitted_rows.to_string()),
                ("Dropped Months", s.dropped_rows.to_string()),
                ("Mean Squared Error", num(s.mse)),
                ("Loss Threshold", format!("{}%", num(s.threshold))),
                ("Threshold Basis", s.basis.to_string()),
            ],
        );

        let mut coefficients = vec![vec!["intercept".to_string(), format!("{:.4}", s.intercept)]];
        coefficients.extend(
            s.coefficients
                .iter()
                .map(|c| vec![c.feature.clone(), format!("{:.4}", c.value)]),
        );
        push_table(md, &["Term", "Coefficient"], &coefficients);

        let flagged: Vec<Vec<String>> = outcome
            .rows
            .iter()
            .filter(|r| Self::is_flagged(r))
            .map(|r| {
                vec![
                    r.period.clone(),
                    num(r.management_cost),
                    num(r.related_party_transactions),
                    num(r.doubtful_debt_ratio),
                    num(r.cash_change_pct),
                    num(r.asset_deviation_pct),
                    num(r.predicted_deviation_pct),
                    yes_no(r.at_risk_predicted),
                    yes_no(r.at_risk_observed),
                ]
            })
            .collect();
        push_listing(
            md,
            "Months at Risk of Asset Loss",
            "No month falls below the loss threshold.",
            &[
                PERIOD,
                MANAGEMENT_COST,
                RELATED_PARTY,
                DOUBTFUL_DEBT_RATIO,
                "cash_change_pct",
                "asset_deviation_pct",
                "predicted_deviation_pct",
                "at_risk_predicted",
                "at_risk_observed",
            ],
            &flagged,
        );
        if s.alternate_at_risk_periods != s.at_risk_periods {
            let other = match s.basis {
                LossBasis::Predicted => LossBasis::Observed,
                LossBasis::Observed => LossBasis::Predicted,
            };
            md.push_str(&format!(
                "Under the {other} basis the flagged months would be: {}.\n\n",
                if s.alternate_at_risk_periods.is_empty() {
                    "none".to_string()
                } else {
                    s.alternate_at_risk_periods.join(", ")
                }
            ));
        }
    }
}
