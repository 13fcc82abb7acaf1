//! Page 1: unusual month-over-month movements in lending and deposits.
//!
//! Four monthly ratios feed an isolation forest; months the forest isolates
//! too quickly are flagged `anomaly = -1`. The first month has no prior
//! period and is dropped, as is any month whose ratios are undefined.

use fundwatch_core::data::{ColumnSpec, DataError, RawTable, TableSchema};
use fundwatch_core::features::{all_defined, pct_change, ratio_pct};
use fundwatch_core::ml::{IsolationForest, IsolationForestParams};
use fundwatch_core::rng::DEFAULT_SEED;
use serde::{Deserialize, Serialize};

use crate::config::{ensure, ConfigError};
use crate::pipeline::{Formula, Outcome, Pipeline, PipelineError, PipelineKind};
use crate::report::{num, push_kv_table, push_listing};

pub const PERIOD: &str = "Tháng";
pub const LOAN_BALANCE: &str = "Dư nợ";
pub const DEPOSITS: &str = "Tiền gửi";
pub const OVERDUE_DEBT: &str = "Nợ quá hạn";
pub const LARGE_TRANSACTIONS: &str = "Số giao dịch lớn";

pub static SCHEMA: TableSchema = TableSchema {
    name: "anomaly",
    columns: &[
        ColumnSpec::text(PERIOD, "period"),
        ColumnSpec::float(LOAN_BALANCE, "loan_balance"),
        ColumnSpec::float(DEPOSITS, "deposits"),
        ColumnSpec::float(OVERDUE_DEBT, "overdue_debt"),
        ColumnSpec::float(LARGE_TRANSACTIONS, "large_transactions"),
    ],
};

static FORMULAS: [Formula; 4] = [
    Formula {
        column: "loan_change_pct",
        expression: "(Dư nợ[t] - Dư nợ[t-1]) / Dư nợ[t-1] * 100",
        meaning: "Month-over-month growth or shrinkage of outstanding loans.",
    },
    Formula {
        column: "deposit_change_pct",
        expression: "(Tiền gửi[t] - Tiền gửi[t-1]) / Tiền gửi[t-1] * 100",
        meaning: "Month-over-month change in member deposits.",
    },
    Formula {
        column: "overdue_ratio",
        expression: "Nợ quá hạn / Dư nợ * 100",
        meaning: "Share of loans not repaid on schedule.",
    },
    Formula {
        column: "funding_utilization",
        expression: "Dư nợ / Tiền gửi * 100",
        meaning: "How much of the deposit base is lent out.",
    },
];

/// One month of fund activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyActivity {
    #[serde(rename = "Tháng")]
    pub period: String,
    #[serde(rename = "Dư nợ")]
    pub loan_balance: f64,
    #[serde(rename = "Tiền gửi")]
    pub deposits: f64,
    #[serde(rename = "Nợ quá hạn")]
    pub overdue_debt: f64,
    #[serde(rename = "Số giao dịch lớn")]
    pub large_transactions: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyFeatures {
    pub loan_change_pct: f64,
    pub deposit_change_pct: f64,
    pub overdue_ratio: f64,
    pub funding_utilization: f64,
}

impl AnomalyFeatures {
    fn to_vec(self) -> Vec<f64> {
        vec![
            self.loan_change_pct,
            self.deposit_change_pct,
            self.overdue_ratio,
            self.funding_utilization,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyRow {
    #[serde(rename = "Tháng")]
    pub period: String,
    #[serde(rename = "Dư nợ")]
    pub loan_balance: f64,
    #[serde(rename = "Tiền gửi")]
    pub deposits: f64,
    #[serde(rename = "Nợ quá hạn")]
    pub overdue_debt: f64,
    #[serde(rename = "Số giao dịch lớn")]
    pub large_transactions: f64,
    pub loan_change_pct: f64,
    pub deposit_change_pct: f64,
    pub overdue_ratio: f64,
    pub funding_utilization: f64,
    /// Isolation-forest decision value; negative means outlier.
    pub anomaly_score: f64,
    /// `-1` for anomalous months, `1` otherwise.
    pub anomaly: i8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    pub contamination: f64,
    pub n_estimators: usize,
    pub seed: u64,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            contamination: 0.2,
            n_estimators: 100,
            seed: DEFAULT_SEED,
        }
    }
}

impl AnomalyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            "anomaly.contamination",
            self.contamination,
            self.contamination > 0.0 && self.contamination <= 0.5,
            "(0, 0.5]",
        )?;
        ensure(
            "anomaly.n_estimators",
            self.n_estimators as f64,
            self.n_estimators > 0,
            ">= 1",
        )
    }

    fn forest_params(&self) -> IsolationForestParams {
        IsolationForestParams {
            n_estimators: self.n_estimators,
            contamination: self.contamination,
            max_samples: None,
            seed: self.seed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalySummary {
    pub input_rows: usize,
    pub scored_rows: usize,
    pub dropped_rows: usize,
    pub contamination: f64,
    /// Score offset separating outliers from inliers.
    pub offset: f64,
    pub anomalous_periods: Vec<String>,
}

/// Per-month ratios; the first month's period changes are NaN.
pub fn derive_features(records: &[MonthlyActivity]) -> Vec<AnomalyFeatures> {
    let loans: Vec<f64> = records.iter().map(|r| r.loan_balance).collect();
    let deposits: Vec<f64> = records.iter().map(|r| r.deposits).collect();
    let loan_change = pct_change(&loans);
    let deposit_change = pct_change(&deposits);

    records
        .iter()
        .enumerate()
        .map(|(i, r)| AnomalyFeatures {
            loan_change_pct: loan_change[i],
            deposit_change_pct: deposit_change[i],
            overdue_ratio: ratio_pct(r.overdue_debt, r.loan_balance),
            funding_utilization: ratio_pct(r.loan_balance, r.deposits),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyDetection;

impl Pipeline for AnomalyDetection {
    const KIND: PipelineKind = PipelineKind::Anomaly;

    type Record = MonthlyActivity;
    type Row = AnomalyRow;
    type Summary = AnomalySummary;
    type Config = AnomalyConfig;

    fn schema() -> &'static TableSchema {
        &SCHEMA
    }

    fn sample() -> Vec<MonthlyActivity> {
        let loans = [120.0, 125.0, 130.0, 135.0, 200.0, 190.0, 180.0, 175.0, 170.0, 165.0, 160.0, 155.0];
        let deposits = [100.0, 105.0, 110.0, 115.0, 80.0, 85.0, 90.0, 95.0, 100.0, 105.0, 110.0, 115.0];
        let overdue = [2.4, 2.5, 2.6, 2.7, 6.0, 7.0, 7.5, 8.0, 8.5, 9.0, 9.5, 10.0];
        let large = [6.0, 7.0, 8.0, 9.0, 20.0, 15.0, 12.0, 10.0, 9.0, 8.0, 7.0, 6.0];

        (0..12)
            .map(|i| MonthlyActivity {
                period: format!("Tháng {}", i + 1),
                loan_balance: loans[i],
                deposits: deposits[i],
                overdue_debt: overdue[i],
                large_transactions: large[i],
            })
            .collect()
    }

    fn from_table(table: &RawTable) -> Result<Vec<MonthlyActivity>, DataError> {
        let period = table.text(PERIOD)?;
        let loans = table.floats(LOAN_BALANCE)?;
        let deposits = table.floats(DEPOSITS)?;
        let overdue = table.floats(OVERDUE_DEBT)?;
        let large = table.floats(LARGE_TRANSACTIONS)?;

        Ok((0..table.len())
            .map(|i| MonthlyActivity {
                period: period[i].clone(),
                loan_balance: loans[i],
                deposits: deposits[i],
                overdue_debt: overdue[i],
                large_transactions: large[i],
            })
            .collect())
    }

    fn formulas() -> &'static [Formula] {
        &FORMULAS
    }

    fn validate_config(config: &AnomalyConfig) -> Result<(), ConfigError> {
        config.validate()
    }

    fn run(
        records: &[MonthlyActivity],
        config: &AnomalyConfig,
    ) -> Result<Outcome<AnomalyRow, AnomalySummary>, PipelineError> {
        let features = derive_features(records);
        let kept: Vec<(&MonthlyActivity, AnomalyFeatures)> = records
            .iter()
            .zip(features)
            .filter(|(r, f)| {
                all_defined(&[r.loan_balance, r.deposits, r.overdue_debt, r.large_transactions])
                    && all_defined(&f.to_vec())
            })
            .collect();

        let dropped_rows = records.len() - kept.len();
        if dropped_rows > 1 {
            tracing::warn!(
                dropped_rows,
                "months with undefined ratios were dropped beyond the first period"
            );
        }

        let matrix: Vec<Vec<f64>> = kept.iter().map(|(_, f)| f.to_vec()).collect();
        let forest = IsolationForest::fit(&matrix, &config.forest_params())?;
        let scores = forest.decision_function(&matrix)?;

        let rows: Vec<AnomalyRow> = kept
            .into_iter()
            .zip(scores)
            .map(|((r, f), score)| AnomalyRow {
                period: r.period.clone(),
                loan_balance: r.loan_balance,
                deposits: r.deposits,
                overdue_debt: r.overdue_debt,
                large_transactions: r.large_transactions,
                loan_change_pct: f.loan_change_pct,
                deposit_change_pct: f.deposit_change_pct,
                overdue_ratio: f.overdue_ratio,
                funding_utilization: f.funding_utilization,
                anomaly_score: score,
                anomaly: if score < 0.0 { -1 } else { 1 },
            })
            .collect();

        let anomalous_periods: Vec<String> = rows
            .iter()
            .filter(|r| Self::is_flagged(r))
            .map(|r| r.period.clone())
            .collect();
        tracing::info!(
            months = rows.len(),
            anomalous = anomalous_periods.len(),
            "anomaly detection finished"
        );

        let summary = AnomalySummary {
            input_rows: records.len(),
            scored_rows: rows.len(),
            dropped_rows,
            contamination: config.contamination,
            offset: forest.offset(),
            anomalous_periods,
        };
        Ok(Outcome { rows, summary })
    }

    fn is_flagged(row: &AnomalyRow) -> bool {
        row.anomaly == -1
    }

    fn write_report(outcome: &Outcome<AnomalyRow, AnomalySummary>, md: &mut String) {
        let s = &outcome.summary;
        md.push_str("## Model\n\n");
        push_kv_table(
            md,
            &[
                ("Model", "Isolation forest".to_string()),
                ("Contamination", num(s.contamination)),
                ("Scored Months", s.scored_rows.to_string()),
                ("Dropped Months", s.dropped_rows.to_string()),
                ("Score Offset", format!("{:.4}", s.offset)),
            ],
        );

        let flagged: Vec<Vec<String>> = outcome
            .rows
            .iter()
            .filter(|r| Self::is_flagged(r))
            .map(|r| {
                vec![
                    r.period.clone(),
                    num(r.loan_change_pct),
                    num(r.deposit_change_pct),
                    num(r.overdue_ratio),
                    num(r.funding_utilization),
                    format!("{:.4}", r.anomaly_score),
                ]
            })
            .collect();
        push_listing(
            md,
            "Anomalous Months",
            "No anomalous months.",
            &[
                PERIOD,
                "loan_change_pct",
                "deposit_change_pct",
                "overdue_ratio",
                "funding_utilization",
                "anomaly_score",
            ],
            &flagged,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_month_is_dropped() {
        let records = AnomalyDetection::sample();
        let outcome = AnomalyDetection::run(&records, &AnomalyConfig::default()).unwrap();
        assert_eq!(outcome.rows.len(), records.len() - 1);
        assert_eq!(outcome.rows[0].period, "Tháng 2");
        assert_eq!(outcome.summary.dropped_rows, 1);
    }

    #[test]
    fn ratios_follow_formulas() {
        let records = AnomalyDetection::sample();
        let outcome = AnomalyDetection::run(&records, &AnomalyConfig::default()).unwrap();
        // Tháng 5: loans 135 -> 200, deposits 115 -> 80.
        let may = &outcome.rows[3];
        assert_eq!(may.period, "Tháng 5");
        assert!((may.loan_change_pct - (200.0 - 135.0) / 135.0 * 100.0).abs() < 1e-9);
        assert!((may.deposit_change_pct - (80.0 - 115.0) / 115.0 * 100.0).abs() < 1e-9);
        assert!((may.overdue_ratio - 6.0 / 200.0 * 100.0).abs() < 1e-9);
        assert!((may.funding_utilization - 200.0 / 80.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn sample_flags_between_one_and_forty_percent() {
        let outcome =
            AnomalyDetection::run(&AnomalyDetection::sample(), &AnomalyConfig::default()).unwrap();
        let flagged = outcome.summary.anomalous_periods.len();
        assert!(flagged >= 1);
        assert!(flagged as f64 <= 0.4 * outcome.rows.len() as f64);
    }

    #[test]
    fn flags_are_stable_across_runs() {
        let records = AnomalyDetection::sample();
        let a = AnomalyDetection::run(&records, &AnomalyConfig::default()).unwrap();
        let b = AnomalyDetection::run(&records, &AnomalyConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn undefined_ratio_drops_month() {
        let mut records = AnomalyDetection::sample();
        records[11].loan_balance = 0.0;
        records[11].overdue_debt = 0.0;
        let outcome = AnomalyDetection::run(&records, &AnomalyConfig::default()).unwrap();
        assert_eq!(outcome.summary.dropped_rows, 2);
        assert!(outcome.rows.iter().all(|r| r.period != "Tháng 12"));
    }

    #[test]
    fn infinite_ratio_reaches_model_and_fails() {
        let mut records = AnomalyDetection::sample();
        records[4].loan_balance = 0.0;
        // Month 6 divides by a zero prior balance: infinite, not undefined.
        let err = AnomalyDetection::run(&records, &AnomalyConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Model(fundwatch_core::ml::ModelError::NonFiniteInput { .. })
        ));
    }

    #[test]
    fn invalid_contamination_fails_validation() {
        let config = AnomalyConfig {
            contamination: 0.7,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
