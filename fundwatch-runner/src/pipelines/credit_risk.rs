//! Page 3: credit-risk level of each fund.
//!
//! Two ratios are standardized over the whole batch, split 70/30 with a fixed
//! seed, and a multinomial logistic regression is fitted on the training
//! part. Predictions are then made for *every* fund, training rows included;
//! each result row records which split it belonged to so readers can tell
//! in-sample predictions apart. The held-out part is scored with a
//! classification report.

use std::fmt;

use fundwatch_core::data::{ColumnSpec, DataError, RawTable, TableSchema};
use fundwatch_core::features::ratio_pct;
use fundwatch_core::ml::{
    train_test_split, ClassificationReport, LogisticParams, ModelError, MultinomialLogistic,
    StandardScaler,
};
use fundwatch_core::rng::{RngHierarchy, DEFAULT_SEED};
use serde::{Deserialize, Serialize};

use crate::config::{ensure, ConfigError};
use crate::pipeline::{Formula, Outcome, Pipeline, PipelineError, PipelineKind};
use crate::report::{num, push_kv_table, push_listing};

pub const FUND: &str = "Quỹ";
pub const TOTAL_LOANS: &str = "Tổng dư nợ";
pub const BAD_DEBT: &str = "Nợ xấu";
pub const TOTAL_DEPOSITS: &str = "Tổng tiền gửi";
pub const RISK_LABEL: &str = "Risk_Label";

pub static SCHEMA: TableSchema = TableSchema {
    name: "credit-risk",
    columns: &[
        ColumnSpec::text(FUND, "fund"),
        ColumnSpec::float(TOTAL_LOANS, "total_loans"),
        ColumnSpec::float(BAD_DEBT, "bad_debt"),
        ColumnSpec::float(TOTAL_DEPOSITS, "total_deposits"),
        ColumnSpec::label(RISK_LABEL, "risk_label"),
    ],
};

static FORMULAS: [Formula; 2] = [
    Formula {
        column: "bad_debt_ratio",
        expression: "Nợ xấu / Tổng dư nợ * 100",
        meaning: "Share of loans unlikely to be recovered.",
    },
    Formula {
        column: "capital_utilization",
        expression: "Tổng dư nợ / Tổng tiền gửi * 100",
        meaning: "How much of the mobilized deposits is lent out.",
    },
];

/// Human-readable risk level behind labels 0, 1, 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "Thấp")]
    Low,
    #[serde(rename = "Trung bình")]
    Medium,
    #[serde(rename = "Cao")]
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    pub fn from_label(label: i64) -> Option<Self> {
        match label {
            0 => Some(RiskLevel::Low),
            1 => Some(RiskLevel::Medium),
            2 => Some(RiskLevel::High),
            _ => None,
        }
    }

    pub fn label(self) -> i64 {
        match self {
            RiskLevel::Low => 0,
            RiskLevel::Medium => 1,
            RiskLevel::High => 2,
        }
    }

    pub fn vietnamese(self) -> &'static str {
        match self {
            RiskLevel::Low => "Thấp",
            RiskLevel::Medium => "Trung bình",
            RiskLevel::High => "Cao",
        }
    }

    pub fn english(self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.vietnamese(), self.english())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitRole {
    Train,
    Test,
}

/// Credit profile of one fund with its reference risk label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundCreditProfile {
    #[serde(rename = "Quỹ")]
    pub fund: String,
    #[serde(rename = "Tổng dư nợ")]
    pub total_loans: f64,
    #[serde(rename = "Nợ xấu")]
    pub bad_debt: f64,
    #[serde(rename = "Tổng tiền gửi")]
    pub total_deposits: f64,
    #[serde(rename = "Risk_Label")]
    pub risk_label: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditRiskRow {
    #[serde(rename = "Quỹ")]
    pub fund: String,
    #[serde(rename = "Tổng dư nợ")]
    pub total_loans: f64,
    #[serde(rename = "Nợ xấu")]
    pub bad_debt: f64,
    #[serde(rename = "Tổng tiền gửi")]
    pub total_deposits: f64,
    #[serde(rename = "Risk_Label")]
    pub risk_label: i64,
    pub bad_debt_ratio: f64,
    pub capital_utilization: f64,
    pub risk_prediction: i64,
    pub risk_level: RiskLevel,
    pub split: SplitRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditRiskConfig {
    pub test_fraction: f64,
    /// Inverse L2 regularization strength.
    pub c: f64,
    pub max_iter: usize,
    pub seed: u64,
}

impl Default for CreditRiskConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.3,
            c: 1.0,
            max_iter: 1000,
            seed: DEFAULT_SEED,
        }
    }
}

impl CreditRiskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            "credit_risk.test_fraction",
            self.test_fraction,
            self.test_fraction > 0.0 && self.test_fraction < 1.0,
            "(0, 1)",
        )?;
        ensure("credit_risk.c", self.c, self.c > 0.0 && self.c.is_finite(), "> 0")?;
        ensure(
            "credit_risk.max_iter",
            self.max_iter as f64,
            self.max_iter > 0,
            ">= 1",
        )
    }

    fn logistic_params(&self) -> LogisticParams {
        LogisticParams {
            c: self.c,
            max_iter: self.max_iter,
            ..Default::default()
        }
    }
}

/// Fitted scaler and classifier, reusable for single-fund predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditRiskModel {
    scaler: StandardScaler,
    classifier: MultinomialLogistic,
}

impl CreditRiskModel {
    pub fn new(scaler: StandardScaler, classifier: MultinomialLogistic) -> Self {
        Self { scaler, classifier }
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn classifier(&self) -> &MultinomialLogistic {
        &self.classifier
    }

    /// Predict the label of one *unscaled* feature row.
    pub fn classify(&self, features: &[f64; 2]) -> Result<i64, ModelError> {
        let scaled = self.scaler.transform_row(features)?;
        self.classifier.predict_row(&scaled)
    }

    /// Derive the two ratios from raw figures and predict the risk level.
    pub fn predict_what_if(&self, input: &WhatIfInput) -> Result<WhatIfPrediction, PipelineError> {
        input.validate()?;
        let bad_debt_ratio = ratio_pct(input.bad_debt, input.total_loans);
        let capital_utilization = ratio_pct(input.total_loans, input.total_deposits);
        let label = self.classify(&[bad_debt_ratio, capital_utilization])?;
        let level = RiskLevel::from_label(label).ok_or_else(|| PipelineError::InvalidRecord {
            row: 0,
            reason: format!("model produced unknown label {label}"),
        })?;
        Ok(WhatIfPrediction {
            bad_debt_ratio,
            capital_utilization,
            label,
            level,
        })
    }
}

/// Raw figures for a hypothetical fund.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WhatIfInput {
    pub total_loans: f64,
    pub bad_debt: f64,
    pub total_deposits: f64,
}

impl Default for WhatIfInput {
    fn default() -> Self {
        Self {
            total_loans: 100.0,
            bad_debt: 0.0,
            total_deposits: 100.0,
        }
    }
}

impl WhatIfInput {
    /// All figures must be finite and non-negative.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fields = [
            (TOTAL_LOANS, self.total_loans),
            (BAD_DEBT, self.bad_debt),
            (TOTAL_DEPOSITS, self.total_deposits),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && value >= 0.0) {
                return Err(PipelineError::InvalidRecord {
                    row: 0,
                    reason: format!("{name} must be a non-negative number, got {value}"),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WhatIfPrediction {
    pub bad_debt_ratio: f64,
    pub capital_utilization: f64,
    pub label: i64,
    pub level: RiskLevel,
}

/// Held-out evaluation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Evaluation {
    /// Every risk level appears in the held-out split.
    Complete { report: ClassificationReport },
    /// Some levels are missing; the report covers the present ones only.
    Partial {
        present: Vec<i64>,
        missing: Vec<i64>,
        warning: String,
        report: ClassificationReport,
    },
    Failed { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskGroups {
    pub low: Vec<String>,
    pub medium: Vec<String>,
    pub high: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditRiskSummary {
    pub funds: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub converged: bool,
    pub iterations: usize,
    pub groups: RiskGroups,
    pub evaluation: Evaluation,
    pub model: CreditRiskModel,
}

pub fn derive_features(r: &FundCreditProfile) -> [f64; 2] {
    [
        ratio_pct(r.bad_debt, r.total_loans),
        ratio_pct(r.total_loans, r.total_deposits),
    ]
}

/// Score held-out predictions over the three risk levels, falling back to the
/// levels actually present when some are missing.
pub fn evaluate(y_test: &[i64], y_pred: &[i64]) -> Evaluation {
    let all: Vec<(i64, &str)> = RiskLevel::ALL
        .iter()
        .map(|l| (l.label(), l.vietnamese()))
        .collect();

    let mut present: Vec<i64> = y_test.to_vec();
    present.sort_unstable();
    present.dedup();
    let missing: Vec<i64> = all
        .iter()
        .map(|(l, _)| *l)
        .filter(|l| !present.contains(l))
        .collect();

    if missing.is_empty() {
        return match ClassificationReport::compute(y_test, y_pred, &all) {
            Ok(report) => Evaluation::Complete { report },
            Err(e) => Evaluation::Failed {
                message: e.to_string(),
            },
        };
    }

    let warning = format!(
        "held-out split has no examples of {}; report covers only {}",
        level_names(&missing),
        level_names(&present)
    );
    if present.is_empty() {
        return Evaluation::Failed { message: warning };
    }
    tracing::warn!("{warning}");

    let labels: Vec<(i64, &str)> = all
        .iter()
        .filter(|(l, _)| present.contains(l))
        .copied()
        .collect();
    match ClassificationReport::compute(y_test, y_pred, &labels) {
        Ok(report) => Evaluation::Partial {
            present,
            missing,
            warning,
            report,
        },
        Err(e) => Evaluation::Failed {
            message: e.to_string(),
        },
    }
}

fn level_names(labels: &[i64]) -> String {
    labels
        .iter()
        .map(|&l| match RiskLevel::from_label(l) {
            Some(level) => format!("{l} ({})", level.vietnamese()),
            None => l.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CreditRiskClassification;

impl Pipeline for CreditRiskClassification {
    const KIND: PipelineKind = PipelineKind::CreditRisk;

    type Record = FundCreditProfile;
    type Row = CreditRiskRow;
    type Summary = CreditRiskSummary;
    type Config = CreditRiskConfig;

    fn schema() -> &'static TableSchema {
        &SCHEMA
    }

    fn sample() -> Vec<FundCreditProfile> {
        let labels = [0, 1, 0, 2, 0, 0, 2, 0, 1, 0, 2, 1, 0, 2, 1, 0, 2, 0, 2, 1];
        let bad_debt = [2.0, 3.0, 1.5, 8.0, 2.5, 1.0, 6.0, 1.8, 3.5, 2.2, 9.0, 2.8, 1.7, 7.0, 3.0, 1.2, 4.5, 2.0, 5.0, 1.8];
        let deposits = [130.0, 120.0, 140.0, 110.0, 145.0, 150.0, 115.0, 160.0, 150.0, 170.0, 120.0, 155.0, 190.0, 130.0, 165.0, 200.0, 140.0, 180.0, 150.0, 220.0];

        (0..20)
            .map(|i| FundCreditProfile {
                fund: format!("Quỹ {}", i + 1),
                total_loans: 120.0 + 5.0 * i as f64,
                bad_debt: bad_debt[i],
                total_deposits: deposits[i],
                risk_label: labels[i],
            })
            .collect()
    }

    fn from_table(table: &RawTable) -> Result<Vec<FundCreditProfile>, DataError> {
        let fund = table.text(FUND)?;
        let loans = table.floats(TOTAL_LOANS)?;
        let bad_debt = table.floats(BAD_DEBT)?;
        let deposits = table.floats(TOTAL_DEPOSITS)?;
        let labels = table.labels(RISK_LABEL)?;

        (0..table.len())
            .map(|i| {
                if RiskLevel::from_label(labels[i]).is_none() {
                    return Err(DataError::InvalidValue {
                        column: RISK_LABEL,
                        row: i,
                        reason: format!("risk label must be 0, 1 or 2, got {}", labels[i]),
                    });
                }
                Ok(FundCreditProfile {
                    fund: fund[i].clone(),
                    total_loans: loans[i],
                    bad_debt: bad_debt[i],
                    total_deposits: deposits[i],
                    risk_label: labels[i],
                })
            })
            .collect()
    }

    fn formulas() -> &'static [Formula] {
        &FORMULAS
    }

    fn validate_config(config: &CreditRiskConfig) -> Result<(), ConfigError> {
        config.validate()
    }

    fn run(
        records: &[FundCreditProfile],
        config: &CreditRiskConfig,
    ) -> Result<Outcome<CreditRiskRow, CreditRiskSummary>, PipelineError> {
        if let Some((row, r)) = records
            .iter()
            .enumerate()
            .find(|(_, r)| RiskLevel::from_label(r.risk_label).is_none())
        {
            return Err(PipelineError::InvalidRecord {
                row,
                reason: format!("risk label must be 0, 1 or 2, got {}", r.risk_label),
            });
        }

        let features: Vec<Vec<f64>> = records.iter().map(|r| derive_features(r).to_vec()).collect();
        let labels: Vec<i64> = records.iter().map(|r| r.risk_label).collect();
        let (scaler, scaled) = StandardScaler::fit_transform(&features)?;

        let mut rng = RngHierarchy::new(config.seed).rng_for("train_test_split", 0);
        let split = train_test_split(records.len(), config.test_fraction, &mut rng)?;
        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<i64>) {
            (
                idx.iter().map(|&i| scaled[i].clone()).collect(),
                idx.iter().map(|&i| labels[i]).collect(),
            )
        };
        let (x_train, y_train) = pick(&split.train);
        let (x_test, y_test) = pick(&split.test);

        let classifier = MultinomialLogistic::fit(&x_train, &y_train, &config.logistic_params())?;
        let predictions = classifier.predict(&scaled)?;
        let evaluation = evaluate(&y_test, &classifier.predict(&x_test)?);

        let held_out = split.test_mask();
        let mut groups = RiskGroups::default();
        let mut rows = Vec::with_capacity(records.len());
        for (i, (r, f)) in records.iter().zip(&features).enumerate() {
            let prediction = predictions[i];
            let level =
                RiskLevel::from_label(prediction).ok_or_else(|| PipelineError::InvalidRecord {
                    row: i,
                    reason: format!("model produced unknown label {prediction}"),
                })?;
            match level {
                RiskLevel::Low => groups.low.push(r.fund.clone()),
                RiskLevel::Medium => groups.medium.push(r.fund.clone()),
                RiskLevel::High => groups.high.push(r.fund.clone()),
            }
            rows.push(CreditRiskRow {
                fund: r.fund.clone(),
                total_loans: r.total_loans,
                bad_debt: r.bad_debt,
                total_deposits: r.total_deposits,
                risk_label: r.risk_label,
                bad_debt_ratio: f[0],
                capital_utilization: f[1],
                risk_prediction: prediction,
                risk_level: level,
                split: if held_out[i] {
                    SplitRole::Test
                } else {
                    SplitRole::Train
                },
            });
        }

        tracing::info!(
            funds = rows.len(),
            train = split.train.len(),
            test = split.test.len(),
            high = groups.high.len(),
            "credit risk classification finished"
        );

        let summary = CreditRiskSummary {
            funds: rows.len(),
            train_rows: split.train.len(),
            test_rows: split.test.len(),
            converged: classifier.converged(),
            iterations: classifier.iterations(),
            groups,
            evaluation,
            model: CreditRiskModel::new(scaler, classifier),
        };
        Ok(Outcome { rows, summary })
    }

    fn is_flagged(row: &CreditRiskRow) -> bool {
        row.risk_level == RiskLevel::High
    }

    fn write_report(outcome: &Outcome<CreditRiskRow, CreditRiskSummary>, md: &mut String) {
        let s = &outcome.summary;
        md.push_str("## Model\n\n");
        push_kv_table(
            md,
            &[
                ("Model", "Multinomial logistic regression (L2)".to_string()),
                ("Training Rows", s.train_rows.to_string()),
                ("Held-out Rows", s.test_rows.to_string()),
                ("Converged", format!("{} ({} iterations)", s.converged, s.iterations)),
            ],
        );
        md.push_str(
            "Predictions cover every fund, including those the model was trained on; \
             the `split` column marks which rows were held out.\n\n",
        );

        for level in RiskLevel::ALL {
            let rows: Vec<Vec<String>> = outcome
                .rows
                .iter()
                .filter(|r| r.risk_level == level)
                .map(|r| {
                    vec![
                        r.fund.clone(),
                        num(r.bad_debt_ratio),
                        num(r.capital_utilization),
                        level.vietnamese().to_string(),
                    ]
                })
                .collect();
            push_listing(
                md,
                &format!("Risk Level: {level}"),
                "No funds at this level.",
                &[FUND, "bad_debt_ratio", "capital_utilization", "risk_level"],
                &rows,
            );
        }

        md.push_str("## Held-out Evaluation\n\n");
        match &s.evaluation {
            Evaluation::Complete { report } => {
                md.push_str(&format!("```text\n{}```\n\n", report.render()));
            }
            Evaluation::Partial {
                warning, report, ..
            } => {
                md.push_str(&format!("> **Warning:** {warning}\n\n"));
                md.push_str(&format!("```text\n{}```\n\n", report.render()));
            }
            Evaluation::Failed { message } => {
                md.push_str(&format!("> **Evaluation failed:** {message}\n\n"));
            }
        }
    }
}
