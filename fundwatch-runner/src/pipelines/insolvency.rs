//! Page 2: funds at risk of running out of liquidity.
//!
//! Four balance-sheet ratios plus net cash flow are standardized over the
//! batch and scored by an isolation forest. A fund is flagged `risk = 1` when
//! its score falls strictly below the configured threshold.

use fundwatch_core::data::{ColumnSpec, DataError, RawTable, TableSchema};
use fundwatch_core::features::ratio_pct;
use fundwatch_core::ml::{IsolationForest, IsolationForestParams, StandardScaler};
use fundwatch_core::rng::DEFAULT_SEED;
use serde::{Deserialize, Serialize};

use crate::config::{ensure, ConfigError};
use crate::pipeline::{Formula, Outcome, Pipeline, PipelineError, PipelineKind};
use crate::report::{num, push_kv_table, push_listing};

pub const FUND: &str = "Quỹ";
pub const CASH: &str = "Tiền mặt";
pub const SHORT_TERM_DEBT: &str = "Nợ ngắn hạn";
pub const NET_CASH_FLOW: &str = "Dòng tiền ròng";
pub const EQUITY: &str = "Vốn chủ sở hữu";
pub const OVERDUE_DEBT: &str = "Nợ quá hạn";

pub static SCHEMA: TableSchema = TableSchema {
    name: "insolvency",
    columns: &[
        ColumnSpec::text(FUND, "fund"),
        ColumnSpec::float(CASH, "cash"),
        ColumnSpec::float(SHORT_TERM_DEBT, "short_term_debt"),
        ColumnSpec::float(NET_CASH_FLOW, "net_cash_flow"),
        ColumnSpec::float(EQUITY, "equity"),
        ColumnSpec::float(OVERDUE_DEBT, "overdue_debt"),
    ],
};

static FORMULAS: [Formula; 4] = [
    Formula {
        column: "liquidity_ratio",
        expression: "Tiền mặt / Nợ ngắn hạn * 100",
        meaning: "Ability to repay short-term debt from cash.",
    },
    Formula {
        column: "debt_to_equity",
        expression: "Nợ ngắn hạn / Vốn chủ sở hữu * 100",
        meaning: "Reliance on debt relative to own capital.",
    },
    Formula {
        column: "liquid_asset_ratio",
        expression: "Tiền mặt / (Tiền mặt + Nợ ngắn hạn) * 100",
        meaning: "Cash share of short-term resources.",
    },
    Formula {
        column: "overdue_ratio",
        expression: "Nợ quá hạn / Nợ ngắn hạn * 100",
        meaning: "Share of short-term debt not repaid on schedule.",
    },
];

/// Liquidity position of one fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundLiquidity {
    #[serde(rename = "Quỹ")]
    pub fund: String,
    #[serde(rename = "Tiền mặt")]
    pub cash: f64,
    #[serde(rename = "Nợ ngắn hạn")]
    pub short_term_debt: f64,
    #[serde(rename = "Dòng tiền ròng")]
    pub net_cash_flow: f64,
    #[serde(rename = "Vốn chủ sở hữu")]
    pub equity: f64,
    #[serde(rename = "Nợ quá hạn")]
    pub overdue_debt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InsolvencyFeatures {
    pub liquidity_ratio: f64,
    pub debt_to_equity: f64,
    pub liquid_asset_ratio: f64,
    pub net_cash_flow: f64,
    pub overdue_ratio: f64,
}

impl InsolvencyFeatures {
    pub fn derive(r: &FundLiquidity) -> Self {
        Self {
            liquidity_ratio: ratio_pct(r.cash, r.short_term_debt),
            debt_to_equity: ratio_pct(r.short_term_debt, r.equity),
            liquid_asset_ratio: ratio_pct(r.cash, r.cash + r.short_term_debt),
            net_cash_flow: r.net_cash_flow,
            overdue_ratio: ratio_pct(r.overdue_debt, r.short_term_debt),
        }
    }

    fn to_vec(self) -> Vec<f64> {
        vec![
            self.liquidity_ratio,
            self.debt_to_equity,
            self.liquid_asset_ratio,
            self.net_cash_flow,
            self.overdue_ratio,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsolvencyRow {
    #[serde(rename = "Quỹ")]
    pub fund: String,
    #[serde(rename = "Tiền mặt")]
    pub cash: f64,
    #[serde(rename = "Nợ ngắn hạn")]
    pub short_term_debt: f64,
    #[serde(rename = "Dòng tiền ròng")]
    pub net_cash_flow: f64,
    #[serde(rename = "Vốn chủ sở hữu")]
    pub equity: f64,
    #[serde(rename = "Nợ quá hạn")]
    pub overdue_debt: f64,
    pub liquidity_ratio: f64,
    pub debt_to_equity: f64,
    pub liquid_asset_ratio: f64,
    pub overdue_ratio: f64,
    /// Isolation-forest decision value; lower is more abnormal.
    pub anomaly_score: f64,
    /// `1` when `anomaly_score < threshold`.
    pub risk: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsolvencyConfig {
    pub contamination: f64,
    pub n_estimators: usize,
    /// Funds scoring strictly below this are flagged.
    pub threshold: f64,
    pub seed: u64,
}

impl Default for InsolvencyConfig {
    fn default() -> Self {
        Self {
            contamination: 0.2,
            n_estimators: 100,
            threshold: -0.1,
            seed: DEFAULT_SEED,
        }
    }
}

impl InsolvencyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            "insolvency.contamination",
            self.contamination,
            self.contamination > 0.0 && self.contamination <= 0.5,
            "(0, 0.5]",
        )?;
        ensure(
            "insolvency.n_estimators",
            self.n_estimators as f64,
            self.n_estimators > 0,
            ">= 1",
        )?;
        ensure(
            "insolvency.threshold",
            self.threshold,
            (-0.5..=0.0).contains(&self.threshold),
            "[-0.5, 0]",
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsolvencySummary {
    pub funds: usize,
    pub contamination: f64,
    pub threshold: f64,
    pub offset: f64,
    pub at_risk_funds: Vec<String>,
}

/// Decision scores of the isolation forest fitted on standardized features.
pub fn anomaly_scores(
    features: &[InsolvencyFeatures],
    config: &InsolvencyConfig,
) -> Result<(Vec<f64>, f64), PipelineError> {
    let matrix: Vec<Vec<f64>> = features.iter().map(|f| f.to_vec()).collect();
    let (_, scaled) = StandardScaler::fit_transform(&matrix)?;
    let params = IsolationForestParams {
        n_estimators: config.n_estimators,
        contamination: config.contamination,
        max_samples: None,
        seed: config.seed,
    };
    let forest = IsolationForest::fit(&scaled, &params)?;
    Ok((forest.decision_function(&scaled)?, forest.offset()))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InsolvencyRisk;

impl Pipeline for InsolvencyRisk {
    const KIND: PipelineKind = PipelineKind::Insolvency;

    type Record = FundLiquidity;
    type Row = InsolvencyRow;
    type Summary = InsolvencySummary;
    type Config = InsolvencyConfig;

    fn schema() -> &'static TableSchema {
        &SCHEMA
    }

    fn sample() -> Vec<FundLiquidity> {
        let cash = [12.0, 8.0, 15.0, 3.0, 10.0, 20.0, 5.0, 18.0, 7.0, 14.0, 2.0, 9.0, 16.0, 4.0, 11.0, 19.0, 6.0, 13.0, 8.0, 17.0];
        let debt = [50.0, 60.0, 45.0, 80.0, 55.0, 40.0, 70.0, 50.0, 65.0, 48.0, 90.0, 52.0, 47.0, 75.0, 58.0, 42.0, 68.0, 53.0, 62.0, 46.0];
        let flow = [3.0, -2.0, 1.0, -6.0, 0.0, 4.0, -4.0, 2.0, -3.0, 1.0, -8.0, 0.0, 3.0, -5.0, -1.0, 5.0, -3.0, 2.0, -2.0, 4.0];
        let equity = [25.0, 20.0, 30.0, 15.0, 22.0, 35.0, 18.0, 28.0, 20.0, 26.0, 12.0, 23.0, 29.0, 17.0, 24.0, 32.0, 19.0, 27.0, 21.0, 31.0];
        let overdue = [2.0, 3.0, 1.5, 8.0, 2.5, 1.0, 4.0, 1.8, 3.5, 2.2, 9.0, 2.8, 1.7, 6.0, 3.0, 1.2, 4.5, 2.0, 3.2, 1.8];

        (0..20)
            .map(|i| FundLiquidity {
                fund: format!("Quỹ {}", i + 1),
                cash: cash[i],
                short_term_debt: debt[i],
                net_cash_flow: flow[i],
                equity: equity[i],
                overdue_debt: overdue[i],
            })
            .collect()
    }

    fn from_table(table: &RawTable) -> Result<Vec<FundLiquidity>, DataError> {
        let fund = table.text(FUND)?;
        let cash = table.floats(CASH)?;
        let debt = table.floats(SHORT_TERM_DEBT)?;
        let flow = table.floats(NET_CASH_FLOW)?;
        let equity = table.floats(EQUITY)?;
        let overdue = table.floats(OVERDUE_DEBT)?;

        Ok((0..table.len())
            .map(|i| FundLiquidity {
                fund: fund[i].clone(),
                cash: cash[i],
                short_term_debt: debt[i],
                net_cash_flow: flow[i],
                equity: equity[i],
                overdue_debt: overdue[i],
            })
            .collect())
    }

    fn formulas() -> &'static [Formula] {
        &FORMULAS
    }

    fn validate_config(config: &InsolvencyConfig) -> Result<(), ConfigError> {
        config.validate()
    }

    fn run(
        records: &[FundLiquidity],
        config: &InsolvencyConfig,
    ) -> Result<Outcome<InsolvencyRow, InsolvencySummary>, PipelineError> {
        let features: Vec<InsolvencyFeatures> =
            records.iter().map(InsolvencyFeatures::derive).collect();
        let (scores, offset) = anomaly_scores(&features, config)?;

        let rows: Vec<InsolvencyRow> = records
            .iter()
            .zip(&features)
            .zip(scores)
            .map(|((r, f), score)| InsolvencyRow {
                fund: r.fund.clone(),
                cash: r.cash,
                short_term_debt: r.short_term_debt,
                net_cash_flow: r.net_cash_flow,
                equity: r.equity,
                overdue_debt: r.overdue_debt,
                liquidity_ratio: f.liquidity_ratio,
                debt_to_equity: f.debt_to_equity,
                liquid_asset_ratio: f.liquid_asset_ratio,
                overdue_ratio: f.overdue_ratio,
                anomaly_score: score,
                risk: u8::from(score < config.threshold),
            })
            .collect();

        let at_risk_funds: Vec<String> = rows
            .iter()
            .filter(|r| Self::is_flagged(r))
            .map(|r| r.fund.clone())
            .collect();
        tracing::info!(
            funds = rows.len(),
            at_risk = at_risk_funds.len(),
            threshold = config.threshold,
            "insolvency scoring finished"
        );

        let summary = InsolvencySummary {
            funds: rows.len(),
            contamination: config.contamination,
            threshold: config.threshold,
            offset,
            at_risk_funds,
        };
        Ok(Outcome { rows, summary })
    }

    fn is_flagged(row: &InsolvencyRow) -> bool {
        row.risk == 1
    }

    fn write_report(outcome: &Outcome<InsolvencyRow, InsolvencySummary>, md: &mut String) {
        let s = &outcome.summary;
        md.push_str("## Model\n\n");
        push_kv_table(
            md,
            &[
                ("Model", "Isolation forest on standardized features".to_string()),
                ("Contamination", num(s.contamination)),
                ("Score Threshold", num(s.threshold)),
                ("Score Offset", format!("{:.4}", s.offset)),
                ("Funds", s.funds.to_string()),
            ],
        );
        md.push_str(
            "Scores near zero or positive are ordinary; strongly negative scores mark funds \
             that the forest isolates in few splits. A fund is flagged when its score is \
             below the threshold, so a threshold closer to 0 flags more funds.\n\n",
        );

        let flagged: Vec<Vec<String>> = outcome
            .rows
            .iter()
            .filter(|r| Self::is_flagged(r))
            .map(|r| {
                vec![
                    r.fund.clone(),
                    num(r.liquidity_ratio),
                    num(r.debt_to_equity),
                    num(r.liquid_asset_ratio),
                    num(r.net_cash_flow),
                    num(r.overdue_ratio),
                    format!("{:.4}", r.anomaly_score),
                ]
            })
            .collect();
        push_listing(
            md,
            "Funds at Risk of Insolvency",
            "No fund scores below the threshold.",
            &[
                FUND,
                "liquidity_ratio",
                "debt_to_equity",
                "liquid_asset_ratio",
                NET_CASH_FLOW,
                "overdue_ratio",
                "anomaly_score",
            ],
            &flagged,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_with_threshold(threshold: f64) -> Outcome<InsolvencyRow, InsolvencySummary> {
        let config = InsolvencyConfig {
            threshold,
            ..Default::default()
        };
        InsolvencyRisk::run(&InsolvencyRisk::sample(), &config).unwrap()
    }

    #[test]
    fn features_follow_formulas() {
        let f = InsolvencyFeatures::derive(&InsolvencyRisk::sample()[0]);
        assert!((f.liquidity_ratio - 24.0).abs() < 1e-12);
        assert!((f.debt_to_equity - 200.0).abs() < 1e-12);
        assert!((f.liquid_asset_ratio - 12.0 / 62.0 * 100.0).abs() < 1e-12);
        assert!((f.overdue_ratio - 4.0).abs() < 1e-12);
        assert_eq!(f.net_cash_flow, 3.0);
    }

    #[test]
    fn flagged_set_is_exactly_scores_below_threshold() {
        let outcome = run_with_threshold(-0.1);
        assert_eq!(outcome.rows.len(), 20);
        for row in &outcome.rows {
            assert_eq!(row.risk == 1, row.anomaly_score < -0.1, "{}", row.fund);
        }
    }

    #[test]
    fn raising_threshold_never_shrinks_flagged_set() {
        let mut previous: Vec<String> = Vec::new();
        for step in 0..=10 {
            let threshold = -0.5 + 0.05 * step as f64;
            let current = run_with_threshold(threshold).summary.at_risk_funds;
            assert!(previous.iter().all(|f| current.contains(f)));
            previous = current;
        }
    }

    #[test]
    fn scores_do_not_depend_on_threshold() {
        let a = run_with_threshold(-0.5);
        let b = run_with_threshold(0.0);
        let sa: Vec<f64> = a.rows.iter().map(|r| r.anomaly_score).collect();
        let sb: Vec<f64> = b.rows.iter().map(|r| r.anomaly_score).collect();
        assert_eq!(sa, sb);
    }

    #[test]
    fn zero_debt_fund_is_rejected_by_model() {
        let mut records = InsolvencyRisk::sample();
        records[0].short_term_debt = 0.0;
        assert!(matches!(
            InsolvencyRisk::run(&records, &InsolvencyConfig::default()),
            Err(PipelineError::Model(_))
        ));
    }

    #[test]
    fn threshold_range_enforced() {
        let config = InsolvencyConfig {
            threshold: -0.6,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
