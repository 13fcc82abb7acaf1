//! Page 5: regulatory compliance checks.
//!
//! No model is fitted. Each fund's capital adequacy ratio and bad-debt ratio
//! are compared with the configured limits.

use fundwatch_core::data::{ColumnSpec, DataError, RawTable, TableSchema};
use fundwatch_core::features::ratio_pct;
use serde::{Deserialize, Serialize};

use crate::config::{ensure, ConfigError};
use crate::pipeline::{Formula, Outcome, Pipeline, PipelineError, PipelineKind};
use crate::report::{num, push_kv_table, push_listing, yes_no};

pub const FUND: &str = "Quỹ";
pub const EQUITY: &str = "Vốn chủ sở hữu";
pub const TOTAL_ASSETS: &str = "Tổng tài sản";
pub const RISK_WEIGHTED_ASSETS: &str = "Tài sản có rủi ro";
pub const BAD_DEBT: &str = "Nợ xấu";
pub const TOTAL_LOANS: &str = "Tổng dư nợ";

pub static SCHEMA: TableSchema = TableSchema {
    name: "compliance",
    columns: &[
        ColumnSpec::text(FUND, "fund"),
        ColumnSpec::float(EQUITY, "equity"),
        ColumnSpec::float(TOTAL_ASSETS, "total_assets"),
        ColumnSpec::float(RISK_WEIGHTED_ASSETS, "risk_weighted_assets"),
        ColumnSpec::float(BAD_DEBT, "bad_debt"),
        ColumnSpec::float(TOTAL_LOANS, "total_loans"),
    ],
};

static FORMULAS: [Formula; 2] = [
    Formula {
        column: "capital_adequacy_ratio",
        expression: "Vốn chủ sở hữu / Tài sản có rủi ro * 100",
        meaning: "Own capital held against risk-weighted assets (CAR).",
    },
    Formula {
        column: "bad_debt_ratio",
        expression: "Nợ xấu / Tổng dư nợ * 100",
        meaning: "Share of the loan book that is non-performing.",
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundCapital {
    #[serde(rename = "Quỹ")]
    pub fund: String,
    #[serde(rename = "Vốn chủ sở hữu")]
    pub equity: f64,
    #[serde(rename = "Tổng tài sản")]
    pub total_assets: f64,
    #[serde(rename = "Tài sản có rủi ro")]
    pub risk_weighted_assets: f64,
    #[serde(rename = "Nợ xấu")]
    pub bad_debt: f64,
    #[serde(rename = "Tổng dư nợ")]
    pub total_loans: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceRow {
    #[serde(rename = "Quỹ")]
    pub fund: String,
    #[serde(rename = "Vốn chủ sở hữu")]
    pub equity: f64,
    #[serde(rename = "Tổng tài sản")]
    pub total_assets: f64,
    #[serde(rename = "Tài sản có rủi ro")]
    pub risk_weighted_assets: f64,
    #[serde(rename = "Nợ xấu")]
    pub bad_debt: f64,
    #[serde(rename = "Tổng dư nợ")]
    pub total_loans: f64,
    pub capital_adequacy_ratio: f64,
    pub bad_debt_ratio: f64,
    pub car_compliant: bool,
    pub bad_debt_compliant: bool,
    pub overall_compliant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Minimum CAR in percent.
    pub car_threshold: f64,
    /// Maximum bad-debt ratio in percent.
    pub bad_debt_threshold: f64,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            car_threshold: 8.0,
            bad_debt_threshold: 3.0,
        }
    }
}

impl ComplianceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure(
            "compliance.car_threshold",
            self.car_threshold,
            (5.0..=15.0).contains(&self.car_threshold),
            "[5, 15]",
        )?;
        ensure(
            "compliance.bad_debt_threshold",
            self.bad_debt_threshold,
            (1.0..=10.0).contains(&self.bad_debt_threshold),
            "[1, 10]",
        )
    }
}

/// Outcome of the two rules for one fund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplianceCheck {
    pub car_compliant: bool,
    pub bad_debt_compliant: bool,
}

impl ComplianceCheck {
    pub fn overall(self) -> bool {
        self.car_compliant && self.bad_debt_compliant
    }
}

/// Both limits are inclusive. A NaN ratio fails its rule.
pub fn evaluate(car: f64, bad_debt_ratio: f64, config: &ComplianceConfig) -> ComplianceCheck {
    ComplianceCheck {
        car_compliant: car >= config.car_threshold,
        bad_debt_compliant: bad_debt_ratio <= config.bad_debt_threshold,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub funds: usize,
    pub car_threshold: f64,
    pub bad_debt_threshold: f64,
    pub compliant: usize,
    pub car_breaches: usize,
    pub bad_debt_breaches: usize,
    pub non_compliant_funds: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ComplianceRules;

impl Pipeline for ComplianceRules {
    const KIND: PipelineKind = PipelineKind::Compliance;

    type Record = FundCapital;
    type Row = ComplianceRow;
    type Summary = ComplianceSummary;
    type Config = ComplianceConfig;

    fn schema() -> &'static TableSchema {
        &SCHEMA
    }

    fn sample() -> Vec<FundCapital> {
        let equity = [25.0, 20.0, 30.0, 10.0, 22.0, 35.0, 12.0, 28.0, 20.0, 26.0, 8.0, 23.0, 29.0, 9.0, 24.0, 32.0, 19.0, 27.0, 15.0, 31.0];
        let assets = [200.0, 180.0, 220.0, 150.0, 190.0, 250.0, 160.0, 210.0, 170.0, 200.0, 140.0, 185.0, 230.0, 145.0, 195.0, 260.0, 155.0, 205.0, 175.0, 240.0];
        let rwa = [150.0, 140.0, 160.0, 140.0, 145.0, 180.0, 160.0, 165.0, 135.0, 155.0, 130.0, 140.0, 170.0, 135.0, 150.0, 190.0, 125.0, 160.0, 150.0, 175.0];
        let bad_debt = [2.0, 3.0, 1.5, 8.0, 2.5, 1.0, 6.0, 1.8, 3.5, 2.2, 9.0, 2.8, 1.7, 7.0, 3.0, 1.2, 4.5, 2.0, 5.0, 1.8];

        (0..20)
            .map(|i| FundCapital {
                fund: format!("Quỹ {}", i + 1),
                equity: equity[i],
                total_assets: assets[i],
                risk_weighted_assets: rwa[i],
                bad_debt: bad_debt[i],
                total_loans: 120.0 + 5.0 * i as f64,
            })
            .collect()
    }

    fn from_table(table: &RawTable) -> Result<Vec<FundCapital>, DataError> {
        let fund = table.text(FUND)?;
        let equity = table.floats(EQUITY)?;
        let assets = table.floats(TOTAL_ASSETS)?;
        let rwa = table.floats(RISK_WEIGHTED_ASSETS)?;
        let bad_debt = table.floats(BAD_DEBT)?;
        let loans = table.floats(TOTAL_LOANS)?;

        Ok((0..table.len())
            .map(|i| FundCapital {
                fund: fund[i].clone(),
                equity: equity[i],
                total_assets: assets[i],
                risk_weighted_assets: rwa[i],
                bad_debt: bad_debt[i],
                total_loans: loans[i],
            })
            .collect())
    }

    fn formulas() -> &'static [Formula] {
        &FORMULAS
    }

    fn validate_config(config: &ComplianceConfig) -> Result<(), ConfigError> {
        config.validate()
    }

    fn run(
        records: &[FundCapital],
        config: &ComplianceConfig,
    ) -> Result<Outcome<ComplianceRow, ComplianceSummary>, PipelineError> {
        let rows: Vec<ComplianceRow> = records
            .iter()
            .map(|r| {
                let car = ratio_pct(r.equity, r.risk_weighted_assets);
                let bad_debt_ratio = ratio_pct(r.bad_debt, r.total_loans);
                let check = evaluate(car, bad_debt_ratio, config);
                ComplianceRow {
                    fund: r.fund.clone(),
                    equity: r.equity,
                    total_assets: r.total_assets,
                    risk_weighted_assets: r.risk_weighted_assets,
                    bad_debt: r.bad_debt,
                    total_loans: r.total_loans,
                    capital_adequacy_ratio: car,
                    bad_debt_ratio,
                    car_compliant: check.car_compliant,
                    bad_debt_compliant: check.bad_debt_compliant,
                    overall_compliant: check.overall(),
                }
            })
            .collect();

        let non_compliant_funds: Vec<String> = rows
            .iter()
            .filter(|r| Self::is_flagged(r))
            .map(|r| r.fund.clone())
            .collect();
        tracing::info!(
            funds = rows.len(),
            non_compliant = non_compliant_funds.len(),
            "compliance checks finished"
        );

        let summary = ComplianceSummary {
            funds: rows.len(),
            car_threshold: config.car_threshold,
            bad_debt_threshold: config.bad_debt_threshold,
            compliant: rows.len() - non_compliant_funds.len(),
            car_breaches: rows.iter().filter(|r| !r.car_compliant).count(),
            bad_debt_breaches: rows.iter().filter(|r| !r.bad_debt_compliant).count(),
            non_compliant_funds,
        };
        Ok(Outcome { rows, summary })
    }

    fn is_flagged(row: &ComplianceRow) -> bool {
        !row.overall_compliant
    }

    fn write_report(outcome: &Outcome<ComplianceRow, ComplianceSummary>, md: &mut String) {
        let s = &outcome.summary;
        md.push_str("## Rules\n\n");
        push_kv_table(
            md,
            &[
                ("Minimum CAR", format!("{}%", num(s.car_threshold))),
                ("Maximum Bad-Debt Ratio", format!("{}%", num(s.bad_debt_threshold))),
                ("Funds", s.funds.to_string()),
                ("Compliant Funds", s.compliant.to_string()),
                ("CAR Breaches", s.car_breaches.to_string()),
                ("Bad-Debt Breaches", s.bad_debt_breaches.to_string()),
            ],
        );

        let flagged: Vec<Vec<String>> = outcome
            .rows
            .iter()
            .filter(|r| Self::is_flagged(r))
            .map(|r| {
                vec![
                    r.fund.clone(),
                    num(r.capital_adequacy_ratio),
                    num(r.bad_debt_ratio),
                    yes_no(r.car_compliant),
                    yes_no(r.bad_debt_compliant),
                ]
            })
            .collect();
        push_listing(
            md,
            "Non-Compliant Funds",
            "Every fund meets both limits.",
            &[
                FUND,
                "capital_adequacy_ratio",
                "bad_debt_ratio",
                "car_compliant",
                "bad_debt_compliant",
            ],
            &flagged,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_inclusive() {
        let config = ComplianceConfig::default();
        let check = evaluate(8.0, 3.0, &config);
        assert!(check.car_compliant);
        assert!(check.bad_debt_compliant);
        assert!(check.overall());

        let check = evaluate(7.999, 3.001, &config);
        assert!(!check.car_compliant);
        assert!(!check.bad_debt_compliant);
    }

    #[test]
    fn nan_ratio_is_not_compliant() {
        let check = evaluate(f64::NAN, f64::NAN, &ComplianceConfig::default());
        assert!(!check.car_compliant);
        assert!(!check.bad_debt_compliant);
    }

    #[test]
    fn sample_ratios_follow_formulas() {
        let outcome =
            ComplianceRules::run(&ComplianceRules::sample(), &ComplianceConfig::default()).unwrap();
        let first = &outcome.rows[0];
        assert!((first.capital_adequacy_ratio - 25.0 / 150.0 * 100.0).abs() < 1e-12);
        assert!((first.bad_debt_ratio - 2.0 / 120.0 * 100.0).abs() < 1e-12);
        assert!(first.overall_compliant);
    }

    #[test]
    fn summary_counts_agree_with_rows() {
        let outcome =
            ComplianceRules::run(&ComplianceRules::sample(), &ComplianceConfig::default()).unwrap();
        let s = &outcome.summary;
        assert_eq!(s.funds, 20);
        assert_eq!(s.compliant + s.non_compliant_funds.len(), 20);
        // Quỹ 11: CAR 8/130 ≈ 6.15%, bad debt 9/170 ≈ 5.29%.
        assert!(s.non_compliant_funds.contains(&"Quỹ 11".to_string()));
    }

    #[test]
    fn zero_risk_weighted_assets_is_not_an_error() {
        let mut records = ComplianceRules::sample();
        records[0].risk_weighted_assets = 0.0;
        let outcome = ComplianceRules::run(&records, &ComplianceConfig::default()).unwrap();
        assert!(outcome.rows[0].capital_adequacy_ratio.is_infinite());
        assert!(outcome.rows[0].car_compliant);
    }

    #[test]
    fn thresholds_validated() {
        let config = ComplianceConfig {
            car_threshold: 4.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = ComplianceConfig {
            bad_debt_threshold: 11.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
