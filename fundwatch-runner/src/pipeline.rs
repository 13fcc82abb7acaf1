//! The shared shape of a supervision pipeline.
//!
//! Every page follows the same path: typed input records → derived columns →
//! model fit or rule evaluation → threshold/label → result rows plus a
//! summary. A pipeline is a type implementing [`Pipeline`]; it owns its
//! record/row types and its configuration, and never touches another
//! pipeline's state.

use std::fmt;
use std::str::FromStr;

use fundwatch_core::data::{DataError, RawTable, TableSchema};
use fundwatch_core::ml::ModelError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// The five supervision pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    Anomaly,
    Insolvency,
    CreditRisk,
    AssetLoss,
    Compliance,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 5] = [
        PipelineKind::Anomaly,
        PipelineKind::Insolvency,
        PipelineKind::CreditRisk,
        PipelineKind::AssetLoss,
        PipelineKind::Compliance,
    ];

    /// Stable identifier used on the command line and in artifact names.
    pub fn slug(self) -> &'static str {
        match self {
            PipelineKind::Anomaly => "anomaly",
            PipelineKind::Insolvency => "insolvency",
            PipelineKind::CreditRisk => "credit-risk",
            PipelineKind::AssetLoss => "asset-loss",
            PipelineKind::Compliance => "compliance",
        }
    }

    /// Page title as shown to supervisors.
    pub fn title(self) -> &'static str {
        match self {
            PipelineKind::Anomaly => "Phát hiện biến động bất thường",
            PipelineKind::Insolvency => "Phát hiện mất khả năng thanh toán",
            PipelineKind::CreditRisk => "Đánh giá mức độ rủi ro tín dụng",
            PipelineKind::AssetLoss => "Phát hiện thất thoát tài sản",
            PipelineKind::Compliance => "Kiểm tra tuân thủ an toàn vốn và nợ xấu",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for PipelineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|k| k.slug() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown page '{s}' (expected one of: {})",
                    Self::ALL.map(|k| k.slug()).join(", ")
                )
            })
    }
}

/// Documentation of one derived column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Formula {
    pub column: &'static str,
    pub expression: &'static str,
    pub meaning: &'static str,
}

/// Result table plus summary record of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome<R, S> {
    pub rows: Vec<R>,
    pub summary: S,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },
}

pub trait Pipeline {
    const KIND: PipelineKind;

    /// One input row, serialized with the page's CSV headers.
    type Record: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync;
    /// One result row: the input columns plus derived and model columns.
    type Row: Serialize + DeserializeOwned + Clone + fmt::Debug + PartialEq + Send + Sync;
    type Summary: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync;
    type Config: Serialize + DeserializeOwned + Clone + fmt::Debug + Default + Send + Sync;

    fn schema() -> &'static TableSchema;

    /// Embedded dataset used when no input file is given.
    fn sample() -> Vec<Self::Record>;

    fn from_table(table: &RawTable) -> Result<Vec<Self::Record>, DataError>;

    fn formulas() -> &'static [Formula];

    /// Reject configuration values outside their accepted ranges.
    fn validate_config(config: &Self::Config) -> Result<(), ConfigError>;

    fn run(
        records: &[Self::Record],
        config: &Self::Config,
    ) -> Result<Outcome<Self::Row, Self::Summary>, PipelineError>;

    /// Whether a result row is in the page's flagged listing.
    fn is_flagged(row: &Self::Row) -> bool;

    /// Append the page-specific Markdown sections for a finished run.
    fn write_report(outcome: &Outcome<Self::Row, Self::Summary>, md: &mut String);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_round_trip() {
        for kind in PipelineKind::ALL {
            assert_eq!(kind.slug().parse::<PipelineKind>().unwrap(), kind);
        }
    }

    #[test]
    fn parse_accepts_underscores_and_case() {
        assert_eq!(
            "Credit_Risk".parse::<PipelineKind>().unwrap(),
            PipelineKind::CreditRisk
        );
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = "liquidity".parse::<PipelineKind>().unwrap_err();
        assert!(err.contains("asset-loss"));
    }

    #[test]
    fn serde_uses_slugs() {
        let json = serde_json::to_string(&PipelineKind::AssetLoss).unwrap();
        assert_eq!(json, "\"asset-loss\"");
    }
}
