//! Supervision configuration: one table per page plus a shared seed.
//!
//! Every field has a default, so an empty file (or no file at all) reproduces
//! the dashboard's initial slider positions. Example:
//!
//! ```toml
//! seed = 42
//!
//! [insolvency]
//! threshold = -0.15
//!
//! [asset_loss]
//! basis = "observed"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipelines::{
    AnomalyConfig, AssetLossConfig, ComplianceConfig, CreditRiskConfig, InsolvencyConfig,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{field} = {value} is outside the allowed range {range}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        range: &'static str,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionConfig {
    /// When set, overrides the seed of every stochastic page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub anomaly: AnomalyConfig,
    pub insolvency: InsolvencyConfig,
    pub credit_risk: CreditRiskConfig,
    pub asset_loss: AssetLossConfig,
    pub compliance: ComplianceConfig,
}

impl SupervisionConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parse, apply the shared seed, and validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(text)?;
        if let Some(seed) = config.seed {
            config.set_seed(seed);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = Some(seed);
        self.anomaly.seed = seed;
        self.insolvency.seed = seed;
        self.credit_risk.seed = seed;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.anomaly.validate()?;
        self.insolvency.validate()?;
        self.credit_risk.validate()?;
        self.asset_loss.validate()?;
        self.compliance.validate()?;
        Ok(())
    }
}

/// `Ok` when `ok` holds, otherwise an out-of-range error for `field`.
pub(crate) fn ensure(
    field: &'static str,
    value: f64,
    ok: bool,
    range: &'static str,
) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::LossBasis;

    #[test]
    fn empty_config_uses_defaults() {
        let config = SupervisionConfig::from_toml_str("").unwrap();
        assert_eq!(config, SupervisionConfig::default());
        assert_eq!(config.anomaly.contamination, 0.2);
        assert_eq!(config.insolvency.threshold, -0.1);
        assert_eq!(config.credit_risk.test_fraction, 0.3);
        assert_eq!(config.asset_loss.threshold, -5.0);
        assert_eq!(config.asset_loss.basis, LossBasis::Predicted);
        assert_eq!(config.compliance.car_threshold, 8.0);
        assert_eq!(config.compliance.bad_debt_threshold, 3.0);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = SupervisionConfig::from_toml_str(
            r#"
            [insolvency]
            threshold = -0.25

            [asset_loss]
            basis = "observed"
            "#,
        )
        .unwrap();
        assert_eq!(config.insolvency.threshold, -0.25);
        assert_eq!(config.insolvency.contamination, 0.2);
        assert_eq!(config.asset_loss.basis, LossBasis::Observed);
        assert_eq!(config.asset_loss.threshold, -5.0);
    }

    #[test]
    fn shared_seed_overrides_pages() {
        let config = SupervisionConfig::from_toml_str("seed = 7").unwrap();
        assert_eq!(config.anomaly.seed, 7);
        assert_eq!(config.insolvency.seed, 7);
        assert_eq!(config.credit_risk.seed, 7);
    }

    #[test]
    fn out_of_range_values_rejected() {
        let cases = [
            "[anomaly]\ncontamination = 0.0",
            "[anomaly]\ncontamination = 0.51",
            "[insolvency]\nthreshold = 0.1",
            "[credit_risk]\nc = 0.0",
            "[credit_risk]\ntest_fraction = 1.0",
            "[credit_risk]\nmax_iter = 0",
            "[asset_loss]\nthreshold = -11.0",
            "[compliance]\ncar_threshold = 4.0",
            "[compliance]\nbad_debt_threshold = 12.0",
            "[anomaly]\nn_estimators = 0",
        ];
        for case in cases {
            assert!(
                matches!(
                    SupervisionConfig::from_toml_str(case),
                    Err(ConfigError::OutOfRange { .. })
                ),
                "accepted: {case}"
            );
        }
    }

    #[test]
    fn unknown_basis_is_a_parse_error() {
        assert!(matches!(
            SupervisionConfig::from_toml_str("[asset_loss]\nbasis = \"both\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = SupervisionConfig::from_file(Path::new("/nonexistent/fundwatch.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn toml_round_trip() {
        let mut config = SupervisionConfig::default();
        config.set_seed(11);
        config.compliance.car_threshold = 9.0;
        let text = toml::to_string(&config).unwrap();
        assert_eq!(SupervisionConfig::from_toml_str(&text).unwrap(), config);
    }
}
