//! FundWatch Runner: supervision pipelines, configuration, export and reporting.
//!
//! This crate builds on `fundwatch-core` to provide:
//! - The [`Pipeline`] trait and the five page pipelines
//! - Input loading from CSV files, uploads or embedded samples
//! - TOML configuration with range validation
//! - CSV/JSON export, artifact bundles and Markdown reports

pub mod config;
pub mod data_loader;
pub mod export;
pub mod pipeline;
pub mod pipelines;
pub mod report;
pub mod runner;

pub use config::{ConfigError, SupervisionConfig};
pub use data_loader::{load_inputs, load_inputs_from_bytes, DataSource, LoadError, LoadedInputs};
pub use export::{
    export_csv, export_manifest, import_csv, import_manifest, load_artifacts, sample_csv,
    save_artifacts, RunManifest,
};
pub use pipeline::{Formula, Outcome, Pipeline, PipelineError, PipelineKind};
pub use pipelines::{
    AnomalyDetection, AssetLossRegression, ComplianceRules, CreditRiskClassification,
    InsolvencyRisk,
};
pub use report::generate_report;
pub use runner::{run_page, run_records, PageRun, RunError, SCHEMA_VERSION};

#[cfg(test)]
mod send_sync_checks {
    use super::*;
    use crate::pipelines::{
        AnomalyRow, AssetLossRow, ComplianceRow, CreditRiskModel, CreditRiskRow, CreditRiskSummary,
        InsolvencyRow,
    };

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn config_is_send_sync() {
        assert_send::<SupervisionConfig>();
        assert_sync::<SupervisionConfig>();
    }

    #[test]
    fn result_rows_are_send_sync() {
        assert_send::<AnomalyRow>();
        assert_sync::<InsolvencyRow>();
        assert_send::<CreditRiskRow>();
        assert_sync::<AssetLossRow>();
        assert_send::<ComplianceRow>();
        assert_sync::<ComplianceRow>();
    }

    #[test]
    fn credit_model_is_send_sync() {
        assert_send::<CreditRiskModel>();
        assert_sync::<CreditRiskModel>();
        assert_send::<CreditRiskSummary>();
    }

    #[test]
    fn page_run_is_send_sync() {
        assert_send::<PageRun<ComplianceRules>>();
        assert_sync::<PageRun<AnomalyDetection>>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}
