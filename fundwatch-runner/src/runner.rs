//! Page runner: wires together config validation, input loading and a pipeline.
//!
//! Two entry points:
//! - `run_page()`: resolves the input (file or embedded sample), then runs. Used by the CLI.
//! - `run_records()`: takes already-loaded inputs. Used for uploads and by tests.

use std::path::Path;

use thiserror::Error;

use crate::config::ConfigError;
use crate::data_loader::{load_inputs, DataSource, LoadError, LoadedInputs};
use crate::pipeline::{Outcome, Pipeline, PipelineError, PipelineKind};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Load(#[from] LoadError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of one page run, with provenance.
#[derive(Debug, Clone)]
pub struct PageRun<P: Pipeline> {
    pub kind: PipelineKind,
    pub source: DataSource,
    pub dataset_hash: String,
    pub input_rows: usize,
    pub config: P::Config,
    pub outcome: Outcome<P::Row, P::Summary>,
}

impl<P: Pipeline> PageRun<P> {
    /// Rows in the page's flagged listing.
    pub fn flagged(&self) -> impl Iterator<Item = &P::Row> + '_ {
        self.outcome.rows.iter().filter(|row| P::is_flagged(row))
    }
}

/// Load the page input from `input` (or the sample) and run the pipeline.
pub fn run_page<P: Pipeline>(
    input: Option<&Path>,
    config: &P::Config,
) -> Result<PageRun<P>, RunError> {
    P::validate_config(config)?;
    let loaded = load_inputs::<P>(input)?;
    run_records::<P>(loaded, config)
}

/// Run the pipeline on pre-loaded inputs; no I/O.
pub fn run_records<P: Pipeline>(
    loaded: LoadedInputs<P::Record>,
    config: &P::Config,
) -> Result<PageRun<P>, RunError> {
    let _span = tracing::info_span!("page", page = %P::KIND).entered();
    tracing::debug!(
        rows = loaded.records.len(),
        source = %loaded.source,
        hash = %loaded.dataset_hash,
        "running pipeline"
    );

    P::validate_config(config)?;
    let outcome = P::run(&loaded.records, config)?;

    Ok(PageRun {
        kind: P::KIND,
        source: loaded.source,
        dataset_hash: loaded.dataset_hash,
        input_rows: loaded.records.len(),
        config: config.clone(),
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::load_inputs_from_bytes;
    use crate::pipelines::{
        AssetLossConfig, AssetLossRegression, ComplianceConfig, ComplianceRules, InsolvencyConfig,
        InsolvencyRisk,
    };

    #[test]
    fn sample_run_records_provenance() {
        let run = run_page::<ComplianceRules>(None, &ComplianceConfig::default()).unwrap();
        assert_eq!(run.kind, PipelineKind::Compliance);
        assert_eq!(run.source, DataSource::Sample);
        assert_eq!(run.input_rows, 20);
        assert_eq!(run.outcome.rows.len(), 20);
        assert_eq!(run.flagged().count(), run.outcome.summary.non_compliant_funds.len());
    }

    #[test]
    fn period_pipeline_reports_original_row_count() {
        let run = run_page::<AssetLossRegression>(None, &AssetLossConfig::default()).unwrap();
        assert_eq!(run.input_rows, 12);
        assert_eq!(run.outcome.rows.len(), 11);
    }

    #[test]
    fn replacement_table_runs_through_same_path() {
        let csv = "fund,cash,short_term_debt,net_cash_flow,equity,overdue_debt\n\
                   A,12,50,3,25,2\nB,8,60,-2,20,3\nC,15,45,1,30,1.5\nD,3,80,-6,15,8\n\
                   E,10,55,0,22,2.5\nF,20,40,4,35,1\n";
        let loaded = load_inputs_from_bytes::<InsolvencyRisk>(csv.as_bytes().to_vec()).unwrap();
        let run = run_records::<InsolvencyRisk>(loaded, &InsolvencyConfig::default()).unwrap();
        assert_eq!(run.source, DataSource::Upload);
        assert_eq!(run.outcome.rows.len(), 6);
    }

    #[test]
    fn invalid_config_rejected_before_loading() {
        let config = ComplianceConfig {
            car_threshold: 20.0,
            ..Default::default()
        };
        let err = run_page::<ComplianceRules>(Some(Path::new("/definitely/missing.csv")), &config)
            .unwrap_err();
        assert!(matches!(err, RunError::Config(_)));
    }

    #[test]
    fn missing_input_is_load_error() {
        let err = run_page::<ComplianceRules>(
            Some(Path::new("/definitely/missing.csv")),
            &ComplianceConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RunError::Load(LoadError::NotFound(_))));
    }
}
