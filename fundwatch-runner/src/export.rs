//! Export: CSV result tables, JSON manifests, and the artifact bundle.
//!
//! Provides three export formats for a page run:
//! - **CSV**: the full augmented table, re-parseable into the same rows
//! - **JSON**: run manifest (config, summary, provenance) with schema versioning
//! - **Markdown**: the human-readable report from [`crate::report`]
//!
//! Persisted manifests include a `schema_version` field. Newer versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::data_loader::DataSource;
use crate::pipeline::{Pipeline, PipelineKind};
use crate::report::generate_report;
use crate::runner::{PageRun, SCHEMA_VERSION};

pub const RESULT_FILE: &str = "result.csv";
pub const SUMMARY_FILE: &str = "summary.json";
pub const REPORT_FILE: &str = "report.md";

// ─── CSV export ─────────────────────────────────────────────────────

/// Serialize rows as UTF-8 comma-delimited CSV with a header row.
pub fn export_csv<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for row in rows {
        wtr.serialize(row).context("failed to serialize CSV row")?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Parse CSV produced by [`export_csv`] back into rows.
pub fn import_csv<T: DeserializeOwned>(text: &str) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_reader(text.as_bytes());
    rdr.deserialize()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("failed to parse CSV row {}", i + 1)))
        .collect()
}

/// The embedded sample of a page as a CSV template.
pub fn sample_csv<P: Pipeline>() -> Result<String> {
    export_csv(&P::sample())
}

// ─── JSON manifest ──────────────────────────────────────────────────

/// Persisted description of one run: everything but the row table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest<C, S> {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub page: PipelineKind,
    pub created_at: DateTime<Local>,
    pub source: DataSource,
    pub dataset_hash: String,
    pub input_rows: usize,
    pub output_rows: usize,
    pub config: C,
    pub summary: S,
}

/// Page-independent part of a manifest, read before the typed body.
#[derive(Deserialize)]
struct ManifestHeader {
    page: PipelineKind,
}

/// Default schema version for manifests written before the field existed.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl<P: Pipeline> From<&PageRun<P>> for RunManifest<P::Config, P::Summary> {
    fn from(run: &PageRun<P>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            page: run.kind,
            created_at: Local::now(),
            source: run.source.clone(),
            dataset_hash: run.dataset_hash.clone(),
            input_rows: run.input_rows,
            output_rows: run.outcome.rows.len(),
            config: run.config.clone(),
            summary: run.outcome.summary.clone(),
        }
    }
}

/// Serialize the manifest of a run to pretty JSON.
pub fn export_manifest<P: Pipeline>(run: &PageRun<P>) -> Result<String> {
    serde_json::to_string_pretty(&RunManifest::from(run))
        .context("failed to serialize run manifest to JSON")
}

/// Deserialize a manifest, rejecting newer schema versions.
pub fn import_manifest<C: DeserializeOwned, S: DeserializeOwned>(
    json: &str,
) -> Result<RunManifest<C, S>> {
    let manifest: RunManifest<C, S> =
        serde_json::from_str(json).context("failed to deserialize run manifest from JSON")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a page run.
///
/// Creates a directory named `{page}_{timestamp}/` under `output_dir`
/// containing:
/// - `result.csv`: the augmented result table
/// - `summary.json`: the run manifest
/// - `report.md`: the Markdown report
///
/// Returns the path to the created directory.
pub fn save_artifacts<P: Pipeline>(run: &PageRun<P>, output_dir: &Path) -> Result<PathBuf> {
    let dirname = format!(
        "{}_{}",
        run.kind.slug(),
        Local::now().format("%Y%m%d_%H%M%S")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let csv = export_csv(&run.outcome.rows)?;
    write_file(&run_dir.join(RESULT_FILE), &csv)?;

    let json = export_manifest(run)?;
    write_file(&run_dir.join(SUMMARY_FILE), &json)?;

    write_file(&run_dir.join(REPORT_FILE), &generate_report(run))?;

    tracing::info!(page = %run.kind, dir = %run_dir.display(), "artifacts saved");
    Ok(run_dir)
}

/// Load the manifest and result rows from an artifact directory.
pub fn load_artifacts<P: Pipeline>(
    dir: &Path,
) -> Result<(RunManifest<P::Config, P::Summary>, Vec<P::Row>)> {
    let manifest_path = dir.join(SUMMARY_FILE);
    let json = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    let header: ManifestHeader =
        serde_json::from_str(&json).context("failed to read run manifest header")?;
    if header.page != P::KIND {
        bail!(
            "artifact directory holds a '{}' run, expected '{}'",
            header.page,
            P::KIND
        );
    }
    let manifest: RunManifest<P::Config, P::Summary> = import_manifest(&json)?;

    let csv_path = dir.join(RESULT_FILE);
    let csv = std::fs::read_to_string(&csv_path)
        .with_context(|| format!("failed to read {}", csv_path.display()))?;
    Ok((manifest, import_csv(&csv)?))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).with_context(|| format!("failed to write {}", path.display()))
}
