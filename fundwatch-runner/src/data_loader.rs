//! Input resolution for the runner.
//!
//! Given an optional CSV path, produces the typed records a pipeline runs on.
//! The fallback policy:
//! 1. If a path is given and exists → ingest it against the page schema
//! 2. If a path is given but missing → fail with a clear error
//! 3. If no path is given → use the page's embedded sample
//!
//! Uploaded bytes (already in memory) take the same ingestion path as files.
//! Every load records its source and a BLAKE3 hash of the records.

use std::fmt;
use std::path::{Path, PathBuf};

use fundwatch_core::data::{DataError, DataIngestor};
use fundwatch_core::fingerprint::dataset_hash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::Pipeline;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("input file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("failed to fingerprint input records: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

/// Where a pipeline's input came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSource {
    /// The embedded sample dataset.
    Sample,
    File { path: PathBuf },
    /// CSV content handed over in memory.
    Upload,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Sample => f.write_str("embedded sample"),
            DataSource::File { path } => write!(f, "file {}", path.display()),
            DataSource::Upload => f.write_str("uploaded CSV"),
        }
    }
}

/// Records plus provenance.
#[derive(Debug, Clone)]
pub struct LoadedInputs<T> {
    pub records: Vec<T>,
    pub source: DataSource,
    /// BLAKE3 over the JSON-encoded records.
    pub dataset_hash: String,
}

impl<T: Serialize> LoadedInputs<T> {
    fn new(records: Vec<T>, source: DataSource) -> Result<Self, LoadError> {
        let dataset_hash = dataset_hash(&records)?;
        Ok(Self {
            records,
            source,
            dataset_hash,
        })
    }
}

/// Load a page's input from `path`, or its embedded sample when `path` is `None`.
pub fn load_inputs<P: Pipeline>(path: Option<&Path>) -> Result<LoadedInputs<P::Record>, LoadError> {
    let Some(path) = path else {
        tracing::debug!(page = %P::KIND, "no input file given, using embedded sample");
        return LoadedInputs::new(P::sample(), DataSource::Sample);
    };

    if !path.exists() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }

    let table = DataIngestor::new(P::schema()).ingest_csv(path)?;
    let records = P::from_table(&table)?;
    tracing::debug!(
        page = %P::KIND,
        path = %path.display(),
        rows = records.len(),
        "loaded input file"
    );
    LoadedInputs::new(
        records,
        DataSource::File {
            path: path.to_path_buf(),
        },
    )
}

/// Load a page's input from CSV bytes already held in memory.
pub fn load_inputs_from_bytes<P: Pipeline>(
    bytes: Vec<u8>,
) -> Result<LoadedInputs<P::Record>, LoadError> {
    let table = DataIngestor::new(P::schema()).ingest_bytes(bytes)?;
    let records = P::from_table(&table)?;
    tracing::debug!(page = %P::KIND, rows = records.len(), "loaded uploaded CSV");
    LoadedInputs::new(records, DataSource::Upload)
}
