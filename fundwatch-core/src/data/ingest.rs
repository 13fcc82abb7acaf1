use polars::prelude::*;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use crate::data::schema::{ColumnKind, SchemaError, TableSchema};

/// Reads a supervision CSV into typed columns keyed by canonical header.
pub struct DataIngestor {
    schema: &'static TableSchema,
}

impl DataIngestor {
    pub fn new(schema: &'static TableSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &'static TableSchema {
        self.schema
    }

    fn read_options(&self) -> CsvReadOptions {
        CsvReadOptions::default()
            .with_has_header(true)
            .with_schema_overwrite(Some(Arc::new(self.schema.dtype_overrides())))
    }

    /// Ingest a CSV file from disk.
    pub fn ingest_csv(&self, path: &Path) -> Result<RawTable, DataError> {
        let df = self
            .read_options()
            .try_into_reader_with_file_path(Some(path.to_path_buf()))
            .and_then(|reader| reader.finish())
            .map_err(|e| DataError::IngestFailed(format!("{}: {e}", path.display())))?;
        self.ingest_frame(&df)
    }

    /// Ingest CSV content already held in memory (e.g. an uploaded file).
    pub fn ingest_bytes(&self, bytes: Vec<u8>) -> Result<RawTable, DataError> {
        let df = self
            .read_options()
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()
            .map_err(|e| DataError::IngestFailed(e.to_string()))?;
        self.ingest_frame(&df)
    }

    /// Extract every schema column from an existing frame.
    pub fn ingest_frame(&self, df: &DataFrame) -> Result<RawTable, DataError> {
        let rows = df.height();
        if rows == 0 {
            return Err(DataError::EmptyTable(self.schema.name));
        }

        let mut table = RawTable {
            rows,
            text: HashMap::new(),
            floats: HashMap::new(),
            labels: HashMap::new(),
        };

        for spec in self.schema.columns {
            let series = self.schema.coerce(df, spec)?;
            let column = spec.header;
            match spec.kind {
                ColumnKind::Text => {
                    let values = series
                        .str()
                        .map_err(|e| DataError::IngestFailed(e.to_string()))?
                        .into_iter()
                        .enumerate()
                        .map(|(row, v)| {
                            v.map(str::to_string)
                                .ok_or(DataError::MissingValue { column, row })
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    table.text.insert(column, values);
                }
                ColumnKind::Float => {
                    let values = series
                        .f64()
                        .map_err(|e| DataError::IngestFailed(e.to_string()))?
                        .into_iter()
                        .enumerate()
                        .map(|(row, v)| v.ok_or(DataError::MissingValue { column, row }))
                        .collect::<Result<Vec<_>, _>>()?;
                    table.floats.insert(column, values);
                }
                ColumnKind::Label => {
                    let values = series
                        .i64()
                        .map_err(|e| DataError::IngestFailed(e.to_string()))?
                        .into_iter()
                        .enumerate()
                        .map(|(row, v)| v.ok_or(DataError::MissingValue { column, row }))
                        .collect::<Result<Vec<_>, _>>()?;
                    table.labels.insert(column, values);
                }
            }
        }

        tracing::debug!(table = self.schema.name, rows, "ingested table");
        Ok(table)
    }
}

/// Column-oriented view of an ingested table, keyed by canonical header.
#[derive(Debug, Clone)]
pub struct RawTable {
    rows: usize,
    text: HashMap<&'static str, Vec<String>>,
    floats: HashMap<&'static str, Vec<f64>>,
    labels: HashMap<&'static str, Vec<i64>>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn text(&self, header: &str) -> Result<&[String], DataError> {
        self.text
            .get(header)
            .map(Vec::as_slice)
            .ok_or_else(|| DataError::UnknownColumn(header.to_string()))
    }

    pub fn floats(&self, header: &str) -> Result<&[f64], DataError> {
        self.floats
            .get(header)
            .map(Vec::as_slice)
            .ok_or_else(|| DataError::UnknownColumn(header.to_string()))
    }

    pub fn labels(&self, header: &str) -> Result<&[i64], DataError> {
        self.labels
            .get(header)
            .map(Vec::as_slice)
            .ok_or_else(|| DataError::UnknownColumn(header.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("ingest failed: {0}")]
    IngestFailed(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("{0}: table has no rows")]
    EmptyTable(&'static str),

    #[error("column '{column}' row {row}: empty cell")]
    MissingValue { column: &'static str, row: usize },

    #[error("column '{column}' row {row}: {reason}")]
    InvalidValue {
        column: &'static str,
        row: usize,
        reason: String,
    },

    #[error("column '{0}' is not part of the table schema")]
    UnknownColumn(String),
}
