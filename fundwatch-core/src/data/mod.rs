//! Data ingestion and table schemas

pub mod ingest;
pub mod schema;

pub use ingest::{DataError, DataIngestor, RawTable};
pub use schema::{ColumnKind, ColumnSpec, SchemaError, TableSchema};
