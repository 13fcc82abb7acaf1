use polars::prelude::*;

/// How a CSV column is interpreted after ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Free-form identifier (period name, fund name).
    Text,
    /// Numeric amount or ratio; integer cells are widened to `f64`.
    Float,
    /// Integer class label.
    Label,
}

impl ColumnKind {
    fn target_dtype(self) -> DataType {
        match self {
            ColumnKind::Text => DataType::String,
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Label => DataType::Int64,
        }
    }
}

/// One required column: canonical header plus an English alias accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub header: &'static str,
    pub alias: &'static str,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub const fn text(header: &'static str, alias: &'static str) -> Self {
        Self {
            header,
            alias,
            kind: ColumnKind::Text,
        }
    }

    pub const fn float(header: &'static str, alias: &'static str) -> Self {
        Self {
            header,
            alias,
            kind: ColumnKind::Float,
        }
    }

    pub const fn label(header: &'static str, alias: &'static str) -> Self {
        Self {
            header,
            alias,
            kind: ColumnKind::Label,
        }
    }
}

/// Expected input layout of one supervision table.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl TableSchema {
    /// Canonical headers in declaration order.
    pub fn headers(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.header).collect()
    }

    /// Read dtypes for every column, under both its header and its alias.
    ///
    /// Passed to the CSV reader so a numeric column never gets fixed as an
    /// integer column from a prefix of whole-number cells.
    pub fn dtype_overrides(&self) -> Schema {
        Schema::from_iter(self.columns.iter().flat_map(|c| {
            [
                Field::new(c.header.into(), c.kind.target_dtype()),
                Field::new(c.alias.into(), c.kind.target_dtype()),
            ]
        }))
    }

    pub fn spec(&self, header: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.header == header)
    }

    /// Find the frame column backing `spec`, trying the canonical header first.
    pub fn locate<'a>(&self, df: &'a DataFrame, spec: &ColumnSpec) -> Result<&'a Column, SchemaError> {
        df.column(spec.header)
            .or_else(|_| df.column(spec.alias))
            .map_err(|_| SchemaError::MissingColumn {
                table: self.name,
                column: spec.header,
                alias: spec.alias,
            })
    }

    /// Check that every required column is present and castable to its kind.
    pub fn validate(&self, df: &DataFrame) -> Result<(), SchemaError> {
        for spec in self.columns {
            self.coerce(df, spec)?;
        }
        Ok(())
    }

    /// Locate `spec` and strictly cast it to the dtype its kind expects.
    pub fn coerce(&self, df: &DataFrame, spec: &ColumnSpec) -> Result<Series, SchemaError> {
        let column = self.locate(df, spec)?;
        column
            .as_materialized_series()
            .strict_cast(&spec.kind.target_dtype())
            .map_err(|e| SchemaError::TypeMismatch {
                column: spec.header,
                expected: spec.kind,
                detail: e.to_string(),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("{table}: missing required column '{column}' (or alias '{alias}')")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
        alias: &'static str,
    },

    #[error("column '{column}' cannot be read as {expected:?}: {detail}")]
    TypeMismatch {
        column: &'static str,
        expected: ColumnKind,
        detail: String,
    },
}
