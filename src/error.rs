use std::{io, path::PathBuf};

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

/// Errors raised while building, transforming or persisting tables.
#[derive(Debug, Error)]
pub enum QuiverError {
    /// Two schemas that must agree are structurally different.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    /// Columns handed to a constructor disagree in length.
    #[error("length mismatch for column `{column}`: expected {expected} rows, got {actual}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    /// A supplied value or array does not have the field's declared type.
    #[error("type mismatch for column `{column}`: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },
    #[error("null value not allowed in column `{0}`")]
    NullNotAllowed(String),
    /// A row mapping does not have the nested shape of the schema.
    #[error("row structure error: {0}")]
    RowStructure(String),
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("out of memory: failed to allocate {requested} bytes")]
    OutOfMemory { requested: usize },
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// I/O failure on a caller-supplied reader or writer.
    #[error("stream io error: {0}")]
    Stream(#[source] io::Error),
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),
}

pub type Result<T, E = QuiverError> = std::result::Result<T, E>;

impl QuiverError {
    pub(crate) fn type_mismatch(
        column: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        QuiverError::TypeMismatch {
            column: column.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        QuiverError::Io {
            path: path.into(),
            source,
        }
    }
}
