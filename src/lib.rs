//! Typed, schema-driven nested tables on top of Arrow.
//!
//! A [`Schema`] describes a nested record shape; a [`Table`] binds chunked
//! Arrow columns to it. Tables are built through validated constructors and
//! never mutated: selecting, sorting, concatenating and flattening all
//! return new tables that share buffers with their inputs where possible.
//!
//! ```
//! use std::sync::Arc;
//!
//! use quiver::{row, schema, Field, Schema, Table};
//!
//! let pair = Arc::new(schema!(("x", Int64, false), ("y", Int64, false)));
//! let wrapper = Arc::new(Schema::new(vec![
//!     pair.as_field("pair"),
//!     Field::new("id", quiver::arrow::datatypes::DataType::Utf8, false),
//! ]));
//! let table = Table::from_rows(
//!     &wrapper,
//!     &[
//!         row! { "id" => "1", "pair" => row! { "x" => 1_i64, "y" => 2_i64 } },
//!         row! { "id" => "2", "pair" => row! { "x" => 3_i64, "y" => 4_i64 } },
//!     ],
//! )
//! .unwrap();
//!
//! let flat = table.flatten().unwrap();
//! assert_eq!(flat.schema().flattened_names(), vec!["pair.x", "pair.y", "id"]);
//! assert_eq!(flat.unflatten(&wrapper).unwrap(), table);
//! ```

mod logging;

/// Chunked column storage.
pub mod column;
/// Concatenation and chunk layout diagnostics.
pub mod concat;
/// Delimited text adapters.
pub mod csv;
pub mod error;
/// Nested to dot-qualified conversion.
pub mod flatten;
/// Parquet persistence and the out-of-core sort.
pub mod ondisk;
pub mod schema;
/// Sort keys and permutations.
pub mod sort;
pub mod table;
/// Dynamic cell values and row mappings.
pub mod value;

pub use arrow;
pub use parquet;

pub use crate::{
    column::ChunkedColumn,
    concat::concatenate,
    csv::CsvOptions,
    error::{QuiverError, Result},
    flatten::{flatten, unflatten},
    ondisk::{sort_on_disk, Compression, DiskSortOptions, SortedTable},
    schema::{Field, FieldType, Schema, SchemaRef},
    sort::{SortKey, SortKeys, SortOrder},
    table::{ColumnData, ColumnMap, ColumnRef, Rows, StructInput, Table, TableData},
    value::{RowMap, Value},
};
