//! Durable storage for tables.
//!
//! Tables are persisted as Parquet files whose Arrow schema is the table
//! schema, struct fields included. [`sort::sort_on_disk`] writes its sorted
//! output through the same path and reads it back.

/// Parquet read and write adapters.
pub mod parquet;

/// Bounded-memory sort persisted to a Parquet file.
pub mod sort;

pub use self::{
    parquet::Compression,
    sort::{sort_on_disk, DiskSortOptions, SortedTable, DEFAULT_BATCH_SIZE},
};
