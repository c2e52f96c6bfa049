use std::{
    env,
    fs::File,
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

use arrow::array::RecordBatch;
use log::Level;
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};
use ulid::Ulid;

use super::parquet::{create_file, read_table, write_error, writer_properties, Compression};
use crate::{
    error::{QuiverError, Result},
    logging::quiver_log,
    schema::SchemaRef,
    sort::{sort_indices, SortKeys},
    table::Table,
};

/// Rows materialized per write when sorting on disk.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Options for [`sort_on_disk`].
#[derive(Debug, Clone)]
pub struct DiskSortOptions {
    batch_size: usize,
    directory: PathBuf,
    path: Option<PathBuf>,
    compression: Compression,
}

impl Default for DiskSortOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            directory: env::temp_dir(),
            path: None,
            compression: Compression::default(),
        }
    }
}

impl DiskSortOptions {
    /// Number of sorted rows taken from the source table per write. Also
    /// the row group size of the output file.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Directory receiving `<ulid>.parquet` when no explicit path is set.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Exact output file. Takes precedence over the directory.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    fn output_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => self.directory.join(format!("{}.parquet", Ulid::new())),
        }
    }
}

/// A table read back from the file [`sort_on_disk`] wrote.
#[derive(Debug, Clone)]
pub struct SortedTable {
    table: Table,
    path: PathBuf,
}

impl SortedTable {
    /// The Parquet file holding the sorted rows. It is not removed when the
    /// table is dropped.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

impl Deref for SortedTable {
    type Target = Table;

    fn deref(&self) -> &Self::Target {
        &self.table
    }
}

/// Parquet writer that is closed on every exit path. A failed write leaves
/// the partial file in place.
struct ScopedWriter {
    path: PathBuf,
    writer: Option<ArrowWriter<File>>,
}

impl ScopedWriter {
    fn create(path: PathBuf, schema: &SchemaRef, props: WriterProperties) -> Result<Self> {
        let writer = ArrowWriter::try_new(
            create_file(&path)?,
            Arc::clone(schema.arrow_schema()),
            Some(props),
        )?;
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }

    fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .write(batch)
                .map_err(|err| write_error(&self.path, err))?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.close().map_err(|err| write_error(&self.path, err))?;
        }
        Ok(())
    }
}

impl Drop for ScopedWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(err) = writer.close() {
                quiver_log!(
                    Level::Warn,
                    "disk_sort_close_failed",
                    "path={} error={}",
                    self.path.display(),
                    err
                );
            }
        }
    }
}

/// Sorts `table` by `keys` into a Parquet file and reads the result back.
///
/// Only the permutation and one batch of `options.batch_size` rows are held
/// beyond the source table while writing. The source table is dropped before
/// the file is reopened. Ties keep their input order, so the result equals
/// [`Table::sort_by`] with the same keys.
///
/// On failure the partially written file, if any, is left in place; I/O
/// errors carry its path.
pub fn sort_on_disk(
    table: Table,
    keys: impl Into<SortKeys>,
    options: &DiskSortOptions,
) -> Result<SortedTable> {
    if options.batch_size == 0 {
        return Err(QuiverError::InvalidArgument(
            "disk sort batch size must be positive".to_string(),
        ));
    }
    let keys = keys.into();
    let indices = sort_indices(&table, &keys)?;
    quiver_log!(
        Level::Info,
        "disk_sort_permutation",
        "rows={} keys={}",
        indices.len(),
        keys.len()
    );

    let schema = Arc::clone(table.schema());
    let path = options.output_path();
    let mut writer = ScopedWriter::create(
        path.clone(),
        &schema,
        writer_properties(options.compression, options.batch_size),
    )?;
    for (i, batch) in indices.chunks(options.batch_size).enumerate() {
        for record_batch in table.take(batch)?.to_record_batches()? {
            writer.write(&record_batch)?;
        }
        quiver_log!(
            Level::Debug,
            "disk_sort_batch",
            "batch={} rows={}",
            i,
            batch.len()
        );
    }
    writer.finish()?;
    drop(indices);
    drop(table);

    let table = read_table(&schema, &path, options.batch_size)?;
    quiver_log!(
        Level::Info,
        "disk_sort_reopened",
        "path={} rows={}",
        path.display(),
        table.len()
    );
    Ok(SortedTable { table, path })
}
