use std::{
    fs::{self, File},
    io,
    path::Path,
    sync::Arc,
};

use arrow::{array::RecordBatch, error::ArrowError};
use parquet::{
    arrow::{arrow_reader::ParquetRecordBatchReaderBuilder, ArrowWriter},
    basic::{Compression as ParquetCompression, ZstdLevel},
    errors::ParquetError,
    file::properties::{WriterProperties, DEFAULT_MAX_ROW_GROUP_SIZE},
};

use crate::{
    error::{QuiverError, Result},
    schema::{Schema, SchemaRef},
    table::Table,
};

/// Rows per record batch when reading a file back.
pub(crate) const DEFAULT_READ_BATCH_SIZE: usize = 8192;

/// Compression applied to persisted pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    /// Zstd with default tuning.
    Zstd,
}

pub(crate) fn writer_properties(
    compression: Compression,
    max_row_group_size: usize,
) -> WriterProperties {
    let builder = match compression {
        Compression::None => {
            WriterProperties::builder().set_compression(ParquetCompression::UNCOMPRESSED)
        }
        Compression::Zstd => WriterProperties::builder()
            .set_compression(ParquetCompression::ZSTD(ZstdLevel::default())),
    };
    builder.set_max_row_group_size(max_row_group_size).build()
}

/// Maps a write failure to [`QuiverError::Io`] when the writer reports an
/// underlying I/O error, so callers learn which file is affected.
pub(crate) fn write_error(path: &Path, err: ParquetError) -> QuiverError {
    match err {
        ParquetError::External(source) => match source.downcast::<io::Error>() {
            Ok(source) => QuiverError::io(path, *source),
            Err(source) => QuiverError::Parquet(ParquetError::External(source)),
        },
        other => QuiverError::Parquet(other),
    }
}

/// Opens `path` for writing, creating missing parent directories.
pub(crate) fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| QuiverError::io(parent, err))?;
    }
    File::create(path).map_err(|err| QuiverError::io(path, err))
}

/// Reads a file written for `schema`. The file's Arrow schema must be
/// structurally equal to `schema`.
pub(crate) fn read_table(schema: &SchemaRef, path: &Path, batch_size: usize) -> Result<Table> {
    let file = File::open(path).map_err(|err| QuiverError::io(path, err))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?.with_batch_size(batch_size);
    let file_schema = Schema::try_from_arrow(builder.schema())?;
    if &file_schema != schema.as_ref() {
        return Err(QuiverError::SchemaMismatch(format!(
            "{} has schema {file_schema}, expected {schema}",
            path.display()
        )));
    }
    let batches = builder
        .build()?
        .collect::<std::result::Result<Vec<RecordBatch>, ArrowError>>()?;
    Table::from_record_batches(schema, batches)
}

impl Table {
    /// Writes the table to a new Parquet file at `path`, uncompressed.
    pub fn to_parquet(&self, path: impl AsRef<Path>) -> Result<()> {
        self.to_parquet_with(path, Compression::default())
    }

    pub fn to_parquet_with(&self, path: impl AsRef<Path>, compression: Compression) -> Result<()> {
        let path = path.as_ref();
        let mut writer = ArrowWriter::try_new(
            create_file(path)?,
            Arc::clone(self.schema().arrow_schema()),
            Some(writer_properties(compression, DEFAULT_MAX_ROW_GROUP_SIZE)),
        )?;
        for batch in self.to_record_batches()? {
            writer
                .write(&batch)
                .map_err(|err| write_error(path, err))?;
        }
        writer.close().map_err(|err| write_error(path, err))?;
        Ok(())
    }

    /// Reads a Parquet file written for `schema`.
    pub fn from_parquet(schema: &SchemaRef, path: impl AsRef<Path>) -> Result<Table> {
        read_table(schema, path.as_ref(), DEFAULT_READ_BATCH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc};

    use parquet::errors::ParquetError;
    use tempfile::TempDir;

    use super::{write_error, Compression};
    use crate::{
        error::QuiverError,
        row, schema,
        schema::{Field, Schema, SchemaRef},
        table::Table,
    };

    fn wrapper_schema() -> SchemaRef {
        let pair = Arc::new(schema!(("x", Int64, false), ("y", Int64, true)));
        Arc::new(Schema::new(vec![
            pair.as_field("pair"),
            Field::new("id", arrow::datatypes::DataType::Utf8, false),
        ]))
    }

    fn wrapper() -> Table {
        Table::from_rows(
            &wrapper_schema(),
            &[
                row! { "id" => "1", "pair" => row! { "x" => 1_i64, "y" => 2_i64 } },
                row! { "id" => "2", "pair" => row! { "x" => 3_i64, "y" => None::<i64> } },
            ],
        )
        .unwrap()
    }

    #[test]
    fn round_trip_nested_table() {
        let tmp = TempDir::new().unwrap();
        let table = wrapper();
        for (name, compression) in [("plain", Compression::None), ("zstd", Compression::Zstd)] {
            let path = tmp.path().join(format!("{name}.parquet"));
            table.to_parquet_with(&path, compression).unwrap();
            let read = Table::from_parquet(&wrapper_schema(), &path).unwrap();
            assert_eq!(read, table);
        }
    }

    #[test]
    fn read_checks_schema() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wrapper.parquet");
        wrapper().to_parquet(&path).unwrap();

        let other = Arc::new(schema!(("id", Utf8, false)));
        let err = Table::from_parquet(&other, &path).unwrap_err();
        assert!(matches!(err, QuiverError::SchemaMismatch(_)));

        let err = Table::from_parquet(&other, tmp.path().join("missing.parquet")).unwrap_err();
        assert!(matches!(err, QuiverError::Io { .. }));
    }

    #[test]
    fn empty_table_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/empty.parquet");
        let empty = Table::empty(&wrapper_schema());
        empty.to_parquet(&path).unwrap();
        assert_eq!(Table::from_parquet(&wrapper_schema(), &path).unwrap(), empty);
    }

    #[test]
    fn io_failures_keep_the_path() {
        let err = ParquetError::External(Box::new(io::Error::new(
            io::ErrorKind::Other,
            "no space left",
        )));
        match write_error("out.parquet".as_ref(), err) {
            QuiverError::Io { path, source } => {
                assert_eq!(path, std::path::PathBuf::from("out.parquet"));
                assert_eq!(source.kind(), io::ErrorKind::Other);
            }
            other => panic!("unexpected error {other:?}"),
        }
        let err = write_error("out.parquet".as_ref(), ParquetError::General("bad".into()));
        assert!(matches!(err, QuiverError::Parquet(_)));
    }
}
