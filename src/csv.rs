//! Delimited text export and import.
//!
//! Tables are written flattened: the header row holds the quoted
//! dot-qualified leaf names, string fields are quoted and nulls are empty
//! fields. Reading parses against the flattened schema and rebuilds the
//! nested table with [`Table::unflatten`]. An empty field reads back as
//! null, except in string columns where it reads back as `""`.

use std::{
    io::{BufRead, BufReader, Read, Write},
    sync::Arc,
};

use arrow::{
    array::{Array, ArrayRef, AsArray, GenericStringArray, OffsetSizeTrait, RecordBatch},
    csv::{reader::Format, ReaderBuilder},
    datatypes::{DataType, Field as ArrowField, Schema as ArrowSchema},
    error::ArrowError,
    util::display::{ArrayFormatter, FormatOptions},
};

use crate::{
    error::{QuiverError, Result},
    schema::{Schema, SchemaRef},
    table::Table,
};

const DEFAULT_DELIMITER: u8 = b',';
const DEFAULT_BATCH_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    delimiter: u8,
    batch_size: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl CsvOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Rows per chunk when reading.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

impl Table {
    pub fn to_csv<W: Write>(&self, writer: W) -> Result<()> {
        self.to_csv_with(writer, &CsvOptions::default())
    }

    pub fn to_csv_with<W: Write>(&self, mut writer: W, options: &CsvOptions) -> Result<()> {
        let flat = self.flatten()?;
        let delimiter = char::from(options.delimiter);

        let mut line = String::new();
        for (i, field) in flat.schema().fields().iter().enumerate() {
            if i > 0 {
                line.push(delimiter);
            }
            line.push_str(&quote(field.name()));
        }
        writeln!(writer, "{line}").map_err(QuiverError::Stream)?;

        let format = FormatOptions::default().with_null("");
        for batch in flat.to_record_batches()? {
            let formatters = batch
                .columns()
                .iter()
                .map(|column| ArrayFormatter::try_new(column.as_ref(), &format))
                .collect::<std::result::Result<Vec<_>, ArrowError>>()?;
            for row in 0..batch.num_rows() {
                line.clear();
                for (i, (column, formatter)) in batch.columns().iter().zip(&formatters).enumerate() {
                    if i > 0 {
                        line.push(delimiter);
                    }
                    if column.is_null(row) {
                        continue;
                    }
                    let value = formatter.value(row).to_string();
                    match column.data_type() {
                        DataType::Utf8 | DataType::LargeUtf8 => line.push_str(&quote(&value)),
                        _ => line.push_str(&value),
                    }
                }
                writeln!(writer, "{line}").map_err(QuiverError::Stream)?;
            }
        }
        writer.flush().map_err(QuiverError::Stream)?;
        Ok(())
    }

    /// Reads a table shaped like `schema` from delimited text with a header
    /// row. Columns may appear in any order but must be exactly the
    /// flattened leaves of `schema`.
    pub fn from_csv<R: Read>(schema: &SchemaRef, reader: R) -> Result<Table> {
        Self::from_csv_with(schema, reader, &CsvOptions::default())
    }

    pub fn from_csv_with<R: Read>(
        schema: &SchemaRef,
        reader: R,
        options: &CsvOptions,
    ) -> Result<Table> {
        let mut reader = BufReader::new(reader);
        let mut header = String::new();
        reader.read_line(&mut header).map_err(QuiverError::Stream)?;
        let (names, _) = Format::default()
            .with_header(true)
            .with_delimiter(options.delimiter)
            .infer_schema(header.as_bytes(), Some(0))?;

        let flat = schema.flattened()?;
        let fields = names
            .fields()
            .iter()
            .map(|name| {
                flat.field_with_name(name.name()).cloned().ok_or_else(|| {
                    QuiverError::SchemaMismatch(format!(
                        "unexpected column `{}` for schema {schema}",
                        name.name()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let file_schema = Arc::new(Schema::try_new(fields)?);
        if file_schema.len() != flat.len() {
            let missing = flat
                .fields()
                .iter()
                .map(|field| field.name())
                .filter(|name| file_schema.index_of(name).is_none())
                .collect::<Vec<_>>();
            return Err(QuiverError::SchemaMismatch(format!(
                "missing columns {missing:?} for schema {schema}"
            )));
        }

        // Empty fields parse as null; string columns read them back as "".
        let read_schema = Arc::new(ArrowSchema::new(
            file_schema
                .arrow_schema()
                .fields()
                .iter()
                .map(|field| match field.data_type() {
                    DataType::Utf8 | DataType::LargeUtf8 => {
                        ArrowField::clone(field).with_nullable(true)
                    }
                    _ => ArrowField::clone(field),
                })
                .collect::<Vec<_>>(),
        ));
        let batches = ReaderBuilder::new(Arc::clone(&read_schema))
            .with_header(false)
            .with_delimiter(options.delimiter)
            .with_batch_size(options.batch_size)
            .build_buffered(reader)?
            .map(|batch| -> Result<RecordBatch> {
                let batch = batch.map_err(|err| match err {
                    ArrowError::IoError(_, source) => QuiverError::Stream(source),
                    other => QuiverError::Arrow(other),
                })?;
                let columns = batch.columns().iter().map(empty_strings_for_nulls).collect();
                Ok(RecordBatch::try_new(Arc::clone(&read_schema), columns)?)
            })
            .collect::<Result<Vec<_>>>()?;
        Table::from_record_batches(&file_schema, batches)?.unflatten(schema)
    }
}

fn empty_strings_for_nulls(array: &ArrayRef) -> ArrayRef {
    if array.null_count() == 0 {
        return Arc::clone(array);
    }
    match array.data_type() {
        DataType::Utf8 => fill_empty(array.as_string::<i32>()),
        DataType::LargeUtf8 => fill_empty(array.as_string::<i64>()),
        _ => Arc::clone(array),
    }
}

fn fill_empty<O: OffsetSizeTrait>(array: &GenericStringArray<O>) -> ArrayRef {
    Arc::new(
        array
            .iter()
            .map(|value| Some(value.unwrap_or_default()))
            .collect::<GenericStringArray<O>>(),
    )
}
