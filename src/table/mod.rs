//! Immutable columnar tables bound to a [`Schema`](crate::schema::Schema).
//!
//! Every top-level field is stored as a [`ChunkedColumn`]. Struct fields hold
//! chunked Arrow struct arrays; [`Table::nested`] exposes them as a `Table`
//! over the same buffers. All operations return new tables.

mod build;

use std::{iter::FusedIterator, sync::Arc};

use arrow::{
    array::{AsArray, RecordBatch, RecordBatchOptions, StructArray},
    datatypes::DataType,
};
pub use build::{ColumnData, ColumnMap, StructInput, TableData};

use crate::{
    column::ChunkedColumn,
    error::{QuiverError, Result},
    schema::SchemaRef,
    sort::{sort_indices, SortKeys},
    value::Value,
};

#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    columns: Vec<ChunkedColumn>,
    num_rows: usize,
}

/// A top-level column as seen through its field: leaf storage, or the
/// nested table of a struct field.
#[derive(Debug, Clone)]
pub enum ColumnRef<'a> {
    Leaf(&'a ChunkedColumn),
    Struct(Table),
}

impl Table {
    /// Binds `columns` to `schema`, checking column count, types, lengths
    /// and nullability.
    pub fn try_new(schema: &SchemaRef, columns: Vec<ChunkedColumn>) -> Result<Self> {
        if columns.len() != schema.len() {
            return Err(QuiverError::SchemaMismatch(format!(
                "schema {schema} has {} fields, got {} columns",
                schema.len(),
                columns.len()
            )));
        }
        let num_rows = columns.first().map_or(0, ChunkedColumn::len);
        for (field, column) in schema.fields().iter().zip(&columns) {
            if &field.data_type() != column.data_type() {
                return Err(QuiverError::type_mismatch(
                    field.name(),
                    field.data_type(),
                    column.data_type(),
                ));
            }
            if column.len() != num_rows {
                return Err(QuiverError::LengthMismatch {
                    column: field.name().to_string(),
                    expected: num_rows,
                    actual: column.len(),
                });
            }
            if let Some(nested) = field.nested() {
                if column.null_count() > 0 {
                    return Err(QuiverError::RowStructure(format!(
                        "struct field `{}` has null rows",
                        field.name()
                    )));
                }
                Table::try_new(nested, struct_children(nested, column)?).map_err(|err| {
                    match err {
                        QuiverError::NullNotAllowed(child) => {
                            QuiverError::NullNotAllowed(format!("{}.{child}", field.name()))
                        }
                        other => other,
                    }
                })?;
            } else if !field.is_nullable() && column.null_count() > 0 {
                return Err(QuiverError::NullNotAllowed(field.name().to_string()));
            }
        }
        Ok(Self {
            schema: Arc::clone(schema),
            columns,
            num_rows,
        })
    }

    pub fn empty(schema: &SchemaRef) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|field| ChunkedColumn::empty(field.data_type()))
            .collect();
        Self {
            schema: Arc::clone(schema),
            columns,
            num_rows: 0,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[ChunkedColumn] {
        &self.columns
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.schema
            .index_of(name)
            .ok_or_else(|| QuiverError::ColumnNotFound(name.to_string()))
    }

    /// Storage of the top-level field `name`. For a struct field this is the
    /// chunked struct array; see [`Table::nested`] for the table view.
    pub fn column(&self, name: &str) -> Result<&ChunkedColumn> {
        Ok(&self.columns[self.position(name)?])
    }

    /// The nested table of the struct field `name`.
    pub fn nested(&self, name: &str) -> Result<Table> {
        self.nested_at(self.position(name)?)
    }

    pub fn get(&self, name: &str) -> Result<ColumnRef<'_>> {
        let i = self.position(name)?;
        if self.schema.field(i).is_struct() {
            Ok(ColumnRef::Struct(self.nested_at(i)?))
        } else {
            Ok(ColumnRef::Leaf(&self.columns[i]))
        }
    }

    pub(crate) fn nested_at(&self, i: usize) -> Result<Table> {
        let field = self.schema.field(i);
        let nested = field.nested().ok_or_else(|| {
            QuiverError::type_mismatch(field.name(), "a struct field", field.data_type())
        })?;
        Ok(Self {
            schema: Arc::clone(nested),
            columns: struct_children(nested, &self.columns[i])?,
            num_rows: self.num_rows,
        })
    }

    /// Resolves a dot-qualified leaf or struct path such as `pair.x`.
    pub fn column_path(&self, path: &str) -> Result<ChunkedColumn> {
        let (positions, _) = self
            .schema
            .resolve(path)
            .ok_or_else(|| QuiverError::ColumnNotFound(path.to_string()))?;
        let (last, parents) = positions
            .split_last()
            .ok_or_else(|| QuiverError::ColumnNotFound(path.to_string()))?;
        let mut table = self.clone();
        for &i in parents {
            table = table.nested_at(i)?;
        }
        Ok(table.columns[*last].clone())
    }

    /// Zero-copy view of `length` rows starting at `offset`, clamped to the
    /// table bounds.
    pub fn slice(&self, offset: usize, length: usize) -> Table {
        let offset = offset.min(self.num_rows);
        let length = length.min(self.num_rows - offset);
        Self {
            schema: Arc::clone(&self.schema),
            columns: self
                .columns
                .iter()
                .map(|column| column.slice(offset, length))
                .collect(),
            num_rows: length,
        }
    }

    /// Lazily yields every row as a length-one table.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            table: self,
            front: 0,
            back: self.num_rows,
        }
    }

    /// Gathers the rows at `indices`, in that order, into a new table with
    /// one chunk per column.
    pub fn take(&self, indices: &[u64]) -> Result<Table> {
        let columns = self
            .columns
            .iter()
            .map(|column| column.take(indices).map(ChunkedColumn::from_array))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            schema: Arc::clone(&self.schema),
            columns,
            num_rows: indices.len(),
        })
    }

    /// Rows whose `column` equals `value`, in their original order.
    pub fn select(&self, column: &str, value: impl Into<Value>) -> Result<Table> {
        let mask = self.column_path(column)?.eq_mask(column, &value.into())?;
        let columns = self
            .columns
            .iter()
            .map(|column| column.filter(&mask))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            schema: Arc::clone(&self.schema),
            columns,
            num_rows: mask.true_count(),
        })
    }

    /// Sorts the table in memory. Accepts a column name (ascending) or a
    /// list of `(column, order)` pairs.
    pub fn sort_by(&self, keys: impl Into<SortKeys>) -> Result<Table> {
        let indices = sort_indices(self, &keys.into())?;
        self.take(&indices)
    }

    /// Splits the table into record batches at the union of all columns'
    /// chunk boundaries, so no column is copied.
    pub fn to_record_batches(&self) -> Result<Vec<RecordBatch>> {
        let mut boundaries = self
            .columns
            .iter()
            .flat_map(|column| column.chunk_offsets().iter().copied())
            .chain([0, self.num_rows])
            .collect::<Vec<_>>();
        boundaries.sort_unstable();
        boundaries.dedup();

        let arrow_schema = Arc::clone(self.schema.arrow_schema());
        let mut batches = Vec::with_capacity(boundaries.len().saturating_sub(1));
        for window in boundaries.windows(2) {
            let (start, length) = (window[0], window[1] - window[0]);
            let arrays = self
                .columns
                .iter()
                .map(|column| column.slice(start, length).to_array())
                .collect::<Result<Vec<_>>>()?;
            let options = RecordBatchOptions::new().with_row_count(Some(length));
            batches.push(RecordBatch::try_new_with_options(
                Arc::clone(&arrow_schema),
                arrays,
                &options,
            )?);
        }
        Ok(batches)
    }

    /// Builds a table with one chunk per column from each batch.
    pub fn from_record_batches(
        schema: &SchemaRef,
        batches: impl IntoIterator<Item = RecordBatch>,
    ) -> Result<Table> {
        let mut chunks = vec![Vec::new(); schema.len()];
        for batch in batches {
            if batch.num_columns() != schema.len() {
                return Err(QuiverError::SchemaMismatch(format!(
                    "schema {schema} has {} fields, record batch has {} columns",
                    schema.len(),
                    batch.num_columns()
                )));
            }
            for (chunk, array) in chunks.iter_mut().zip(batch.columns()) {
                chunk.push(Arc::clone(array));
            }
        }
        let columns = schema
            .fields()
            .iter()
            .zip(chunks)
            .map(|(field, chunks)| {
                ChunkedColumn::try_new(field.data_type(), chunks).map_err(|_| {
                    QuiverError::SchemaMismatch(format!(
                        "record batches do not match field `{}` of {schema}",
                        field.name()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Table::try_new(schema, columns)
    }

    /// The table as chunked struct arrays, ready to be stored as a struct
    /// field of a parent table.
    pub(crate) fn to_struct_column(&self) -> Result<ChunkedColumn> {
        let data_type = DataType::Struct(self.schema.arrow_fields());
        let chunks = self
            .to_record_batches()?
            .into_iter()
            .map(|batch| Arc::new(StructArray::from(batch)) as _)
            .collect();
        ChunkedColumn::try_new(data_type, chunks)
    }

    pub fn to_struct_array(&self) -> Result<StructArray> {
        Ok(self.to_struct_column()?.to_array()?.as_struct().clone())
    }

    /// Rebuilds every column as a single contiguous chunk.
    pub fn defragment(&self) -> Result<Table> {
        let columns = self
            .columns
            .iter()
            .map(ChunkedColumn::defragment)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            schema: Arc::clone(&self.schema),
            columns,
            num_rows: self.num_rows,
        })
    }
}

/// Splits a chunked struct column into one chunked column per child field.
fn struct_children(nested: &SchemaRef, column: &ChunkedColumn) -> Result<Vec<ChunkedColumn>> {
    let mut children = vec![Vec::with_capacity(column.num_chunks()); nested.len()];
    for chunk in column.chunks() {
        let chunk = chunk.as_struct();
        for (child, array) in children.iter_mut().zip(chunk.columns()) {
            child.push(Arc::clone(array));
        }
    }
    nested
        .fields()
        .iter()
        .zip(children)
        .map(|(field, chunks)| ChunkedColumn::try_new(field.data_type(), chunks))
        .collect()
}

/// Tables are equal when their schemas are structurally equal and every
/// column holds the same values. Chunk layout is not compared.
impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.num_rows == other.num_rows
            && self.schema == other.schema
            && self.columns == other.columns
    }
}

/// Row iterator over a [`Table`]; each item is a length-one slice.
#[derive(Debug, Clone)]
pub struct Rows<'a> {
    table: &'a Table,
    front: usize,
    back: usize,
}

impl Iterator for Rows<'_> {
    type Item = Table;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let row = self.table.slice(self.front, 1);
        self.front += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for Rows<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some(self.table.slice(self.back, 1))
    }
}

impl ExactSizeIterator for Rows<'_> {}

impl FusedIterator for Rows<'_> {}

impl<'a> IntoIterator for &'a Table {
    type Item = Table;
    type IntoIter = Rows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows()
    }
}
