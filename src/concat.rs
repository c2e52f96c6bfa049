//! Concatenation and chunk layout diagnostics.

use log::Level;

use crate::{
    column::ChunkedColumn,
    error::{QuiverError, Result},
    logging::quiver_log,
    table::Table,
};

/// Appends the rows of `tables` in order. All inputs must share a
/// structurally equal schema.
///
/// Without `defrag` the chunks of every input are kept, so each column ends
/// up with the sum of the inputs' chunk counts. With `defrag` every column
/// is copied into a single chunk.
pub fn concatenate(tables: &[Table], defrag: bool) -> Result<Table> {
    let (first, rest) = tables.split_first().ok_or_else(|| {
        QuiverError::InvalidArgument("concatenate needs at least one table".to_string())
    })?;
    let schema = first.schema();
    for (i, table) in rest.iter().enumerate() {
        if table.schema() != schema {
            return Err(QuiverError::SchemaMismatch(format!(
                "table {} has schema {}, expected {schema}",
                i + 1,
                table.schema()
            )));
        }
    }

    let columns = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            ChunkedColumn::concat(
                &field.data_type(),
                tables.iter().map(|table| &table.columns()[i]),
            )
        })
        .collect::<Result<Vec<_>>>()?;
    let table = Table::try_new(schema, columns)?;
    quiver_log!(
        Level::Debug,
        "concatenate",
        "tables={} rows={} defrag={}",
        tables.len(),
        table.len(),
        defrag
    );
    if defrag && table.fragmented() {
        let chunks = table.columns().iter().map(ChunkedColumn::num_chunks).sum::<usize>();
        let table = table.defragment()?;
        quiver_log!(
            Level::Debug,
            "defragment",
            "rows={} columns={} chunks_before={}",
            table.len(),
            table.num_columns(),
            chunks
        );
        return Ok(table);
    }
    Ok(table)
}

impl Table {
    /// Number of chunks backing each top-level column, in schema order.
    pub fn chunk_counts(&self) -> Vec<(&str, usize)> {
        self.schema()
            .fields()
            .iter()
            .zip(self.columns())
            .map(|(field, column)| (field.name(), column.num_chunks()))
            .collect()
    }

    /// True when any top-level column spans more than one chunk.
    pub fn fragmented(&self) -> bool {
        self.columns().iter().any(|column| column.num_chunks() > 1)
    }
}
