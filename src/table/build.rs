//! Validated table constructors.

use std::collections::{btree_map::Entry, BTreeMap, BTreeSet};

use arrow::array::ArrayRef;

use super::Table;
use crate::{
    column::ChunkedColumn,
    error::{QuiverError, Result},
    schema::{Field, FieldType, SchemaRef},
    value::{leaf_array, RowMap, Value},
};

/// Named columns handed to [`Table::from_pydict`].
pub type ColumnMap = BTreeMap<String, ColumnData>;

/// Input for one column of a constructor.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Array(ArrayRef),
    Chunked(ChunkedColumn),
    /// Row values; a struct field takes [`Value::Struct`] rows.
    Values(Vec<Value>),
    Struct(StructInput),
}

/// Input for a struct field: either raw nested columns that still need
/// validation, or a table that was already built against the nested schema.
#[derive(Debug, Clone)]
pub enum StructInput {
    RawFields(ColumnMap),
    Prebuilt(Table),
}

/// Columns given by position (schema order) or by name.
#[derive(Debug, Clone)]
pub enum TableData {
    Positional(Vec<ColumnData>),
    Named(ColumnMap),
}

impl From<ArrayRef> for ColumnData {
    fn from(array: ArrayRef) -> Self {
        ColumnData::Array(array)
    }
}

impl From<ChunkedColumn> for ColumnData {
    fn from(column: ChunkedColumn) -> Self {
        ColumnData::Chunked(column)
    }
}

impl<T> From<Vec<T>> for ColumnData
where
    T: Into<Value>,
{
    fn from(values: Vec<T>) -> Self {
        ColumnData::Values(values.into_iter().map(Into::into).collect())
    }
}

impl From<Table> for ColumnData {
    fn from(table: Table) -> Self {
        ColumnData::Struct(StructInput::Prebuilt(table))
    }
}

impl From<ColumnMap> for ColumnData {
    fn from(columns: ColumnMap) -> Self {
        ColumnData::Struct(StructInput::RawFields(columns))
    }
}

impl From<Vec<ColumnData>> for TableData {
    fn from(columns: Vec<ColumnData>) -> Self {
        TableData::Positional(columns)
    }
}

impl From<ColumnMap> for TableData {
    fn from(columns: ColumnMap) -> Self {
        TableData::Named(columns)
    }
}

fn resolve_column(field: &Field, data: ColumnData) -> Result<ChunkedColumn> {
    match (field.field_type(), data) {
        (_, ColumnData::Array(array)) => Ok(ChunkedColumn::from_array(array)),
        (_, ColumnData::Chunked(column)) => Ok(column),
        (FieldType::Leaf(data_type), ColumnData::Values(values)) => Ok(
            ChunkedColumn::from_array(leaf_array(
                field.name(),
                data_type,
                field.is_nullable(),
                &values,
            )?),
        ),
        (FieldType::Struct(nested), ColumnData::Values(values)) => {
            let rows = values
                .iter()
                .enumerate()
                .map(|(i, value)| match value {
                    Value::Struct(row) => Ok(row),
                    other => Err(QuiverError::RowStructure(format!(
                        "value {i} of struct field `{}` is {}, expected a nested row",
                        field.name(),
                        other.type_name()
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;
            Table::from_row_refs(nested, &rows)?.to_struct_column()
        }
        (FieldType::Struct(nested), ColumnData::Struct(StructInput::Prebuilt(table))) => {
            if table.schema() != nested {
                return Err(QuiverError::SchemaMismatch(format!(
                    "table for field `{}` has schema {}, expected {nested}",
                    field.name(),
                    table.schema()
                )));
            }
            table.to_struct_column()
        }
        (FieldType::Struct(nested), ColumnData::Struct(StructInput::RawFields(columns))) => {
            Table::from_pydict(nested, columns)?.to_struct_column()
        }
        (FieldType::Leaf(data_type), ColumnData::Struct(_)) => Err(QuiverError::type_mismatch(
            field.name(),
            data_type,
            "nested columns",
        )),
    }
}

impl Table {
    /// Builds a table from arrays in schema field order. Struct fields take
    /// Arrow struct arrays.
    pub fn from_arrays(schema: &SchemaRef, arrays: Vec<ArrayRef>) -> Result<Table> {
        Self::from_data(
            schema,
            TableData::Positional(arrays.into_iter().map(ColumnData::Array).collect()),
        )
    }

    /// Builds a table from columns keyed by field name. Every field must be
    /// present and no other names are accepted.
    pub fn from_pydict(schema: &SchemaRef, mut columns: ColumnMap) -> Result<Table> {
        let mut resolved = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let data = columns.remove(field.name()).ok_or_else(|| {
                QuiverError::SchemaMismatch(format!(
                    "missing column `{}` for schema {schema}",
                    field.name()
                ))
            })?;
            resolved.push(resolve_column(field, data)?);
        }
        if !columns.is_empty() {
            let unexpected = columns.into_keys().collect::<Vec<_>>();
            return Err(QuiverError::SchemaMismatch(format!(
                "unexpected columns {unexpected:?} for schema {schema}"
            )));
        }
        Table::try_new(schema, resolved)
    }

    /// Keyword form of [`Table::from_pydict`]; order of the pairs is free.
    pub fn from_kwargs<K>(
        schema: &SchemaRef,
        columns: impl IntoIterator<Item = (K, ColumnData)>,
    ) -> Result<Table>
    where
        K: Into<String>,
    {
        let mut map = ColumnMap::new();
        for (name, data) in columns {
            match map.entry(name.into()) {
                Entry::Vacant(entry) => {
                    entry.insert(data);
                }
                Entry::Occupied(entry) => {
                    return Err(QuiverError::InvalidArgument(format!(
                        "column `{}` given more than once",
                        entry.key()
                    )))
                }
            }
        }
        Self::from_pydict(schema, map)
    }

    /// Builds a table from row mappings shaped like the schema. Struct fields
    /// take a nested [`Value::Struct`] in every row.
    pub fn from_rows(schema: &SchemaRef, rows: &[RowMap]) -> Result<Table> {
        Self::from_row_refs(schema, &rows.iter().collect::<Vec<_>>())
    }

    pub(crate) fn from_row_refs(schema: &SchemaRef, rows: &[&RowMap]) -> Result<Table> {
        let names = schema
            .fields()
            .iter()
            .map(|field| field.name())
            .collect::<BTreeSet<_>>();
        for (i, row) in rows.iter().enumerate() {
            if let Some(missing) = names.iter().find(|name| !row.contains_key(**name)) {
                return Err(QuiverError::RowStructure(format!(
                    "row {i} is missing field `{missing}`"
                )));
            }
            if let Some(extra) = row.keys().find(|key| !names.contains(key.as_str())) {
                return Err(QuiverError::RowStructure(format!(
                    "row {i} has unexpected field `{extra}`"
                )));
            }
        }

        let mut columns = Vec::with_capacity(schema.len());
        for field in schema.fields() {
            let column = match field.field_type() {
                FieldType::Leaf(data_type) => {
                    let values = rows.iter().map(|row| row[field.name()].clone()).collect::<Vec<_>>();
                    ChunkedColumn::from_array(leaf_array(
                        field.name(),
                        data_type,
                        field.is_nullable(),
                        &values,
                    )?)
                }
                FieldType::Struct(nested) => {
                    let children = rows
                        .iter()
                        .enumerate()
                        .map(|(i, row)| match &row[field.name()] {
                            Value::Struct(child) => Ok(child),
                            other => Err(QuiverError::RowStructure(format!(
                                "row {i} has {} for struct field `{}`, expected a nested row",
                                other.type_name(),
                                field.name()
                            ))),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    Table::from_row_refs(nested, &children)?.to_struct_column()?
                }
            };
            columns.push(column);
        }
        Table::try_new(schema, columns)
    }

    /// Dispatches positional or named column data to the matching
    /// constructor.
    pub fn from_data(schema: &SchemaRef, data: impl Into<TableData>) -> Result<Table> {
        match data.into() {
            TableData::Named(columns) => Self::from_pydict(schema, columns),
            TableData::Positional(columns) => {
                if columns.len() != schema.len() {
                    return Err(QuiverError::SchemaMismatch(format!(
                        "schema {schema} has {} fields, got {} columns",
                        schema.len(),
                        columns.len()
                    )));
                }
                let columns = schema
                    .fields()
                    .iter()
                    .zip(columns)
                    .map(|(field, data)| resolve_column(field, data))
                    .collect::<Result<Vec<_>>>()?;
                Table::try_new(schema, columns)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::{
        array::{Array, ArrayRef, Int64Array, StringArray, StructArray},
        buffer::NullBuffer,
        datatypes::DataType,
    };

    use super::{ColumnData, ColumnMap, TableData};
    use crate::{
        error::QuiverError,
        row,
        schema::{Field, Schema, SchemaRef},
        table::Table,
        value::Value,
    };

    fn pair_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("x", DataType::Int64, false),
            Field::new("y", DataType::Int64, false),
        ]))
    }

    fn wrapper_schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            pair_schema().as_field("pair"),
            Field::new("id", DataType::Utf8, false),
        ]))
    }

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().copied().map(Value::Int64).collect()
    }

    #[test]
    fn from_arrays_with_struct_array() {
        let xs: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        let ys: ArrayRef = Arc::new(Int64Array::from(vec![4, 5, 6]));
        let pairs = StructArray::new(pair_schema().arrow_fields(), vec![xs, ys], None);
        let ids: ArrayRef = Arc::new(StringArray::from(vec!["v1", "v2", "v3"]));

        let wrapper = Table::from_arrays(&wrapper_schema(), vec![Arc::new(pairs), ids]).unwrap();
        assert_eq!(wrapper.len(), 3);
        assert_eq!(
            wrapper.column("id").unwrap().to_values().unwrap(),
            vec![Value::from("v1"), Value::from("v2"), Value::from("v3")]
        );
        assert_eq!(
            wrapper.nested("pair").unwrap().column("y").unwrap().to_values().unwrap(),
            ints(&[4, 5, 6])
        );
    }

    #[test]
    fn from_arrays_rejects_null_struct_rows() {
        let xs: ArrayRef = Arc::new(Int64Array::from(vec![Some(1), None]));
        let ys: ArrayRef = Arc::new(Int64Array::from(vec![Some(2), None]));
        let ids: ArrayRef = Arc::new(StringArray::from(vec!["v1", "v2"]));

        let masked = StructArray::new(
            pair_schema().arrow_fields(),
            vec![xs.clone(), ys.clone()],
            Some(NullBuffer::from(vec![true, false])),
        );
        let err = Table::from_arrays(&wrapper_schema(), vec![Arc::new(masked), ids.clone()])
            .unwrap_err();
        assert!(matches!(err, QuiverError::RowStructure(_)));

        let xs: ArrayRef = Arc::new(Int64Array::from(vec![1, 3]));
        let ys: ArrayRef = Arc::new(Int64Array::from(vec![2, 4]));
        let all_valid = StructArray::new(
            pair_schema().arrow_fields(),
            vec![xs, ys],
            Some(NullBuffer::new_valid(2)),
        );
        let wrapper = Table::from_arrays(&wrapper_schema(), vec![Arc::new(all_valid), ids]).unwrap();
        let flat = wrapper.flatten().unwrap();
        assert_eq!(
            flat.column("pair.x").unwrap().to_values().unwrap(),
            ints(&[1, 3])
        );
    }

    #[test]
    fn to_struct_array_matches_arrow() {
        let xs: ArrayRef = Arc::new(Int64Array::from(vec![1, 2, 3]));
        let ys: ArrayRef = Arc::new(Int64Array::from(vec![4, 5, 6]));
        let pair = Table::from_arrays(&pair_schema(), vec![xs.clone(), ys.clone()]).unwrap();
        let want = StructArray::new(pair_schema().arrow_fields(), vec![xs, ys], None);
        assert_eq!(pair.to_struct_array().unwrap(), want);
    }

    #[test]
    fn from_pydict_with_nested_rows() {
        let mut columns = ColumnMap::new();
        columns.insert("id".into(), ColumnData::from(vec!["v1", "v2", "v3"]));
        columns.insert(
            "pair".into(),
            ColumnData::from(vec![
                row! { "x" => 1_i64, "y" => 2_i64 },
                row! { "x" => 3_i64, "y" => 4_i64 },
                row! { "x" => 5_i64, "y" => 6_i64 },
            ]),
        );
        let wrapper = Table::from_pydict(&wrapper_schema(), columns).unwrap();
        assert_eq!(wrapper.len(), 3);
        assert_eq!(
            wrapper.nested("pair").unwrap().column("x").unwrap().to_values().unwrap(),
            ints(&[1, 3, 5])
        );
    }

    #[test]
    fn from_pydict_missing_and_extra_columns() {
        let mut columns = ColumnMap::new();
        columns.insert("x".into(), ColumnData::from(vec![1_i64]));
        let err = Table::from_pydict(&pair_schema(), columns.clone()).unwrap_err();
        assert!(matches!(err, QuiverError::SchemaMismatch(_)));

        columns.insert("y".into(), ColumnData::from(vec![1_i64]));
        columns.insert("z".into(), ColumnData::from(vec![1_i64]));
        let err = Table::from_pydict(&pair_schema(), columns).unwrap_err();
        assert!(matches!(err, QuiverError::SchemaMismatch(_)));
    }

    #[test]
    fn from_kwargs_prebuilt_and_raw_nested() {
        let layer1 = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        let layer2 = Arc::new(Schema::new(vec![
            Field::new("y", DataType::Int64, false),
            layer1.as_field("layer1"),
        ]));
        let layer3 = Arc::new(Schema::new(vec![
            Field::new("z", DataType::Int64, false),
            layer2.as_field("layer2"),
        ]));

        let l1 = Table::from_kwargs(&layer1, [("x", ColumnData::from(vec![1_i64, 2, 3]))])
            .unwrap();
        let l2 = Table::from_kwargs(
            &layer2,
            [
                ("y", ColumnData::from(vec![4_i64, 5, 6])),
                ("layer1", ColumnData::from(l1)),
            ],
        )
        .unwrap();
        let l3 = Table::from_kwargs(
            &layer3,
            [
                ("z", ColumnData::from(vec![7_i64, 8, 9])),
                ("layer2", ColumnData::from(l2)),
            ],
        )
        .unwrap();
        let l2 = l3.nested("layer2").unwrap();
        assert_eq!(l2.column("y").unwrap().to_values().unwrap(), ints(&[4, 5, 6]));
        assert_eq!(
            l2.nested("layer1").unwrap().column("x").unwrap().to_values().unwrap(),
            ints(&[1, 2, 3])
        );

        let mut raw = ColumnMap::new();
        raw.insert("x".into(), ColumnData::from(vec![1_i64, 2, 3]));
        let mut raw2 = ColumnMap::new();
        raw2.insert("y".into(), ColumnData::from(vec![4_i64, 5, 6]));
        raw2.insert("layer1".into(), ColumnData::from(raw));
        let from_raw = Table::from_kwargs(
            &layer3,
            [
                ("z", ColumnData::from(vec![7_i64, 8, 9])),
                ("layer2", ColumnData::from(raw2)),
            ],
        )
        .unwrap();
        assert_eq!(from_raw, l3);
    }

    #[test]
    fn prebuilt_table_must_match_nested_schema() {
        let other = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        let table = Table::from_kwargs(&other, [("x", ColumnData::from(vec![1_i64]))]).unwrap();
        let err = Table::from_kwargs(
            &wrapper_schema(),
            [
                ("pair", ColumnData::from(table)),
                ("id", ColumnData::from(vec!["a"])),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, QuiverError::SchemaMismatch(_)));
    }

    #[test]
    fn from_kwargs_rejects_duplicates() {
        let err = Table::from_kwargs(
            &pair_schema(),
            [
                ("x", ColumnData::from(vec![1_i64])),
                ("x", ColumnData::from(vec![2_i64])),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, QuiverError::InvalidArgument(_)));
    }

    #[test]
    fn from_rows_builds_nested_columns() {
        let rows = vec![
            row! { "id" => "1", "pair" => row! { "x" => 1_i64, "y" => 2_i64 } },
            row! { "id" => "2", "pair" => row! { "x" => 3_i64, "y" => 4_i64 } },
        ];
        let wrapper = Table::from_rows(&wrapper_schema(), &rows).unwrap();
        assert_eq!(
            wrapper.column("id").unwrap().to_values().unwrap(),
            vec![Value::from("1"), Value::from("2")]
        );
        let pair = wrapper.nested("pair").unwrap();
        assert_eq!(pair.column("x").unwrap().to_values().unwrap(), ints(&[1, 3]));
        assert_eq!(pair.column("y").unwrap().to_values().unwrap(), ints(&[2, 4]));
    }

    #[test]
    fn from_rows_rejects_bad_shapes() {
        let missing = vec![row! { "id" => "1" }];
        let err = Table::from_rows(&wrapper_schema(), &missing).unwrap_err();
        assert!(matches!(err, QuiverError::RowStructure(_)));

        let flat_pair = vec![row! { "id" => "1", "pair" => 3_i64 }];
        let err = Table::from_rows(&wrapper_schema(), &flat_pair).unwrap_err();
        assert!(matches!(err, QuiverError::RowStructure(_)));

        let extra = vec![row! { "x" => 1_i64, "y" => 2_i64, "z" => 3_i64 }];
        let err = Table::from_rows(&pair_schema(), &extra).unwrap_err();
        assert!(matches!(err, QuiverError::RowStructure(_)));

        let wrong_type = vec![row! { "x" => "a", "y" => 2_i64 }];
        let err = Table::from_rows(&pair_schema(), &wrong_type).unwrap_err();
        assert!(matches!(err, QuiverError::TypeMismatch { .. }));
    }

    #[test]
    fn from_rows_empty() {
        let wrapper = Table::from_rows(&wrapper_schema(), &[]).unwrap();
        assert!(wrapper.is_empty());
        assert_eq!(wrapper.nested("pair").unwrap().len(), 0);
    }

    #[test]
    fn from_data_dispatch() {
        let positional = Table::from_data(
            &pair_schema(),
            vec![
                ColumnData::from(vec![1_i64, 2, 3]),
                ColumnData::from(vec![4_i64, 5, 6]),
            ],
        )
        .unwrap();

        let mut named = ColumnMap::new();
        named.insert("y".into(), ColumnData::from(vec![4_i64, 5, 6]));
        named.insert("x".into(), ColumnData::from(vec![1_i64, 2, 3]));
        let named = Table::from_data(&pair_schema(), TableData::Named(named)).unwrap();
        assert_eq!(positional, named);
        assert_eq!(named.column("x").unwrap().to_values().unwrap(), ints(&[1, 2, 3]));

        let wrapper = Table::from_data(
            &wrapper_schema(),
            vec![
                ColumnData::from(named),
                ColumnData::from(vec!["1", "2", "3"]),
            ],
        )
        .unwrap();
        assert_eq!(
            wrapper.nested("pair").unwrap().column("x").unwrap().to_values().unwrap(),
            ints(&[1, 2, 3])
        );
        assert_eq!(wrapper.column("pair").unwrap().chunks()[0].len(), 3);
    }
}
