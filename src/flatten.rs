//! Conversion between nested tables and single-level tables whose column
//! names are dot-qualified paths (`pair.x`).

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use crate::{
    column::ChunkedColumn,
    error::{QuiverError, Result},
    schema::{Field, FieldType, Schema, SchemaRef, PATH_SEPARATOR},
    table::Table,
};

/// Replaces every struct field by its leaves, depth first in field order.
/// Leaf columns are shared with `table`, row count is unchanged.
pub fn flatten(table: &Table) -> Result<Table> {
    let schema = Arc::new(table.schema().flattened()?);
    let mut columns = Vec::with_capacity(schema.len());
    collect_leaves(table, &mut columns)?;
    Table::try_new(&schema, columns)
}

fn collect_leaves(table: &Table, out: &mut Vec<ChunkedColumn>) -> Result<()> {
    for (i, field) in table.schema().fields().iter().enumerate() {
        if field.is_struct() {
            collect_leaves(&table.nested_at(i)?, out)?;
        } else {
            out.push(table.columns()[i].clone());
        }
    }
    Ok(())
}

/// Rebuilds a nested table shaped like `schema` from a flat table.
///
/// Flat columns are grouped by the segment before the first `.`; each group
/// must hold exactly the flattened leaves of the matching field.
pub fn unflatten(table: &Table, schema: &SchemaRef) -> Result<Table> {
    let expected = schema.flattened_names().into_iter().collect::<BTreeSet<_>>();
    let actual = table
        .schema()
        .fields()
        .iter()
        .map(|field| field.name().to_string())
        .collect::<BTreeSet<_>>();
    if expected != actual {
        let missing = expected.difference(&actual).collect::<Vec<_>>();
        let unexpected = actual.difference(&expected).collect::<Vec<_>>();
        return Err(QuiverError::SchemaMismatch(format!(
            "flat columns do not match {schema}: missing {missing:?}, unexpected {unexpected:?}"
        )));
    }

    let mut groups: HashMap<&str, (Vec<Field>, Vec<ChunkedColumn>)> = HashMap::new();
    for (field, column) in table.schema().fields().iter().zip(table.columns()) {
        let (head, member) = match field.name().split_once(PATH_SEPARATOR) {
            Some((head, rest)) => (head, field.clone().with_name(rest)),
            None => (field.name(), field.clone()),
        };
        let group = groups.entry(head).or_default();
        group.0.push(member);
        group.1.push(column.clone());
    }

    let mut columns = Vec::with_capacity(schema.len());
    for field in schema.fields() {
        if field.name().contains(PATH_SEPARATOR) {
            return Err(QuiverError::SchemaMismatch(format!(
                "field `{}` cannot be rebuilt from dot-qualified columns",
                field.name()
            )));
        }
        let (members, mut group) = groups.remove(field.name()).ok_or_else(|| {
            QuiverError::SchemaMismatch(format!("no flat columns for field `{}`", field.name()))
        })?;
        let column = match field.field_type() {
            FieldType::Leaf(_) => match (members.as_slice(), group.pop()) {
                ([member], Some(column)) if member.name() == field.name() => column,
                _ => {
                    return Err(QuiverError::SchemaMismatch(format!(
                        "leaf field `{}` matches more than one flat column",
                        field.name()
                    )))
                }
            },
            FieldType::Struct(nested) => {
                let sub = Table::try_new(&Arc::new(Schema::try_new(members)?), group)?;
                unflatten(&sub, nested)?.to_struct_column()?
            }
        };
        columns.push(column);
    }
    if let Some(head) = groups.keys().next() {
        return Err(QuiverError::SchemaMismatch(format!(
            "flat columns under `{head}` have no field in {schema}"
        )));
    }
    Table::try_new(schema, columns)
}

impl Table {
    pub fn flatten(&self) -> Result<Table> {
        flatten(self)
    }

    pub fn unflatten(&self, schema: &SchemaRef) -> Result<Table> {
        unflatten(self, schema)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::datatypes::DataType;

    use crate::{
        error::QuiverError,
        row, schema,
        schema::{Field, Schema, SchemaRef},
        table::{ColumnData, Table},
        value::Value,
    };

    fn wrapper_schema() -> SchemaRef {
        let pair = Arc::new(schema!(("x", Int64, false), ("y", Int64, false)));
        Arc::new(Schema::new(vec![
            pair.as_field("pair"),
            Field::new("id", DataType::Utf8, false),
        ]))
    }

    fn wrapper() -> Table {
        Table::from_rows(
            &wrapper_schema(),
            &[
                row! { "id" => "1", "pair" => row! { "x" => 1_i64, "y" => 2_i64 } },
                row! { "id" => "2", "pair" => row! { "x" => 3_i64, "y" => 4_i64 } },
            ],
        )
        .unwrap()
    }

    #[test]
    fn flatten_names_and_round_trip() {
        let nested = wrapper();
        let flat = nested.flatten().unwrap();
        assert_eq!(flat.schema().flattened_names(), vec!["pair.x", "pair.y", "id"]);
        assert_eq!(flat.len(), 2);
        assert_eq!(
            flat.column("pair.y").unwrap().to_values().unwrap(),
            vec![Value::Int64(2), Value::Int64(4)]
        );

        let rebuilt = flat.unflatten(&wrapper_schema()).unwrap();
        assert_eq!(rebuilt, nested);
    }

    #[test]
    fn three_levels_round_trip() {
        let layer1 = Arc::new(schema!(("x", Int64, false)));
        let layer2 = Arc::new(Schema::new(vec![
            Field::new("y", DataType::Int64, false),
            layer1.as_field("layer1"),
        ]));
        let layer3 = Arc::new(Schema::new(vec![
            Field::new("z", DataType::Int64, false),
            layer2.as_field("layer2"),
        ]));
        let rows = (0..4_i64)
            .map(|i| {
                row! {
                    "z" => i,
                    "layer2" => row! { "y" => i * 10, "layer1" => row! { "x" => i * 100 } },
                }
            })
            .collect::<Vec<_>>();
        let table = Table::from_rows(&layer3, &rows).unwrap();
        let flat = table.flatten().unwrap();
        assert_eq!(
            flat.schema().flattened_names(),
            vec!["z", "layer2.y", "layer2.layer1.x"]
        );
        assert_eq!(flat.unflatten(&layer3).unwrap(), table);
    }

    #[test]
    fn unflatten_accepts_any_column_order() {
        let nested = wrapper();
        let flat = nested.flatten().unwrap();
        let reordered = Table::from_kwargs(
            &Arc::new(Schema::new(vec![
                Field::new("id", DataType::Utf8, false),
                Field::new("pair.y", DataType::Int64, false),
                Field::new("pair.x", DataType::Int64, false),
            ])),
            [
                ("id", ColumnData::from(flat.column("id").unwrap().clone())),
                ("pair.y", ColumnData::from(flat.column("pair.y").unwrap().clone())),
                ("pair.x", ColumnData::from(flat.column("pair.x").unwrap().clone())),
            ],
        )
        .unwrap();
        assert_eq!(reordered.unflatten(&wrapper_schema()).unwrap(), nested);
    }

    #[test]
    fn unflatten_rejects_partial_and_extra_columns() {
        let partial_schema = Arc::new(Schema::new(vec![
            Field::new("pair.x", DataType::Int64, false),
            Field::new("id", DataType::Utf8, false),
        ]));
        let partial = Table::from_kwargs(
            &partial_schema,
            [
                ("pair.x", ColumnData::from(vec![1_i64])),
                ("id", ColumnData::from(vec!["1"])),
            ],
        )
        .unwrap();
        let err = partial.unflatten(&wrapper_schema()).unwrap_err();
        assert!(matches!(err, QuiverError::SchemaMismatch(_)));

        let extra_schema = Arc::new(Schema::new(vec![
            Field::new("pair.x", DataType::Int64, false),
            Field::new("pair.y", DataType::Int64, false),
            Field::new("pair.w", DataType::Int64, false),
            Field::new("id", DataType::Utf8, false),
        ]));
        let extra = Table::from_kwargs(
            &extra_schema,
            [
                ("pair.x", ColumnData::from(vec![1_i64])),
                ("pair.y", ColumnData::from(vec![2_i64])),
                ("pair.w", ColumnData::from(vec![3_i64])),
                ("id", ColumnData::from(vec!["1"])),
            ],
        )
        .unwrap();
        let err = extra.unflatten(&wrapper_schema()).unwrap_err();
        assert!(matches!(err, QuiverError::SchemaMismatch(_)));
    }

    #[test]
    fn unflatten_checks_leaf_types() {
        let flat_schema = Arc::new(Schema::new(vec![
            Field::new("pair.x", DataType::Utf8, false),
            Field::new("pair.y", DataType::Int64, false),
            Field::new("id", DataType::Utf8, false),
        ]));
        let flat = Table::from_kwargs(
            &flat_schema,
            [
                ("pair.x", ColumnData::from(vec!["a"])),
                ("pair.y", ColumnData::from(vec![2_i64])),
                ("id", ColumnData::from(vec!["1"])),
            ],
        )
        .unwrap();
        let err = flat.unflatten(&wrapper_schema()).unwrap_err();
        assert!(matches!(err, QuiverError::TypeMismatch { .. }));
    }

    #[test]
    fn flatten_of_flat_table_is_identity() {
        let schema = Arc::new(schema!(("a", Int64, false), ("b", Utf8, true)));
        let table = Table::from_kwargs(
            &schema,
            [
                ("a", ColumnData::from(vec![1_i64, 2])),
                ("b", ColumnData::from(vec![Some("x"), None])),
            ],
        )
        .unwrap();
        assert_eq!(table.flatten().unwrap(), table);
        assert_eq!(table.unflatten(&schema).unwrap(), table);
    }
}
