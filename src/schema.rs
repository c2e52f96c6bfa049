//! Nested schema model.
//!
//! A [`Schema`] is an ordered list of [`Field`]s. A field is either a leaf
//! column with an Arrow [`DataType`], or a struct field that embeds another
//! schema (see [`Schema::as_field`]). Equality is structural and recursive.

use std::{collections::HashMap, fmt, sync::Arc};

use arrow::datatypes::{
    DataType, Field as ArrowField, Fields, Schema as ArrowSchema, SchemaRef as ArrowSchemaRef,
};
use once_cell::sync::OnceCell;

use crate::error::{QuiverError, Result};

/// Separator used to join nested field names into flat column names.
pub const PATH_SEPARATOR: char = '.';

pub type SchemaRef = Arc<Schema>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Leaf(DataType),
    Struct(SchemaRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    field_type: FieldType,
    is_nullable: bool,
}

impl Field {
    /// Creates a field from an Arrow data type. `DataType::Struct` is turned
    /// into a nested [`Schema`].
    ///
    /// # Panics
    ///
    /// Panics if a struct data type contains duplicate child names.
    pub fn new(name: impl Into<String>, data_type: DataType, is_nullable: bool) -> Self {
        let field_type = match data_type {
            DataType::Struct(children) => {
                FieldType::Struct(Arc::new(Schema::new(
                    children.iter().map(|child| Field::from(child.as_ref())).collect(),
                )))
            }
            other => FieldType::Leaf(other),
        };
        Self {
            name: name.into(),
            field_type,
            is_nullable,
        }
    }

    pub fn new_struct(name: impl Into<String>, schema: SchemaRef, is_nullable: bool) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Struct(schema),
            is_nullable,
        }
    }

    pub fn try_from_arrow(field: &ArrowField) -> Result<Self> {
        let field_type = match field.data_type() {
            DataType::Struct(children) => {
                FieldType::Struct(Arc::new(Schema::try_from_arrow_fields(children)?))
            }
            other => FieldType::Leaf(other.clone()),
        };
        Ok(Self {
            name: field.name().clone(),
            field_type,
            is_nullable: field.is_nullable(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn is_nullable(&self) -> bool {
        self.is_nullable
    }

    pub fn with_nullable(mut self, is_nullable: bool) -> Self {
        self.is_nullable = is_nullable;
        self
    }

    /// Returns the nested schema of a struct field.
    pub fn nested(&self) -> Option<&SchemaRef> {
        match &self.field_type {
            FieldType::Struct(schema) => Some(schema),
            FieldType::Leaf(_) => None,
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.field_type, FieldType::Struct(_))
    }

    /// The Arrow data type backing this field's storage.
    pub fn data_type(&self) -> DataType {
        match &self.field_type {
            FieldType::Leaf(data_type) => data_type.clone(),
            FieldType::Struct(schema) => DataType::Struct(schema.arrow_fields()),
        }
    }

    pub fn to_arrow(&self) -> ArrowField {
        ArrowField::new(&self.name, self.data_type(), self.is_nullable)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl From<&ArrowField> for Field {
    fn from(value: &ArrowField) -> Self {
        Field::new(value.name(), value.data_type().clone(), value.is_nullable())
    }
}

/// Ordered field definitions with a name lookup built once at construction.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    arrow_schema: OnceCell<ArrowSchemaRef>,
}

impl Schema {
    /// Creates a schema from an ordered list of fields.
    ///
    /// # Panics
    ///
    /// Panics on empty or duplicate field names; use [`Schema::try_new`] to
    /// handle those as errors.
    pub fn new(fields: Vec<Field>) -> Self {
        match Self::try_new(fields) {
            Ok(schema) => schema,
            Err(err) => panic!("invalid schema: {err}"),
        }
    }

    pub fn try_new(fields: Vec<Field>) -> Result<Self> {
        let mut index = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(QuiverError::SchemaMismatch(format!(
                    "field {i} has an empty name"
                )));
            }
            if index.insert(field.name.clone(), i).is_some() {
                return Err(QuiverError::SchemaMismatch(format!(
                    "duplicate field name `{}`",
                    field.name
                )));
            }
        }
        Ok(Self {
            fields,
            index,
            arrow_schema: OnceCell::new(),
        })
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn try_from_arrow(schema: &ArrowSchema) -> Result<Self> {
        Self::try_from_arrow_fields(schema.fields())
    }

    fn try_from_arrow_fields(fields: &Fields) -> Result<Self> {
        Self::try_new(
            fields
                .iter()
                .map(|field| Field::try_from_arrow(field))
                .collect::<Result<Vec<_>>>()?,
        )
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn field_with_name(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    /// Embeds this schema as a struct field of a parent schema.
    pub fn as_field(self: &Arc<Self>, name: impl Into<String>) -> Field {
        Field::new_struct(name, Arc::clone(self), true)
    }

    /// Resolves a dot-qualified path to the chain of field positions that
    /// reaches it. An exact top-level match wins over descending into structs.
    pub fn resolve(&self, path: &str) -> Option<(Vec<usize>, &Field)> {
        if let Some(i) = self.index_of(path) {
            return Some((vec![i], &self.fields[i]));
        }
        let (head, rest) = path.split_once(PATH_SEPARATOR)?;
        let i = self.index_of(head)?;
        let (mut positions, field) = self.fields[i].nested()?.resolve(rest)?;
        positions.insert(0, i);
        Some((positions, field))
    }

    /// Leaf fields of this schema, depth first in field order, renamed to
    /// their dot-qualified paths.
    pub fn flattened_fields(&self) -> Vec<Field> {
        let mut out = Vec::new();
        self.collect_flattened(None, &mut out);
        out
    }

    pub fn flattened_names(&self) -> Vec<String> {
        self.flattened_fields()
            .into_iter()
            .map(|field| field.name)
            .collect()
    }

    /// Single-level schema whose fields are the dot-qualified leaves. Fails
    /// when a dotted path collides with a top-level name.
    pub fn flattened(&self) -> Result<Schema> {
        Schema::try_new(self.flattened_fields())
    }

    fn collect_flattened(&self, prefix: Option<&str>, out: &mut Vec<Field>) {
        for field in &self.fields {
            let name = match prefix {
                Some(prefix) => format!("{prefix}{PATH_SEPARATOR}{}", field.name),
                None => field.name.clone(),
            };
            match &field.field_type {
                FieldType::Struct(nested) => nested.collect_flattened(Some(&name), out),
                FieldType::Leaf(_) => out.push(field.clone().with_name(name)),
            }
        }
    }

    pub fn arrow_fields(&self) -> Fields {
        self.fields.iter().map(Field::to_arrow).collect()
    }

    /// The equivalent Arrow schema, built on first use.
    pub fn arrow_schema(&self) -> &ArrowSchemaRef {
        self.arrow_schema
            .get_or_init(|| Arc::new(ArrowSchema::new(self.arrow_fields())))
    }

    pub fn to_arrow(&self) -> ArrowSchema {
        self.arrow_schema().as_ref().clone()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match &field.field_type {
                FieldType::Leaf(data_type) => write!(f, "{}: {data_type}", field.name)?,
                FieldType::Struct(nested) => write!(f, "{}: {nested}", field.name)?,
            }
        }
        f.write_str("}")
    }
}

/// Creates a flat [`Schema`] from `(name, type, nullable)` triples.
///
/// ## Example:
///
/// ```
/// use quiver::schema;
///
/// let pair = schema!(("x", Int64, false), ("y", Int64, false));
/// assert_eq!(pair.len(), 2);
/// ```
#[macro_export]
macro_rules! schema {
    ($(($name: expr, $type: ident, $nullable: expr)),* $(,)?) => {
        {
            $crate::schema::Schema::new(
                vec![
                    $(
                        $crate::schema::Field::new($name, $crate::arrow::datatypes::DataType::$type, $nullable),
                    )*
                ],
            )
        }
    }
}
