use std::{collections::BTreeMap, slice, sync::Arc};

use arrow::{
    array::{
        Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Float32Array, Float64Array,
        Int16Array, Int32Array, Int64Array, Int8Array, LargeBinaryArray, LargeStringArray,
        Scalar, StringArray, UInt16Array, UInt32Array, UInt64Array, UInt8Array,
    },
    datatypes::{
        DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type,
        UInt16Type, UInt32Type, UInt64Type, UInt8Type,
    },
};

use crate::error::{QuiverError, Result};

/// A row shaped as a mapping from field name to value. Struct fields hold a
/// nested [`Value::Struct`].
pub type RowMap = BTreeMap<String, Value>;

/// A single dynamically typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null is less than any non-Null value
    Null,
    Boolean(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    Binary(Vec<u8>),
    /// Nested row of a struct field.
    Struct(RowMap),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::UInt8(_) => "UInt8",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::String(_) => "String",
            Value::Binary(_) => "Binary",
            Value::Struct(_) => "Struct",
        }
    }

    /// Reads the value at `index` of `array`.
    pub fn from_array(array: &dyn Array, index: usize) -> Result<Self> {
        if index >= array.len() {
            return Err(QuiverError::InvalidArgument(format!(
                "index {index} out of bounds for array of length {}",
                array.len()
            )));
        }
        if array.is_null(index) {
            return Ok(Value::Null);
        }
        let value = match array.data_type() {
            DataType::Null => Value::Null,
            DataType::Boolean => Value::Boolean(array.as_boolean().value(index)),
            DataType::Int8 => Value::Int8(array.as_primitive::<Int8Type>().value(index)),
            DataType::Int16 => Value::Int16(array.as_primitive::<Int16Type>().value(index)),
            DataType::Int32 => Value::Int32(array.as_primitive::<Int32Type>().value(index)),
            DataType::Int64 => Value::Int64(array.as_primitive::<Int64Type>().value(index)),
            DataType::UInt8 => Value::UInt8(array.as_primitive::<UInt8Type>().value(index)),
            DataType::UInt16 => Value::UInt16(array.as_primitive::<UInt16Type>().value(index)),
            DataType::UInt32 => Value::UInt32(array.as_primitive::<UInt32Type>().value(index)),
            DataType::UInt64 => Value::UInt64(array.as_primitive::<UInt64Type>().value(index)),
            DataType::Float32 => {
                Value::Float32(array.as_primitive::<Float32Type>().value(index))
            }
            DataType::Float64 => {
                Value::Float64(array.as_primitive::<Float64Type>().value(index))
            }
            DataType::Utf8 => Value::String(array.as_string::<i32>().value(index).to_string()),
            DataType::LargeUtf8 => {
                Value::String(array.as_string::<i64>().value(index).to_string())
            }
            DataType::Binary => Value::Binary(array.as_binary::<i32>().value(index).to_vec()),
            DataType::LargeBinary => {
                Value::Binary(array.as_binary::<i64>().value(index).to_vec())
            }
            DataType::Struct(fields) => {
                let array = array.as_struct();
                let mut row = RowMap::new();
                for (field, column) in fields.iter().zip(array.columns()) {
                    row.insert(
                        field.name().clone(),
                        Value::from_array(column.as_ref(), index)?,
                    );
                }
                Value::Struct(row)
            }
            other => {
                return Err(QuiverError::InvalidArgument(format!(
                    "no value representation for data type {other}"
                )))
            }
        };
        Ok(value)
    }

    /// Converts the value into a length-one scalar of `data_type`, suitable
    /// for comparison kernels.
    pub fn to_scalar(&self, column: &str, data_type: &DataType) -> Result<Scalar<ArrayRef>> {
        let array = leaf_array(column, data_type, true, slice::from_ref(self))?;
        Ok(Scalar::new(array))
    }

    fn integer(&self) -> Option<i128> {
        match self {
            Value::Int8(v) => Some(*v as i128),
            Value::Int16(v) => Some(*v as i128),
            Value::Int32(v) => Some(*v as i128),
            Value::Int64(v) => Some(*v as i128),
            Value::UInt8(v) => Some(*v as i128),
            Value::UInt16(v) => Some(*v as i128),
            Value::UInt32(v) => Some(*v as i128),
            Value::UInt64(v) => Some(*v as i128),
            _ => None,
        }
    }

    fn float(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            other => other.integer().map(|v| v as f64),
        }
    }
}

fn collect<'a, T>(
    column: &str,
    data_type: &DataType,
    is_nullable: bool,
    values: &'a [Value],
    convert: impl Fn(&'a Value) -> Option<T>,
) -> Result<Vec<Option<T>>> {
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        match value {
            Value::Null if is_nullable => out.push(None),
            Value::Null => return Err(QuiverError::NullNotAllowed(column.to_string())),
            value => match convert(value) {
                Some(v) => out.push(Some(v)),
                None => {
                    return Err(QuiverError::type_mismatch(
                        column,
                        data_type,
                        value.type_name(),
                    ))
                }
            },
        }
    }
    Ok(out)
}

macro_rules! integer_array {
    ($column:expr, $data_type:expr, $nullable:expr, $values:expr, $native:ty, $array:ty) => {
        Arc::new(<$array>::from(collect(
            $column,
            $data_type,
            $nullable,
            $values,
            |v| v.integer().and_then(|i| <$native>::try_from(i).ok()),
        )?)) as ArrayRef
    };
}

/// Builds a leaf column of `data_type` from row values. Integers are
/// accepted for any integer or float type they fit in.
pub fn leaf_array(
    column: &str,
    data_type: &DataType,
    is_nullable: bool,
    values: &[Value],
) -> Result<ArrayRef> {
    let array: ArrayRef = match data_type {
        DataType::Boolean => Arc::new(BooleanArray::from(collect(
            column,
            data_type,
            is_nullable,
            values,
            |v| match v {
                Value::Boolean(b) => Some(*b),
                _ => None,
            },
        )?)),
        DataType::Int8 => integer_array!(column, data_type, is_nullable, values, i8, Int8Array),
        DataType::Int16 => {
            integer_array!(column, data_type, is_nullable, values, i16, Int16Array)
        }
        DataType::Int32 => {
            integer_array!(column, data_type, is_nullable, values, i32, Int32Array)
        }
        DataType::Int64 => {
            integer_array!(column, data_type, is_nullable, values, i64, Int64Array)
        }
        DataType::UInt8 => {
            integer_array!(column, data_type, is_nullable, values, u8, UInt8Array)
        }
        DataType::UInt16 => {
            integer_array!(column, data_type, is_nullable, values, u16, UInt16Array)
        }
        DataType::UInt32 => {
            integer_array!(column, data_type, is_nullable, values, u32, UInt32Array)
        }
        DataType::UInt64 => {
            integer_array!(column, data_type, is_nullable, values, u64, UInt64Array)
        }
        DataType::Float32 => Arc::new(Float32Array::from(collect(
            column,
            data_type,
            is_nullable,
            values,
            |v| v.float().map(|f| f as f32),
        )?)),
        DataType::Float64 => Arc::new(Float64Array::from(collect(
            column,
            data_type,
            is_nullable,
            values,
            Value::float,
        )?)),
        DataType::Utf8 => Arc::new(StringArray::from(collect(
            column,
            data_type,
            is_nullable,
            values,
            as_str,
        )?)),
        DataType::LargeUtf8 => Arc::new(LargeStringArray::from(collect(
            column,
            data_type,
            is_nullable,
            values,
            as_str,
        )?)),
        DataType::Binary => Arc::new(BinaryArray::from(collect(
            column,
            data_type,
            is_nullable,
            values,
            as_bytes,
        )?)),
        DataType::LargeBinary => Arc::new(LargeBinaryArray::from(collect(
            column,
            data_type,
            is_nullable,
            values,
            as_bytes,
        )?)),
        other => {
            let actual = values
                .iter()
                .find(|v| !v.is_null())
                .map_or("Null", Value::type_name);
            return Err(QuiverError::type_mismatch(column, other, actual));
        }
    };
    Ok(array)
}

fn as_str(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        _ => None,
    }
}

fn as_bytes(value: &Value) -> Option<&[u8]> {
    match value {
        Value::Binary(b) => Some(b.as_slice()),
        Value::String(s) => Some(s.as_bytes()),
        _ => None,
    }
}

macro_rules! impl_from_native {
    ($($native:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$native> for Value {
                fn from(value: $native) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_from_native!(
    bool => Boolean,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Binary,
    RowMap => Struct,
);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Creates a [`RowMap`] from `name => value` pairs.
///
/// ## Example:
///
/// ```
/// use quiver::row;
///
/// let row = row! { "id" => "1", "pair" => row! { "x" => 1_i64, "y" => 2_i64 } };
/// assert_eq!(row.len(), 2);
/// ```
#[macro_export]
macro_rules! row {
    ($($name:expr => $value:expr),* $(,)?) => {
        {
            #[allow(unused_mut)]
            let mut row = $crate::value::RowMap::new();
            $(
                row.insert(::std::string::String::from($name), $crate::value::Value::from($value));
            )*
            row
        }
    };
}
