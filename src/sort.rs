//! Sort keys and the row permutation that realizes them.

use std::{fmt, mem, str::FromStr};

use arrow::compute::{LexicographicalComparator, SortColumn, SortOptions};

use crate::{
    error::{QuiverError, Result},
    table::Table,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl FromStr for SortOrder {
    type Err = QuiverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ascending" => Ok(SortOrder::Ascending),
            "descending" => Ok(SortOrder::Descending),
            other => Err(QuiverError::InvalidArgument(format!(
                "unknown sort order `{other}`, expected `ascending` or `descending`"
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Ascending => f.write_str("ascending"),
            SortOrder::Descending => f.write_str("descending"),
        }
    }
}

/// One sort column. `column` may be a dot-qualified path into a struct
/// field. Nulls sort last unless `nulls_first` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub order: SortOrder,
    pub nulls_first: bool,
}

impl SortKey {
    pub fn new(column: impl Into<String>, order: SortOrder) -> Self {
        Self {
            column: column.into(),
            order,
            nulls_first: false,
        }
    }

    pub fn ascending(column: impl Into<String>) -> Self {
        Self::new(column, SortOrder::Ascending)
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self::new(column, SortOrder::Descending)
    }

    pub fn with_nulls_first(mut self, nulls_first: bool) -> Self {
        self.nulls_first = nulls_first;
        self
    }

    fn options(&self) -> SortOptions {
        SortOptions {
            descending: self.order == SortOrder::Descending,
            nulls_first: self.nulls_first,
        }
    }
}

/// Ordered list of sort keys; the first key is the most significant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortKeys(Vec<SortKey>);

impl SortKeys {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self(keys)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SortKey> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SortKeys {
    fn from(column: &str) -> Self {
        Self(vec![SortKey::ascending(column)])
    }
}

impl From<String> for SortKeys {
    fn from(column: String) -> Self {
        Self(vec![SortKey::ascending(column)])
    }
}

impl From<SortKey> for SortKeys {
    fn from(key: SortKey) -> Self {
        Self(vec![key])
    }
}

impl From<Vec<SortKey>> for SortKeys {
    fn from(keys: Vec<SortKey>) -> Self {
        Self(keys)
    }
}

impl<S> From<Vec<(S, SortOrder)>> for SortKeys
where
    S: Into<String>,
{
    fn from(keys: Vec<(S, SortOrder)>) -> Self {
        Self(
            keys.into_iter()
                .map(|(column, order)| SortKey::new(column, order))
                .collect(),
        )
    }
}

impl<S, const N: usize> From<[(S, SortOrder); N]> for SortKeys
where
    S: Into<String>,
{
    fn from(keys: [(S, SortOrder); N]) -> Self {
        Self::from(Vec::from(keys))
    }
}

/// Computes the permutation that stably sorts `table` by `keys`.
///
/// Only the key columns are materialized; the returned index vector is
/// bounded by the row count. Rows with equal keys keep their input order.
pub fn sort_indices(table: &Table, keys: &SortKeys) -> Result<Vec<u64>> {
    if keys.is_empty() {
        return Err(QuiverError::InvalidArgument(
            "at least one sort key is required".to_string(),
        ));
    }
    let mut columns = Vec::with_capacity(keys.len());
    for key in keys.iter() {
        let column = table.column_path(&key.column)?;
        columns.push(SortColumn {
            values: column.to_array()?,
            options: Some(key.options()),
        });
    }
    let comparator = LexicographicalComparator::try_new(&columns)?;

    let mut indices: Vec<u64> = Vec::new();
    indices
        .try_reserve_exact(table.len())
        .map_err(|_| QuiverError::OutOfMemory {
            requested: table.len().saturating_mul(mem::size_of::<u64>()),
        })?;
    indices.extend(0..table.len() as u64);
    indices.sort_by(|&a, &b| comparator.compare(a as usize, b as usize));
    Ok(indices)
}
