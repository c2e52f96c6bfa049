//! Chunked column storage.
//!
//! A [`ChunkedColumn`] is an ordered list of contiguous Arrow arrays sharing
//! one data type. Slicing and selecting reuse the chunks' buffers; only
//! [`ChunkedColumn::defragment`] and multi-chunk [`ChunkedColumn::to_array`]
//! copy.

use std::{cmp, sync::Arc};

use arrow::{
    array::{new_empty_array, Array, ArrayRef, AsArray, BooleanArray, UInt64Array},
    compute::{self, TakeOptions},
    datatypes::DataType,
};

use crate::{
    error::{QuiverError, Result},
    value::Value,
};

#[derive(Debug, Clone)]
pub struct ChunkedColumn {
    data_type: DataType,
    chunks: Vec<ArrayRef>,
    // start offset of every chunk
    offsets: Vec<usize>,
    len: usize,
}

impl ChunkedColumn {
    /// Creates a column from chunks that all have `data_type`. An empty chunk
    /// list becomes a single empty chunk.
    pub fn try_new(data_type: DataType, chunks: Vec<ArrayRef>) -> Result<Self> {
        for chunk in &chunks {
            if chunk.data_type() != &data_type {
                return Err(QuiverError::type_mismatch(
                    "<chunk>",
                    &data_type,
                    chunk.data_type(),
                ));
            }
        }
        Ok(Self::new_unchecked(data_type, chunks))
    }

    fn new_unchecked(data_type: DataType, mut chunks: Vec<ArrayRef>) -> Self {
        if chunks.is_empty() {
            chunks.push(new_empty_array(&data_type));
        }
        let mut offsets = Vec::with_capacity(chunks.len());
        let mut len = 0;
        for chunk in &chunks {
            offsets.push(len);
            len += chunk.len();
        }
        Self {
            data_type,
            chunks,
            offsets,
            len,
        }
    }

    pub fn from_array(array: ArrayRef) -> Self {
        Self::new_unchecked(array.data_type().clone(), vec![array])
    }

    pub fn empty(data_type: DataType) -> Self {
        Self::new_unchecked(data_type, Vec::new())
    }

    /// Appends the chunks of every column, in order, without copying data.
    pub fn concat<'a>(
        data_type: &DataType,
        columns: impl IntoIterator<Item = &'a ChunkedColumn>,
    ) -> Result<Self> {
        let mut chunks = Vec::new();
        for column in columns {
            if &column.data_type != data_type {
                return Err(QuiverError::type_mismatch(
                    "<concat>",
                    data_type,
                    &column.data_type,
                ));
            }
            chunks.extend(column.chunks.iter().cloned());
        }
        Ok(Self::new_unchecked(data_type.clone(), chunks))
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn chunks(&self) -> &[ArrayRef] {
        &self.chunks
    }

    pub fn num_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Start offsets of every chunk.
    pub(crate) fn chunk_offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn null_count(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.null_count()).sum()
    }

    /// Zero-copy view of `length` rows starting at `offset`, clamped to the
    /// column bounds.
    pub fn slice(&self, offset: usize, length: usize) -> Self {
        let start = cmp::min(offset, self.len);
        let end = cmp::min(start.saturating_add(length), self.len);
        let mut chunks = Vec::new();
        for (chunk, &chunk_start) in self.chunks.iter().zip(&self.offsets) {
            let chunk_end = chunk_start + chunk.len();
            if chunk_end <= start || chunk_start >= end {
                continue;
            }
            let from = cmp::max(start, chunk_start) - chunk_start;
            let to = cmp::min(end, chunk_end) - chunk_start;
            chunks.push(chunk.slice(from, to - from));
        }
        Self::new_unchecked(self.data_type.clone(), chunks)
    }

    /// Returns the column as one contiguous array, copying only when it spans
    /// more than one chunk.
    pub fn to_array(&self) -> Result<ArrayRef> {
        match self.chunks.as_slice() {
            [chunk] => Ok(Arc::clone(chunk)),
            chunks => {
                let arrays = chunks.iter().map(|chunk| chunk.as_ref()).collect::<Vec<_>>();
                Ok(compute::concat(&arrays)?)
            }
        }
    }

    /// Rebuilds the column as a single chunk.
    pub fn defragment(&self) -> Result<Self> {
        Ok(Self::new_unchecked(
            self.data_type.clone(),
            vec![self.to_array()?],
        ))
    }

    fn locate(&self, index: usize) -> Result<(usize, usize)> {
        if index >= self.len {
            return Err(QuiverError::InvalidArgument(format!(
                "row index {index} out of bounds for column of length {}",
                self.len
            )));
        }
        let chunk = self.offsets.partition_point(|&start| start <= index) - 1;
        Ok((chunk, index - self.offsets[chunk]))
    }

    /// Gathers the rows at `indices` into a new contiguous array.
    pub fn take(&self, indices: &[u64]) -> Result<ArrayRef> {
        if let [chunk] = self.chunks.as_slice() {
            let indices = UInt64Array::from(indices.to_vec());
            let options = TakeOptions { check_bounds: true };
            return Ok(compute::take(chunk.as_ref(), &indices, Some(options))?);
        }
        let mut positions = Vec::with_capacity(indices.len());
        for &index in indices {
            positions.push(self.locate(index as usize)?);
        }
        let chunks = self
            .chunks
            .iter()
            .map(|chunk| chunk.as_ref())
            .collect::<Vec<_>>();
        Ok(compute::interleave(&chunks, &positions)?)
    }

    /// Keeps the rows where `mask` is true. `mask` spans the whole column;
    /// the chunk layout is preserved.
    pub fn filter(&self, mask: &BooleanArray) -> Result<Self> {
        if mask.len() != self.len {
            return Err(QuiverError::LengthMismatch {
                column: "<mask>".to_string(),
                expected: self.len,
                actual: mask.len(),
            });
        }
        let mut chunks = Vec::with_capacity(self.chunks.len());
        for (chunk, &start) in self.chunks.iter().zip(&self.offsets) {
            let predicate = mask.slice(start, chunk.len());
            chunks.push(compute::filter(chunk.as_ref(), &predicate)?);
        }
        Ok(Self::new_unchecked(self.data_type.clone(), chunks))
    }

    /// Boolean mask of the rows equal to `value`. A null `value` matches
    /// null rows.
    pub(crate) fn eq_mask(&self, name: &str, value: &Value) -> Result<BooleanArray> {
        if matches!(self.data_type, DataType::Struct(_)) {
            return Err(QuiverError::type_mismatch(
                name,
                "a leaf column",
                &self.data_type,
            ));
        }
        let mut masks = Vec::with_capacity(self.chunks.len());
        if value.is_null() {
            for chunk in &self.chunks {
                masks.push(compute::is_null(chunk.as_ref())?);
            }
        } else {
            let scalar = value.to_scalar(name, &self.data_type)?;
            for chunk in &self.chunks {
                masks.push(compute::kernels::cmp::eq(chunk, &scalar)?);
            }
        }
        match masks.as_slice() {
            [mask] => Ok(mask.clone()),
            masks => {
                let arrays = masks.iter().map(|mask| mask as &dyn Array).collect::<Vec<_>>();
                Ok(compute::concat(&arrays)?.as_boolean().clone())
            }
        }
    }

    pub fn value(&self, index: usize) -> Result<Value> {
        let (chunk, offset) = self.locate(index)?;
        Value::from_array(self.chunks[chunk].as_ref(), offset)
    }

    pub fn to_values(&self) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(self.len);
        for chunk in &self.chunks {
            for i in 0..chunk.len() {
                values.push(Value::from_array(chunk.as_ref(), i)?);
            }
        }
        Ok(values)
    }
}

/// Columns are equal when they hold the same values, whatever their chunk
/// layout.
impl PartialEq for ChunkedColumn {
    fn eq(&self, other: &Self) -> bool {
        if self.data_type != other.data_type || self.len != other.len {
            return false;
        }
        let mut boundaries = self
            .offsets
            .iter()
            .chain(&other.offsets)
            .copied()
            .chain([self.len])
            .collect::<Vec<_>>();
        boundaries.sort_unstable();
        boundaries.dedup();
        boundaries.windows(2).all(|window| {
            let (start, length) = (window[0], window[1] - window[0]);
            let (lhs, rhs) = (self.slice(start, length), other.slice(start, length));
            lhs.chunks[0].as_ref() == rhs.chunks[0].as_ref()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::{
        array::{ArrayRef, AsArray, BooleanArray, Int64Array},
        datatypes::{DataType, Int64Type},
    };

    use super::ChunkedColumn;
    use crate::value::Value;

    fn ints(values: &[i64]) -> ArrayRef {
        Arc::new(Int64Array::from(values.to_vec()))
    }

    fn chunked(chunks: &[&[i64]]) -> ChunkedColumn {
        ChunkedColumn::try_new(
            DataType::Int64,
            chunks.iter().map(|chunk| ints(chunk)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn slice_spans_chunks() {
        let column = chunked(&[&[1, 2], &[3], &[4, 5, 6]]);
        let slice = column.slice(1, 4);
        assert_eq!(slice.num_chunks(), 3);
        assert_eq!(
            slice.to_values().unwrap(),
            vec![Value::Int64(2), Value::Int64(3), Value::Int64(4), Value::Int64(5)]
        );
        assert_eq!(column.slice(10, 3).len(), 0);
        assert_eq!(column.slice(10, 3).num_chunks(), 1);
    }

    #[test]
    fn take_across_chunks() {
        let column = chunked(&[&[10, 11], &[12, 13, 14]]);
        let taken = column.take(&[4, 0, 2]).unwrap();
        assert_eq!(taken.as_primitive::<Int64Type>().values().to_vec(), vec![14, 10, 12]);
        assert!(column.take(&[5]).is_err());

        let single = chunked(&[&[1, 2, 3]]);
        assert!(single.take(&[3]).is_err());
    }

    #[test]
    fn equality_ignores_chunk_layout() {
        let a = chunked(&[&[1, 2], &[3, 4]]);
        let b = chunked(&[&[1], &[2, 3, 4]]);
        let c = chunked(&[&[1, 2, 3, 5]]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.defragment().unwrap().num_chunks(), 1);
        assert_eq!(a.defragment().unwrap(), a);
    }

    #[test]
    fn filter_keeps_chunk_layout() {
        let column = chunked(&[&[1, 2], &[3, 4]]);
        let mask = BooleanArray::from(vec![true, false, false, true]);
        let filtered = column.filter(&mask).unwrap();
        assert_eq!(filtered.num_chunks(), 2);
        assert_eq!(filtered.to_values().unwrap(), vec![Value::Int64(1), Value::Int64(4)]);
    }

    #[test]
    fn eq_mask_matches_nulls() {
        let column = ChunkedColumn::from_array(Arc::new(Int64Array::from(vec![
            Some(1),
            None,
            Some(1),
        ])));
        let mask = column.eq_mask("a", &Value::Int64(1)).unwrap();
        assert_eq!(mask.true_count(), 2);
        let mask = column.eq_mask("a", &Value::Null).unwrap();
        assert!(mask.value(1));
        assert_eq!(mask.true_count(), 1);
    }
}
