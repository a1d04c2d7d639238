//! Selection Vector — sorted indirection over a container's rows.

use crate::error::{DbxError, DbxResult};
use crate::record::VectorContainer;
use arrow::array::{Array, UInt32Array};
use arrow::compute::{self, SortColumn, SortOptions};
use std::sync::Arc;

/// 행 재배치 없이 정렬 순서를 표현하는 인덱스 벡터 (SV2)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionVector {
    indices: Vec<u32>,
}

impl SelectionVector {
    pub fn new(indices: Vec<u32>) -> Self {
        Self { indices }
    }

    /// Copies the indices produced by an Arrow sort kernel.
    pub fn from_indices(indices: &UInt32Array) -> DbxResult<Self> {
        if indices.null_count() > 0 {
            return Err(DbxError::InvalidArguments(
                "selection indices must not contain nulls".to_string(),
            ));
        }
        Ok(Self {
            indices: indices.values().to_vec(),
        })
    }

    /// Sorts `container` by `order_by` (column index, ascending) without moving any row.
    pub fn sort(container: &VectorContainer, order_by: &[(usize, bool)]) -> DbxResult<Self> {
        let sort_columns: Vec<SortColumn> = order_by
            .iter()
            .map(|(col_idx, asc)| {
                let values = container.column(*col_idx).ok_or_else(|| {
                    DbxError::InvalidArguments(format!(
                        "sort column {col_idx} out of range ({} columns)",
                        container.num_columns()
                    ))
                })?;
                Ok(SortColumn {
                    values: Arc::clone(values),
                    options: Some(SortOptions {
                        descending: !asc,
                        nulls_first: true,
                    }),
                })
            })
            .collect::<DbxResult<_>>()?;

        let rows = u32::try_from(container.record_count()).map_err(|_| {
            DbxError::InvalidArguments(format!(
                "{} rows exceed the selection vector limit of {}",
                container.record_count(),
                u32::MAX
            ))
        })?;
        if sort_columns.is_empty() {
            return Ok(Self::new((0..rows).collect()));
        }

        let indices = compute::lexsort_to_indices(&sort_columns, None)?;
        Self::from_indices(&indices)
    }

    /// Number of selected rows.
    pub fn count(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Physical row for logical position `pos`.
    pub fn index(&self, pos: usize) -> usize {
        self.indices[pos] as usize
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.indices
    }

    /// Largest referenced row, if any.
    pub fn max_index(&self) -> Option<usize> {
        self.indices.iter().max().map(|&i| i as usize)
    }

    /// Releases the index buffer.
    pub fn clear(&mut self) {
        self.indices = Vec::new();
    }

    pub(crate) fn to_array(&self) -> UInt32Array {
        UInt32Array::from(self.indices.clone())
    }
}
