//! Input Batch — one in-memory batch plus its sort order.
//!
//! Batches arriving from upstream are sorted individually by building a
//! selection vector over them; the rows themselves are not moved until the
//! batch is merged or spilled.

use super::batch_group::{BatchGroup, BatchGroupCore};
use crate::error::{DbxError, DbxResult};
use crate::record::{SelectionVector, VectorContainer};
use arrow::array::ArrayRef;
use arrow::compute;
use rayon::prelude::*;
use std::sync::Arc;

/// 메모리 상주 런: 업스트림 배치 1개 + 정렬 인덱스(SV2)
#[derive(Debug)]
pub struct InputBatch {
    core: BatchGroupCore,
    sv2: Option<SelectionVector>,
    /// Memory estimate supplied by the caller for spill decisions
    data_size: usize,
}

impl InputBatch {
    /// Takes ownership of `container` and `sv2`. Every index must address a row of the container.
    pub fn try_new(
        container: VectorContainer,
        sv2: Option<SelectionVector>,
        data_size: usize,
    ) -> DbxResult<Self> {
        if let Some(max) = sv2.as_ref().and_then(|sv| sv.max_index()) {
            if max >= container.record_count() {
                return Err(DbxError::InvalidArguments(format!(
                    "selection index {max} out of range for {} rows",
                    container.record_count()
                )));
            }
        }

        Ok(Self {
            core: BatchGroupCore::new(container),
            sv2,
            data_size,
        })
    }

    /// Sorts `container` by `order_by` (column index, ascending) and wraps it.
    pub fn sorted(container: VectorContainer, order_by: &[(usize, bool)]) -> DbxResult<Self> {
        let sv2 = SelectionVector::sort(&container, order_by)?;
        let data_size = container.memory_size();
        Self::try_new(container, Some(sv2), data_size)
    }

    pub fn sv2(&self) -> Option<&SelectionVector> {
        self.sv2.as_ref()
    }

    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Copies the rows out in selection order, e.g. before spilling.
    pub fn materialize_sorted(&self) -> DbxResult<VectorContainer> {
        let container = self.core.container();
        let Some(sv2) = &self.sv2 else {
            return Ok(container.clone());
        };

        let indices = sv2.to_array();
        let columns: Vec<ArrayRef> = container
            .columns()
            .par_iter()
            .map(|col| compute::take(col.as_ref(), &indices, None))
            .collect::<Result<_, _>>()?;

        Ok(VectorContainer::from_parts(
            Arc::clone(container.schema()),
            columns,
            sv2.count(),
        ))
    }
}

impl BatchGroup for InputBatch {
    fn core(&self) -> &BatchGroupCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BatchGroupCore {
        &mut self.core
    }

    fn record_count(&self) -> usize {
        match &self.sv2 {
            Some(sv2) => sv2.count(),
            None => self.core.container().record_count(),
        }
    }

    fn next_index(&mut self) -> DbxResult<Option<usize>> {
        let count = self.record_count();
        let pos = self.core.advance(count);
        Ok(match (&self.sv2, pos) {
            (Some(sv2), Some(pos)) => Some(sv2.index(pos)),
            (_, pos) => pos,
        })
    }

    fn close(&mut self) -> DbxResult<()> {
        let result = self.core.close();
        if let Some(sv2) = &mut self.sv2 {
            sv2.clear();
        }
        result
    }
}
