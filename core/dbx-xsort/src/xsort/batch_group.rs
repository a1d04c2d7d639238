//! Batch Group — uniform row cursor over one sorted run.

use crate::error::{DbxError, DbxResult};
use crate::record::{SelectionVector, TypedFieldId, VectorContainer, coerce_container};
use arrow::array::ArrayRef;
use arrow::datatypes::SchemaRef;

/// State shared by every batch group: the current container, the read
/// pointer and the optional target schema.
///
/// Invariant: `pointer <= record_count` of the data currently loaded.
#[derive(Debug)]
pub struct BatchGroupCore {
    container: VectorContainer,
    pointer: usize,
    schema: Option<SchemaRef>,
}

impl BatchGroupCore {
    pub fn new(container: VectorContainer) -> Self {
        Self {
            container,
            pointer: 0,
            schema: None,
        }
    }

    pub fn container(&self) -> &VectorContainer {
        &self.container
    }

    pub(crate) fn container_mut(&mut self) -> &mut VectorContainer {
        &mut self.container
    }

    /// Replaces the current container and rewinds the pointer.
    pub(crate) fn replace_container(&mut self, container: VectorContainer) {
        self.container = container;
        self.pointer = 0;
    }

    /// Next position to emit.
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub(crate) fn set_pointer(&mut self, pointer: usize) {
        debug_assert!(pointer <= self.container.record_count());
        self.pointer = pointer;
    }

    /// Target schema, if one was set.
    pub fn target_schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    /// Coerces the current container to `schema` and keeps `schema` for later batches.
    pub fn set_schema(&mut self, schema: SchemaRef) -> DbxResult<()> {
        coerce_container(&mut self.container, &schema)?;
        self.schema = Some(schema);
        Ok(())
    }

    /// Linear cursor step over `record_count` logical rows.
    pub fn advance(&mut self, record_count: usize) -> Option<usize> {
        if self.pointer >= record_count {
            return None;
        }
        let val = self.pointer;
        self.pointer += 1;
        Some(val)
    }

    /// Releases the container's buffers; the shell and its schema stay usable.
    pub fn close(&mut self) -> DbxResult<()> {
        self.container.zero_vectors();
        self.pointer = 0;
        Ok(())
    }
}

/// 정렬된 런(run)에 대한 공통 반복 인터페이스 — 메모리/디스크 구분 없음
///
/// A merge driver holds runs as `Box<dyn BatchGroup>` and pulls row
/// indices with [`next_index`](BatchGroup::next_index); values are then read
/// from [`container`](BatchGroup::container) at that index. Indices are only
/// valid until the next call, which may load a different batch.
pub trait BatchGroup: Send {
    /// Shared state, for implementors.
    fn core(&self) -> &BatchGroupCore;

    fn core_mut(&mut self) -> &mut BatchGroupCore;

    /// Coerces current and future batches to `schema`.
    fn set_schema(&mut self, schema: SchemaRef) -> DbxResult<()> {
        self.core_mut().set_schema(schema)
    }

    /// Row index of the next record, or `None` once the run is exhausted.
    fn next_index(&mut self) -> DbxResult<Option<usize>> {
        let count = self.record_count();
        Ok(self.core_mut().advance(count))
    }

    /// Rows available without further I/O.
    fn record_count(&self) -> usize {
        self.core().container().record_count()
    }

    /// Raw row count of the current container, ignoring any selection.
    fn unfiltered_record_count(&self) -> usize {
        self.core().container().record_count()
    }

    fn schema(&self) -> SchemaRef {
        self.core().container().schema().clone()
    }

    fn container(&self) -> &VectorContainer {
        self.core().container()
    }

    fn column(&self, id: usize) -> Option<&ArrayRef> {
        self.core().container().column(id)
    }

    fn column_by_name(&self, path: &str) -> Option<&ArrayRef> {
        self.core().container().column_by_name(path)
    }

    fn value_vector_id(&self, path: &str) -> Option<TypedFieldId> {
        self.core().container().value_vector_id(path)
    }

    /// Batch groups expose one linear cursor plus at most one level of
    /// indirection; four-byte (multi-batch) selection is never available.
    fn supports_sv4(&self) -> bool {
        false
    }

    fn selection_vector2(&self) -> DbxResult<&SelectionVector> {
        Err(DbxError::UnsupportedOperation(
            "batch groups do not expose a selection vector; use next_index".to_string(),
        ))
    }

    fn selection_vector4(&self) -> DbxResult<&SelectionVector> {
        Err(DbxError::UnsupportedOperation(
            "batch groups do not support four-byte selection vectors".to_string(),
        ))
    }

    /// Releases the buffers held by this group.
    fn close(&mut self) -> DbxResult<()> {
        self.core_mut().close()
    }
}
