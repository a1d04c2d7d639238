//! Vector Container — owned Arrow columns with an explicit record count.
//!
//! Unlike an immutable `RecordBatch`, a container can be *zeroed* (its
//! columns released while the shell and schema stay valid) and can receive
//! columns from another container by buffer transfer.

use crate::error::{DbxError, DbxResult};
use arrow::array::{Array, ArrayRef, new_empty_array};
use arrow::datatypes::{DataType, Schema, SchemaRef};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;

/// Location and type of a column inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedFieldId {
    pub index: usize,
    pub data_type: DataType,
    pub nullable: bool,
}

/// Columnar container: one `ArrayRef` per schema field, all `record_count` long.
#[derive(Debug, Clone)]
pub struct VectorContainer {
    schema: SchemaRef,
    columns: Vec<ArrayRef>,
    record_count: usize,
}

impl VectorContainer {
    /// An empty container (no rows) with the given schema.
    pub fn empty(schema: SchemaRef) -> Self {
        let columns = schema
            .fields()
            .iter()
            .map(|f| new_empty_array(f.data_type()))
            .collect();
        Self {
            schema,
            columns,
            record_count: 0,
        }
    }

    /// Container with no columns and no rows. Used as the initial husk of a spilled run.
    pub fn new_shell() -> Self {
        Self::empty(Arc::new(Schema::empty()))
    }

    /// Takes ownership of a batch's columns.
    pub fn from_batch(batch: RecordBatch) -> Self {
        let record_count = batch.num_rows();
        let schema = batch.schema();
        let columns = batch.columns().to_vec();
        Self {
            schema,
            columns,
            record_count,
        }
    }

    /// Builds a container after validating column lengths and types.
    pub fn try_new(schema: SchemaRef, columns: Vec<ArrayRef>) -> DbxResult<Self> {
        let batch = RecordBatch::try_new(schema, columns)?;
        Ok(Self::from_batch(batch))
    }

    pub(crate) fn from_parts(schema: SchemaRef, columns: Vec<ArrayRef>, record_count: usize) -> Self {
        debug_assert_eq!(schema.fields().len(), columns.len());
        Self {
            schema,
            columns,
            record_count,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn columns(&self) -> &[ArrayRef] {
        &self.columns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ArrayRef> {
        self.columns.iter()
    }

    /// Column by position.
    pub fn column(&self, id: usize) -> Option<&ArrayRef> {
        self.columns.get(id)
    }

    /// Column by field name.
    pub fn column_by_name(&self, path: &str) -> Option<&ArrayRef> {
        self.value_vector_id(path)
            .and_then(|id| self.columns.get(id.index))
    }

    /// Resolves a field name to its position and type.
    pub fn value_vector_id(&self, path: &str) -> Option<TypedFieldId> {
        self.schema
            .column_with_name(path)
            .map(|(index, field)| TypedFieldId {
                index,
                data_type: field.data_type().clone(),
                nullable: field.is_nullable(),
            })
    }

    /// Bytes held by the column buffers.
    pub fn memory_size(&self) -> usize {
        self.columns.iter().map(|c| c.get_array_memory_size()).sum()
    }

    /// Releases every column's buffers, keeping the schema. The record count becomes 0.
    pub fn zero_vectors(&mut self) {
        for (column, field) in self.columns.iter_mut().zip(self.schema.fields()) {
            *column = new_empty_array(field.data_type());
        }
        self.record_count = 0;
    }

    /// Moves every column out of `source` into `self`, matched by position.
    ///
    /// `source` is left zeroed. `self` takes the source's schema and record count.
    pub fn transfer_from(&mut self, source: &mut VectorContainer) -> DbxResult<()> {
        if self.columns.len() != source.columns.len() {
            return Err(DbxError::Schema(format!(
                "cannot transfer {} columns into a container of {}",
                source.columns.len(),
                self.columns.len()
            )));
        }

        for (target, incoming) in self.columns.iter_mut().zip(source.columns.iter_mut()) {
            let empty = new_empty_array(incoming.data_type());
            *target = std::mem::replace(incoming, empty);
        }
        self.schema = Arc::clone(&source.schema);
        self.record_count = source.record_count;
        source.record_count = 0;
        Ok(())
    }

    /// Snapshot of the current contents as a `RecordBatch` (shares buffers).
    pub fn to_record_batch(&self) -> DbxResult<RecordBatch> {
        let options = RecordBatchOptions::new().with_row_count(Some(self.record_count));
        Ok(RecordBatch::try_new_with_options(
            Arc::clone(&self.schema),
            self.columns.clone(),
            &options,
        )?)
    }
}

impl<'a> IntoIterator for &'a VectorContainer {
    type Item = &'a ArrayRef;
    type IntoIter = std::slice::Iter<'a, ArrayRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
