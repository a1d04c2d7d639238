//! Schema coercion — reshape a container to a target schema.
//!
//! Batches spilled at different times may carry different shapes. Before
//! they are merged, each one is coerced to the run's target schema:
//!
//! - columns are reordered to the target's field order (matched by name),
//! - a column whose type differs is cast to the target type,
//! - a target field missing from the container becomes an all-null column.
//!
//! Dropping a column is never implicit: a container field absent from the
//! target schema is a schema error.

use crate::error::{DbxError, DbxResult};
use crate::record::VectorContainer;
use arrow::array::{Array, ArrayRef, new_null_array};
use arrow::compute::{can_cast_types, cast};
use arrow::datatypes::{Field, SchemaRef};
use rayon::prelude::*;
use std::sync::Arc;

/// Coerces `container` in place to `target`. On error the container is unchanged.
pub fn coerce_container(container: &mut VectorContainer, target: &SchemaRef) -> DbxResult<()> {
    if container.schema() == target {
        return Ok(());
    }

    for field in container.schema().fields() {
        if target.column_with_name(field.name()).is_none() {
            return Err(DbxError::Schema(format!(
                "column '{}' is not part of the target schema",
                field.name()
            )));
        }
    }

    let source: &VectorContainer = container;
    let rows = source.record_count();
    let columns: Vec<ArrayRef> = target
        .fields()
        .par_iter()
        .map(|field| coerce_column(source, field, rows))
        .collect::<DbxResult<_>>()?;

    *container = VectorContainer::from_parts(Arc::clone(target), columns, rows);
    Ok(())
}

fn coerce_column(container: &VectorContainer, field: &Field, rows: usize) -> DbxResult<ArrayRef> {
    let Some(column) = container.column_by_name(field.name()) else {
        if rows > 0 && !field.is_nullable() {
            return Err(DbxError::Schema(format!(
                "cannot add non-nullable column '{}' to {rows} existing rows",
                field.name()
            )));
        }
        return Ok(new_null_array(field.data_type(), rows));
    };

    if column.data_type() == field.data_type() {
        return Ok(Arc::clone(column));
    }

    if !can_cast_types(column.data_type(), field.data_type()) {
        return Err(DbxError::TypeMismatch {
            expected: format!("column '{}': {:?}", field.name(), field.data_type()),
            actual: format!("{:?}", column.data_type()),
        });
    }
    Ok(cast(column.as_ref(), field.data_type())?)
}
