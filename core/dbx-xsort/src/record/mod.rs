//! Record layer — containers, selection vectors and schema coercion.

pub mod container;
pub mod schema_util;
pub mod selection;

pub use container::{TypedFieldId, VectorContainer};
pub use schema_util::coerce_container;
pub use selection::SelectionVector;
