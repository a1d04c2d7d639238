//! External sort batch groups.
//!
//! A sort run lives either in memory ([`InputBatch`]) or in a spill file
//! ([`SpilledRun`]); both are consumed through the [`BatchGroup`] cursor.

mod batch_group;
mod input_batch;
mod spilled_run;

pub use batch_group::{BatchGroup, BatchGroupCore};
pub use input_batch::InputBatch;
pub use spilled_run::{RunState, SpillReader, SpillWriter, SpilledRun};
