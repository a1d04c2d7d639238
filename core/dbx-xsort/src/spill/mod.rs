//! Spill layer — the spill area, its byte streams and the batch codec.

pub mod channel;
pub mod codec;
pub mod config;
pub mod spill_set;

pub use channel::{FileSpillSink, FileSpillSource, SpillChannel, SpillSink, SpillSource};
pub use codec::BatchCodec;
pub use config::{SpillCompression, SpillConfig};
pub use spill_set::SpillSet;
