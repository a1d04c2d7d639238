//! Spilled Run — a sorted run persisted to one spill file.
//!
//! The run is split into three cooperating pieces:
//!
//! - [`SpillWriter`] owns the output stream and appends batches,
//! - [`SpillReader`] owns the input stream and decodes the next batch,
//! - [`SpilledRun`] holds the *husk* (the current container, emptied between
//!   loads) and a [`RunState`] that says which of the two is active.
//!
//! ```text
//! Writing ──finish_writing / first read──▶ Idle ──first read──▶ Reading
//!    │                                      │                      │
//!    └──────────────────── close ───────────┴──────────────────────┴──▶ Closed
//! ```
//!
//! Reads are destructive: the file is deleted on close, so a run can be
//! consumed exactly once and never rewound.

use super::batch_group::{BatchGroup, BatchGroupCore};
use crate::error::{DbxError, DbxResult, FirstError};
use crate::record::{VectorContainer, coerce_container};
use crate::spill::{BatchCodec, SpillChannel, SpillSet, SpillSink, SpillSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Append side of a spilled run.
pub struct SpillWriter {
    sink: Box<dyn SpillSink>,
}

impl SpillWriter {
    fn append(&mut self, codec: &BatchCodec, container: &VectorContainer) -> DbxResult<u64> {
        codec.write_to_stream(container, &mut *self.sink)
    }

    /// Tallies and closes the stream. Returns the bytes written.
    fn close(self, channel: &dyn SpillChannel, path: &Path) -> DbxResult<u64> {
        let written = self.sink.position();
        channel.tally_write_bytes(written);
        self.sink.close()?;
        tracing::debug!(target: "xsort", bytes = written, path = %path.display(), "Summary: wrote spill file");
        Ok(written)
    }
}

/// Read side of a spilled run.
pub struct SpillReader {
    source: Box<dyn SpillSource>,
}

impl SpillReader {
    fn read_batch(&mut self, codec: &BatchCodec) -> DbxResult<VectorContainer> {
        codec.read_from_stream(&mut *self.source)
    }

    fn close(self, channel: &dyn SpillChannel, path: &Path) -> DbxResult<u64> {
        let read = self.source.position();
        channel.tally_read_bytes(read);
        self.source.close()?;
        tracing::debug!(target: "xsort", bytes = read, path = %path.display(), "Summary: read spill file");
        Ok(read)
    }
}

/// Which stream of the run is open.
pub enum RunState {
    /// Output stream open; `add_batch` allowed.
    Writing(SpillWriter),
    /// No stream open, nothing read yet.
    Idle,
    /// Input stream open; batches are loaded on demand.
    Reading(SpillReader),
    /// Terminal. Streams closed, file deleted.
    Closed,
}

impl RunState {
    pub fn name(&self) -> &'static str {
        match self {
            RunState::Writing(_) => "writing",
            RunState::Idle => "idle",
            RunState::Reading(_) => "reading",
            RunState::Closed => "closed",
        }
    }
}

/// 디스크에 스필된 정렬 런 — 쓰기 후 한 번만 읽을 수 있음 (destructive read)
pub struct SpilledRun {
    core: BatchGroupCore,
    channel: Arc<dyn SpillChannel>,
    codec: BatchCodec,
    path: PathBuf,
    /// Batches written but not yet read back
    pending_batches: usize,
    state: RunState,
    /// Stage of the first failed append or load. Once set, the file
    /// contents are no longer trusted and the run only accepts `close`.
    failed: Option<&'static str>,
}

impl SpilledRun {
    /// Opens the output stream for `path`. The run starts empty.
    pub fn new(channel: Arc<dyn SpillChannel>, path: PathBuf, codec: BatchCodec) -> DbxResult<Self> {
        let sink = channel.open_for_output(&path)?;
        Ok(Self {
            core: BatchGroupCore::new(VectorContainer::new_shell()),
            channel,
            codec,
            path,
            pending_batches: 0,
            state: RunState::Writing(SpillWriter { sink }),
            failed: None,
        })
    }

    /// New run in the next spill file of `spill_set`, using its compression setting.
    pub fn create(spill_set: Arc<SpillSet>) -> DbxResult<Self> {
        let path = spill_set.next_spill_file(None)?;
        let codec = BatchCodec::new(spill_set.config().compression)?;
        Self::new(spill_set, path, codec)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pending_batches(&self) -> usize {
        self.pending_batches
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, RunState::Closed)
    }

    /// `true` once an append or load has failed.
    pub fn is_failed(&self) -> bool {
        self.failed.is_some()
    }

    /// Appends `container` to the spill file and keeps its emptied shell as the husk.
    ///
    /// On error the container is dropped; the run itself must still be closed.
    /// A failed write may leave a partial frame behind, so every later
    /// `add_batch` or `next_index` on this run fails as well.
    pub fn add_batch(&mut self, mut container: VectorContainer) -> DbxResult<()> {
        if let Some(stage) = self.failed {
            return Err(DbxError::InvalidOperation {
                message: "cannot add a batch to a spilled run".to_string(),
                context: format!("an earlier {stage} of {} failed", self.path.display()),
            });
        }
        let RunState::Writing(writer) = &mut self.state else {
            return Err(DbxError::InvalidOperation {
                message: "cannot add a batch to a spilled run".to_string(),
                context: format!("run is {}", self.state.name()),
            });
        };

        let record_count = container.record_count();
        let start = Instant::now();
        let bytes = match writer.append(&self.codec, &container) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.failed = Some("write");
                tracing::warn!(target: "xsort", path = %self.path.display(), error = %e, "spill write failed");
                return Err(e);
            }
        };
        container.zero_vectors();
        tracing::trace!(
            target: "xsort",
            records = record_count,
            bytes,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Wrote spilled batch"
        );
        self.pending_batches += 1;

        if let Some(schema) = self.core.target_schema() {
            coerce_container(&mut container, schema)?;
        }
        self.core.replace_container(container);
        Ok(())
    }

    /// Closes the output stream and returns the bytes written. No-op once closed.
    pub fn finish_writing(&mut self) -> DbxResult<u64> {
        match std::mem::replace(&mut self.state, RunState::Idle) {
            RunState::Writing(writer) => writer.close(self.channel.as_ref(), &self.path),
            other => {
                self.state = other;
                Ok(0)
            }
        }
    }

    /// Replaces the husk's contents with the next batch from disk.
    fn load_next_batch(&mut self) -> DbxResult<()> {
        self.core.container_mut().zero_vectors();

        if matches!(self.state, RunState::Writing(_)) {
            self.finish_writing()?;
        }
        if matches!(self.state, RunState::Idle) {
            let source = self.channel.open_for_input(&self.path)?;
            self.state = RunState::Reading(SpillReader { source });
        }
        let RunState::Reading(reader) = &mut self.state else {
            return Err(DbxError::Internal(format!(
                "spilled run has no reader in state {}",
                self.state.name()
            )));
        };

        let start = Instant::now();
        let mut incoming = reader.read_batch(&self.codec)?;
        if let Some(schema) = self.core.target_schema() {
            coerce_container(&mut incoming, schema)?;
        }
        tracing::trace!(
            target: "xsort",
            records = incoming.record_count(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Read spilled batch"
        );
        self.pending_batches -= 1;

        let husk = self.core.container_mut();
        if husk.num_columns() != incoming.num_columns() {
            // Batches of differing shape without a target schema.
            *husk = VectorContainer::empty(Arc::clone(incoming.schema()));
        }
        husk.transfer_from(&mut incoming)?;
        Ok(())
    }
}

impl BatchGroup for SpilledRun {
    fn core(&self) -> &BatchGroupCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut BatchGroupCore {
        &mut self.core
    }

    fn next_index(&mut self) -> DbxResult<Option<usize>> {
        if self.is_closed() {
            return Err(DbxError::InvalidOperation {
                message: "cannot read from a spilled run".to_string(),
                context: "run is closed".to_string(),
            });
        }
        if let Some(stage) = self.failed {
            return Err(DbxError::data_read(DbxError::Storage(format!(
                "an earlier {stage} of {} failed",
                self.path.display()
            ))));
        }

        if self.core.pointer() < self.record_count() {
            let count = self.record_count();
            return Ok(self.core.advance(count));
        }

        // Current batch exhausted: load the next non-empty one.
        while self.pending_batches > 0 {
            if let Err(e) = self.load_next_batch() {
                self.core.container_mut().zero_vectors();
                self.failed = Some("read");
                return Err(DbxError::data_read(e));
            }
            if self.record_count() > 0 {
                // Row 0 is returned now, so the next row is 1.
                self.core.set_pointer(1);
                return Ok(Some(0));
            }
        }
        Ok(None)
    }

    /// Releases the husk, closes whichever stream is open and deletes the file.
    ///
    /// Every step runs even if an earlier one failed; the first error is returned.
    fn close(&mut self) -> DbxResult<()> {
        if self.is_closed() {
            return Ok(());
        }

        let mut errors = FirstError::new();
        errors.record("release_container", self.core.close());

        let (writer, reader) = match std::mem::replace(&mut self.state, RunState::Closed) {
            RunState::Writing(writer) => (Some(writer), None),
            RunState::Reading(reader) => (None, Some(reader)),
            RunState::Idle | RunState::Closed => (None, None),
        };
        if let Some(writer) = writer {
            errors.record(
                "close_output_stream",
                writer.close(self.channel.as_ref(), &self.path).map(drop),
            );
        }
        if let Some(reader) = reader {
            errors.record(
                "close_input_stream",
                reader.close(self.channel.as_ref(), &self.path).map(drop),
            );
        }
        errors.record("delete_spill_file", self.channel.delete(&self.path));

        if self.pending_batches > 0 {
            tracing::debug!(
                target: "xsort",
                pending = self.pending_batches,
                path = %self.path.display(),
                "closed spilled run with unread batches"
            );
        }
        self.pending_batches = 0;
        errors.into_result()
    }
}

impl Drop for SpilledRun {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        tracing::warn!(target: "xsort", path = %self.path.display(), "spilled run dropped without close");
        if let Err(e) = BatchGroup::close(self) {
            tracing::warn!(target: "xsort", error = %e, "failed to clean up spilled run");
        }
    }
}
