//! Spill Channel — byte streams against a spill area.
//!
//! A [`SpilledRun`](crate::xsort::SpilledRun) never touches the file system
//! directly. It opens its streams, deletes its file and reports its byte
//! counts through this trait, so the spill area can be swapped (or made to
//! fail in tests).

use crate::error::DbxResult;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Output stream of one spill file.
pub trait SpillSink: Write + Send {
    /// Bytes written through this stream so far.
    fn position(&self) -> u64;

    /// Flushes and closes the stream.
    fn close(self: Box<Self>) -> DbxResult<()>;
}

/// Input stream of one spill file.
pub trait SpillSource: Read + Send {
    /// Bytes read through this stream so far.
    fn position(&self) -> u64;

    fn close(self: Box<Self>) -> DbxResult<()>;
}

/// Spill area shared by all runs of an operator.
///
/// # Contract
///
/// - `open_for_output`: creates (truncates) the file.
/// - `open_for_input`: opens an existing file from its start.
/// - `delete`: removes the file; a file that is already gone is not an error.
/// - `tally_*`: adds to the channel-wide totals. Each stream is tallied once, at close.
pub trait SpillChannel: Send + Sync {
    fn open_for_output(&self, path: &Path) -> DbxResult<Box<dyn SpillSink>>;

    fn open_for_input(&self, path: &Path) -> DbxResult<Box<dyn SpillSource>>;

    fn delete(&self, path: &Path) -> DbxResult<()>;

    fn tally_write_bytes(&self, bytes: u64);

    fn tally_read_bytes(&self, bytes: u64);
}

/// Buffered file writer that counts the bytes passed through it.
pub struct FileSpillSink {
    inner: BufWriter<File>,
    written: u64,
}

impl FileSpillSink {
    pub fn new(file: File, buffer_size: usize) -> Self {
        Self {
            inner: BufWriter::with_capacity(buffer_size, file),
            written: 0,
        }
    }
}

impl Write for FileSpillSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl SpillSink for FileSpillSink {
    fn position(&self) -> u64 {
        self.written
    }

    fn close(self: Box<Self>) -> DbxResult<()> {
        let file = self.inner.into_inner().map_err(|e| e.into_error())?;
        file.sync_data()?;
        Ok(())
    }
}

/// Buffered file reader that counts the bytes consumed from it.
pub struct FileSpillSource {
    inner: BufReader<File>,
    read: u64,
}

impl FileSpillSource {
    pub fn new(file: File, buffer_size: usize) -> Self {
        Self {
            inner: BufReader::with_capacity(buffer_size, file),
            read: 0,
        }
    }
}

impl Read for FileSpillSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        Ok(n)
    }
}

impl SpillSource for FileSpillSource {
    fn position(&self) -> u64 {
        self.read
    }

    fn close(self: Box<Self>) -> DbxResult<()> {
        drop(self);
        Ok(())
    }
}
