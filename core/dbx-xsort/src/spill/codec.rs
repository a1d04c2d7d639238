//! Batch codec — Arrow IPC framing for spill files.
//!
//! Every spilled batch is an independent frame:
//!
//! ```text
//! [u64 LE payload length][Arrow IPC stream: schema, one record batch, EOS]
//! ```
//!
//! Frames carry their own schema, so batches written before and after a
//! schema change can share one spill file. There is no file header.

use crate::error::{DbxError, DbxResult};
use crate::record::VectorContainer;
use crate::spill::config::SpillCompression;
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::{IpcWriteOptions, StreamWriter};
use std::io::{self, Cursor, Read, Write};

/// Size of the length prefix in front of each frame.
pub const FRAME_HEADER_LEN: u64 = 8;

/// Upper bound on a single frame (1 GiB); anything larger is treated as corruption.
pub const MAX_FRAME_LEN: u64 = 1 << 30;

/// Paired encoder/decoder for spilled batches.
#[derive(Debug, Clone)]
pub struct BatchCodec {
    options: IpcWriteOptions,
}

impl BatchCodec {
    pub fn new(compression: SpillCompression) -> DbxResult<Self> {
        let options =
            IpcWriteOptions::default().try_with_compression(compression.to_ipc_compression())?;
        Ok(Self { options })
    }

    /// Serializes the container (record count and every column) to one IPC stream.
    pub fn encode(&self, container: &VectorContainer) -> DbxResult<Vec<u8>> {
        let batch = container.to_record_batch()?;
        let mut buffer = Vec::new();

        {
            let mut writer =
                StreamWriter::try_new_with_options(&mut buffer, &batch.schema(), self.options.clone())?;
            writer.write(&batch)?;
            writer.finish()?;
        }

        Ok(buffer)
    }

    /// Rebuilds a container from one IPC stream payload.
    pub fn decode(&self, payload: &[u8]) -> DbxResult<VectorContainer> {
        let mut reader = StreamReader::try_new(Cursor::new(payload), None)?;
        let batch = reader
            .next()
            .ok_or_else(|| DbxError::Serialization("spill frame holds no batch".to_string()))??;
        Ok(VectorContainer::from_batch(batch))
    }

    /// Appends one frame to `sink`, returning the bytes written.
    pub fn write_to_stream<W: Write + ?Sized>(
        &self,
        container: &VectorContainer,
        sink: &mut W,
    ) -> DbxResult<u64> {
        let payload = self.encode(container)?;
        let len = payload.len() as u64;
        if len > MAX_FRAME_LEN {
            return Err(DbxError::Serialization(format!(
                "batch of {len} encoded bytes exceeds the spill frame limit"
            )));
        }
        sink.write_all(&len.to_le_bytes())?;
        sink.write_all(&payload)?;
        Ok(FRAME_HEADER_LEN + len)
    }

    /// Reads the next frame from `source`.
    pub fn read_from_stream<R: Read + ?Sized>(&self, source: &mut R) -> DbxResult<VectorContainer> {
        let mut header = [0u8; FRAME_HEADER_LEN as usize];
        source.read_exact(&mut header)?;
        let len = u64::from_le_bytes(header);
        if len > MAX_FRAME_LEN {
            return Err(DbxError::Serialization(format!(
                "spill frame length {len} exceeds limit"
            )));
        }

        // Grows with the bytes actually present, so a bogus length cannot
        // force a huge allocation.
        let mut payload = Vec::new();
        Read::take(&mut *source, len).read_to_end(&mut payload)?;
        if (payload.len() as u64) < len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("spill frame truncated: {} of {len} bytes", payload.len()),
            )
            .into());
        }
        self.decode(&payload)
    }
}
