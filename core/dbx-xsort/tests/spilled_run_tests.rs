// Spilled run 통합 테스트
//
// 왕복(round-trip), 파괴적 읽기, close 오류 집계, 스키마 강제 변환, 바이트 집계

use arrow::array::{Array, AsArray, Int32Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema, SchemaRef};
use dbx_xsort::error::{DbxError, DbxResult};
use dbx_xsort::record::VectorContainer;
use dbx_xsort::spill::codec::{FRAME_HEADER_LEN, MAX_FRAME_LEN};
use dbx_xsort::spill::{BatchCodec, SpillChannel, SpillCompression, SpillConfig, SpillSet, SpillSink, SpillSource};
use dbx_xsort::xsort::{BatchGroup, SpilledRun};
use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
    ]))
}

fn make_batch(ids: &[i64], names: &[&str]) -> VectorContainer {
    VectorContainer::try_new(
        schema(),
        vec![
            Arc::new(Int64Array::from(ids.to_vec())),
            Arc::new(StringArray::from(names.to_vec())),
        ],
    )
    .unwrap()
}

/// Drains the run, collecting `(id, name)` for every row.
fn drain(run: &mut dyn BatchGroup) -> DbxResult<Vec<(i64, String)>> {
    let mut rows = Vec::new();
    while let Some(idx) = run.next_index()? {
        let ids = run.column_by_name("id").unwrap().as_primitive::<Int64Type>();
        let names = run.column_by_name("name").unwrap().as_string::<i32>();
        rows.push((ids.value(idx), names.value(idx).to_string()));
    }
    Ok(rows)
}

// ═══════════════════════════════════════════════════════════════════════════
// Fault injection
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Faults {
    output_close: bool,
    open_input: bool,
    input_close: bool,
    delete: bool,
    /// Bytes the output stream accepts before reporting a full disk
    write_budget: Option<usize>,
}

struct FaultyChannel {
    inner: SpillSet,
    faults: Faults,
    delete_calls: AtomicUsize,
}

impl FaultyChannel {
    fn new(faults: Faults) -> Self {
        Self {
            inner: SpillSet::temporary().unwrap(),
            faults,
            delete_calls: AtomicUsize::new(0),
        }
    }
}

struct FailingCloseSink {
    inner: Box<dyn SpillSink>,
}

impl Write for FailingCloseSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl SpillSink for FailingCloseSink {
    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn close(self: Box<Self>) -> DbxResult<()> {
        self.inner.close()?;
        Err(io::Error::other("output close failed").into())
    }
}

/// Accepts `remaining` bytes, then fails every write (partial writes included).
struct FullDiskSink {
    inner: Box<dyn SpillSink>,
    remaining: usize,
}

impl Write for FullDiskSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::other("disk full"));
        }
        let n = buf.len().min(self.remaining);
        let n = self.inner.write(&buf[..n])?;
        self.remaining -= n;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl SpillSink for FullDiskSink {
    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn close(self: Box<Self>) -> DbxResult<()> {
        self.inner.close()
    }
}

struct FailingCloseSource {
    inner: Box<dyn SpillSource>,
}

impl Read for FailingCloseSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl SpillSource for FailingCloseSource {
    fn position(&self) -> u64 {
        self.inner.position()
    }

    fn close(self: Box<Self>) -> DbxResult<()> {
        self.inner.close()?;
        Err(io::Error::other("input close failed").into())
    }
}

impl SpillChannel for FaultyChannel {
    fn open_for_output(&self, path: &Path) -> DbxResult<Box<dyn SpillSink>> {
        let sink = self.inner.open_for_output(path)?;
        if let Some(remaining) = self.faults.write_budget {
            return Ok(Box::new(FullDiskSink { inner: sink, remaining }));
        }
        if self.faults.output_close {
            return Ok(Box::new(FailingCloseSink { inner: sink }));
        }
        Ok(sink)
    }

    fn open_for_input(&self, path: &Path) -> DbxResult<Box<dyn SpillSource>> {
        if self.faults.open_input {
            return Err(io::Error::other("input unavailable").into());
        }
        let source = self.inner.open_for_input(path)?;
        if self.faults.input_close {
            return Ok(Box::new(FailingCloseSource { inner: source }));
        }
        Ok(source)
    }

    fn delete(&self, path: &Path) -> DbxResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.faults.delete {
            return Err(DbxError::Storage("delete refused".to_string()));
        }
        self.inner.delete(path)
    }

    fn tally_write_bytes(&self, bytes: u64) {
        self.inner.tally_write_bytes(bytes);
    }

    fn tally_read_bytes(&self, bytes: u64) {
        self.inner.tally_read_bytes(bytes);
    }
}

fn faulty_run(faults: Faults) -> (Arc<FaultyChannel>, SpilledRun) {
    let channel = Arc::new(FaultyChannel::new(faults));
    let path = channel.inner.next_spill_file(Some("faulty")).unwrap();
    let codec = BatchCodec::new(SpillCompression::None).unwrap();
    let run = SpilledRun::new(channel.clone(), path, codec).unwrap();
    (channel, run)
}

// ═══════════════════════════════════════════════════════════════════════════
// Round trip and destructive read
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_round_trip_preserves_rows_and_order() -> DbxResult<()> {
    dbx_xsort::logging::init_test();
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;

    run.add_batch(make_batch(&[1, 2, 3], &["a", "b", "c"]))?;
    run.add_batch(make_batch(&[4], &["d"]))?;
    run.add_batch(make_batch(&[5, 6], &["e", "f"]))?;
    run.set_schema(schema())?;

    let rows = drain(&mut run)?;
    let expected: Vec<(i64, String)> = ["a", "b", "c", "d", "e", "f"]
        .iter()
        .enumerate()
        .map(|(i, s)| (i as i64 + 1, s.to_string()))
        .collect();
    assert_eq!(rows, expected);

    run.close()?;
    Ok(())
}

#[test]
fn test_destructive_read_deletes_file() -> DbxResult<()> {
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;
    run.add_batch(make_batch(&[10, 20], &["x", "y"]))?;
    let path = run.path().to_path_buf();

    assert_eq!(drain(&mut run)?.len(), 2);
    assert!(path.exists());

    run.close()?;
    assert!(!path.exists());
    assert!(run.next_index().is_err());
    Ok(())
}

#[test]
fn test_exhaustion_is_stable() -> DbxResult<()> {
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;
    run.add_batch(make_batch(&[1], &["only"]))?;

    assert_eq!(run.next_index()?, Some(0));
    for _ in 0..5 {
        assert_eq!(run.next_index()?, None);
    }
    assert_eq!(run.pending_batches(), 0);
    run.close()?;
    Ok(())
}

#[test]
fn test_empty_run_is_exhausted() -> DbxResult<()> {
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;
    assert_eq!(run.next_index()?, None);
    assert_eq!(run.record_count(), 0);
    run.close()?;
    Ok(())
}

#[test]
fn test_close_unread_run_deletes_file() -> DbxResult<()> {
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;
    run.add_batch(make_batch(&[1, 2], &["a", "b"]))?;
    let path = run.path().to_path_buf();

    run.close()?;
    assert!(!path.exists());
    assert!(run.is_closed());
    Ok(())
}

#[test]
fn test_compressed_round_trip() -> DbxResult<()> {
    let config = SpillConfig::new("zstd-sort").with_compression(SpillCompression::Zstd);
    let spill_set = Arc::new(SpillSet::new(config)?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;

    let ids: Vec<i64> = (0..1000).collect();
    let names: Vec<String> = ids.iter().map(|i| format!("name-{}", i % 7)).collect();
    let name_refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    run.add_batch(make_batch(&ids, &name_refs))?;

    let rows = drain(&mut run)?;
    assert_eq!(rows.len(), 1000);
    assert_eq!(rows[999], (999, "name-5".to_string()));
    run.close()?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Schema coercion
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_schema_set_before_write_applies_to_read() -> DbxResult<()> {
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;

    let target = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, true),
        Field::new("score", DataType::Float64, true),
    ]));
    run.set_schema(Arc::clone(&target))?;

    // Narrower types, different column order, no "score".
    let narrow = Arc::new(Schema::new(vec![
        Field::new("name", DataType::Utf8, true),
        Field::new("id", DataType::Int32, false),
    ]));
    let batch = VectorContainer::try_new(
        narrow,
        vec![
            Arc::new(StringArray::from(vec!["p", "q"])),
            Arc::new(Int32Array::from(vec![7, 8])),
        ],
    )?;
    run.add_batch(batch)?;
    assert_eq!(run.schema(), target);

    let rows = drain(&mut run)?;
    assert_eq!(rows, vec![(7, "p".to_string()), (8, "q".to_string())]);
    assert_eq!(run.schema(), target);
    let score = run.column_by_name("score").unwrap();
    assert_eq!(score.data_type(), &DataType::Float64);
    run.close()?;
    Ok(())
}

#[test]
fn test_schema_evolution_across_batches() -> DbxResult<()> {
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;

    let old = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
    let old_batch = VectorContainer::try_new(old, vec![Arc::new(Int64Array::from(vec![1]))])?;
    run.add_batch(old_batch)?;

    let newer = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("score", DataType::Float64, true),
    ]));
    let new_batch = VectorContainer::try_new(
        Arc::clone(&newer),
        vec![
            Arc::new(Int64Array::from(vec![2])),
            Arc::new(arrow::array::Float64Array::from(vec![0.5])),
        ],
    )?;
    run.add_batch(new_batch)?;
    run.set_schema(Arc::clone(&newer))?;

    assert_eq!(run.next_index()?, Some(0));
    assert!(run.column(1).unwrap().is_null(0));
    assert_eq!(run.next_index()?, Some(0));
    let score = run.column(1).unwrap().as_primitive::<Float64Type>();
    assert_eq!(score.value(0), 0.5);
    assert_eq!(run.next_index()?, None);
    run.close()?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Byte accounting
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_byte_tallies_match_file_size() -> DbxResult<()> {
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;
    run.add_batch(make_batch(&[1, 2, 3], &["a", "b", "c"]))?;
    run.add_batch(make_batch(&[4, 5], &["d", "e"]))?;

    assert_eq!(spill_set.write_bytes(), 0);
    let written = run.finish_writing()?;
    let file_len = std::fs::metadata(run.path())?.len();
    assert_eq!(written, file_len);
    assert_eq!(spill_set.write_bytes(), file_len);

    assert_eq!(drain(&mut run)?.len(), 5);
    assert_eq!(spill_set.read_bytes(), 0);
    run.close()?;
    assert_eq!(spill_set.read_bytes(), file_len);
    assert_eq!(spill_set.write_bytes(), file_len);
    Ok(())
}

#[test]
fn test_write_tally_on_close_without_read() -> DbxResult<()> {
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;
    run.add_batch(make_batch(&[1], &["a"]))?;
    let path = run.path().to_path_buf();
    run.close()?;

    assert!(spill_set.write_bytes() > 0);
    assert_eq!(spill_set.read_bytes(), 0);
    assert!(!path.exists());
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════
// Failures
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_close_reports_first_error_and_still_deletes() {
    let (channel, mut run) = faulty_run(Faults {
        output_close: true,
        delete: true,
        ..Faults::default()
    });
    run.add_batch(make_batch(&[1], &["a"])).unwrap();

    let err = run.close().unwrap_err();
    assert!(err.to_string().contains("output close failed"), "{err}");
    assert_eq!(channel.delete_calls.load(Ordering::SeqCst), 1);
    assert!(run.is_closed());

    // Closing again does not retry anything.
    run.close().unwrap();
    assert_eq!(channel.delete_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failed_output_close_still_deletes_file() {
    let (channel, mut run) = faulty_run(Faults {
        output_close: true,
        ..Faults::default()
    });
    run.add_batch(make_batch(&[1, 2], &["a", "b"])).unwrap();
    let path = run.path().to_path_buf();

    assert!(run.close().is_err());
    assert!(!path.exists());
    assert_eq!(channel.delete_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_open_input_failure_is_data_read_error() {
    let (channel, mut run) = faulty_run(Faults {
        open_input: true,
        ..Faults::default()
    });
    run.add_batch(make_batch(&[1], &["a"])).unwrap();

    let err = run.next_index().unwrap_err();
    assert!(matches!(err, DbxError::DataRead { .. }));
    assert!(err.is_user_facing());
    assert!(err.to_string().contains("input unavailable"));
    assert_eq!(run.record_count(), 0);

    run.close().unwrap();
    assert_eq!(channel.delete_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_corrupt_spill_file_poisons_run() -> DbxResult<()> {
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;
    run.add_batch(make_batch(&[1, 2, 3], &["a", "b", "c"]))?;
    let written = run.finish_writing()?;

    let file = OpenOptions::new().write(true).open(run.path())?;
    file.set_len(written - 4)?;
    drop(file);

    let err = run.next_index().unwrap_err();
    assert!(matches!(err, DbxError::DataRead { .. }));
    assert!(err.to_string().contains("Failure while reading spilled data"));

    // No retry: the run stays failed.
    assert!(matches!(run.next_index(), Err(DbxError::DataRead { .. })));

    let path = run.path().to_path_buf();
    run.close()?;
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_failed_write_poisons_run() {
    let first = make_batch(&[1, 2], &["a", "b"]);
    let codec = BatchCodec::new(SpillCompression::None).unwrap();
    let frame_len = FRAME_HEADER_LEN as usize + codec.encode(&first).unwrap().len();

    // Room for the first frame and a few bytes of the second.
    let (channel, mut run) = faulty_run(Faults {
        write_budget: Some(frame_len + 10),
        ..Faults::default()
    });
    run.add_batch(first).unwrap();

    let err = run.add_batch(make_batch(&[3, 4], &["c", "d"])).unwrap_err();
    assert!(err.to_string().contains("disk full"), "{err}");
    assert!(run.is_failed());
    assert_eq!(run.pending_batches(), 1);

    // Nothing more is accepted after the partial frame.
    let err = run.add_batch(make_batch(&[5], &["e"])).unwrap_err();
    assert!(matches!(err, DbxError::InvalidOperation { .. }));
    assert_eq!(run.pending_batches(), 1);

    let err = run.next_index().unwrap_err();
    assert!(matches!(err, DbxError::DataRead { .. }));
    assert!(err.to_string().contains("earlier write"), "{err}");

    let path = run.path().to_path_buf();
    run.close().unwrap();
    assert!(!path.exists());
    assert_eq!(channel.delete_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_input_close_failure_still_deletes_and_tallies() {
    let (channel, mut run) = faulty_run(Faults {
        input_close: true,
        ..Faults::default()
    });
    run.add_batch(make_batch(&[1, 2], &["a", "b"])).unwrap();
    run.add_batch(make_batch(&[3], &["c"])).unwrap();
    let written = run.finish_writing().unwrap();

    assert_eq!(drain(&mut run).unwrap().len(), 3);
    let path = run.path().to_path_buf();

    let err = run.close().unwrap_err();
    assert!(err.to_string().contains("input close failed"), "{err}");
    assert_eq!(channel.delete_calls.load(Ordering::SeqCst), 1);
    assert!(!path.exists());
    assert_eq!(channel.inner.read_bytes(), written);
    assert_eq!(channel.inner.write_bytes(), written);
}

/// Overwrites the length prefix of the first frame in `path`.
fn corrupt_length_prefix(path: &Path, len: u64) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&len.to_le_bytes())?;
    file.sync_all()
}

#[test]
fn test_huge_frame_length_is_data_read_error() -> DbxResult<()> {
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;
    run.add_batch(make_batch(&[1, 2, 3], &["a", "b", "c"]))?;
    run.finish_writing()?;

    corrupt_length_prefix(run.path(), 40 << 30)?;

    let err = run.next_index().unwrap_err();
    assert!(matches!(err, DbxError::DataRead { .. }));
    assert!(err.is_user_facing());
    assert!(run.is_failed());
    run.close()?;
    Ok(())
}

#[test]
fn test_frame_length_past_end_of_file_is_data_read_error() -> DbxResult<()> {
    let spill_set = Arc::new(SpillSet::temporary()?);
    let mut run = SpilledRun::create(Arc::clone(&spill_set))?;
    run.add_batch(make_batch(&[1, 2, 3], &["a", "b", "c"]))?;
    run.finish_writing()?;

    // Within the frame limit but far beyond the file.
    corrupt_length_prefix(run.path(), MAX_FRAME_LEN)?;

    let err = run.next_index().unwrap_err();
    assert!(matches!(err, DbxError::DataRead { .. }));
    assert!(err.to_string().contains("truncated"), "{err}");

    let path = run.path().to_path_buf();
    run.close()?;
    assert!(!path.exists());
    Ok(())
}
