//! Size-rotated write-ahead journal of consensus messages.
//!
//! One instance per node. Records are framed with a CRC-32C header, appended
//! to the active `wal.<N>` segment behind a bounded buffer, and replayed from
//! a `(segment, offset)` checkpoint after a restart. A background ticker
//! re-evaluates rotation independent of write traffic.

pub mod layout;
pub mod record;
pub mod replay;
pub mod writer;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, trace, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::journal::layout::{list_segments, segment_file_name, segment_path};
use crate::journal::record::{encode_record, RecordError};
use crate::journal::replay::scan_segment;
use crate::journal::writer::SegmentWriter;
use crate::message::{CodecError, MessageCodec};

pub use crate::journal::layout::SegmentRef;
pub use crate::journal::replay::{SegmentFault, READ_BUFFER_BYTES};
pub use crate::journal::writer::WRITE_BUFFER_BYTES;

/// A segment is sealed and its successor opened once it reaches this size.
pub const SEGMENT_LIMIT_BYTES: u64 = 100 * 1024 * 1024;

/// Period of the background rotation check.
pub const ROTATE_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Tunables for one journal instance. `Default` matches production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JournalConfig {
    pub segment_limit_bytes: u64,
    pub rotate_interval: Duration,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            segment_limit_bytes: SEGMENT_LIMIT_BYTES,
            rotate_interval: ROTATE_TICK_INTERVAL,
        }
    }
}

/// Replay resume point: the segment id and byte offset the consensus layer
/// persists alongside its state snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub file_id: u32,
    pub offset: u64,
}

impl Checkpoint {
    pub fn new(file_id: u32, offset: u64) -> Self {
        Self { file_id, offset }
    }
}

/// Errors surfaced by journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// Mutation attempted before open completed or after close.
    #[error("no active journal")]
    NoActiveJournal,
    #[error("failed to open journal directory {}", .dir.display())]
    OpenDirectory {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Could not open a segment at journal open or during replay.
    #[error("failed to open journal segment wal.{id}")]
    OpenSegment {
        id: u32,
        #[source]
        source: io::Error,
    },
    /// Could not open the successor segment during rotation. Fatal: the
    /// previous segment is already sealed.
    #[error("failed to rotate to journal segment wal.{id}")]
    RotateSegment {
        id: u32,
        #[source]
        source: io::Error,
    },
    #[error("failed to write journal record")]
    WriteSegment(#[source] io::Error),
    #[error("failed to flush journal")]
    FlushSegment(#[source] io::Error),
    #[error("failed to stat journal segment")]
    Stat(#[source] io::Error),
    #[error("failed to encode journal message")]
    Encode(#[source] CodecError),
    #[error("failed to frame journal record")]
    Record(#[source] RecordError),
    #[error("no journal segments in {}", .dir.display())]
    NoSegments { dir: PathBuf },
    #[error("failed to load journal segment wal.{segment}")]
    Load {
        segment: u32,
        #[source]
        fault: SegmentFault,
    },
}

impl JournalError {
    /// True for failures after which the split between buffered and on-disk
    /// bytes is ambiguous. Continued appends could silently drop messages the
    /// consensus state depends on, so the supervising layer is expected to
    /// abort; restart plus replay repairs the tail.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::RotateSegment { .. } | Self::WriteSegment(_) | Self::FlushSegment(_)
        )
    }
}

#[derive(Debug)]
struct JournalState {
    file_id: u32,
    writer: Option<SegmentWriter>,
}

struct JournalInner<C> {
    dir: PathBuf,
    codec: C,
    config: JournalConfig,
    state: Mutex<JournalState>,
}

/// Append-only journal of consensus messages.
///
/// All mutating operations serialize through one mutex, filesystem syscalls
/// included; the journal is not latency-critical relative to consensus round
/// duration and insertion order must be preserved.
pub struct Journal<C: MessageCodec> {
    inner: Arc<JournalInner<C>>,
    exit: Option<Sender<()>>,
    ticker: Option<thread::JoinHandle<()>>,
}

impl<C: MessageCodec> Journal<C> {
    /// Opens the journal in `dir` with production tunables.
    pub fn open(dir: impl Into<PathBuf>, codec: C) -> Result<Self, JournalError> {
        Self::open_with_config(dir, codec, JournalConfig::default())
    }

    /// Opens the journal in `dir`, creating the directory if missing. The
    /// segment with the highest discovered id becomes active, or `wal.1` on a
    /// fresh directory.
    pub fn open_with_config(
        dir: impl Into<PathBuf>,
        codec: C,
        config: JournalConfig,
    ) -> Result<Self, JournalError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| JournalError::OpenDirectory {
            dir: dir.clone(),
            source,
        })?;
        let file_id = list_segments(&dir)
            .last()
            .map(|segment| segment.id)
            .unwrap_or(1);
        let writer = SegmentWriter::open(segment_path(&dir, file_id))
            .map_err(|source| JournalError::OpenSegment { id: file_id, source })?;
        debug!(
            "opened journal segment {} in {}",
            segment_file_name(file_id),
            dir.display()
        );

        let inner = Arc::new(JournalInner {
            dir,
            codec,
            config,
            state: Mutex::new(JournalState {
                file_id,
                writer: Some(writer),
            }),
        });
        let (exit, ticks) = mpsc::channel();
        let ticker = spawn_rotation_ticker(Arc::clone(&inner), ticks);
        Ok(Self {
            inner,
            exit: Some(exit),
            ticker: Some(ticker),
        })
    }

    /// Appends one message. With `sync` the record is pushed through the
    /// user-space buffer before returning.
    ///
    /// Rotation is evaluated before the write, so a record whose addition
    /// would cross the segment limit lands in the new segment. Errors for
    /// which [`JournalError::is_fatal`] holds must be treated as a signal to
    /// stop the node.
    pub fn insert(&self, message: &C::Message, sync: bool) -> Result<(), JournalError> {
        let mut state = self.inner.state.lock();
        if state.writer.is_none() {
            return Err(JournalError::NoActiveJournal);
        }
        let tagged = self.inner.codec.encode(message).map_err(JournalError::Encode)?;
        let pack = encode_record(tagged.kind, &tagged.payload).map_err(JournalError::Record)?;

        self.inner
            .rotate_locked(&mut state, self.inner.config.segment_limit_bytes)?;

        let writer = state.writer.as_mut().ok_or(JournalError::NoActiveJournal)?;
        match writer.write(&pack) {
            Ok(n) => trace!("inserted {n}-byte journal record"),
            Err(source) => {
                error!("journal write failed: {source}");
                return Err(JournalError::WriteSegment(source));
            }
        }
        if sync {
            if let Err(source) = writer.flush() {
                error!("journal flush failed: {source}");
                return Err(JournalError::FlushSegment(source));
            }
        }
        Ok(())
    }

    /// Flushes and reports the position new records will land at. The pair is
    /// the canonical replay checkpoint; the caller persists it elsewhere.
    pub fn current_journal(&self) -> Result<Checkpoint, JournalError> {
        let mut state = self.inner.state.lock();
        let writer = state.writer.as_mut().ok_or(JournalError::NoActiveJournal)?;
        writer.flush().map_err(JournalError::FlushSegment)?;
        let offset = writer.on_disk_len().map_err(JournalError::Stat)?;
        let checkpoint = Checkpoint::new(state.file_id, offset);
        trace!(
            "journal checkpoint at wal.{} offset {}",
            checkpoint.file_id,
            checkpoint.offset
        );
        Ok(checkpoint)
    }

    /// Replays every record at or after `from`, delivering decoded messages
    /// to `sink` in insertion order.
    ///
    /// Damage confined to the tail of the most recent segment, with less than
    /// one write buffer of unrecovered bytes, is logged and sealed away by a
    /// forced rotation; the load still succeeds. Damage anywhere else fails
    /// the load.
    pub fn load_journal(
        &self,
        from: Checkpoint,
        mut sink: impl FnMut(C::Message),
    ) -> Result<(), JournalError> {
        let mut state = self.inner.state.lock();
        let segments = list_segments(&self.inner.dir);
        if segments.is_empty() {
            return Err(JournalError::NoSegments {
                dir: self.inner.dir.clone(),
            });
        }
        debug!(
            "loading journal from wal.{} offset {}",
            from.file_id, from.offset
        );
        for (index, segment) in segments.iter().enumerate() {
            let start_offset = if segment.id == from.file_id {
                from.offset
            } else if segment.id > from.file_id {
                0
            } else {
                continue;
            };
            let scan = scan_segment(&segment.path, start_offset, &self.inner.codec, &mut sink)
                .map_err(|source| JournalError::OpenSegment {
                    id: segment.id,
                    source,
                })?;
            let Some(fault) = scan.fault else { continue };
            let last = index == segments.len() - 1;
            if last && scan.recovered_bytes + WRITE_BUFFER_BYTES as u64 > scan.segment_bytes {
                warn!(
                    "discarding damaged tail of {} ({} of {} bytes recovered): {fault}",
                    segment_file_name(segment.id),
                    scan.recovered_bytes,
                    scan.segment_bytes
                );
                self.inner.rotate_locked(&mut state, 0)?;
                break;
            }
            return Err(JournalError::Load {
                segment: segment.id,
                fault,
            });
        }
        Ok(())
    }

    /// Removes every segment whose id is strictly below `high_water_id`. The
    /// active segment is kept regardless; unlink failures are logged and
    /// swallowed.
    pub fn expire_segments(&self, high_water_id: u32) {
        let state = self.inner.state.lock();
        for segment in list_segments(&self.inner.dir) {
            if segment.id == state.file_id || segment.id >= high_water_id {
                continue;
            }
            match fs::remove_file(&segment.path) {
                Ok(()) => debug!("expired journal segment {}", segment_file_name(segment.id)),
                Err(err) => warn!(
                    "failed to expire journal segment {}: {err}",
                    segment_file_name(segment.id)
                ),
            }
        }
    }

    /// Flushes and closes the active segment and stops the rotation ticker.
    /// Later mutations fail with [`JournalError::NoActiveJournal`]. Idempotent.
    pub fn close(&mut self) {
        {
            let mut state = self.inner.state.lock();
            if let Some(writer) = state.writer.take() {
                debug!("closing journal, flushing {}", segment_file_name(state.file_id));
                if let Err(err) = writer.flush_and_close() {
                    error!("failed to flush journal on close: {err}");
                }
            }
        }
        drop(self.exit.take());
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }
    }

    /// Identifier of the segment currently open for writing.
    pub fn active_segment(&self) -> u32 {
        self.inner.state.lock().file_id
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }
}

impl<C: MessageCodec> Drop for Journal<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C> JournalInner<C> {
    /// Seals the active segment and opens its successor once the active file
    /// reaches `limit` bytes on disk. Assumes the journal mutex is held; it
    /// is never re-acquired here.
    fn rotate_locked(&self, state: &mut JournalState, limit: u64) -> Result<(), JournalError> {
        let size = match state.writer.as_ref() {
            None => return Err(JournalError::NoActiveJournal),
            Some(writer) => match writer.on_disk_len() {
                Ok(size) => size,
                Err(err) => {
                    // Unknown size: skip this check rather than rotate blind.
                    error!(
                        "failed to stat journal segment {}: {err}",
                        segment_file_name(state.file_id)
                    );
                    return Ok(());
                }
            },
        };
        if size < limit {
            return Ok(());
        }
        if let Some(writer) = state.writer.take() {
            writer.flush_and_close().map_err(JournalError::FlushSegment)?;
        }
        let next_id = state.file_id + 1;
        let writer = SegmentWriter::open(segment_path(&self.dir, next_id)).map_err(|source| {
            error!(
                "failed to open journal segment {}: {source}",
                segment_file_name(next_id)
            );
            JournalError::RotateSegment {
                id: next_id,
                source,
            }
        })?;
        state.writer = Some(writer);
        state.file_id = next_id;
        debug!("rotated journal to {}", segment_file_name(next_id));
        Ok(())
    }
}

fn spawn_rotation_ticker<C: MessageCodec>(
    inner: Arc<JournalInner<C>>,
    exit: Receiver<()>,
) -> thread::JoinHandle<()> {
    let interval = inner.config.rotate_interval;
    thread::spawn(move || {
        // Discard the initial tick.
        if !matches!(exit.recv_timeout(interval), Err(RecvTimeoutError::Timeout)) {
            return;
        }
        loop {
            match exit.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let mut state = inner.state.lock();
                    if state.writer.is_none() {
                        continue;
                    }
                    trace!("rotation tick");
                    let limit = inner.config.segment_limit_bytes;
                    if let Err(err) = inner.rotate_locked(&mut state, limit) {
                        error!("periodic journal rotation failed: {err}");
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    })
}
