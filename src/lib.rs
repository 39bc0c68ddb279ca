//! Write-ahead journal for a BFT consensus engine.
//!
//! Consensus protocol messages are framed with a CRC-32C header and appended
//! to size-rotated `wal.<N>` segments on local disk. After a crash or a
//! graceful shutdown the node replays messages from a `(segment, offset)`
//! checkpoint forward to rebuild its in-memory consensus state, tolerating a
//! damaged tail on the most recent segment.
#![deny(unreachable_pub)]
#![deny(unused_must_use)]

pub mod journal;
pub mod message;

pub use journal::layout::{list_segments, segment_file_name, segment_path, SegmentRef};
pub use journal::record::{encode_record, RecordError, RecordHeader, RECORD_HEADER_BYTES};
pub use journal::writer::SegmentWriter;
pub use journal::{
    Checkpoint, Journal, JournalConfig, JournalError, SegmentFault, READ_BUFFER_BYTES,
    ROTATE_TICK_INTERVAL, SEGMENT_LIMIT_BYTES, WRITE_BUFFER_BYTES,
};
pub use message::{CodecError, DispatchCodec, MessageCodec, TaggedPayload};
