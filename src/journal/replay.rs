use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::trace;
use thiserror::Error;

use crate::journal::record::{RecordError, RecordHeader, RECORD_HEADER_BYTES};
use crate::message::{CodecError, MessageCodec};

/// Capacity of the replay read buffer; also the tail-tolerance window.
pub const READ_BUFFER_BYTES: usize = 16 * 1024;

/// Outcome of scanning one segment: bytes recovered into the sink, total
/// on-disk bytes, and the fault that ended the scan early, if any.
#[derive(Debug)]
pub(crate) struct SegmentScan {
    pub(crate) recovered_bytes: u64,
    pub(crate) segment_bytes: u64,
    pub(crate) fault: Option<SegmentFault>,
}

impl SegmentScan {
    fn fault(self, fault: SegmentFault) -> Self {
        Self {
            fault: Some(fault),
            ..self
        }
    }
}

/// Damage encountered inside a segment's record stream during replay.
#[derive(Debug, Error)]
pub enum SegmentFault {
    #[error("record truncated mid-frame")]
    Truncated,
    #[error(transparent)]
    Crc(RecordError),
    #[error(transparent)]
    Decode(CodecError),
    #[error("read failed: {0}")]
    Io(io::Error),
}

/// Scans the segment at `path` from `start_offset`, delivering each decoded
/// message to `sink` in on-disk order.
///
/// Open and stat failures are hard errors. Anything that goes wrong inside the
/// record stream is reported as a fault together with the progress made, so
/// the caller can weigh it against the tail-tolerance window. The cursor
/// advances by exactly `header + payload` bytes per record.
pub(crate) fn scan_segment<C: MessageCodec>(
    path: &Path,
    start_offset: u64,
    codec: &C,
    sink: &mut dyn FnMut(C::Message),
) -> io::Result<SegmentScan> {
    let file = File::open(path)?;
    let segment_bytes = file.metadata()?.len();
    let mut reader = BufReader::with_capacity(READ_BUFFER_BYTES, file);
    let mut recovered_bytes = 0u64;
    if start_offset > 0 {
        reader.seek(SeekFrom::Start(start_offset))?;
        recovered_bytes = start_offset;
    }

    loop {
        let scan = SegmentScan {
            recovered_bytes,
            segment_bytes,
            fault: None,
        };
        let mut header_bytes = [0u8; RECORD_HEADER_BYTES];
        match read_fully(&mut reader, &mut header_bytes) {
            // A zero-byte read at a record boundary is clean exhaustion.
            Ok(0) => break,
            Ok(n) if n < RECORD_HEADER_BYTES => return Ok(scan.fault(SegmentFault::Truncated)),
            Ok(_) => {}
            Err(err) => return Ok(scan.fault(SegmentFault::Io(err))),
        }
        let header = RecordHeader::decode(&header_bytes);
        let mut payload = vec![0u8; header.payload_len as usize];
        match read_fully(&mut reader, &mut payload) {
            Ok(n) if n < payload.len() => return Ok(scan.fault(SegmentFault::Truncated)),
            Ok(_) => {}
            Err(err) => return Ok(scan.fault(SegmentFault::Io(err))),
        }
        if let Err(err) = header.verify(&payload) {
            return Ok(scan.fault(SegmentFault::Crc(err)));
        }
        match codec.decode(header.kind, &payload) {
            Ok(message) => {
                sink(message);
                recovered_bytes += header.record_len();
            }
            Err(err) => return Ok(scan.fault(SegmentFault::Decode(err))),
        }
    }
    trace!(
        "segment {} exhausted after {recovered_bytes} of {segment_bytes} bytes",
        path.display()
    );
    Ok(SegmentScan {
        recovered_bytes,
        segment_bytes,
        fault: None,
    })
}

/// Reads until `buf` is full or the stream ends; returns the bytes read.
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
