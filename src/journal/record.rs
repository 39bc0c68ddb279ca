use crc32c::crc32c;
use thiserror::Error;

/// Bytes of CRC, length and kind tag in front of every payload.
pub const RECORD_HEADER_BYTES: usize = 10;

/// Framing header of one journal record: Castagnoli CRC of the payload,
/// payload length and the decoder kind tag, all big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub crc: u32,
    pub payload_len: u32,
    pub kind: u16,
}

impl RecordHeader {
    pub fn decode(bytes: &[u8; RECORD_HEADER_BYTES]) -> Self {
        let crc = u32::from_be_bytes(bytes[0..4].try_into().expect("slice length"));
        let payload_len = u32::from_be_bytes(bytes[4..8].try_into().expect("slice length"));
        let kind = u16::from_be_bytes(bytes[8..10].try_into().expect("slice length"));
        Self {
            crc,
            payload_len,
            kind,
        }
    }

    /// Total on-disk size of the record this header describes.
    pub fn record_len(&self) -> u64 {
        RECORD_HEADER_BYTES as u64 + u64::from(self.payload_len)
    }

    /// Recomputes the payload checksum and compares it to the stored one.
    pub fn verify(&self, payload: &[u8]) -> Result<(), RecordError> {
        let computed = crc32c(payload);
        if computed != self.crc {
            return Err(RecordError::CrcMismatch {
                stored: self.crc,
                computed,
            });
        }
        Ok(())
    }
}

/// Frames one payload into its on-disk form. The payload is already
/// serialized by the caller; this only prepends the integrity header.
pub fn encode_record(kind: u16, payload: &[u8]) -> Result<Vec<u8>, RecordError> {
    if payload.len() > u32::MAX as usize {
        return Err(RecordError::PayloadTooLarge { len: payload.len() });
    }
    let mut pack = vec![0u8; RECORD_HEADER_BYTES + payload.len()];
    pack[0..4].copy_from_slice(&crc32c(payload).to_be_bytes());
    pack[4..8].copy_from_slice(&(payload.len() as u32).to_be_bytes());
    pack[8..10].copy_from_slice(&kind.to_be_bytes());
    pack[RECORD_HEADER_BYTES..].copy_from_slice(payload);
    Ok(pack)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record payload of {len} bytes exceeds the 4-byte length field")]
    PayloadTooLarge { len: usize },
    #[error("record CRC mismatch (stored {stored:#010x}, computed {computed:#010x})")]
    CrcMismatch { stored: u32, computed: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_payload_behind_big_endian_header() {
        let pack = encode_record(7, b"prepare").unwrap();
        assert_eq!(pack.len(), RECORD_HEADER_BYTES + 7);
        assert_eq!(&pack[0..4], &crc32c(b"prepare").to_be_bytes());
        assert_eq!(&pack[4..8], &7u32.to_be_bytes());
        assert_eq!(&pack[8..10], &7u16.to_be_bytes());
        assert_eq!(&pack[10..], b"prepare");
    }

    #[test]
    fn header_round_trip() {
        let pack = encode_record(0x0102, b"vote").unwrap();
        let header = RecordHeader::decode(pack[..RECORD_HEADER_BYTES].try_into().unwrap());
        assert_eq!(header.payload_len, 4);
        assert_eq!(header.kind, 0x0102);
        assert_eq!(header.record_len(), 14);
        header.verify(b"vote").unwrap();
    }

    #[test]
    fn verify_rejects_flipped_bit() {
        let pack = encode_record(1, b"viewchange").unwrap();
        let header = RecordHeader::decode(pack[..RECORD_HEADER_BYTES].try_into().unwrap());
        let mut payload = pack[RECORD_HEADER_BYTES..].to_vec();
        payload[3] ^= 0x01;
        let err = header.verify(&payload).unwrap_err();
        assert!(matches!(err, RecordError::CrcMismatch { .. }));
    }

    #[test]
    fn empty_payload_is_legal() {
        let pack = encode_record(2, b"").unwrap();
        assert_eq!(pack.len(), RECORD_HEADER_BYTES);
        let header = RecordHeader::decode(pack[..RECORD_HEADER_BYTES].try_into().unwrap());
        assert_eq!(header.payload_len, 0);
        header.verify(b"").unwrap();
    }
}
