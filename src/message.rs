//! Serialization seam between the consensus layer and the journal.

use std::collections::HashMap;

use thiserror::Error;

/// An already-serialized consensus message plus the 16-bit tag that selects
/// its decoder during replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedPayload {
    pub kind: u16,
    pub payload: Vec<u8>,
}

impl TaggedPayload {
    pub fn new(kind: u16, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }
}

/// Turns consensus messages into opaque tagged payloads and back.
///
/// The journal never interprets message bytes: the engine hands in a
/// serialized payload for appends and receives the decoded message through
/// [`MessageCodec::decode`] during replay.
pub trait MessageCodec: Send + Sync + 'static {
    type Message;

    fn encode(&self, message: &Self::Message) -> Result<TaggedPayload, CodecError>;

    fn decode(&self, kind: u16, payload: &[u8]) -> Result<Self::Message, CodecError>;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(String),
    #[error("no decoder registered for message kind {kind}")]
    UnknownKind { kind: u16 },
    #[error("failed to decode message kind {kind}: {reason}")]
    Decode { kind: u16, reason: String },
}

type EncodeFn<M> = Box<dyn Fn(&M) -> Result<TaggedPayload, CodecError> + Send + Sync>;
type DecodeFn<M> = Box<dyn Fn(&[u8]) -> Result<M, CodecError> + Send + Sync>;

/// [`MessageCodec`] backed by a static dispatch table.
///
/// Each kind tag maps to its own typed decode closure; lookup is a plain map
/// access with no runtime type introspection.
pub struct DispatchCodec<M> {
    encode: EncodeFn<M>,
    decoders: HashMap<u16, DecodeFn<M>>,
}

impl<M> DispatchCodec<M> {
    pub fn new(
        encode: impl Fn(&M) -> Result<TaggedPayload, CodecError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            encode: Box::new(encode),
            decoders: HashMap::new(),
        }
    }

    /// Registers the decoder for one kind tag, replacing any previous entry.
    pub fn with_decoder(
        mut self,
        kind: u16,
        decode: impl Fn(&[u8]) -> Result<M, CodecError> + Send + Sync + 'static,
    ) -> Self {
        self.decoders.insert(kind, Box::new(decode));
        self
    }
}

impl<M: 'static> MessageCodec for DispatchCodec<M> {
    type Message = M;

    fn encode(&self, message: &M) -> Result<TaggedPayload, CodecError> {
        (self.encode)(message)
    }

    fn decode(&self, kind: u16, payload: &[u8]) -> Result<M, CodecError> {
        let decode = self
            .decoders
            .get(&kind)
            .ok_or(CodecError::UnknownKind { kind })?;
        decode(payload)
    }
}
