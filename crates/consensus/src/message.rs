// Copyright (c) 2026, the dbft-rs authors
// Licensed under the MIT License

//! Consensus payload envelope and the six message kinds.
//!
//! Wire layout of the unsigned envelope (little-endian):
//! `u32 version`, 32-byte `prev_hash`, `u32 height`, `u16 validator_index`,
//! then the length-prefixed inner message `{u8 kind, u8 view_number, body}`.
//! The payload identity is the double SHA-256 of that encoding.

use crate::recovery::RecoveryMessage;
use dbft_primitives::io::MAX_ARRAY_SIZE;
use dbft_primitives::{hash256, BinaryReader, BinaryWriter, IoError, Signature, UInt160, UInt256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Upper bound on transaction hashes accepted in one proposal.
pub const MAX_TRANSACTIONS_PER_BLOCK: u64 = 0xFFFF;

/// Wire tags of the message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConsensusMessageType {
    ChangeView = 0x00,
    PrepareRequest = 0x20,
    PrepareResponse = 0x21,
    Commit = 0x30,
    RecoveryRequest = 0x40,
    RecoveryMessage = 0x41,
}

impl ConsensusMessageType {
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::ChangeView),
            0x20 => Some(Self::PrepareRequest),
            0x21 => Some(Self::PrepareResponse),
            0x30 => Some(Self::Commit),
            0x40 => Some(Self::RecoveryRequest),
            0x41 => Some(Self::RecoveryMessage),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChangeView => "ChangeView",
            Self::PrepareRequest => "PrepareRequest",
            Self::PrepareResponse => "PrepareResponse",
            Self::Commit => "Commit",
            Self::RecoveryRequest => "RecoveryRequest",
            Self::RecoveryMessage => "RecoveryMessage",
        }
    }
}

impl fmt::Display for ConsensusMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The primary's proposal for a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareRequest {
    pub timestamp: u64,
    pub nonce: u64,
    pub next_consensus: UInt160,
    pub transaction_hashes: Vec<UInt256>,
}

impl PrepareRequest {
    pub(crate) fn encode(&self, w: &mut BinaryWriter) {
        w.write_u64(self.timestamp);
        w.write_u64(self.nonce);
        w.write_uint160(&self.next_consensus);
        w.write_var_int(self.transaction_hashes.len() as u64);
        for hash in &self.transaction_hashes {
            w.write_uint256(hash);
        }
    }

    pub(crate) fn decode(r: &mut BinaryReader<'_>) -> Result<Self, IoError> {
        let timestamp = r.read_u64()?;
        let nonce = r.read_u64()?;
        let next_consensus = r.read_uint160()?;
        let count = r.read_var_int(MAX_TRANSACTIONS_PER_BLOCK)?;
        let mut transaction_hashes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            transaction_hashes.push(r.read_uint256()?);
        }
        Ok(Self {
            timestamp,
            nonce,
            next_consensus,
            transaction_hashes,
        })
    }
}

/// A backup's acknowledgement, carrying the hash of the primary's
/// PrepareRequest payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareResponse {
    pub preparation_hash: UInt256,
}

/// Vote to abandon the current view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeView {
    pub new_view_number: u8,
    pub timestamp: u64,
}

/// A validator's signature over the tentative header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Commit {
    pub signature: Signature,
}

/// Plea for peers to rebroadcast their consensus state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryRequest {
    pub timestamp: u64,
}

/// The six message kinds as a tagged sum.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    ChangeView(ChangeView),
    PrepareRequest(PrepareRequest),
    PrepareResponse(PrepareResponse),
    Commit(Commit),
    RecoveryRequest(RecoveryRequest),
    RecoveryMessage(RecoveryMessage),
}

impl MessageBody {
    #[must_use]
    pub const fn kind(&self) -> ConsensusMessageType {
        match self {
            Self::ChangeView(_) => ConsensusMessageType::ChangeView,
            Self::PrepareRequest(_) => ConsensusMessageType::PrepareRequest,
            Self::PrepareResponse(_) => ConsensusMessageType::PrepareResponse,
            Self::Commit(_) => ConsensusMessageType::Commit,
            Self::RecoveryRequest(_) => ConsensusMessageType::RecoveryRequest,
            Self::RecoveryMessage(_) => ConsensusMessageType::RecoveryMessage,
        }
    }
}

/// Inner message: a view number and one of the six bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusMessage {
    pub view_number: u8,
    pub body: MessageBody,
}

impl ConsensusMessage {
    #[must_use]
    pub const fn new(view_number: u8, body: MessageBody) -> Self {
        Self { view_number, body }
    }

    #[must_use]
    pub const fn change_view(view_number: u8, body: ChangeView) -> Self {
        Self::new(view_number, MessageBody::ChangeView(body))
    }

    #[must_use]
    pub fn prepare_request(view_number: u8, body: PrepareRequest) -> Self {
        Self::new(view_number, MessageBody::PrepareRequest(body))
    }

    #[must_use]
    pub const fn prepare_response(view_number: u8, body: PrepareResponse) -> Self {
        Self::new(view_number, MessageBody::PrepareResponse(body))
    }

    #[must_use]
    pub const fn commit(view_number: u8, body: Commit) -> Self {
        Self::new(view_number, MessageBody::Commit(body))
    }

    #[must_use]
    pub const fn recovery_request(view_number: u8, body: RecoveryRequest) -> Self {
        Self::new(view_number, MessageBody::RecoveryRequest(body))
    }

    #[must_use]
    pub fn recovery_message(view_number: u8, body: RecoveryMessage) -> Self {
        Self::new(view_number, MessageBody::RecoveryMessage(body))
    }

    fn encode(&self, w: &mut BinaryWriter) {
        w.write_u8(self.body.kind().as_byte());
        w.write_u8(self.view_number);
        match &self.body {
            MessageBody::ChangeView(m) => {
                w.write_u8(m.new_view_number);
                w.write_u64(m.timestamp);
            }
            MessageBody::PrepareRequest(m) => m.encode(w),
            MessageBody::PrepareResponse(m) => w.write_uint256(&m.preparation_hash),
            MessageBody::Commit(m) => w.write_bytes(m.signature.as_bytes()),
            MessageBody::RecoveryRequest(m) => w.write_u64(m.timestamp),
            MessageBody::RecoveryMessage(m) => m.encode(w),
        }
    }

    fn decode(r: &mut BinaryReader<'_>) -> Result<Self, IoError> {
        let tag_offset = r.offset();
        let tag = r.read_u8()?;
        let kind = ConsensusMessageType::from_byte(tag)
            .ok_or(IoError::InvalidValue("message kind", tag_offset))?;
        let view_number = r.read_u8()?;
        let body = match kind {
            ConsensusMessageType::ChangeView => MessageBody::ChangeView(ChangeView {
                new_view_number: r.read_u8()?,
                timestamp: r.read_u64()?,
            }),
            ConsensusMessageType::PrepareRequest => {
                MessageBody::PrepareRequest(PrepareRequest::decode(r)?)
            }
            ConsensusMessageType::PrepareResponse => {
                MessageBody::PrepareResponse(PrepareResponse {
                    preparation_hash: r.read_uint256()?,
                })
            }
            ConsensusMessageType::Commit => MessageBody::Commit(Commit {
                signature: read_signature(r)?,
            }),
            ConsensusMessageType::RecoveryRequest => {
                MessageBody::RecoveryRequest(RecoveryRequest {
                    timestamp: r.read_u64()?,
                })
            }
            ConsensusMessageType::RecoveryMessage => {
                MessageBody::RecoveryMessage(RecoveryMessage::decode(r)?)
            }
        };
        Ok(Self { view_number, body })
    }
}

pub(crate) fn read_signature(r: &mut BinaryReader<'_>) -> Result<Signature, IoError> {
    let offset = r.offset();
    let bytes = r.read_bytes(dbft_primitives::crypto::SIGNATURE_SIZE)?;
    Signature::from_bytes(bytes).map_err(|_| IoError::InvalidValue("signature", offset))
}

/// The envelope exchanged between validators.
///
/// The identity hash is computed lazily over the unsigned encoding and
/// memoized; the only mutation that invalidates it is the recovery-path
/// validator re-stamp.
#[derive(Debug, Clone)]
pub struct ConsensusPayload {
    version: u32,
    prev_hash: UInt256,
    height: u32,
    validator_index: u16,
    message: ConsensusMessage,
    hash: OnceLock<UInt256>,
}

impl PartialEq for ConsensusPayload {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.prev_hash == other.prev_hash
            && self.height == other.height
            && self.validator_index == other.validator_index
            && self.message == other.message
    }
}

impl ConsensusPayload {
    #[must_use]
    pub fn new(
        version: u32,
        prev_hash: UInt256,
        height: u32,
        validator_index: u16,
        message: ConsensusMessage,
    ) -> Self {
        Self {
            version,
            prev_hash,
            height,
            validator_index,
            message,
            hash: OnceLock::new(),
        }
    }

    #[must_use]
    pub const fn version(&self) -> u32 {
        self.version
    }

    #[must_use]
    pub const fn prev_hash(&self) -> UInt256 {
        self.prev_hash
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn validator_index(&self) -> u16 {
        self.validator_index
    }

    #[must_use]
    pub const fn view_number(&self) -> u8 {
        self.message.view_number
    }

    #[must_use]
    pub const fn kind(&self) -> ConsensusMessageType {
        self.message.body.kind()
    }

    #[must_use]
    pub const fn message(&self) -> &ConsensusMessage {
        &self.message
    }

    #[must_use]
    pub fn change_view(&self) -> Option<&ChangeView> {
        match &self.message.body {
            MessageBody::ChangeView(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn prepare_request(&self) -> Option<&PrepareRequest> {
        match &self.message.body {
            MessageBody::PrepareRequest(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn prepare_response(&self) -> Option<&PrepareResponse> {
        match &self.message.body {
            MessageBody::PrepareResponse(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn commit(&self) -> Option<&Commit> {
        match &self.message.body {
            MessageBody::Commit(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn recovery_message(&self) -> Option<&RecoveryMessage> {
        match &self.message.body {
            MessageBody::RecoveryMessage(m) => Some(m),
            _ => None,
        }
    }

    /// Re-addresses the payload to another validator.
    ///
    /// Only the recovery path uses this, to attribute an embedded
    /// PrepareRequest to the primary of the recovered view. The memoized
    /// hash is discarded because the encoding changes.
    pub fn restamp_validator_index(&mut self, validator_index: u16) {
        self.validator_index = validator_index;
        self.hash = OnceLock::new();
    }

    /// Stable identity: double SHA-256 of the unsigned encoding.
    #[must_use]
    pub fn hash(&self) -> UInt256 {
        *self.hash.get_or_init(|| hash256(&self.encode()))
    }

    /// Marshals the unsigned envelope.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut inner = BinaryWriter::new();
        self.message.encode(&mut inner);
        let inner = inner.into_bytes();

        let mut w = BinaryWriter::with_capacity(42 + inner.len() + 3);
        w.write_u32(self.version);
        w.write_uint256(&self.prev_hash);
        w.write_u32(self.height);
        w.write_u16(self.validator_index);
        w.write_var_bytes(&inner);
        w.into_bytes()
    }

    /// Unmarshals an unsigned envelope.
    ///
    /// # Errors
    ///
    /// Returns an [`IoError`] on truncation, unknown message tags, or
    /// trailing bytes inside the inner message.
    pub fn decode(data: &[u8]) -> Result<Self, IoError> {
        let mut r = BinaryReader::new(data);
        let version = r.read_u32()?;
        let prev_hash = r.read_uint256()?;
        let height = r.read_u32()?;
        let validator_index = r.read_u16()?;
        let inner = r.read_var_bytes(MAX_ARRAY_SIZE)?;

        let mut ir = BinaryReader::new(inner);
        let message = ConsensusMessage::decode(&mut ir)?;
        if ir.remaining() != 0 {
            return Err(IoError::InvalidValue("consensus message", ir.offset()));
        }

        Ok(Self {
            version,
            prev_hash,
            height,
            validator_index,
            message,
            hash: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{ChangeViewCompact, CommitCompact, PreparationCompact};
    use dbft_primitives::KeyPair;
    use hex_literal::hex;

    fn roundtrip(payload: &ConsensusPayload) {
        let bytes = payload.encode();
        let decoded = ConsensusPayload::decode(&bytes).unwrap();
        assert_eq!(&decoded, payload);
        assert_eq!(decoded.hash(), payload.hash());
    }

    fn envelope(message: ConsensusMessage) -> ConsensusPayload {
        ConsensusPayload::new(0, UInt256::from([9u8; 32]), 42, 3, message)
    }

    #[test]
    fn prepare_request_roundtrip() {
        let body = PrepareRequest {
            timestamp: 1_700_000_000_123,
            nonce: 0xDEAD_BEEF_CAFE_F00D,
            next_consensus: UInt160::from([7u8; 20]),
            transaction_hashes: vec![UInt256::from([1u8; 32]), UInt256::from([2u8; 32])],
        };
        roundtrip(&envelope(ConsensusMessage::prepare_request(0, body)));
    }

    #[test]
    fn prepare_response_roundtrip() {
        let body = PrepareResponse {
            preparation_hash: UInt256::from(hex!(
                "b74f66f80de93df5b8f2671db9add7907f3229e6a49a5bb5bbd93a91d832d49a"
            )),
        };
        roundtrip(&envelope(ConsensusMessage::prepare_response(1, body)));
    }

    #[test]
    fn change_view_roundtrip() {
        let body = ChangeView {
            new_view_number: 2,
            timestamp: 55,
        };
        roundtrip(&envelope(ConsensusMessage::change_view(1, body)));
    }

    #[test]
    fn commit_roundtrip() {
        let keys = KeyPair::generate();
        let body = Commit {
            signature: keys.sign(b"header"),
        };
        roundtrip(&envelope(ConsensusMessage::commit(0, body)));
    }

    #[test]
    fn recovery_roundtrip() {
        let keys = KeyPair::generate();
        let body = RecoveryMessage {
            change_views: vec![ChangeViewCompact {
                validator_index: 1,
                original_view_number: 0,
                timestamp: 10,
            }],
            prepare_request: Some(PrepareRequest {
                timestamp: 20,
                nonce: 30,
                next_consensus: UInt160::zero(),
                transaction_hashes: vec![UInt256::from([5u8; 32])],
            }),
            preparation_hash: Some(UInt256::from([6u8; 32])),
            prepare_responses: vec![
                PreparationCompact { validator_index: 0 },
                PreparationCompact { validator_index: 2 },
            ],
            commits: vec![CommitCompact {
                view_number: 0,
                validator_index: 2,
                signature: keys.sign(b"header"),
            }],
        };
        roundtrip(&envelope(ConsensusMessage::recovery_message(0, body)));

        roundtrip(&envelope(ConsensusMessage::recovery_request(
            3,
            RecoveryRequest { timestamp: 77 },
        )));
    }

    #[test]
    fn unknown_kind_rejected() {
        let payload = envelope(ConsensusMessage::recovery_request(
            0,
            RecoveryRequest { timestamp: 1 },
        ));
        let mut bytes = payload.encode();
        // The kind tag sits right after the var-int length of the inner
        // message, 43 bytes into the envelope.
        bytes[43] = 0x7F;
        assert!(matches!(
            ConsensusPayload::decode(&bytes),
            Err(IoError::InvalidValue("message kind", _))
        ));
    }

    #[test]
    fn restamp_changes_hash() {
        let mut payload = envelope(ConsensusMessage::recovery_request(
            0,
            RecoveryRequest { timestamp: 1 },
        ));
        let before = payload.hash();
        payload.restamp_validator_index(5);
        assert_eq!(payload.validator_index(), 5);
        assert_ne!(payload.hash(), before);
    }

    #[test]
    fn truncated_envelope_rejected() {
        let payload = envelope(ConsensusMessage::recovery_request(
            0,
            RecoveryRequest { timestamp: 1 },
        ));
        let bytes = payload.encode();
        assert!(ConsensusPayload::decode(&bytes[..bytes.len() - 1]).is_err());
    }
}
