// Copyright (c) 2026, the dbft-rs authors
// Licensed under the MIT License

//! Compact state carried by a RecoveryMessage and its expansion back into
//! full payloads.
//!
//! A recovery answer condenses everything its sender knows about the
//! current height: change-view votes, the primary's proposal (or at least
//! its payload hash), who acknowledged it, and every commit signature. The
//! receiver expands each compact entry into an ordinary payload and runs it
//! through the normal handlers.

use crate::block::{Block, Transaction};
use crate::context::Context;
use crate::message::{
    read_signature, ChangeView, Commit, ConsensusMessage, ConsensusPayload, PrepareRequest,
    PrepareResponse,
};
use dbft_primitives::{BinaryReader, BinaryWriter, IoError, Signature, UInt256};

/// Per-section bound on embedded entries; a compact section can never hold
/// more entries than there are validator indices.
const MAX_COMPACT_ENTRIES: u64 = u16::MAX as u64;

/// A validator's change-view vote, stripped to what recovery needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeViewCompact {
    pub validator_index: u16,
    pub original_view_number: u8,
    pub timestamp: u64,
}

/// Records that a validator acknowledged the proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreparationCompact {
    pub validator_index: u16,
}

/// A commit signature together with the view it was produced in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitCompact {
    pub view_number: u8,
    pub validator_index: u16,
    pub signature: Signature,
}

/// Body of a RecoveryMessage.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryMessage {
    pub change_views: Vec<ChangeViewCompact>,
    pub prepare_request: Option<PrepareRequest>,
    pub preparation_hash: Option<UInt256>,
    pub prepare_responses: Vec<PreparationCompact>,
    pub commits: Vec<CommitCompact>,
}

impl RecoveryMessage {
    /// Condenses the sender's view of the current height from its context.
    pub fn from_context<T: Transaction, B: Block<T>>(context: &Context<T, B>) -> Self {
        let change_views = context
            .change_view_payloads
            .iter()
            .flatten()
            .filter_map(|payload| {
                let body = payload.change_view()?;
                Some(ChangeViewCompact {
                    validator_index: payload.validator_index(),
                    original_view_number: payload.view_number(),
                    timestamp: body.timestamp,
                })
            })
            .collect();

        let primary_slot = context
            .preparation_payloads
            .get(context.primary_index(context.view_number) as usize)
            .and_then(Option::as_ref);
        let prepare_request = primary_slot
            .and_then(|p| p.prepare_request())
            .cloned();
        let preparation_hash = primary_slot.map(ConsensusPayload::hash).or_else(|| {
            context
                .preparation_payloads
                .iter()
                .flatten()
                .find_map(|p| p.prepare_response())
                .map(|resp| resp.preparation_hash)
        });

        let prepare_responses = context
            .preparation_payloads
            .iter()
            .flatten()
            .filter(|p| p.prepare_response().is_some())
            .map(|p| PreparationCompact {
                validator_index: p.validator_index(),
            })
            .collect();

        let commits = context
            .commit_payloads
            .iter()
            .flatten()
            .filter_map(|payload| {
                let body = payload.commit()?;
                Some(CommitCompact {
                    view_number: payload.view_number(),
                    validator_index: payload.validator_index(),
                    signature: body.signature,
                })
            })
            .collect();

        Self {
            change_views,
            prepare_request,
            preparation_hash,
            prepare_responses,
            commits,
        }
    }

    /// Expands the embedded change-view votes into full payloads.
    pub fn change_view_payloads(&self, outer: &ConsensusPayload) -> Vec<ConsensusPayload> {
        self.change_views
            .iter()
            .map(|cv| {
                ConsensusPayload::new(
                    outer.version(),
                    outer.prev_hash(),
                    outer.height(),
                    cv.validator_index,
                    ConsensusMessage::change_view(
                        cv.original_view_number,
                        ChangeView {
                            new_view_number: cv.original_view_number.saturating_add(1),
                            timestamp: cv.timestamp,
                        },
                    ),
                )
            })
            .collect()
    }

    /// Expands the embedded proposal, if any. The caller re-stamps the
    /// validator index to the primary of the recovered view.
    pub fn prepare_request_payload(&self, outer: &ConsensusPayload) -> Option<ConsensusPayload> {
        let request = self.prepare_request.clone()?;
        Some(ConsensusPayload::new(
            outer.version(),
            outer.prev_hash(),
            outer.height(),
            outer.validator_index(),
            ConsensusMessage::prepare_request(outer.view_number(), request),
        ))
    }

    /// Expands the embedded acknowledgements. Empty when the sender did not
    /// know the proposal's payload hash.
    pub fn prepare_response_payloads(&self, outer: &ConsensusPayload) -> Vec<ConsensusPayload> {
        let Some(preparation_hash) = self.preparation_hash else {
            return Vec::new();
        };
        self.prepare_responses
            .iter()
            .map(|p| {
                ConsensusPayload::new(
                    outer.version(),
                    outer.prev_hash(),
                    outer.height(),
                    p.validator_index,
                    ConsensusMessage::prepare_response(
                        outer.view_number(),
                        PrepareResponse { preparation_hash },
                    ),
                )
            })
            .collect()
    }

    /// Expands the embedded commit signatures, each under its original view.
    pub fn commit_payloads(&self, outer: &ConsensusPayload) -> Vec<ConsensusPayload> {
        self.commits
            .iter()
            .map(|c| {
                ConsensusPayload::new(
                    outer.version(),
                    outer.prev_hash(),
                    outer.height(),
                    c.validator_index,
                    ConsensusMessage::commit(
                        c.view_number,
                        Commit {
                            signature: c.signature,
                        },
                    ),
                )
            })
            .collect()
    }

    pub(crate) fn encode(&self, w: &mut BinaryWriter) {
        w.write_var_int(self.change_views.len() as u64);
        for cv in &self.change_views {
            w.write_u16(cv.validator_index);
            w.write_u8(cv.original_view_number);
            w.write_u64(cv.timestamp);
        }

        match &self.prepare_request {
            Some(request) => {
                w.write_u8(1);
                request.encode(w);
            }
            None => w.write_u8(0),
        }

        match &self.preparation_hash {
            Some(hash) => w.write_var_bytes(hash.as_bytes()),
            None => w.write_var_int(0),
        }

        w.write_var_int(self.prepare_responses.len() as u64);
        for p in &self.prepare_responses {
            w.write_u16(p.validator_index);
        }

        w.write_var_int(self.commits.len() as u64);
        for c in &self.commits {
            w.write_u8(c.view_number);
            w.write_u16(c.validator_index);
            w.write_bytes(c.signature.as_bytes());
        }
    }

    pub(crate) fn decode(r: &mut BinaryReader<'_>) -> Result<Self, IoError> {
        let count = r.read_var_int(MAX_COMPACT_ENTRIES)?;
        let mut change_views = Vec::with_capacity(count as usize);
        for _ in 0..count {
            change_views.push(ChangeViewCompact {
                validator_index: r.read_u16()?,
                original_view_number: r.read_u8()?,
                timestamp: r.read_u64()?,
            });
        }

        let flag_offset = r.offset();
        let prepare_request = match r.read_u8()? {
            0 => None,
            1 => Some(PrepareRequest::decode(r)?),
            _ => return Err(IoError::InvalidValue("prepare request flag", flag_offset)),
        };

        let hash_offset = r.offset();
        let hash_bytes = r.read_var_bytes(32)?;
        let preparation_hash = match hash_bytes.len() {
            0 => None,
            _ => Some(
                UInt256::from_bytes(hash_bytes)
                    .map_err(|_| IoError::InvalidValue("preparation hash", hash_offset))?,
            ),
        };

        let count = r.read_var_int(MAX_COMPACT_ENTRIES)?;
        let mut prepare_responses = Vec::with_capacity(count as usize);
        for _ in 0..count {
            prepare_responses.push(PreparationCompact {
                validator_index: r.read_u16()?,
            });
        }

        let count = r.read_var_int(MAX_COMPACT_ENTRIES)?;
        let mut commits = Vec::with_capacity(count as usize);
        for _ in 0..count {
            commits.push(CommitCompact {
                view_number: r.read_u8()?,
                validator_index: r.read_u16()?,
                signature: read_signature(r)?,
            });
        }

        Ok(Self {
            change_views,
            prepare_request,
            preparation_hash,
            prepare_responses,
            commits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> RecoveryMessage {
        RecoveryMessage {
            change_views: Vec::new(),
            prepare_request: None,
            preparation_hash: None,
            prepare_responses: Vec::new(),
            commits: Vec::new(),
        }
    }

    fn outer(view: u8) -> ConsensusPayload {
        ConsensusPayload::new(
            0,
            UInt256::from([3u8; 32]),
            7,
            2,
            ConsensusMessage::recovery_message(view, empty()),
        )
    }

    #[test]
    fn change_view_expansion_targets_next_view() {
        let recovery = RecoveryMessage {
            change_views: vec![ChangeViewCompact {
                validator_index: 1,
                original_view_number: 0,
                timestamp: 99,
            }],
            ..empty()
        };

        let payloads = recovery.change_view_payloads(&outer(1));
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].validator_index(), 1);
        assert_eq!(payloads[0].view_number(), 0);
        assert_eq!(payloads[0].change_view().unwrap().new_view_number, 1);
    }

    #[test]
    fn responses_without_preparation_hash_expand_to_nothing() {
        let recovery = RecoveryMessage {
            prepare_responses: vec![PreparationCompact { validator_index: 0 }],
            ..empty()
        };
        assert!(recovery.prepare_response_payloads(&outer(0)).is_empty());
    }

    #[test]
    fn commit_expansion_keeps_original_view() {
        let keys = dbft_primitives::KeyPair::generate();
        let recovery = RecoveryMessage {
            commits: vec![CommitCompact {
                view_number: 3,
                validator_index: 0,
                signature: keys.sign(b"h"),
            }],
            ..empty()
        };
        let payloads = recovery.commit_payloads(&outer(5));
        assert_eq!(payloads[0].view_number(), 3);
        assert_eq!(payloads[0].validator_index(), 0);
    }
}
