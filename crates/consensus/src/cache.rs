//! Cache for messages that arrived ahead of the engine: future heights,
//! or the next view at the current height.

use crate::message::{ConsensusMessageType, ConsensusPayload};
use std::collections::BTreeMap;

/// One height's worth of early messages, bucketed by kind. Replay order on
/// drain is prepares (arrival order), then change-views, then commits.
#[derive(Debug, Default)]
pub struct MessageBucket {
    pub prepares: Vec<ConsensusPayload>,
    pub change_views: Vec<ConsensusPayload>,
    pub commits: Vec<ConsensusPayload>,
}

impl MessageBucket {
    #[must_use]
    pub fn len(&self) -> usize {
        self.prepares.len() + self.change_views.len() + self.commits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Early messages keyed by height. Recovery traffic is never cached; a
/// node that is behind asks again once it catches up.
#[derive(Debug, Default)]
pub struct MessageCache {
    mail: BTreeMap<u32, MessageBucket>,
}

impl MessageCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, payload: ConsensusPayload) {
        let bucket = self.mail.entry(payload.height()).or_default();
        match payload.kind() {
            ConsensusMessageType::PrepareRequest | ConsensusMessageType::PrepareResponse => {
                bucket.prepares.push(payload);
            }
            ConsensusMessageType::ChangeView => bucket.change_views.push(payload),
            ConsensusMessageType::Commit => bucket.commits.push(payload),
            ConsensusMessageType::RecoveryRequest | ConsensusMessageType::RecoveryMessage => {}
        }
    }

    /// Removes and returns the bucket for `height`, if any.
    pub fn drain(&mut self, height: u32) -> Option<MessageBucket> {
        self.mail.remove(&height)
    }

    /// Drops buckets for heights the chain has moved past.
    pub fn prune_below(&mut self, height: u32) {
        self.mail = self.mail.split_off(&height);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mail.values().map(MessageBucket::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChangeView, Commit, ConsensusMessage, PrepareResponse, RecoveryRequest};
    use dbft_primitives::{KeyPair, UInt256};

    fn payload(height: u32, index: u16, message: ConsensusMessage) -> ConsensusPayload {
        ConsensusPayload::new(0, UInt256::zero(), height, index, message)
    }

    #[test]
    fn buckets_by_height_and_kind() {
        let keys = KeyPair::generate();
        let mut cache = MessageCache::new();

        cache.add(payload(
            10,
            0,
            ConsensusMessage::commit(
                0,
                Commit {
                    signature: keys.sign(b"h"),
                },
            ),
        ));
        cache.add(payload(
            10,
            1,
            ConsensusMessage::prepare_response(
                0,
                PrepareResponse {
                    preparation_hash: UInt256::zero(),
                },
            ),
        ));
        cache.add(payload(
            10,
            2,
            ConsensusMessage::change_view(
                0,
                ChangeView {
                    new_view_number: 1,
                    timestamp: 0,
                },
            ),
        ));
        cache.add(payload(
            11,
            3,
            ConsensusMessage::prepare_response(
                0,
                PrepareResponse {
                    preparation_hash: UInt256::zero(),
                },
            ),
        ));

        let bucket = cache.drain(10).unwrap();
        assert_eq!(bucket.prepares.len(), 1);
        assert_eq!(bucket.change_views.len(), 1);
        assert_eq!(bucket.commits.len(), 1);

        assert!(cache.drain(10).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn recovery_traffic_is_not_cached() {
        let mut cache = MessageCache::new();
        cache.add(payload(
            10,
            0,
            ConsensusMessage::recovery_request(0, RecoveryRequest { timestamp: 0 }),
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn prune_drops_stale_heights() {
        let mut cache = MessageCache::new();
        for height in [8u32, 9, 10] {
            cache.add(payload(
                height,
                0,
                ConsensusMessage::prepare_response(
                    0,
                    PrepareResponse {
                        preparation_hash: UInt256::zero(),
                    },
                ),
            ));
        }
        cache.prune_below(10);
        assert!(cache.drain(9).is_none());
        assert!(cache.drain(10).is_some());
    }
}
