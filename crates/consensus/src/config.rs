//! Engine configuration: timing, identity resolution and the collaborator
//! seams.

use crate::block::{Block, Ledger, MemoryPool, Transaction};
use crate::error::{ConsensusError, ConsensusResult};
use crate::message::ConsensusPayload;
use crate::timer::ConsensusTimer;
use dbft_primitives::{KeyPair, PublicKey};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Duration;

/// Resolves this node's slot and signing key against a validator set.
/// Returning `None` makes the node a watch-only observer.
pub type KeyPairResolver = Box<dyn Fn(&[PublicKey]) -> Option<(u16, KeyPair)> + Send>;

/// Everything the engine needs from the outside world.
///
/// The broadcast channel is best-effort: the engine never blocks on it and
/// drops payloads the transport cannot take.
pub struct Config<T: Transaction, B: Block<T>> {
    pub timer: Box<dyn ConsensusTimer>,
    /// Target block interval.
    pub seconds_per_block: Duration,
    /// Version stamped into outgoing payloads.
    pub version: u32,
    pub key_pair: KeyPairResolver,
    pub ledger: Arc<dyn Ledger<T, B>>,
    pub mempool: Arc<dyn MemoryPool<T>>,
    pub broadcast: SyncSender<ConsensusPayload>,
}

impl<T: Transaction, B: Block<T>> Config<T, B> {
    /// Checked once at engine construction; the engine never starts with a
    /// bad configuration.
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.seconds_per_block.is_zero() {
            return Err(ConsensusError::InvalidConfiguration(
                "seconds_per_block must be positive",
            ));
        }
        Ok(())
    }
}
