//! Seams for the external collaborators: transactions, blocks, the chain
//! view and the memory pool.
//!
//! The engine never hashes, signs, assembles or persists anything itself;
//! everything of that kind crosses one of these traits. All methods take
//! `&self` — implementations are expected to be internally synchronized.

use crate::context::Context;
use dbft_primitives::{KeyPair, PublicKey, Signature, UInt160, UInt256};

/// A transaction as the engine sees it: an identity and nothing more.
pub trait Transaction: Clone + Send + 'static {
    fn hash(&self) -> UInt256;
}

/// A block (or tentative header) produced from consensus state.
///
/// `sign`/`verify` cover whatever byte representation the implementation
/// considers signable; the engine only requires that a signature produced
/// by `sign` under a validator's keypair verifies under that validator's
/// public key.
pub trait Block<T: Transaction>: Clone + Send + 'static {
    fn hash(&self) -> UInt256;

    /// Signs the header for a commit.
    fn sign(&self, keys: &KeyPair) -> Signature;

    /// Verifies a commit signature against this header.
    fn verify(&self, key: &PublicKey, signature: &Signature) -> bool;

    /// Attaches the full transaction list during finalization.
    fn set_transactions(&mut self, transactions: Vec<T>);

    /// Attaches the quorum of commit signatures during finalization.
    fn set_signatures(&mut self, signatures: Vec<(u16, Signature)>);
}

/// Chain view, block assembly and persistence.
pub trait Ledger<T: Transaction, B: Block<T>>: Send + Sync {
    /// Height of the current chain tip.
    fn height(&self) -> u32;

    /// Hash of the current chain tip.
    fn block_hash(&self) -> UInt256;

    /// Validator set for the height currently under consensus.
    fn validators(&self) -> Vec<PublicKey>;

    /// Validator set that would follow from applying `transactions`.
    fn next_validators(&self, transactions: &[T]) -> Vec<PublicKey>;

    /// Digest of the multi-signature address for a validator subset.
    fn consensus_address(&self, validators: &[PublicKey]) -> UInt160;

    /// Builds the tentative header from the proposal recorded in `context`.
    fn new_block_from_context(&self, context: &Context<T, B>) -> B;

    /// Full verification of a tentative block before acknowledging it.
    fn verify_block(&self, block: &B) -> bool;

    /// Delivers a finalized block for persistence.
    fn process_block(&self, block: B);
}

/// The transaction pool the proposer draws from and backups resolve
/// proposal hashes against.
pub trait MemoryPool<T: Transaction>: Send + Sync {
    /// Looks a transaction up by hash.
    fn get_transaction(&self, hash: &UInt256) -> Option<T>;

    /// Best-effort request to fetch missing transactions from peers.
    fn request_transactions(&self, hashes: &[UInt256]);

    /// The verified candidate set for a new proposal.
    fn get_verified(&self) -> Vec<T>;
}
