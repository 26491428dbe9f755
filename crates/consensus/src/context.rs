//! Per-height consensus state: the proposal, the per-validator payload
//! slots, and the predicates the handlers gate on.

use crate::block::{Block, Ledger, Transaction};
use crate::message::ConsensusPayload;
use dbft_primitives::{KeyPair, PublicKey, UInt160, UInt256};
use std::collections::HashMap;

/// State container for exactly one (height, view) pair between resets.
///
/// The engine owns one of these; per-validator slots hold the latest
/// payload accepted from each validator. Clearing a slot is always
/// explicit.
pub struct Context<T: Transaction, B: Block<T>> {
    /// Height under consensus (chain tip + 1).
    pub height: u32,
    pub view_number: u8,
    pub validators: Vec<PublicKey>,
    /// Our slot in `validators`; `None` means watch-only.
    pub my_index: Option<u16>,
    /// Signing key when we are a validator.
    pub key_pair: Option<KeyPair>,
    /// Hash of the current chain tip.
    pub prev_hash: UInt256,

    // Proposal fields, populated by the primary's PrepareRequest (or by us
    // when proposing).
    pub timestamp: u64,
    pub nonce: u64,
    pub next_consensus: UInt160,
    /// `None` until a proposal is known; `Some` even when empty.
    pub transaction_hashes: Option<Vec<UInt256>>,
    pub transactions: HashMap<UInt256, T>,

    /// Latest Prepare* per validator for the current view.
    pub preparation_payloads: Vec<Option<ConsensusPayload>>,
    /// Latest Commit per validator; any view is remembered.
    pub commit_payloads: Vec<Option<ConsensusPayload>>,
    /// Highest-NewViewNumber ChangeView per validator.
    pub change_view_payloads: Vec<Option<ConsensusPayload>>,
    /// Highest height observed from each validator. Monotone.
    pub last_seen_message: Vec<u32>,

    /// Cached tentative header, built once the proposal is known.
    pub header: Option<B>,
}

impl<T: Transaction, B: Block<T>> Context<T, B> {
    pub(crate) fn new() -> Self {
        Self {
            height: 0,
            view_number: 0,
            validators: Vec::new(),
            my_index: None,
            key_pair: None,
            prev_hash: UInt256::zero(),
            timestamp: 0,
            nonce: 0,
            next_consensus: UInt160::zero(),
            transaction_hashes: None,
            transactions: HashMap::new(),
            preparation_payloads: Vec::new(),
            commit_payloads: Vec::new(),
            change_view_payloads: Vec::new(),
            last_seen_message: Vec::new(),
            header: None,
        }
    }

    /// Number of validators.
    #[must_use]
    pub fn n(&self) -> usize {
        self.validators.len()
    }

    /// Maximum tolerated Byzantine validators, `(n - 1) / 3`.
    #[must_use]
    pub fn f(&self) -> usize {
        (self.n().saturating_sub(1)) / 3
    }

    /// Quorum size, `n - f` (two thirds plus one).
    #[must_use]
    pub fn m(&self) -> usize {
        self.n() - self.f()
    }

    /// Primary slot for `view`: `(height - view) mod n`.
    #[must_use]
    pub fn primary_index(&self, view: u8) -> u16 {
        let n = self.n().max(1) as i64;
        (i64::from(self.height) - i64::from(view)).rem_euclid(n) as u16
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.my_index == Some(self.primary_index(self.view_number))
    }

    #[must_use]
    pub fn is_backup(&self) -> bool {
        self.my_index.is_some() && !self.is_primary()
    }

    #[must_use]
    pub fn watch_only(&self) -> bool {
        self.my_index.is_none()
    }

    fn my_slot<'a>(&self, slots: &'a [Option<ConsensusPayload>]) -> Option<&'a ConsensusPayload> {
        self.my_index
            .and_then(|index| slots.get(index as usize))
            .and_then(Option::as_ref)
    }

    /// True once the primary's proposal for the current view is known,
    /// whether it arrived from the network or we sent it ourselves.
    #[must_use]
    pub fn request_sent_or_received(&self) -> bool {
        self.preparation_payloads
            .get(self.primary_index(self.view_number) as usize)
            .is_some_and(Option::is_some)
    }

    /// True once our own Prepare* for the current view is recorded.
    #[must_use]
    pub fn response_sent(&self) -> bool {
        self.my_slot(&self.preparation_payloads).is_some()
    }

    /// True once our own Commit is recorded.
    #[must_use]
    pub fn commit_sent(&self) -> bool {
        self.my_slot(&self.commit_payloads).is_some()
    }

    /// True while our own ChangeView asks for a higher view than the
    /// current one.
    #[must_use]
    pub fn view_changing(&self) -> bool {
        self.my_slot(&self.change_view_payloads)
            .and_then(ConsensusPayload::change_view)
            .is_some_and(|cv| cv.new_view_number > self.view_number)
    }

    /// More than `f` validators have either committed or fallen silent, so
    /// waiting for a view change quorum cannot succeed and stalled phases
    /// may proceed.
    #[must_use]
    pub fn more_than_f_nodes_committed_or_lost(&self) -> bool {
        let committed = self.commit_payloads.iter().flatten().count();
        let lost = self
            .last_seen_message
            .iter()
            .filter(|&&seen| seen + 1 < self.height)
            .count();
        committed + lost > self.f()
    }

    /// True once every hash in the proposal resolves to a transaction.
    #[must_use]
    pub fn has_all_transactions(&self) -> bool {
        self.transaction_hashes
            .as_ref()
            .is_some_and(|hashes| hashes.iter().all(|h| self.transactions.contains_key(h)))
    }

    pub(crate) fn update_last_seen(&mut self, validator_index: u16, height: u32) {
        if let Some(seen) = self.last_seen_message.get_mut(validator_index as usize) {
            if *seen < height {
                *seen = height;
            }
        }
    }

    /// Builds (and caches) the tentative header once the proposal is known.
    pub(crate) fn make_header(&mut self, ledger: &dyn Ledger<T, B>) -> Option<&B> {
        if self.header.is_none() {
            if self.transaction_hashes.is_none() {
                return None;
            }
            self.header = Some(ledger.new_block_from_context(self));
        }
        self.header.as_ref()
    }

    /// Transactions in proposal order, for block finalization.
    pub(crate) fn ordered_transactions(&self) -> Vec<T> {
        self.transaction_hashes
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|h| self.transactions.get(h).cloned())
            .collect()
    }

    /// Height transition: new validator set, fresh commit and last-seen
    /// slots, view back to zero.
    pub(crate) fn reset_for_height(
        &mut self,
        height: u32,
        prev_hash: UInt256,
        validators: Vec<PublicKey>,
        key: Option<(u16, KeyPair)>,
    ) {
        self.height = height;
        self.prev_hash = prev_hash;
        self.validators = validators;
        let n = self.n();

        match key {
            Some((index, keys)) => {
                self.my_index = Some(index);
                self.key_pair = Some(keys);
            }
            None => {
                self.my_index = None;
                self.key_pair = None;
            }
        }

        self.commit_payloads = vec![None; n];
        // Seed every peer as alive at the previous height; an all-lost
        // start would make the committed-or-lost escape trivially true.
        self.last_seen_message = vec![height.saturating_sub(1); n];
        if let Some(index) = self.my_index {
            self.last_seen_message[index as usize] = height;
        }

        self.reset_view_state(0);
    }

    /// View transition within the same height: commits and last-seen
    /// survive, everything per-view is dropped.
    pub(crate) fn reset_for_view(&mut self, view: u8) {
        self.reset_view_state(view);
    }

    fn reset_view_state(&mut self, view: u8) {
        let n = self.n();
        self.view_number = view;
        self.timestamp = 0;
        self.nonce = 0;
        self.next_consensus = UInt160::zero();
        self.transaction_hashes = None;
        self.transactions = HashMap::new();
        self.preparation_payloads = vec![None; n];
        self.change_view_payloads = vec![None; n];
        self.header = None;
    }
}
