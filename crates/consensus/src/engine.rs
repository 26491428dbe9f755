// Copyright (c) 2026, the dbft-rs authors
// Licensed under the MIT License

//! The per-height consensus state machine.
//!
//! A single-threaded driver: every entry point (`start`, `on_receive`,
//! `on_transaction`, `on_timeout`, `on_block_persisted`) runs to completion
//! before the next one is admitted. Handlers update the [`Context`], quorum
//! checks decide transitions, and outbound payloads go to the best-effort
//! broadcast channel.

use crate::block::{Block, Transaction};
use crate::cache::MessageCache;
use crate::config::Config;
use crate::context::Context;
use crate::error::ConsensusResult;
use crate::message::{
    ChangeView, Commit, ConsensusMessage, ConsensusMessageType, ConsensusPayload, PrepareRequest,
    PrepareResponse, RecoveryRequest,
};
use crate::recovery::RecoveryMessage;
use crate::timer::HeightView;
use dbft_primitives::UInt256;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// The dBFT engine for one node.
///
/// Composition over the two halves of its world: the engine has a
/// [`Context`] (per-height state) and a [`Config`] (collaborators).
pub struct Dbft<T: Transaction, B: Block<T>> {
    context: Context<T, B>,
    config: Config<T, B>,
    cache: MessageCache,
    /// Unix millis of the last locally persisted block.
    block_persist_time: Option<u64>,
    /// True only while a RecoveryMessage is being processed.
    recovering: bool,
    started: bool,
}

impl<T: Transaction, B: Block<T>> Dbft<T, B> {
    /// Validates the configuration and builds an idle engine.
    ///
    /// # Errors
    ///
    /// Returns [`ConsensusError::InvalidConfiguration`] for a bad
    /// configuration; nothing else fails after this point.
    ///
    /// [`ConsensusError::InvalidConfiguration`]: crate::ConsensusError::InvalidConfiguration
    pub fn new(config: Config<T, B>) -> ConsensusResult<Self> {
        config.validate()?;
        Ok(Self {
            context: Context::new(),
            config,
            cache: MessageCache::new(),
            block_persist_time: None,
            recovering: false,
            started: false,
        })
    }

    #[must_use]
    pub fn context(&self) -> &Context<T, B> {
        &self.context
    }

    #[must_use]
    pub const fn started(&self) -> bool {
        self.started
    }

    /// Begins consensus at the chain's next height.
    pub fn start(&mut self) {
        if self.started {
            warn!("start called twice, ignoring");
            return;
        }
        self.started = true;
        self.cache = MessageCache::new();
        self.initialize_consensus(0);
    }

    /// Notifies the engine that a block was accepted outside of consensus
    /// (e.g. synced from the network); moves on to the next height.
    pub fn on_block_persisted(&mut self) {
        if !self.started {
            return;
        }
        self.block_persist_time = Some(self.config.timer.now());
        self.initialize_consensus(0);
    }

    /// Entry point for payloads delivered by the transport.
    pub fn on_receive(&mut self, payload: ConsensusPayload) {
        if !self.started {
            return;
        }

        if usize::from(payload.validator_index()) >= self.context.n() {
            error!(
                from = payload.validator_index(),
                "validator index out of range"
            );
            return;
        }

        debug!(
            kind = %payload.kind(),
            from = payload.validator_index(),
            height = payload.height(),
            view = payload.view_number(),
            my_height = self.context.height,
            my_view = self.context.view_number,
            "received message"
        );

        if payload.height() < self.context.height {
            debug!(height = payload.height(), "ignoring stale message");
            return;
        }
        let next_view = self
            .context
            .view_number
            .checked_add(1)
            .is_some_and(|next| payload.view_number() == next);
        if payload.height() > self.context.height
            || (payload.height() == self.context.height && next_view)
        {
            debug!(
                height = payload.height(),
                view = payload.view_number(),
                "caching early message"
            );
            self.cache.add(payload);
            return;
        }

        self.context
            .update_last_seen(payload.validator_index(), payload.height());

        match payload.kind() {
            ConsensusMessageType::ChangeView => self.on_change_view(payload),
            ConsensusMessageType::PrepareRequest => self.on_prepare_request(payload),
            ConsensusMessageType::PrepareResponse => self.on_prepare_response(payload),
            ConsensusMessageType::Commit => self.on_commit(payload),
            ConsensusMessageType::RecoveryRequest => self.on_recovery_request(payload),
            ConsensusMessageType::RecoveryMessage => self.on_recovery_message(payload),
        }
    }

    /// Entry point for timer firings.
    pub fn on_timeout(&mut self, hv: HeightView) {
        if !self.started || self.context.watch_only() {
            return;
        }
        if hv.height != self.context.height || hv.view != self.context.view_number {
            debug!(%hv, "ignoring stale timer");
            return;
        }

        debug!(height = hv.height, view = hv.view, "timeout");

        if self.context.is_primary() && !self.context.request_sent_or_received() {
            self.send_prepare_request();
        } else if (self.context.is_primary() && self.context.request_sent_or_received())
            || self.context.is_backup()
        {
            if self.context.commit_sent() {
                info!("commit already sent, asking peers for recovery");
                self.send_recovery_request();
                self.change_timer(self.config.seconds_per_block * 2);
            } else {
                self.send_change_view();
            }
        }
    }

    /// Entry point for transactions observed by the node.
    pub fn on_transaction(&mut self, transaction: T) {
        if !self.started {
            return;
        }
        if !self.context.is_backup()
            || (self.context.view_changing()
                && !self.context.more_than_f_nodes_committed_or_lost())
            || !self.context.request_sent_or_received()
            || self.context.response_sent()
            || self.context.commit_sent()
        {
            return;
        }

        let hash = transaction.hash();
        if self.context.transactions.contains_key(&hash) {
            return;
        }
        let proposed = self
            .context
            .transaction_hashes
            .as_deref()
            .unwrap_or_default()
            .contains(&hash);
        if !proposed {
            return;
        }
        self.add_transaction(transaction);
    }

    fn add_transaction(&mut self, transaction: T) {
        self.context
            .transactions
            .insert(transaction.hash(), transaction);
        if !self.context.has_all_transactions() {
            return;
        }
        if self.context.is_primary() || self.context.watch_only() {
            return;
        }

        let verified = match self.context.make_header(&*self.config.ledger) {
            Some(header) => self.config.ledger.verify_block(header),
            None => return,
        };
        if !verified {
            warn!(
                height = self.context.height,
                "proposed block failed verification"
            );
            self.send_change_view();
            return;
        }

        self.extend_timer(2);
        self.send_prepare_response();
        self.check_prepare();
    }

    // ------------------------------------------------------------------
    // Reset and transitions
    // ------------------------------------------------------------------

    fn initialize_consensus(&mut self, view: u8) {
        self.reset(view);

        let role = if self.context.is_primary() {
            "Primary"
        } else if self.context.watch_only() {
            "WatchOnly"
        } else {
            "Backup"
        };
        debug!(
            height = self.context.height,
            view,
            index = ?self.context.my_index,
            role,
            "initialize"
        );

        if !self.context.watch_only() {
            if self.context.is_primary() && !self.recovering {
                // First view of a fresh height: propose as soon as the rest
                // of the block interval has elapsed.
                let elapsed = self
                    .block_persist_time
                    .map(|persisted| self.config.timer.now().saturating_sub(persisted))
                    .map_or(Duration::ZERO, Duration::from_millis);
                let delay = self.config.seconds_per_block.saturating_sub(elapsed);
                self.change_timer(delay);
            } else {
                self.change_timer(self.backoff_timeout(self.context.view_number));
            }
        }

        if let Some(bucket) = self.cache.drain(self.context.height) {
            debug!(count = bucket.len(), "replaying cached messages");
            for payload in bucket.prepares {
                if payload.kind() == ConsensusMessageType::PrepareRequest {
                    self.on_prepare_request(payload);
                } else {
                    self.on_prepare_response(payload);
                }
            }
            for payload in bucket.change_views {
                self.on_change_view(payload);
            }
            for payload in bucket.commits {
                self.on_commit(payload);
            }
        }
        self.cache.prune_below(self.context.height);
    }

    fn reset(&mut self, view: u8) {
        if view == 0 {
            let height = self.config.ledger.height() + 1;
            let prev_hash = self.config.ledger.block_hash();
            let validators = self.config.ledger.validators();
            let key = (self.config.key_pair)(&validators);
            self.context
                .reset_for_height(height, prev_hash, validators, key);
        } else {
            self.context.reset_for_view(view);
        }
    }

    // ------------------------------------------------------------------
    // Phase handlers
    // ------------------------------------------------------------------

    fn on_prepare_request(&mut self, payload: ConsensusPayload) {
        if self.context.request_sent_or_received() {
            debug!(
                from = payload.validator_index(),
                "ignoring PrepareRequest: proposal already known"
            );
            return;
        }
        if payload.view_number() != self.context.view_number {
            debug!(view = payload.view_number(), "ignoring wrong view number");
            return;
        }
        if payload.validator_index() != self.context.primary_index(self.context.view_number) {
            debug!(
                from = payload.validator_index(),
                "ignoring PrepareRequest from non-primary"
            );
            return;
        }
        let Some(request) = payload.prepare_request().cloned() else {
            error!("PrepareRequest payload without a request body");
            return;
        };

        self.extend_timer(2);
        if request.transaction_hashes.is_empty() {
            debug!("received empty PrepareRequest");
        }

        self.context.timestamp = request.timestamp;
        self.context.nonce = request.nonce;
        self.context.next_consensus = request.next_consensus;
        self.context.transaction_hashes = Some(request.transaction_hashes);
        self.context.transactions = HashMap::new();
        self.context.header = None;

        let request_hash = payload.hash();
        let index = payload.validator_index() as usize;
        self.context.preparation_payloads[index] = Some(payload);

        if !self.process_missing_transactions() {
            // NextConsensus mismatch; a ChangeView is already out.
            return;
        }
        self.update_existing_payloads(request_hash);

        if !self.context.has_all_transactions() {
            return;
        }
        self.send_prepare_response();
        self.check_prepare();
    }

    /// Resolves the proposal's hashes against the mempool. Returns false
    /// when the proposal's NextConsensus does not match the validator set
    /// the transactions produce.
    fn process_missing_transactions(&mut self) -> bool {
        let hashes = self.context.transaction_hashes.clone().unwrap_or_default();
        let mut missing = Vec::new();
        let mut fetched = Vec::new();
        for hash in &hashes {
            match self.config.mempool.get_transaction(hash) {
                Some(tx) => {
                    self.context.transactions.insert(*hash, tx.clone());
                    fetched.push(tx);
                }
                None => missing.push(*hash),
            }
        }

        if missing.is_empty() {
            let expected = self
                .config
                .ledger
                .consensus_address(&self.config.ledger.next_validators(&fetched));
            if self.context.next_consensus != expected {
                error!(
                    %expected,
                    actual = %self.context.next_consensus,
                    "invalid NextConsensus in proposal"
                );
                self.send_change_view();
                return false;
            }
        } else {
            warn!(count = missing.len(), "missing transactions, requesting");
            self.config.mempool.request_transactions(&missing);
        }
        true
    }

    /// A new proposal invalidates earlier per-validator state: responses
    /// that reference another proposal and commits whose signatures do not
    /// match the new tentative header.
    fn update_existing_payloads(&mut self, request_hash: UInt256) {
        for slot in &mut self.context.preparation_payloads {
            let stale = slot
                .as_ref()
                .and_then(|p| p.prepare_response())
                .is_some_and(|resp| resp.preparation_hash != request_hash);
            if stale {
                *slot = None;
            }
        }

        let Some(header) = self.context.make_header(&*self.config.ledger).cloned() else {
            return;
        };
        let view = self.context.view_number;
        let validators = self.context.validators.clone();
        for slot in &mut self.context.commit_payloads {
            let Some(p) = slot else { continue };
            if p.view_number() != view {
                continue;
            }
            let valid = p.commit().is_some_and(|commit| {
                validators
                    .get(p.validator_index() as usize)
                    .is_some_and(|key| header.verify(key, &commit.signature))
            });
            if !valid {
                warn!(
                    from = p.validator_index(),
                    "cannot validate commit signature"
                );
                *slot = None;
            }
        }
    }

    fn on_prepare_response(&mut self, payload: ConsensusPayload) {
        if payload.view_number() != self.context.view_number {
            debug!(view = payload.view_number(), "ignoring wrong view number");
            return;
        }
        let Some(index) = self.slot_index(&payload) else {
            return;
        };
        if self.context.preparation_payloads[index].is_some()
            || (self.context.view_changing()
                && !self.context.more_than_f_nodes_committed_or_lost())
        {
            debug!(
                from = payload.validator_index(),
                "ignoring PrepareResponse: duplicate or view changing"
            );
            return;
        }
        let Some(response) = payload.prepare_response().copied() else {
            error!("PrepareResponse payload without a response body");
            return;
        };

        debug!(from = payload.validator_index(), "prepare response");
        self.context.preparation_payloads[index] = Some(payload);

        let primary = self.context.primary_index(self.context.view_number) as usize;
        if let Some(request) = self.context.preparation_payloads[primary].clone() {
            if request.prepare_request().is_none() {
                error!("primary preparation slot holds no request");
                return;
            }
            let request_hash = request.hash();
            if response.preparation_hash != request_hash {
                self.context.preparation_payloads[index] = None;
                debug!(
                    expected = %request_hash,
                    received = %response.preparation_hash,
                    "preparation hash mismatch"
                );
                return;
            }
        }

        self.extend_timer(2);
        if self.context.request_sent_or_received() {
            self.check_prepare();
        }
    }

    fn on_change_view(&mut self, payload: ConsensusPayload) {
        let Some(change_view) = payload.change_view().copied() else {
            error!("ChangeView payload without a body");
            return;
        };
        let new_view = change_view.new_view_number;

        if new_view <= self.context.view_number {
            // The sender is behind; what it really needs is our state.
            debug!(
                from = payload.validator_index(),
                new_view, "old ChangeView, treating as recovery request"
            );
            self.on_recovery_request(payload);
            return;
        }
        if self.context.commit_sent() {
            debug!("ignoring ChangeView: commit sent");
            return;
        }
        let Some(index) = self.slot_index(&payload) else {
            return;
        };
        let superseded = self.context.change_view_payloads[index]
            .as_ref()
            .and_then(|p| p.change_view())
            .is_some_and(|existing| new_view < existing.new_view_number);
        if superseded {
            return;
        }

        self.context.change_view_payloads[index] = Some(payload);
        self.check_change_view(new_view);
    }

    fn on_commit(&mut self, payload: ConsensusPayload) {
        self.extend_timer(4);

        let Some(index) = self.slot_index(&payload) else {
            return;
        };
        let Some(commit) = payload.commit().copied() else {
            error!("Commit payload without a body");
            return;
        };

        if payload.view_number() == self.context.view_number {
            match self.context.make_header(&*self.config.ledger).cloned() {
                None => {
                    // Still collecting prepares; hold the commit unverified,
                    // it is revalidated once the proposal arrives.
                    self.context.commit_payloads[index] = Some(payload);
                }
                Some(header) => {
                    let key = self.context.validators[index];
                    if header.verify(&key, &commit.signature) {
                        self.context.commit_payloads[index] = Some(payload);
                        self.check_commit();
                    } else {
                        warn!(from = index, "cannot validate commit signature");
                    }
                }
            }
            return;
        }

        // Commits from other views are remembered: a block that finished
        // elsewhere can still be assembled once enough of them surface.
        self.context.commit_payloads[index] = Some(payload);
    }

    fn on_recovery_request(&mut self, payload: ConsensusPayload) {
        if self.context.watch_only() {
            return;
        }
        if !self.context.commit_sent() {
            // Only the f validators right after the requester answer, so a
            // single request does not trigger n recovery responses.
            let Some(my) = self.context.my_index else {
                return;
            };
            let n = self.context.n() as i64;
            let distance =
                (i64::from(my) - i64::from(payload.validator_index())).rem_euclid(n);
            if distance < 1 || distance > self.context.f() as i64 {
                return;
            }
        }
        self.send_recovery_message();
    }

    fn on_recovery_message(&mut self, payload: ConsensusPayload) {
        // `recovering` biases timer selection while prior decisions replay;
        // the wrapper guarantees it is cleared on every exit path.
        self.recovering = true;
        self.process_recovery_message(payload);
        self.recovering = false;
    }

    fn process_recovery_message(&mut self, payload: ConsensusPayload) {
        let Some(recovery) = payload.recovery_message().cloned() else {
            error!("RecoveryMessage payload without a body");
            return;
        };
        debug!(
            from = payload.validator_index(),
            view = payload.view_number(),
            "recovery message received"
        );

        if payload.view_number() > self.context.view_number {
            if self.context.commit_sent() {
                return;
            }
            for change_view in recovery.change_view_payloads(&payload) {
                self.on_change_view(change_view);
            }
        }

        // The change-view replay may just have moved us into the recovered
        // view, so the view comparison is repeated against live state.
        if payload.view_number() == self.context.view_number
            && !(self.context.view_changing()
                && !self.context.more_than_f_nodes_committed_or_lost())
            && !self.context.commit_sent()
        {
            if !self.context.request_sent_or_received() {
                if let Some(mut request) = recovery.prepare_request_payload(&payload) {
                    request.restamp_validator_index(
                        self.context.primary_index(payload.view_number()),
                    );
                    self.on_prepare_request(request);
                } else if self.context.is_primary() {
                    self.send_prepare_request();
                }
            }
            for response in recovery.prepare_response_payloads(&payload) {
                self.on_prepare_response(response);
            }
        }

        if payload.view_number() <= self.context.view_number {
            for commit in recovery.commit_payloads(&payload) {
                self.on_commit(commit);
            }
        }
    }

    /// Bounds check for per-validator slots; embedded recovery entries do
    /// not pass through the dispatcher's sender check.
    fn slot_index(&self, payload: &ConsensusPayload) -> Option<usize> {
        let index = usize::from(payload.validator_index());
        if index >= self.context.n() {
            debug!(from = payload.validator_index(), "validator index out of range");
            return None;
        }
        Some(index)
    }

    // ------------------------------------------------------------------
    // Quorum engine
    // ------------------------------------------------------------------

    fn check_prepare(&mut self) {
        if !self.context.request_sent_or_received() || self.context.commit_sent() {
            return;
        }
        let count = self.context.preparation_payloads.iter().flatten().count();
        if count >= self.context.m() && self.context.has_all_transactions() {
            self.send_commit();
            self.check_commit();
        }
    }

    fn check_commit(&mut self) {
        if !self.context.has_all_transactions() {
            return;
        }
        let view = self.context.view_number;
        let count = self
            .context
            .commit_payloads
            .iter()
            .flatten()
            .filter(|p| p.view_number() == view)
            .count();
        if count < self.context.m() {
            return;
        }

        let Some(header) = self.context.make_header(&*self.config.ledger).cloned() else {
            error!("commit quorum reached without a buildable header");
            return;
        };

        let signatures = self
            .context
            .commit_payloads
            .iter()
            .flatten()
            .filter(|p| p.view_number() == view)
            .filter_map(|p| p.commit().map(|c| (p.validator_index(), c.signature)))
            .collect();

        let mut block = header;
        block.set_signatures(signatures);
        block.set_transactions(self.context.ordered_transactions());

        info!(
            height = self.context.height,
            view,
            hash = %block.hash(),
            "block approved, handing over for persistence"
        );
        self.config.ledger.process_block(block);
        self.block_persist_time = Some(self.config.timer.now());
        self.initialize_consensus(0);
    }

    fn check_change_view(&mut self, new_view: u8) {
        if self.context.view_number >= new_view {
            return;
        }
        let count = self
            .context
            .change_view_payloads
            .iter()
            .flatten()
            .filter_map(|p| p.change_view())
            .filter(|cv| cv.new_view_number >= new_view)
            .count();
        if count < self.context.m() {
            return;
        }
        info!(
            height = self.context.height,
            new_view, "view change quorum reached"
        );
        self.initialize_consensus(new_view);
    }

    // ------------------------------------------------------------------
    // Outbound actions
    // ------------------------------------------------------------------

    fn make_payload(&self, message: ConsensusMessage) -> Option<ConsensusPayload> {
        let index = self.context.my_index?;
        Some(ConsensusPayload::new(
            self.config.version,
            self.context.prev_hash,
            self.context.height,
            index,
            message,
        ))
    }

    fn broadcast(&mut self, payload: ConsensusPayload) {
        if let Err(err) = self.config.broadcast.try_send(payload) {
            warn!(%err, "broadcast channel rejected payload");
        }
    }

    fn send_prepare_request(&mut self) {
        if !self.context.is_primary() || self.context.request_sent_or_received() {
            return;
        }

        let transactions = self.config.mempool.get_verified();
        let hashes: Vec<UInt256> = transactions.iter().map(Transaction::hash).collect();

        self.context.timestamp = self.config.timer.now();
        self.context.nonce = rand::random();
        self.context.next_consensus = self
            .config
            .ledger
            .consensus_address(&self.config.ledger.next_validators(&transactions));
        self.context.transaction_hashes = Some(hashes.clone());
        self.context.transactions = transactions
            .into_iter()
            .map(|tx| (tx.hash(), tx))
            .collect();
        self.context.header = None;

        let request = PrepareRequest {
            timestamp: self.context.timestamp,
            nonce: self.context.nonce,
            next_consensus: self.context.next_consensus,
            transaction_hashes: hashes,
        };
        let Some(payload) =
            self.make_payload(ConsensusMessage::prepare_request(
                self.context.view_number,
                request,
            ))
        else {
            return;
        };

        info!(
            height = self.context.height,
            view = self.context.view_number,
            txs = self.context.transactions.len(),
            "sending PrepareRequest"
        );
        let request_hash = payload.hash();
        let index = payload.validator_index() as usize;
        self.context.preparation_payloads[index] = Some(payload.clone());
        // Responses and commits that arrived ahead of our own proposal were
        // held unchecked; the header is buildable now, so vet them exactly
        // like a received proposal would.
        self.update_existing_payloads(request_hash);
        self.broadcast(payload);

        if self.context.n() == 1 {
            // Nobody to wait for.
            self.check_prepare();
        }
        self.change_timer(self.backoff_timeout(self.context.view_number));
    }

    fn send_prepare_response(&mut self) {
        if self.context.watch_only() || self.context.response_sent() {
            return;
        }
        let primary = self.context.primary_index(self.context.view_number) as usize;
        let Some(request) = self.context.preparation_payloads[primary].as_ref() else {
            error!("no proposal to acknowledge");
            return;
        };
        let preparation_hash = request.hash();

        let Some(payload) = self.make_payload(ConsensusMessage::prepare_response(
            self.context.view_number,
            PrepareResponse { preparation_hash },
        )) else {
            return;
        };

        debug!(
            height = self.context.height,
            view = self.context.view_number,
            "sending PrepareResponse"
        );
        let index = payload.validator_index() as usize;
        self.context.preparation_payloads[index] = Some(payload.clone());
        self.broadcast(payload);
    }

    fn send_change_view(&mut self) {
        if self.context.watch_only() {
            return;
        }
        let new_view = self.context.view_number.saturating_add(1);
        self.change_timer(self.backoff_timeout(new_view));

        let Some(payload) = self.make_payload(ConsensusMessage::change_view(
            self.context.view_number,
            ChangeView {
                new_view_number: new_view,
                timestamp: self.config.timer.now(),
            },
        )) else {
            return;
        };

        info!(
            height = self.context.height,
            view = self.context.view_number,
            new_view,
            "sending ChangeView"
        );
        let index = payload.validator_index() as usize;
        self.context.change_view_payloads[index] = Some(payload.clone());
        self.broadcast(payload);
        self.check_change_view(new_view);
    }

    fn send_commit(&mut self) {
        if self.context.watch_only() || self.context.commit_sent() {
            return;
        }
        let Some(keys) = self.context.key_pair.clone() else {
            return;
        };
        let Some(header) = self.context.make_header(&*self.config.ledger) else {
            error!("no header to commit to");
            return;
        };
        let signature = header.sign(&keys);

        let Some(payload) = self.make_payload(ConsensusMessage::commit(
            self.context.view_number,
            Commit { signature },
        )) else {
            return;
        };

        info!(
            height = self.context.height,
            view = self.context.view_number,
            "sending Commit"
        );
        let index = payload.validator_index() as usize;
        self.context.commit_payloads[index] = Some(payload.clone());
        self.broadcast(payload);
    }

    fn send_recovery_request(&mut self) {
        if self.context.watch_only() {
            return;
        }
        let Some(payload) = self.make_payload(ConsensusMessage::recovery_request(
            self.context.view_number,
            RecoveryRequest {
                timestamp: self.config.timer.now(),
            },
        )) else {
            return;
        };
        info!(
            height = self.context.height,
            view = self.context.view_number,
            "requesting recovery"
        );
        self.broadcast(payload);
    }

    fn send_recovery_message(&mut self) {
        if self.context.watch_only() {
            return;
        }
        let recovery = RecoveryMessage::from_context(&self.context);
        let Some(payload) = self.make_payload(ConsensusMessage::recovery_message(
            self.context.view_number,
            recovery,
        )) else {
            return;
        };
        debug!(
            height = self.context.height,
            view = self.context.view_number,
            "sending recovery state"
        );
        self.broadcast(payload);
    }

    // ------------------------------------------------------------------
    // Timer coordination
    // ------------------------------------------------------------------

    fn change_timer(&mut self, delay: Duration) {
        debug!(
            height = self.context.height,
            view = self.context.view_number,
            ?delay,
            "reset timer"
        );
        let hv = HeightView::new(self.context.height, self.context.view_number);
        self.config.timer.reset(hv, delay);
    }

    /// Grants `count` per-validator shares of a block interval, but never
    /// once the node has committed or is leaving the view.
    fn extend_timer(&mut self, count: u32) {
        if self.context.commit_sent() || self.context.view_changing() {
            return;
        }
        let active = (self.context.n() - self.context.f()).max(1) as u32;
        self.config
            .timer
            .extend(self.config.seconds_per_block * count / active);
    }

    /// Exponential per-view backoff: `seconds_per_block << (view + 1)`.
    fn backoff_timeout(&self, view: u8) -> Duration {
        let shift = (u32::from(view) + 1).min(20);
        self.config.seconds_per_block.saturating_mul(1u32 << shift)
    }
}
