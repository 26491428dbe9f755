//! Message-passing front-end for the engine.
//!
//! The engine is single-threaded by design; this wrapper gives it one
//! input queue. A spawned task owns the engine and consumes commands in
//! order, so every entry point runs to completion before the next one is
//! admitted, and callers never share the engine directly.

use crate::block::{Block, Transaction};
use crate::engine::Dbft;
use crate::message::ConsensusPayload;
use crate::timer::HeightView;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Inputs accepted by a running [`ConsensusService`].
#[derive(Debug)]
pub enum ConsensusCommand<T> {
    /// A payload arrived from the transport.
    Receive(ConsensusPayload),
    /// A transaction was observed locally.
    Transaction(T),
    /// The timer fired for the given (height, view).
    Timeout(HeightView),
    /// A block was persisted outside of consensus.
    BlockPersisted,
    /// Drain no further commands and drop the engine.
    Stop,
}

/// Owns the engine task and hands out command senders.
pub struct ConsensusService<T: Transaction> {
    commands: mpsc::Sender<ConsensusCommand<T>>,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl<T: Transaction> ConsensusService<T> {
    /// Starts the engine on a spawned task and returns its front-end.
    ///
    /// `buffer` bounds the command queue; producers get backpressure via
    /// the returned sender.
    #[must_use]
    pub fn spawn<B: Block<T>>(mut engine: Dbft<T, B>, buffer: usize) -> Self {
        let (commands, mut receiver) = mpsc::channel::<ConsensusCommand<T>>(buffer);
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let task = tokio::spawn(async move {
            engine.start();
            while let Some(command) = receiver.recv().await {
                // Cancellation is checked between commands, before any
                // further outbound I/O can be initiated.
                if flag.load(Ordering::Acquire) {
                    break;
                }
                match command {
                    ConsensusCommand::Receive(payload) => engine.on_receive(payload),
                    ConsensusCommand::Transaction(transaction) => {
                        engine.on_transaction(transaction);
                    }
                    ConsensusCommand::Timeout(hv) => engine.on_timeout(hv),
                    ConsensusCommand::BlockPersisted => engine.on_block_persisted(),
                    ConsensusCommand::Stop => break,
                }
            }
            debug!("consensus service stopped");
        });

        Self {
            commands,
            cancelled,
            task,
        }
    }

    /// A cloneable sender feeding the engine's input queue.
    #[must_use]
    pub fn handle(&self) -> mpsc::Sender<ConsensusCommand<T>> {
        self.commands.clone()
    }

    /// Cancels the service: commands still queued are discarded without
    /// reaching the engine.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Graceful shutdown: everything queued ahead of the stop is still
    /// processed, then the engine task finishes.
    pub async fn stop(self) {
        let _ = self.commands.send(ConsensusCommand::Stop).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Ledger, MemoryPool};
    use crate::config::Config;
    use crate::context::Context;
    use crate::timer::ConsensusTimer;
    use dbft_primitives::{hash160, KeyPair, PublicKey, Signature, UInt160, UInt256};
    use std::sync::atomic::AtomicU32;
    use std::sync::{mpsc as std_mpsc, Mutex};
    use std::time::Duration;

    #[derive(Clone)]
    struct Tx;

    impl Transaction for Tx {
        fn hash(&self) -> UInt256 {
            UInt256::zero()
        }
    }

    #[derive(Clone)]
    struct TestBlock {
        hash: UInt256,
        sign_data: Vec<u8>,
    }

    impl Block<Tx> for TestBlock {
        fn hash(&self) -> UInt256 {
            self.hash
        }
        fn sign(&self, keys: &KeyPair) -> Signature {
            keys.sign(&self.sign_data)
        }
        fn verify(&self, key: &PublicKey, signature: &Signature) -> bool {
            key.verify(&self.sign_data, signature)
        }
        fn set_transactions(&mut self, _transactions: Vec<Tx>) {}
        fn set_signatures(&mut self, _signatures: Vec<(u16, Signature)>) {}
    }

    struct SoloLedger {
        validators: Vec<PublicKey>,
        height: AtomicU32,
        persisted: Mutex<Vec<UInt256>>,
    }

    impl Ledger<Tx, TestBlock> for SoloLedger {
        fn height(&self) -> u32 {
            self.height.load(Ordering::SeqCst)
        }
        fn block_hash(&self) -> UInt256 {
            UInt256::zero()
        }
        fn validators(&self) -> Vec<PublicKey> {
            self.validators.clone()
        }
        fn next_validators(&self, _transactions: &[Tx]) -> Vec<PublicKey> {
            self.validators.clone()
        }
        fn consensus_address(&self, validators: &[PublicKey]) -> UInt160 {
            let bytes: Vec<u8> = validators
                .iter()
                .flat_map(|k| k.as_bytes().to_vec())
                .collect();
            hash160(&bytes)
        }
        fn new_block_from_context(&self, context: &Context<Tx, TestBlock>) -> TestBlock {
            TestBlock {
                hash: UInt256::from([context.height as u8; 32]),
                sign_data: context.height.to_le_bytes().to_vec(),
            }
        }
        fn verify_block(&self, _block: &TestBlock) -> bool {
            true
        }
        fn process_block(&self, block: TestBlock) {
            self.persisted.lock().unwrap().push(block.hash());
            self.height.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct EmptyPool;

    impl MemoryPool<Tx> for EmptyPool {
        fn get_transaction(&self, _hash: &UInt256) -> Option<Tx> {
            None
        }
        fn request_transactions(&self, _hashes: &[UInt256]) {}
        fn get_verified(&self) -> Vec<Tx> {
            Vec::new()
        }
    }

    struct StillClock;

    impl ConsensusTimer for StillClock {
        fn now(&self) -> u64 {
            0
        }
        fn reset(&mut self, _hv: HeightView, _delay: Duration) {}
        fn extend(&mut self, _delay: Duration) {}
    }

    #[tokio::test]
    async fn solo_validator_produces_a_block_per_timeout() {
        let keys = KeyPair::generate();
        let ledger = Arc::new(SoloLedger {
            validators: vec![*keys.public_key()],
            height: AtomicU32::new(0),
            persisted: Mutex::new(Vec::new()),
        });
        let (broadcast, outbound) = std_mpsc::sync_channel(16);

        let resolver_keys = keys.clone();
        let engine = Dbft::new(Config {
            timer: Box::new(StillClock),
            seconds_per_block: Duration::from_secs(1),
            version: 0,
            key_pair: Box::new(move |validators| {
                validators
                    .iter()
                    .position(|k| k == resolver_keys.public_key())
                    .map(|index| (index as u16, resolver_keys.clone()))
            }),
            ledger: Arc::clone(&ledger) as Arc<dyn Ledger<Tx, TestBlock>>,
            mempool: Arc::new(EmptyPool),
            broadcast,
        })
        .unwrap();

        let service = ConsensusService::spawn(engine, 16);
        let handle = service.handle();

        // A single validator reaches both quorums by itself: the timeout
        // produces a proposal, a commit and a persisted block.
        handle
            .send(ConsensusCommand::Timeout(HeightView::new(1, 0)))
            .await
            .unwrap();
        service.stop().await;

        assert_eq!(ledger.height.load(Ordering::SeqCst), 1);
        assert_eq!(ledger.persisted.lock().unwrap().len(), 1);

        let sent: Vec<_> = outbound.try_iter().map(|p| p.kind()).collect();
        assert!(sent.contains(&crate::message::ConsensusMessageType::PrepareRequest));
        assert!(sent.contains(&crate::message::ConsensusMessageType::Commit));
    }

    #[tokio::test]
    async fn cancelled_service_discards_queued_commands() {
        let keys = KeyPair::generate();
        let ledger = Arc::new(SoloLedger {
            validators: vec![*keys.public_key()],
            height: AtomicU32::new(0),
            persisted: Mutex::new(Vec::new()),
        });
        let (broadcast, _outbound) = std_mpsc::sync_channel(16);

        let resolver_keys = keys.clone();
        let engine = Dbft::new(Config {
            timer: Box::new(StillClock),
            seconds_per_block: Duration::from_secs(1),
            version: 0,
            key_pair: Box::new(move |validators| {
                validators
                    .iter()
                    .position(|k| k == resolver_keys.public_key())
                    .map(|index| (index as u16, resolver_keys.clone()))
            }),
            ledger: Arc::clone(&ledger) as Arc<dyn Ledger<Tx, TestBlock>>,
            mempool: Arc::new(EmptyPool),
            broadcast,
        })
        .unwrap();

        let service = ConsensusService::spawn(engine, 16);
        service.cancel();

        // Without the cancellation this timeout would produce a block.
        let handle = service.handle();
        handle
            .send(ConsensusCommand::Timeout(HeightView::new(1, 0)))
            .await
            .unwrap();
        service.stop().await;

        assert_eq!(ledger.height.load(Ordering::SeqCst), 0);
        assert!(ledger.persisted.lock().unwrap().is_empty());
    }
}
