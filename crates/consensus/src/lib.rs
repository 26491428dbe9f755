//! Deterministic Byzantine fault tolerant (dBFT) consensus engine.
//!
//! A fixed, ordered set of `n` validators produces a linear chain of
//! blocks while tolerating up to `f = (n - 1) / 3` Byzantine members. For
//! every height the engine drives a three-phase exchange with single-block
//! finality:
//!
//! ```text
//!  primary                                   backups
//!     │──────── PrepareRequest ─────────────────│   propose
//!     │◄─────── PrepareResponse ────────────────│   acknowledge
//!     │◄──────────── Commit ───────────────────►│   m = n - f signatures
//!     │                block persisted           │
//! ```
//!
//! A silent or faulty primary is replaced through ChangeView votes with
//! exponentially growing timeouts, and nodes that restarted or fell behind
//! catch up through the RecoveryRequest/RecoveryMessage sub-protocol
//! instead of waiting out the timers.
//!
//! The engine itself is a single-threaded state machine behind one input
//! queue. Hashing, signing, block assembly, transaction pooling, timers
//! and the transport are all collaborators passed in through
//! [`Config`]; see the `block` and `timer` modules for the seams.
//!
//! Safety: two honest nodes never commit different blocks at the same
//! height. Liveness: with at most `f` faulty validators and a reachable
//! quorum of `m = n - f`, every height eventually commits exactly one
//! block.

pub mod block;
pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod message;
pub mod recovery;
pub mod service;
pub mod timer;

pub use block::{Block, Ledger, MemoryPool, Transaction};
pub use cache::{MessageBucket, MessageCache};
pub use config::{Config, KeyPairResolver};
pub use context::Context;
pub use engine::Dbft;
pub use error::{ConsensusError, ConsensusResult};
pub use message::{
    ChangeView, Commit, ConsensusMessage, ConsensusMessageType, ConsensusPayload, MessageBody,
    PrepareRequest, PrepareResponse, RecoveryRequest,
};
pub use recovery::{ChangeViewCompact, CommitCompact, PreparationCompact, RecoveryMessage};
pub use service::{ConsensusCommand, ConsensusService};
pub use timer::{ConsensusTimer, HeightView};
