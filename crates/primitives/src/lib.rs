//! Foundation types for the dbft consensus engine.
//!
//! This crate keeps the consensus state machine independent of any node
//! runtime: fixed-size digests, the little-endian wire codec, and the
//! secp256r1 signing primitives live here.

pub mod crypto;
pub mod error;
pub mod hash;
pub mod io;

pub use crypto::{hash160, hash256, sha256, KeyPair, PublicKey, Signature};
pub use error::{CryptoError, IoError, PrimitiveError};
pub use hash::{UInt160, UInt256};
pub use io::{BinaryReader, BinaryWriter};
