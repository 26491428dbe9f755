//! Hashing and secp256r1 ECDSA used by the consensus engine.
//!
//! Payload identifiers are double SHA-256 digests; the next-consensus
//! address is RIPEMD-160 over SHA-256. Signatures are 64-byte r||s over
//! the SHA-256 of the signed data.

use crate::error::CryptoError;
use crate::hash::{UInt160, UInt256};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature as EcdsaSignature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// Size of a compressed SEC1 public key encoding.
pub const PUBLIC_KEY_SIZE: usize = 33;

/// Size of a raw r||s signature.
pub const SIGNATURE_SIZE: usize = 64;

/// SHA-256 of `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Double SHA-256 of `data`, as a [`UInt256`].
#[must_use]
pub fn hash256(data: &[u8]) -> UInt256 {
    UInt256::from(sha256(&sha256(data)))
}

/// RIPEMD-160 of SHA-256 of `data`, as a [`UInt160`].
#[must_use]
pub fn hash160(data: &[u8]) -> UInt160 {
    let mut hasher = Ripemd160::new();
    hasher.update(sha256(data));
    let digest: [u8; 20] = hasher.finalize().into();
    UInt160::from(digest)
}

/// A compressed secp256r1 public key.
///
/// Ordering is over the compressed encoding, which makes validator sets
/// sortable the same way on every node.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Parses a compressed SEC1 encoding.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidPublicKey`] if the bytes are not a
    /// valid compressed curve point.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key = VerifyingKey::from_sec1_bytes(bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        let point = key.to_encoded_point(true);
        let encoded: [u8; PUBLIC_KEY_SIZE] = point
            .as_bytes()
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self(encoded))
    }

    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Verifies a signature over `data` (SHA-256 message digest).
    #[must_use]
    pub fn verify(&self, data: &[u8], signature: &Signature) -> bool {
        let Ok(key) = VerifyingKey::from_sec1_bytes(&self.0) else {
            return false;
        };
        let Ok(sig) = EcdsaSignature::from_slice(&signature.0) else {
            return false;
        };
        key.verify(data, &sig).is_ok()
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A 64-byte r||s ECDSA signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSignature`] unless the slice is exactly
    /// 64 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; SIGNATURE_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(raw))
    }

    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

/// A secp256r1 keypair for signing consensus messages and headers.
#[derive(Clone)]
pub struct KeyPair {
    secret: SigningKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a fresh keypair from the operating system RNG.
    #[must_use]
    pub fn generate() -> Self {
        // Rejection-sample until the bytes form a valid non-zero scalar;
        // all but a negligible fraction of draws succeed on the first try.
        loop {
            let mut bytes = [0u8; 32];
            OsRng.fill_bytes(&mut bytes);
            if let Ok(secret) = SigningKey::from_slice(&bytes) {
                return Self::from_signing_key(secret);
            }
        }
    }

    /// Restores a keypair from raw secret scalar bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidSecretKey`] if the bytes are not a
    /// valid non-zero scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = SigningKey::from_slice(bytes).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self::from_signing_key(secret))
    }

    fn from_signing_key(secret: SigningKey) -> Self {
        let point = secret.verifying_key().to_encoded_point(true);
        let mut encoded = [0u8; PUBLIC_KEY_SIZE];
        encoded.copy_from_slice(point.as_bytes());
        Self {
            secret,
            public: PublicKey(encoded),
        }
    }

    #[inline]
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Signs `data` (SHA-256 message digest) and returns the raw r||s form.
    #[must_use]
    pub fn sign(&self, data: &[u8]) -> Signature {
        let signature: EcdsaSignature = self.secret.sign(data);
        let mut raw = [0u8; SIGNATURE_SIZE];
        raw.copy_from_slice(&signature.to_bytes());
        Signature(raw)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn sha256_matches_known_vector() {
        // sha256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            digest,
            hex!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn sign_then_verify() {
        let keys = KeyPair::generate();
        let signature = keys.sign(b"tentative header bytes");
        assert!(keys.public_key().verify(b"tentative header bytes", &signature));
        assert!(!keys.public_key().verify(b"different bytes", &signature));
    }

    #[test]
    fn verify_rejects_foreign_key() {
        let signer = KeyPair::generate();
        let other = KeyPair::generate();
        let signature = signer.sign(b"payload");
        assert!(!other.public_key().verify(b"payload", &signature));
    }

    #[test]
    fn public_key_roundtrip() {
        let keys = KeyPair::generate();
        let restored = PublicKey::from_bytes(keys.public_key().as_bytes()).unwrap();
        assert_eq!(&restored, keys.public_key());
    }

    #[test]
    fn rejects_garbage_key_material() {
        assert_eq!(
            PublicKey::from_bytes(&[0u8; 33]).unwrap_err(),
            CryptoError::InvalidPublicKey
        );
        assert_eq!(
            Signature::from_bytes(&[0u8; 63]).unwrap_err(),
            CryptoError::InvalidSignature
        );
    }
}
