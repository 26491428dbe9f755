//! Fixed-size digest types used across the consensus wire format.

use crate::error::PrimitiveError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Byte length of a [`UInt256`].
pub const UINT256_SIZE: usize = 32;

/// Byte length of a [`UInt160`].
pub const UINT160_SIZE: usize = 20;

/// A 256-bit digest (payload hashes, transaction hashes, block hashes).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UInt256([u8; UINT256_SIZE]);

impl UInt256 {
    /// Returns the all-zero digest.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; UINT256_SIZE])
    }

    #[inline]
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        let mut i = 0;
        while i < UINT256_SIZE {
            if self.0[i] != 0 {
                return false;
            }
            i += 1;
        }
        true
    }

    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; UINT256_SIZE] {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Builds a digest from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`PrimitiveError::InvalidLength`] unless the slice is exactly
    /// 32 bytes long.
    pub fn from_bytes(value: &[u8]) -> Result<Self, PrimitiveError> {
        let bytes: [u8; UINT256_SIZE] =
            value
                .try_into()
                .map_err(|_| PrimitiveError::InvalidLength {
                    expected: UINT256_SIZE,
                    actual: value.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl From<[u8; UINT256_SIZE]> for UInt256 {
    fn from(bytes: [u8; UINT256_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for UInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt256({})", self)
    }
}

impl FromStr for UInt256 {
    type Err = PrimitiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

/// A 160-bit digest (the next-consensus address).
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UInt160([u8; UINT160_SIZE]);

impl UInt160 {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; UINT160_SIZE])
    }

    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; UINT160_SIZE] {
        &self.0
    }

    /// # Errors
    ///
    /// Returns [`PrimitiveError::InvalidLength`] unless the slice is exactly
    /// 20 bytes long.
    pub fn from_bytes(value: &[u8]) -> Result<Self, PrimitiveError> {
        let bytes: [u8; UINT160_SIZE] =
            value
                .try_into()
                .map_err(|_| PrimitiveError::InvalidLength {
                    expected: UINT160_SIZE,
                    actual: value.len(),
                })?;
        Ok(Self(bytes))
    }
}

impl From<[u8; UINT160_SIZE]> for UInt160 {
    fn from(bytes: [u8; UINT160_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for UInt160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UInt160({})", self)
    }
}

impl FromStr for UInt160 {
    type Err = PrimitiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn uint256_roundtrip_through_hex() {
        let digest =
            UInt256::from(hex!("b74f66f80de93df5b8f2671db9add7907f3229e6a49a5bb5bbd93a91d832d49a"));
        let text = digest.to_string();
        assert_eq!(text.parse::<UInt256>().unwrap(), digest);
    }

    #[test]
    fn uint256_rejects_wrong_length() {
        let err = UInt256::from_bytes(&[1u8; 31]).unwrap_err();
        assert_eq!(
            err,
            PrimitiveError::InvalidLength {
                expected: 32,
                actual: 31
            }
        );
    }

    #[test]
    fn zero_is_zero() {
        assert!(UInt256::zero().is_zero());
        assert!(!UInt256::from([1u8; 32]).is_zero());
        assert_eq!(UInt160::zero().as_bytes(), &[0u8; 20]);
    }

    #[test]
    fn accepts_0x_prefix() {
        let digest = "0x0000000000000000000000000000000000000000"
            .parse::<UInt160>()
            .unwrap();
        assert_eq!(digest, UInt160::zero());
    }
}
