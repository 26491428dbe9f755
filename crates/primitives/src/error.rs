use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PrimitiveError {
    #[error("invalid digest length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid hex encoding: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Decode-side failures of the binary codec. Encoding is infallible.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IoError {
    #[error("unexpected end of input: needed {needed} more bytes at offset {offset}")]
    UnexpectedEof { offset: usize, needed: usize },

    #[error("variable-length quantity {value} exceeds limit {max}")]
    VarIntTooLarge { value: u64, max: u64 },

    #[error("invalid value for {0} at offset {1}")]
    InvalidValue(&'static str, usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid secret key material")]
    InvalidSecretKey,

    #[error("invalid public key encoding")]
    InvalidPublicKey,

    #[error("invalid signature encoding")]
    InvalidSignature,

    #[error("signing failed")]
    SigningFailed,
}
