use dbft_primitives::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(&'static str),

    #[error("malformed consensus payload: {0}")]
    MalformedPayload(#[from] IoError),
}

pub type ConsensusResult<T> = Result<T, ConsensusError>;
