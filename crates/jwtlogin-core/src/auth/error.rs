use thiserror::Error;

/// Failures while decoding tokens or stored session records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    #[error("Corrupt session record: {0}")]
    CorruptSession(String),
}
