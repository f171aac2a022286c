use thiserror::Error;

/// Failures surfaced by `SecretService`.
///
/// Absent, expired and exhausted records all map to `NotFound` so a caller
/// cannot tell whether a secret ever existed or how many views remain.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("{0}")]
    Validation(String),

    #[error("secret not found, it may have expired or been viewed already")]
    NotFound,

    #[error("could not decrypt secret, the stored data may be corrupted")]
    Decryption,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SecretError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
