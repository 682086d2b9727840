//! Error handling for the send pipeline
//!
//! One enum covers every failure the pipeline can surface. Variants are
//! grouped by how a caller is expected to react: correct the form, re-prompt
//! for the PIN, retry, or treat as a bug.

use std::fmt;

/// Result type alias for send pipeline operations
pub type Result<T> = std::result::Result<T, SendError>;

#[derive(Debug, Clone)]
pub enum SendError {
    /// Malformed destination address (base58, checksum, network byte, length)
    Address(String),
    /// Non-positive or over-range output amount
    OutputValue(String),
    /// A per-token sub-form was incomplete or malformed
    IncompleteFormData(String),
    /// Credential layer returned a different number of signatures than inputs
    SignatureCountMismatch { expected: usize, actual: usize },
    /// PIN or secret could not unlock the signing keys
    CredentialUnavailable(String),
    /// Nonce search reached its bound without finding a hash below target
    ProofOfWorkExhausted { max_nonce: u32 },
    /// The node refused the transaction; message is the node's reason
    SubmissionRejected(String),
    /// Network-level failure talking to the node
    Transport(String),
    /// Wire encoding/decoding errors
    Serialization(String),
    /// Invalid weight or mining worker failure
    Mining(String),
    /// Cryptographic operation errors
    Crypto(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
    /// Encryption/decryption errors of the key store
    Encryption(String),
}

impl SendError {
    /// Errors the user fixes by editing the form and trying again.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            SendError::Address(_) | SendError::OutputValue(_) | SendError::IncompleteFormData(_)
        )
    }

    /// Errors where repeating the same request may succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SendError::ProofOfWorkExhausted { .. } | SendError::Transport(_)
        )
    }

    /// Errors resolved by asking the user for the PIN again.
    pub fn needs_new_credentials(&self) -> bool {
        matches!(self, SendError::CredentialUnavailable(_))
    }
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Address(msg) => write!(f, "Invalid address: {msg}"),
            SendError::OutputValue(msg) => write!(f, "Invalid output value: {msg}"),
            SendError::IncompleteFormData(msg) => write!(f, "Incomplete form data: {msg}"),
            SendError::SignatureCountMismatch { expected, actual } => write!(
                f,
                "Signature count mismatch: expected {expected}, got {actual}"
            ),
            SendError::CredentialUnavailable(msg) => write!(f, "Credentials unavailable: {msg}"),
            SendError::ProofOfWorkExhausted { max_nonce } => {
                write!(f, "Proof of work exhausted after {max_nonce} nonces")
            }
            SendError::SubmissionRejected(msg) => write!(f, "{msg}"),
            SendError::Transport(msg) => write!(f, "Transport error: {msg}"),
            SendError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            SendError::Mining(msg) => write!(f, "Mining error: {msg}"),
            SendError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            SendError::Config(msg) => write!(f, "Configuration error: {msg}"),
            SendError::Io(msg) => write!(f, "I/O error: {msg}"),
            SendError::Encryption(msg) => write!(f, "Encryption error: {msg}"),
        }
    }
}

impl std::error::Error for SendError {}

impl From<std::io::Error> for SendError {
    fn from(err: std::io::Error) -> Self {
        SendError::Io(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for SendError {
    fn from(err: bincode::error::EncodeError) -> Self {
        SendError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for SendError {
    fn from(err: bincode::error::DecodeError) -> Self {
        SendError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for SendError {
    fn from(err: serde_json::Error) -> Self {
        SendError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        SendError::Transport(err.to_string())
    }
}

impl From<toml::de::Error> for SendError {
    fn from(err: toml::de::Error) -> Self {
        SendError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_are_user_correctable() {
        assert!(SendError::Address("bad".to_string()).is_user_correctable());
        assert!(SendError::OutputValue("zero".to_string()).is_user_correctable());
        assert!(!SendError::SignatureCountMismatch {
            expected: 2,
            actual: 1
        }
        .is_user_correctable());
    }

    #[test]
    fn test_retriable_errors() {
        assert!(SendError::ProofOfWorkExhausted { max_nonce: 10 }.is_retriable());
        assert!(SendError::Transport("timeout".to_string()).is_retriable());
        assert!(!SendError::SubmissionRejected("double spend".to_string()).is_retriable());
        assert!(!SendError::Serialization("truncated".to_string()).is_retriable());
    }

    #[test]
    fn test_wrong_pin_needs_new_credentials() {
        let err = SendError::CredentialUnavailable("Wrong PIN".to_string());
        assert!(err.needs_new_credentials());
        assert!(!err.is_retriable());
        assert!(!SendError::Transport("timeout".to_string()).needs_new_credentials());
    }

    #[test]
    fn test_rejection_message_is_verbatim() {
        let err = SendError::SubmissionRejected("Invalid inputs".to_string());
        assert_eq!(err.to_string(), "Invalid inputs");
    }
}
