// ABOUTME: Error types for request authentication using thiserror.
// ABOUTME: One variant per construction-time and per-call failure kind.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building a signer or signing a request.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Failed to read a key file from disk.
    #[error("failed to read private key from {path}: {source}")]
    ReadKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Key material is malformed or of an unsupported kind.
    #[error("failed to parse private key: {0}")]
    KeyParse(String),

    /// The supplied fingerprint does not belong to the loaded key.
    #[error("key fingerprint mismatch: expected {expected}, key has {actual}")]
    FingerprintMismatch { expected: String, actual: String },

    /// The key loaded but could not produce a signature.
    #[error("private key failed signing self-test: {0}")]
    SelfTestSign(String),

    /// No agent socket was configured.
    #[error("no SSH agent available (SSH_AUTH_SOCK is not set)")]
    AgentUnavailable,

    /// Failed to connect to the agent socket.
    #[error("failed to connect to SSH agent at {path}: {source}")]
    AgentConnect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The agent does not hold a key with the requested fingerprint.
    #[error("no key with fingerprint {fingerprint} found in SSH agent")]
    KeyNotFoundInAgent { fingerprint: String },

    /// I/O failure while talking to the agent.
    #[error("SSH agent I/O failed: {0}")]
    AgentIo(#[source] std::io::Error),

    /// The agent sent a malformed reply or refused the request.
    #[error("SSH agent protocol error: {0}")]
    AgentProtocol(String),

    /// A previous I/O failure left the agent connection unusable.
    #[error("SSH agent connection was lost; construct a new signer")]
    AgentConnectionLost,

    /// The agent returned a signature format that cannot be translated.
    #[error("unsupported SSH agent signature algorithm: {0}")]
    UnsupportedAgentAlgorithm(String),

    /// Cryptographic failure while signing.
    #[error("signing failed: {0}")]
    Signing(String),

    /// A computed header value is not a valid HTTP header value.
    #[error("invalid value for header {header}: {message}")]
    InvalidHeader { header: String, message: String },

    /// Missing or invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type alias using AuthError.
pub type Result<T> = std::result::Result<T, AuthError>;
