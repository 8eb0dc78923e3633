// ABOUTME: HTTP Signature request authentication for the Triton cloud API.
// ABOUTME: Provides fingerprinting, local-key and SSH-agent signers, and request signing.

//! # triton-auth
//!
//! Proves the caller's identity on every outbound API request by signing the
//! request's `date` header and sending the result in an `Authorization`
//! header of the form:
//!
//! ```text
//! Signature keyId="/<account>/keys/<fingerprint>",algorithm="rsa-sha512",headers="date",signature="<base64>"
//! ```
//!
//! ## Features
//!
//! - **Fingerprinting**: MD5 fingerprints of SSH public keys, in compact and colon form
//! - **Local keys**: RSA (`rsa-sha512`) and ECDSA (`ecdsa-sha512`) keys held in memory
//! - **SSH agent**: delegate signing to a running agent (`rsa-sha1`)
//! - **Request signing**: set `date` and `Authorization` on `http` requests
//!
//! ## Example
//!
//! ```no_run
//! use triton_auth::{sign_request, PrivateKeySigner, Signer};
//!
//! let key = std::fs::read("/path/to/id_rsa").expect("key should read");
//! let signer = PrivateKeySigner::new(
//!     "fe:64:fc:2c:5b:5d:ff:7c:79:7f:11:d3:6e:b6:f6:6b",
//!     &key,
//!     "acme",
//!     None,
//! )
//! .expect("signer should build");
//! println!("Key fingerprint: {}", signer.key_fingerprint());
//!
//! let mut request = http::Request::get("https://cloudapi.example.com/acme/machines")
//!     .body(())
//!     .expect("request should build");
//! sign_request(&signer, &mut request).expect("request should sign");
//! ```

mod agent;
mod config;
mod error;
mod fingerprint;
mod key;
mod local;
mod pipeline;
mod signer;

// Re-export primary types and functions
pub use agent::{AgentClient, AgentIdentity, AgentSignature, SshAgentSigner};
pub use config::{default_config_path, AuthConfig, AuthSettings, KeySource};
pub use error::{AuthError, Result};
pub use fingerprint::{normalize_fingerprint, Fingerprint};
pub use key::{KeyKind, KeyMaterial};
pub use local::PrivateKeySigner;
pub use pipeline::{authorize_headers, rfc1123_date, sign_request};
pub use signer::{
    signing_string, KeyId, RawSignature, RawSigner, Signer, SignerIdentity, SigningAlgorithm,
};
