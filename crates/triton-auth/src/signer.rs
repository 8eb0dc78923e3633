// ABOUTME: The Signer capability shared by local-key and agent signers.
// ABOUTME: Defines signing algorithms, keyId formatting and the Authorization header shape.

use crate::error::Result;
use crate::fingerprint::Fingerprint;
use std::fmt;

/// Signature algorithms understood by the remote verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningAlgorithm {
    /// RSA PKCS#1 v1.5 over SHA-512.
    RsaSha512,
    /// ECDSA over SHA-512, DER-encoded `(r, s)`.
    EcdsaSha512,
    /// RSA PKCS#1 v1.5 over SHA-1, as returned by an SSH agent.
    RsaSha1,
}

impl SigningAlgorithm {
    /// Wire name used in the `algorithm` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::RsaSha512 => "rsa-sha512",
            SigningAlgorithm::EcdsaSha512 => "ecdsa-sha512",
            SigningAlgorithm::RsaSha1 => "rsa-sha1",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `keyId` naming which account, user and key produced a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyId {
    account: String,
    user: Option<String>,
    fingerprint: String,
}

impl KeyId {
    /// Build a keyId; an empty user name is treated as absent.
    pub fn new(account: &str, user: Option<&str>, fingerprint: &Fingerprint) -> Self {
        Self {
            account: account.to_string(),
            user: user.filter(|u| !u.is_empty()).map(str::to_string),
            fingerprint: fingerprint.display(),
        }
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Display (colon-delimited) fingerprint of the key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(
                f,
                "/{}/users/{}/keys/{}",
                self.account, user, self.fingerprint
            ),
            None => write!(f, "/{}/keys/{}", self.account, self.fingerprint),
        }
    }
}

/// Who is signing and how; fixed when a signer is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerIdentity {
    pub key_id: KeyId,
    pub algorithm: SigningAlgorithm,
}

impl SignerIdentity {
    /// Format the full `Authorization` header value for a base64 signature.
    pub fn authorization(&self, signature: &str) -> String {
        format!(
            "Signature keyId=\"{}\",algorithm=\"{}\",headers=\"date\",signature=\"{}\"",
            self.key_id, self.algorithm, signature
        )
    }
}

/// The canonical string signed for a request: `date: <value>`.
pub fn signing_string(date_header: &str) -> String {
    format!("date: {date_header}")
}

/// Converts a `date` header value into a complete `Authorization` header value.
///
/// Implementations must be safe to share between request-issuing threads.
pub trait Signer: fmt::Debug + Send + Sync {
    /// Sign `date: <date_header>` and format the `Authorization` header value.
    ///
    /// # Errors
    /// Returns an error if the signature cannot be produced. Failures are
    /// never retried here.
    fn sign(&self, date_header: &str) -> Result<String>;

    /// Display (colon-delimited) fingerprint of the signing key.
    fn key_fingerprint(&self) -> &str;
}

/// A base64 signature together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignature {
    pub signature: String,
    pub algorithm: SigningAlgorithm,
}

/// Signers that can also sign arbitrary strings, such as pre-signed URLs.
///
/// Only signers holding key material locally provide this.
pub trait RawSigner: Signer {
    /// Sign `data` with the same primitive [`Signer::sign`] uses.
    ///
    /// # Errors
    /// Returns an error if the signature cannot be produced.
    fn sign_raw(&self, data: &str) -> Result<RawSignature>;

    /// Algorithm this signer always uses.
    fn default_algorithm(&self) -> SigningAlgorithm;
}
