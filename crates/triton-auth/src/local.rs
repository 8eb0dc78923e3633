// ABOUTME: Signer backed by a private key held in this process.
// ABOUTME: Verifies the key against the expected fingerprint and self-tests before use.

use crate::error::{AuthError, Result};
use crate::fingerprint::{normalize_fingerprint, Fingerprint};
use crate::key::KeyMaterial;
use crate::signer::{
    signing_string, KeyId, RawSignature, RawSigner, Signer, SignerIdentity, SigningAlgorithm,
};
use base64::Engine;
use tracing::{debug, trace, warn};

/// Message signed once at construction to prove the key can sign.
const SELF_TEST_MESSAGE: &str = "triton-auth signing self-test";

/// Signs requests with an in-memory RSA or ECDSA private key.
///
/// The key is read-only after construction, so a single signer can be
/// shared across threads without locking.
#[derive(Debug)]
pub struct PrivateKeySigner {
    key: KeyMaterial,
    identity: SignerIdentity,
}

impl PrivateKeySigner {
    /// Build a signer from raw private key bytes.
    ///
    /// `key_fingerprint` may be in colon or compact MD5 form and must match
    /// the supplied key. An empty or missing `user` selects the account key.
    ///
    /// # Errors
    /// - `AuthError::KeyParse` if the key cannot be parsed
    /// - `AuthError::FingerprintMismatch` if the key is not the one named
    /// - `AuthError::SelfTestSign` if the key cannot produce a signature
    pub fn new(
        key_fingerprint: &str,
        private_key: &[u8],
        account: &str,
        user: Option<&str>,
    ) -> Result<Self> {
        let key = KeyMaterial::parse(private_key)?;
        Self::from_key_material(key_fingerprint, key, account, user)
    }

    /// Build a signer from already-parsed key material.
    ///
    /// # Errors
    /// As [`PrivateKeySigner::new`], minus parsing.
    pub fn from_key_material(
        key_fingerprint: &str,
        key: KeyMaterial,
        account: &str,
        user: Option<&str>,
    ) -> Result<Self> {
        let fingerprint = key.fingerprint();
        if !fingerprint.matches(key_fingerprint) {
            warn!(
                expected = %key_fingerprint,
                actual = %fingerprint,
                "private key does not match configured key id"
            );
            return Err(AuthError::FingerprintMismatch {
                expected: normalize_fingerprint(key_fingerprint),
                actual: fingerprint.compact(),
            });
        }

        let algorithm = key.signing_algorithm();
        key.sign_sha512(SELF_TEST_MESSAGE.as_bytes())
            .map_err(|e| AuthError::SelfTestSign(e.to_string()))?;

        debug!(
            fingerprint = %fingerprint,
            algorithm = %algorithm,
            account,
            "created private key signer"
        );

        Ok(Self {
            identity: SignerIdentity {
                key_id: KeyId::new(account, user, &fingerprint),
                algorithm,
            },
            key,
        })
    }

    /// Identity embedded in every signed request.
    pub fn identity(&self) -> &SignerIdentity {
        &self.identity
    }

    /// `keyId` sent in the `Authorization` header.
    pub fn key_id(&self) -> &KeyId {
        &self.identity.key_id
    }

    /// The key's fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        self.key.fingerprint()
    }

    fn sign_base64(&self, data: &str) -> Result<String> {
        let signature = self.key.sign_sha512(data.as_bytes())?;
        trace!(algorithm = %self.identity.algorithm, len = signature.len(), "signed");
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }
}

impl Signer for PrivateKeySigner {
    fn sign(&self, date_header: &str) -> Result<String> {
        let signature = self.sign_base64(&signing_string(date_header))?;
        Ok(self.identity.authorization(&signature))
    }

    fn key_fingerprint(&self) -> &str {
        self.identity.key_id.fingerprint()
    }
}

impl RawSigner for PrivateKeySigner {
    fn sign_raw(&self, data: &str) -> Result<RawSignature> {
        Ok(RawSignature {
            signature: self.sign_base64(data)?,
            algorithm: self.identity.algorithm,
        })
    }

    fn default_algorithm(&self) -> SigningAlgorithm {
        self.identity.algorithm
    }
}
