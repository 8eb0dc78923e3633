// ABOUTME: Private key material parsing for the local signer.
// ABOUTME: Accepts PKCS#1, SEC1, PKCS#8 and OpenSSH encodings of RSA and ECDSA keys.

use crate::error::{AuthError, Result};
use crate::fingerprint::Fingerprint;
use crate::signer::SigningAlgorithm;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha512};
use ssh_encoding::Encode;
use ssh_key::private::{EcdsaKeypair, KeypairData, RsaKeypair};
use ssh_key::public::{EcdsaPublicKey, KeyData, RsaPublicKey};
use ssh_key::Mpint;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Kinds of private key known to the Triton signing scheme.
///
/// Only RSA and ECDSA have signing paths; Ed25519 and DSA are named so they
/// can be reported, and are rejected when parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Rsa,
    Ecdsa,
    Ed25519,
    Dsa,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyKind::Rsa => "rsa",
            KeyKind::Ecdsa => "ecdsa",
            KeyKind::Ed25519 => "ed25519",
            KeyKind::Dsa => "dsa",
        })
    }
}

enum EcdsaKey {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
}

impl EcdsaKey {
    /// Uncompressed SEC1 encoding of the public point.
    fn public_point(&self) -> Vec<u8> {
        match self {
            EcdsaKey::P256(key) => key.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            EcdsaKey::P384(key) => key.verifying_key().to_encoded_point(false).as_bytes().to_vec(),
            EcdsaKey::P521(key) => p521::ecdsa::VerifyingKey::from(key).to_encoded_point(false).as_bytes().to_vec(),
        }
    }
}

enum Inner {
    Rsa(Box<RsaPrivateKey>),
    Ecdsa(EcdsaKey),
}

/// A parsed private key of exactly one supported kind.
pub struct KeyMaterial {
    inner: Inner,
    /// SSH wire encoding of the public half, computed once at parse time.
    public_blob: Vec<u8>,
}

impl KeyMaterial {
    /// Parse private key bytes in PEM or OpenSSH encoding.
    ///
    /// # Errors
    /// Returns `AuthError::KeyParse` for malformed, encrypted or unsupported keys.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| AuthError::KeyParse("key material is not PEM text".to_string()))?;
        let label = pem_label(text)
            .ok_or_else(|| AuthError::KeyParse("no PEM header found".to_string()))?;

        let inner = match label {
            "OPENSSH PRIVATE KEY" => from_openssh(text)?,
            "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_pem(text)
                .map(|key| Inner::Rsa(Box::new(key)))
                .map_err(|e| AuthError::KeyParse(e.to_string()))?,
            "EC PRIVATE KEY" => from_sec1(text)?,
            "PRIVATE KEY" => from_pkcs8(text)?,
            "DSA PRIVATE KEY" => return Err(unsupported(KeyKind::Dsa)),
            "ENCRYPTED PRIVATE KEY" => return Err(encrypted()),
            other => {
                return Err(AuthError::KeyParse(format!(
                    "unrecognized PEM block {other:?}"
                )))
            }
        };

        let key = Self::new(inner)?;
        debug!(kind = %key.kind(), format = label, "parsed private key");
        Ok(key)
    }

    /// Read and parse a private key file.
    ///
    /// # Errors
    /// Returns `AuthError::ReadKey` if the file cannot be read, otherwise as [`Self::parse`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| AuthError::ReadKey {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&bytes)
    }

    fn new(inner: Inner) -> Result<Self> {
        let mut public_blob = Vec::new();
        public_key_data(&inner)?
            .encode(&mut public_blob)
            .map_err(|e| AuthError::KeyParse(format!("cannot encode public key: {e}")))?;
        Ok(Self { inner, public_blob })
    }

    /// Which kind of key this is.
    pub fn kind(&self) -> KeyKind {
        match self.inner {
            Inner::Rsa(_) => KeyKind::Rsa,
            Inner::Ecdsa(_) => KeyKind::Ecdsa,
        }
    }

    /// Algorithm used for signatures made with this key.
    pub fn signing_algorithm(&self) -> SigningAlgorithm {
        match self.inner {
            Inner::Rsa(_) => SigningAlgorithm::RsaSha512,
            Inner::Ecdsa(_) => SigningAlgorithm::EcdsaSha512,
        }
    }

    /// SSH wire encoding of the public half.
    pub fn public_blob(&self) -> &[u8] {
        &self.public_blob
    }

    /// MD5 fingerprint of the public half.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_public_blob(&self.public_blob)
    }

    /// Sign `data` over a SHA-512 digest.
    ///
    /// RSA produces a PKCS#1 v1.5 signature; ECDSA produces an ASN.1 DER
    /// encoded `(r, s)` pair.
    pub(crate) fn sign_sha512(&self, data: &[u8]) -> Result<Vec<u8>> {
        let digest = Sha512::digest(data);
        let failed = |e: p256::ecdsa::Error| AuthError::Signing(e.to_string());

        match &self.inner {
            Inner::Rsa(key) => key
                .sign_with_rng(
                    &mut rand::thread_rng(),
                    Pkcs1v15Sign::new::<Sha512>(),
                    &digest,
                )
                .map_err(|e| AuthError::Signing(e.to_string())),
            Inner::Ecdsa(EcdsaKey::P256(key)) => {
                let signature: p256::ecdsa::Signature = key.sign_prehash(&digest).map_err(failed)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            Inner::Ecdsa(EcdsaKey::P384(key)) => {
                let signature: p384::ecdsa::Signature = key.sign_prehash(&digest).map_err(failed)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            Inner::Ecdsa(EcdsaKey::P521(key)) => {
                let signature: p521::ecdsa::Signature = key.sign_prehash(&digest).map_err(failed)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("kind", &self.kind())
            .field("fingerprint", &self.fingerprint().display())
            .finish_non_exhaustive()
    }
}

fn from_openssh(text: &str) -> Result<Inner> {
    let key =
        ssh_key::PrivateKey::from_openssh(text).map_err(|e| AuthError::KeyParse(e.to_string()))?;
    if key.is_encrypted() {
        return Err(encrypted());
    }

    match key.key_data() {
        KeypairData::Rsa(pair) => rsa_from_openssh(pair).map(|key| Inner::Rsa(Box::new(key))),
        KeypairData::Ecdsa(pair) => ecdsa_from_openssh(pair).map(Inner::Ecdsa),
        KeypairData::Ed25519(_) => Err(unsupported(KeyKind::Ed25519)),
        KeypairData::Dsa(_) => Err(unsupported(KeyKind::Dsa)),
        _ => Err(AuthError::KeyParse(
            "unsupported OpenSSH key type".to_string(),
        )),
    }
}

fn from_sec1(text: &str) -> Result<Inner> {
    if let Ok(secret) = p256::SecretKey::from_sec1_pem(text) {
        return Ok(Inner::Ecdsa(EcdsaKey::P256(secret.into())));
    }
    if let Ok(secret) = p384::SecretKey::from_sec1_pem(text) {
        return Ok(Inner::Ecdsa(EcdsaKey::P384(secret.into())));
    }
    p521::SecretKey::from_sec1_pem(text)
        .ok()
        .and_then(|secret| p521::ecdsa::SigningKey::from_bytes(&secret.to_bytes()).ok())
        .map(|key| Inner::Ecdsa(EcdsaKey::P521(key)))
        .ok_or_else(|| {
            AuthError::KeyParse("EC key is malformed or not on a NIST P curve".to_string())
        })
}

fn from_pkcs8(text: &str) -> Result<Inner> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(text) {
        return Ok(Inner::Rsa(Box::new(key)));
    }
    if let Ok(secret) = p256::SecretKey::from_pkcs8_pem(text) {
        return Ok(Inner::Ecdsa(EcdsaKey::P256(secret.into())));
    }
    if let Ok(secret) = p384::SecretKey::from_pkcs8_pem(text) {
        return Ok(Inner::Ecdsa(EcdsaKey::P384(secret.into())));
    }
    p521::SecretKey::from_pkcs8_pem(text)
        .ok()
        .and_then(|secret| p521::ecdsa::SigningKey::from_bytes(&secret.to_bytes()).ok())
        .map(|key| Inner::Ecdsa(EcdsaKey::P521(key)))
        .ok_or_else(|| {
            AuthError::KeyParse("PKCS#8 key is not RSA or ECDSA on a NIST P curve".to_string())
        })
}

fn rsa_from_openssh(pair: &RsaKeypair) -> Result<RsaPrivateKey> {
    let component = |bytes: Option<&[u8]>| {
        bytes
            .map(BigUint::from_bytes_be)
            .ok_or_else(|| AuthError::KeyParse("negative RSA key component".to_string()))
    };

    let n = component(pair.public.n.as_positive_bytes())?;
    let e = component(pair.public.e.as_positive_bytes())?;
    let d = component(pair.private.d.as_positive_bytes())?;
    let p = component(pair.private.p.as_positive_bytes())?;
    let q = component(pair.private.q.as_positive_bytes())?;

    RsaPrivateKey::from_components(n, e, d, vec![p, q])
        .map_err(|e| AuthError::KeyParse(e.to_string()))
}

fn ecdsa_from_openssh(pair: &EcdsaKeypair) -> Result<EcdsaKey> {
    let invalid = |_| AuthError::KeyParse("invalid ECDSA private scalar".to_string());

    match pair {
        EcdsaKeypair::NistP256 { private, .. } => {
            p256::ecdsa::SigningKey::from_slice(private.as_slice())
                .map(EcdsaKey::P256)
                .map_err(invalid)
        }
        EcdsaKeypair::NistP384 { private, .. } => {
            p384::ecdsa::SigningKey::from_slice(private.as_slice())
                .map(EcdsaKey::P384)
                .map_err(invalid)
        }
        EcdsaKeypair::NistP521 { private, .. } => {
            p521::ecdsa::SigningKey::from_slice(private.as_slice())
                .map(EcdsaKey::P521)
                .map_err(invalid)
        }
    }
}

/// OpenSSH public key for the private half held in `inner`.
fn public_key_data(inner: &Inner) -> Result<KeyData> {
    let invalid = |e: ssh_key::Error| AuthError::KeyParse(format!("invalid public key: {e}"));

    let key_data = match inner {
        Inner::Rsa(key) => KeyData::Rsa(RsaPublicKey {
            e: Mpint::from_positive_bytes(&key.e().to_bytes_be()).map_err(invalid)?,
            n: Mpint::from_positive_bytes(&key.n().to_bytes_be()).map_err(invalid)?,
        }),
        Inner::Ecdsa(key) => {
            KeyData::Ecdsa(EcdsaPublicKey::from_sec1_bytes(&key.public_point()).map_err(invalid)?)
        }
    };
    Ok(key_data)
}

/// Label of the first `-----BEGIN <label>-----` line.
fn pem_label(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("-----BEGIN ")?.strip_suffix("-----"))
}

fn unsupported(kind: KeyKind) -> AuthError {
    AuthError::KeyParse(format!("unsupported key type: {kind}"))
}

fn encrypted() -> AuthError {
    AuthError::KeyParse("passphrase-protected keys are not supported".to_string())
}
