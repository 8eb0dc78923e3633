// ABOUTME: MD5 fingerprints of SSH public key blobs.
// ABOUTME: Renders compact hex for matching and colon-delimited hex for display.

use md5::{Digest, Md5};
use std::fmt;

/// MD5 fingerprint of a public key's SSH wire encoding.
///
/// The compact form (`fe64fc2c...`) is used for matching against a
/// caller-supplied key id; the display form (`fe:64:fc:2c:...`) is used in
/// the `keyId` of a signed request and for human-facing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Compute the fingerprint of an SSH wire-encoded public key blob.
    pub fn of_public_blob(blob: &[u8]) -> Self {
        let mut digest = [0u8; 16];
        digest.copy_from_slice(&Md5::digest(blob));
        Self(digest)
    }

    /// Lowercase hex digest with no separators.
    pub fn compact(&self) -> String {
        hex::encode(self.0)
    }

    /// Lowercase hex digest with a colon between every byte.
    pub fn display(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Whether a caller-supplied fingerprint (any accepted form) names this key.
    pub fn matches(&self, supplied: &str) -> bool {
        normalize_fingerprint(supplied) == self.compact()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Normalize a caller-supplied fingerprint to compact form.
///
/// Accepts colon or compact form, an optional `MD5:` prefix, and either case.
pub fn normalize_fingerprint(supplied: &str) -> String {
    let trimmed = supplied.trim();
    let without_prefix = trimmed
        .get(..4)
        .filter(|p| p.eq_ignore_ascii_case("md5:"))
        .map_or(trimmed, |_| &trimmed[4..]);

    without_prefix
        .chars()
        .filter(|c| *c != ':')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
