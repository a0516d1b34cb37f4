//! Authorized public keys.
//!
//! Keys are indexed by their wire encoding, the same bytes an SSH transport
//! hands over for the key a client presented.

use ssh_key::{HashAlg, PublicKey};
use thiserror::Error;

/// Failure to read an OpenSSH public key line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid public key on line {line}: {reason}")]
pub struct KeyError {
    pub line: usize,
    pub reason: String,
}

/// A public key allowed to authenticate as some user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthorizedKey {
    wire: Vec<u8>,
    algorithm: String,
    comment: String,
    fingerprint: String,
}

impl AuthorizedKey {
    /// Parse a single `authorized_keys`-style line (`<algo> <base64> [comment]`).
    pub fn from_openssh(line: &str) -> Result<Self, KeyError> {
        let key = PublicKey::from_openssh(line.trim()).map_err(|e| KeyError {
            line: 1,
            reason: e.to_string(),
        })?;
        Self::from_public_key(&key).map_err(|reason| KeyError { line: 1, reason })
    }

    /// Build from wire-encoded key bytes, as presented during a handshake.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, KeyError> {
        let key = PublicKey::from_bytes(bytes).map_err(|e| KeyError {
            line: 1,
            reason: e.to_string(),
        })?;
        Self::from_public_key(&key).map_err(|reason| KeyError { line: 1, reason })
    }

    fn from_public_key(key: &PublicKey) -> Result<Self, String> {
        let wire = key.to_bytes().map_err(|e| e.to_string())?;
        Ok(Self {
            wire,
            algorithm: key.algorithm().as_str().to_string(),
            comment: key.comment().to_string(),
            fingerprint: key.fingerprint(HashAlg::Sha256).to_string(),
        })
    }

    /// Wire-encoded key bytes.
    #[inline]
    pub fn wire(&self) -> &[u8] {
        &self.wire
    }

    /// Key algorithm, e.g. `ssh-ed25519`.
    #[inline]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    #[inline]
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// SHA-256 fingerprint, e.g. `SHA256:...`.
    #[inline]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Parse every key in an `authorized_keys` file body.
///
/// Blank lines and `#` comments are skipped. Line numbers in errors are 1-based.
pub fn parse_authorized_keys(contents: &str) -> Result<Vec<AuthorizedKey>, KeyError> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            AuthorizedKey::from_openssh(line).map_err(|e| KeyError {
                line: i + 1,
                reason: e.reason,
            })
        })
        .collect()
}
