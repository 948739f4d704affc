//! Term signatures
//!
//! A signature is the first `len` lowercase hex characters of a one-way
//! digest of the term: plain SHA-256, or HMAC-SHA256 when the index is
//! obfuscated with an application key. Hex keeps file names safe on
//! case-insensitive filesystems, and every additional prefix character
//! fans a container out 16 ways.
//!
//! Signatures are stable for a given (term, key) pair across restarts, so
//! an index written with a key stays queryable only with that same key.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::limits::MAX_SIGNATURE_LEN;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Signature
// ============================================================================

/// Fixed-length, filesystem-safe hash of a search term
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(String);

impl Signature {
    /// Validate an externally supplied signature.
    ///
    /// Accepts 1..=24 hex characters (either case, stored lowercase).
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() || text.len() > MAX_SIGNATURE_LEN {
            return Err(Error::InvalidSignature(format!(
                "length {} outside 1..={}",
                text.len(),
                MAX_SIGNATURE_LEN
            )));
        }
        if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidSignature(format!("{:?} is not hex", text)));
        }
        Ok(Signature(text.to_ascii_lowercase()))
    }

    /// Signature text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Signatures are never empty; provided for API symmetry
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first `n` characters (the whole signature if shorter)
    pub fn prefix(&self, n: usize) -> &str {
        &self.0[..n.min(self.0.len())]
    }

    /// True when this signature falls under container prefix `prefix`
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Signature {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SignatureHasher
// ============================================================================

/// Maps terms to signatures, optionally keyed
#[derive(Clone)]
pub struct SignatureHasher {
    len: usize,
    mac: Option<HmacSha256>,
}

impl fmt::Debug for SignatureHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureHasher")
            .field("len", &self.len)
            .field("keyed", &self.mac.is_some())
            .finish()
    }
}

impl SignatureHasher {
    /// Unkeyed hasher producing `len`-character signatures.
    pub fn new(len: usize) -> Result<Self> {
        Self::validate_len(len)?;
        Ok(SignatureHasher { len, mac: None })
    }

    /// Keyed hasher: signatures are HMAC-SHA256(key, term).
    pub fn with_key(len: usize, key: &[u8]) -> Result<Self> {
        Self::validate_len(len)?;
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| Error::InvalidConfig(format!("index key rejected: {}", e)))?;
        Ok(SignatureHasher {
            len,
            mac: Some(mac),
        })
    }

    fn validate_len(len: usize) -> Result<()> {
        if len == 0 || len > MAX_SIGNATURE_LEN {
            return Err(Error::InvalidConfig(format!(
                "signature length must be in 1..={}, got {}",
                MAX_SIGNATURE_LEN, len
            )));
        }
        Ok(())
    }

    /// Signature length produced by this hasher
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when signatures are keyed
    pub fn is_keyed(&self) -> bool {
        self.mac.is_some()
    }

    /// Hash a term.
    pub fn hash(&self, term: &str) -> Signature {
        let digest: Vec<u8> = match &self.mac {
            Some(mac) => mac
                .clone()
                .chain_update(term.as_bytes())
                .finalize()
                .into_bytes()
                .to_vec(),
            None => Sha256::digest(term.as_bytes()).to_vec(),
        };

        let mut text = String::with_capacity(self.len + 1);
        for byte in digest.iter().take((self.len + 1) / 2) {
            text.push_str(&format!("{:02x}", byte));
        }
        text.truncate(self.len);
        Signature(text)
    }
}
