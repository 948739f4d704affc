//! Error types for kwstore
//!
//! This module defines all error types used throughout the engine.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! # Propagation
//!
//! - Missing container files are never errors (absence means "no hits yet").
//! - Corrupt lines are skipped by the parsers and never surface here.
//! - Write, decode and crypto failures propagate to the caller.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kwstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the posting list engine
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The storage codec could not decode a file (wrong key, damaged ciphertext)
    #[error("Decode error in {path}: {detail}")]
    Decode {
        /// File that failed to decode
        path: PathBuf,
        /// Codec-provided description
        detail: String,
    },

    /// Data corruption detected in a value that had to be decoded
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A signature supplied by a caller is malformed
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Configuration value out of range or unparseable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build a corruption error from anything printable.
    pub fn corruption(detail: impl Into<String>) -> Self {
        Error::Corruption(detail.into())
    }

    /// True when the error came from the codec rather than the filesystem.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}
