//! Core types for kwstore
//!
//! This crate defines the foundational pieces shared by the storage and
//! engine layers:
//! - Error: Error type hierarchy
//! - HitSet: set of message index positions
//! - intset: integer set codec (literal / compressed bitmask)
//! - Signature, SignatureHasher: term signatures, optionally keyed
//! - Limits: signature length, container budget, codec threshold

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hitset;
pub mod intset;
pub mod limits;
pub mod signature;

pub use error::{Error, Result};
pub use hitset::{HitSet, MsgIdx};
pub use intset::{pack, unpack, COMPRESSED_MARKER};
pub use limits::{
    Limits, DEFAULT_LITERAL_MAX, DEFAULT_MAX_ITEMS, MAX_MSGID_SIGNATURE, MAX_SIGNATURE_LEN,
};
pub use signature::{Signature, SignatureHasher};
