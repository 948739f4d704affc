//! Size limits for signatures, containers and the integer set codec
//!
//! Custom limits are chosen when the engine is opened (see the engine
//! config). Changing `signature_len` for an existing index makes old
//! containers unreachable, so treat it as fixed once data exists.

use crate::error::{Error, Result};

/// Longest signature the hasher can produce (hex characters).
pub const MAX_SIGNATURE_LEN: usize = 24;

/// Default container budget (sum of hit-set sizes) before a split.
pub const DEFAULT_MAX_ITEMS: usize = 12_000;

/// Sets with at most this many members are written as literal values.
pub const DEFAULT_LITERAL_MAX: usize = 15;

/// Reserved journal signature tracking the highest message position seen.
pub const MAX_MSGID_SIGNATURE: &str = "_MAX_MSGID_";

/// Limits shared by the storage and engine layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Signature length in characters (1..=24)
    pub signature_len: usize,

    /// Container budget in entries
    pub max_items: usize,

    /// Literal threshold of the integer set codec
    pub literal_max: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            signature_len: MAX_SIGNATURE_LEN,
            max_items: DEFAULT_MAX_ITEMS,
            literal_max: DEFAULT_LITERAL_MAX,
        }
    }
}

impl Limits {
    /// Check every limit is inside its supported range.
    pub fn validate(&self) -> Result<()> {
        if self.signature_len == 0 || self.signature_len > MAX_SIGNATURE_LEN {
            return Err(Error::InvalidConfig(format!(
                "signature_len must be in 1..={}, got {}",
                MAX_SIGNATURE_LEN, self.signature_len
            )));
        }
        if self.max_items == 0 {
            return Err(Error::InvalidConfig(
                "max_items must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
