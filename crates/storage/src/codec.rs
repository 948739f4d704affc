//! Encryption-at-rest seam
//!
//! Container files are passed whole through a [`StorageCodec`]; the journal
//! passes each appended batch through it as one `@` chunk. The embedding
//! application supplies the encrypting codec (typically one that drives an
//! external helper such as GnuPG). [`IdentityCodec`] stores plain text.

/// Byte transform applied to everything the index writes.
///
/// Implementations are shared between worker threads, hence `Send + Sync`.
pub trait StorageCodec: Send + Sync {
    /// Transform plain bytes into their stored form.
    fn encode(&self, data: &[u8]) -> Vec<u8>;

    /// Recover plain bytes, failing on a wrong key or damaged input.
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Short name used in diagnostics
    fn codec_id(&self) -> &str;

    /// True when encode/decode pass bytes through untouched.
    ///
    /// The journal skips chunk framing for such codecs.
    fn is_identity(&self) -> bool {
        false
    }
}

/// Failure to decode stored bytes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The stored bytes could not be turned back into plain text.
    #[error("{codec_id} could not decode {data_len} bytes: {detail}")]
    DecodeError {
        /// What went wrong
        detail: String,
        /// Codec that attempted the decode
        codec_id: String,
        /// Length of the rejected input
        data_len: usize,
    },
}

impl CodecError {
    /// Build a decode error.
    pub fn decode(detail: impl Into<String>, codec_id: impl Into<String>, data_len: usize) -> Self {
        CodecError::DecodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
            data_len,
        }
    }
}

/// Plain-text storage
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl StorageCodec for IdentityCodec {
    fn encode(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(data.to_vec())
    }

    fn codec_id(&self) -> &str {
        "identity"
    }

    fn is_identity(&self) -> bool {
        true
    }
}
