//! Storage layer for kwstore
//!
//! This crate implements the on-disk side of the posting list engine:
//! - StorageCodec: encryption-at-rest seam (IdentityCodec by default)
//! - format: file naming, atomic writes and the tab-separated line format
//! - Layout: which signature prefixes have a container file
//! - ContainerStore: postings directory + codec + layout
//! - PostingContainer: one shard (load / get / add / remove / save)
//! - splitter: peels oversized containers into longer-prefix children
//!
//! Caching, the write journal and maintenance live in `kwstore-engine`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod container;
pub mod format;
pub mod layout;
mod splitter;
pub mod store;

pub use codec::{CodecError, IdentityCodec, StorageCodec};
pub use container::{ContainerLock, Entries, PostingContainer, SaveOutcome};
pub use layout::Layout;
pub use store::ContainerStore;
