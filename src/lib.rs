//! kwstore - posting list storage engine for a personal mail search index
//!
//! kwstore maps search terms to sets of message index positions. New
//! associations are appended to a write journal and migrated later into
//! sharded container files that split themselves when they grow too large.
//!
//! # Quick Start
//!
//! ```no_run
//! use kwstore::{Engine, OptimizeOptions};
//!
//! # fn main() -> kwstore::Result<()> {
//! let engine = Engine::open_default("/tmp/mail-index")?;
//! engine.append("invoice", [1, 2, 3])?;
//! let hits = engine.posting_list("invoice").hits()?;
//! assert!(hits.contains(2));
//!
//! engine.optimize(OptimizeOptions::full())?;
//! engine.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `kwstore-core`: errors, hit sets, the integer set codec, term signatures
//! - `kwstore-storage`: container files, layout, splitting, storage codecs
//! - `kwstore-engine`: journal, container cache, optimizer, `Engine`

pub use kwstore_core::{intset, Error, HitSet, Limits, MsgIdx, Result, Signature, SignatureHasher};
pub use kwstore_engine::{
    Engine, EngineConfig, EngineStats, FlushReport, OptimizeOptions, OptimizeReport, PostingList,
};
pub use kwstore_storage::{CodecError, IdentityCodec, StorageCodec};
