//! Posting list engine for kwstore
//!
//! This crate ties the storage layer together:
//! - Engine: open/close, append, optimize, stats
//! - Journal: append-only write journal with removal tombstones
//! - ContainerCache: open containers, write-back and eviction
//! - optimizer: journal migration, merging, journal rewrite
//! - PostingList: per-term hits / append / remove
//! - EngineConfig: `kwstore.toml`
//!
//! The engine is the only component that knows about:
//! - Lock ordering across journal, containers and cache
//! - When journal entries may be dropped from disk

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod journal;
pub mod optimizer;
pub mod posting_list;

pub use cache::{ContainerCache, FlushReport};
pub use config::{EngineConfig, CONFIG_FILE_NAME};
pub use engine::{Engine, EngineStats};
pub use journal::{Journal, Pending};
pub use optimizer::{OptimizeOptions, OptimizeReport};
pub use posting_list::PostingList;
