//! Integration Tests
//!
//! End-to-end behaviour of the posting list engine, one module per concern:
//! - scenarios: the basic append / remove / migrate / codec flows
//! - splitting: container splits and merges at scale
//! - concurrency: parallel writers, readers racing migration
//! - durability: restart replay, tombstones, crash-safe saves, codecs
//! - properties: randomized append/read round trips

#[path = "../common/mod.rs"]
mod common;

mod concurrency;
mod durability;
mod properties;
mod scenarios;
mod splitting;
