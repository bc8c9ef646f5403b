//! Shared helpers for the storage integration tests. Each test binary uses
//! a different subset.
#![allow(dead_code, unused_imports)]

pub mod fixtures;
pub mod memory;
pub mod mocks;

pub use fixtures::{pack_id, seeded_bytes, sha256_hash};
pub use memory::RssWatch;
pub use mocks::{InstrumentedBackend, MockLargeListingBackend};
