//! Local key-value cache with freshness metadata.
//!
//! This module provides the `CacheManager`, a namespaced key→JSON store
//! that records a last-write timestamp next to every value. Staleness is a
//! read-time computation against a caller-supplied maximum age; nothing
//! expires on its own.
//!
//! Every key can be observed as a live stream of its current value.
//!
//! Layout inside the backing preference document:
//! - `<key>`: the serialized value
//! - `timestamp_<key>`: last write time in epoch milliseconds

pub mod backend;
pub mod error;
pub mod manager;
mod slots;

pub use backend::{Edit, FileStore, MemoryStore, PreferenceStore};
pub use error::CacheError;
pub use manager::CacheManager;
