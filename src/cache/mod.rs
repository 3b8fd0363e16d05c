//! Cache of decompressed basket payloads.
//!
//! Baskets are addressed by their byte offset in the file, so one cache
//! belongs to exactly one open file.

mod lru;

pub use lru::{BasketCache, CacheStats};
