//! Persisted Cid map for separate compilation
//!
//! Units compiled at different times must agree on every class's Cid, so the
//! encoding of one build is saved and fed back into the encoder of the next.
//! The encoder uses it to break ordering ties and refuses to silently produce
//! a different Cid for a class it names.

mod cid_cache;
mod error;
mod hash;

pub use cid_cache::{CidCache, CidEntry};
pub use error::{CacheError, Result};
pub use hash::hash_hierarchy;

/// Cache format version - increment when the on-disk layout changes
pub const CACHE_VERSION: u32 = 1;

/// Default file name of the persisted Cid map
pub const CID_CACHE_FILE_NAME: &str = "cids.bin";
