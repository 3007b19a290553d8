//! Scene cache for the climatology pipeline.
//!
//! Provides:
//! - A key→blob store over `object_store` (local directory or memory)
//! - The binary cache-entry format
//! - [`SceneCache`], which validates entries on read and self-heals on corruption

pub mod codec;
pub mod error;
pub mod object_store;
pub mod scene_cache;

pub use self::object_store::{BlobStore, BlobStoreConfig, StorageStats};
pub use codec::{decode_entry, encode_entry, CacheEntry, CacheEntryMeta};
pub use error::{CacheError, CacheResult};
pub use scene_cache::{CacheStats, SceneCache};
