//! Name and content hashes used by the lookup tables.
//!
//! All string hashes are computed over the UTF-8 bytes of the string.

use xxhash_rust::xxh32::xxh32;
use xxhash_rust::xxh3::xxh3_64;

/// 64-bit hash of a canonical name, table name or row identity (XXH3).
pub fn name_hash(name: &str) -> u64 {
    xxh3_64(name.as_bytes())
}

/// 32-bit hash of a canonical name (XXH32, seed 0).
pub fn name_hash32(name: &str) -> u32 {
    xxh32(name.as_bytes(), 0)
}

/// 64-bit hash of decompressed file contents (XXH3).
pub fn content_hash(data: &[u8]) -> u64 {
    xxh3_64(data)
}
