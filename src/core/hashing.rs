//! Hash helpers shared by the grouper, the stabilizer and the catalog writer
//!
//! Bundle names and group hashes use xxh3-128 rendered as 32 lowercase hex digits.
//! Catalog content hashes use SHA-256 so that remote `.hash` sidecars are stable
//! across builder versions.

use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::{xxh3_128, Xxh3};

/// Hash a single string to 32 hex digits
pub fn hash_str(value: &str) -> String {
    format!("{:032x}", xxh3_128(value.as_bytes()))
}

/// Hash an ordered list of parts
///
/// Each part is length-prefixed so that `["ab", "c"]` and `["a", "bc"]` differ.
pub fn hash_parts<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Xxh3::new();
    for part in parts {
        let bytes = part.as_ref().as_bytes();
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    format!("{:032x}", hasher.digest128())
}

/// Hash raw bytes to 32 hex digits
pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:032x}", xxh3_128(data))
}

/// SHA-256 of serialized catalog content, hex encoded
pub fn content_hash(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
