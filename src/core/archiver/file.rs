//! Reference archiver writing zstd-compressed member tables
//!
//! **Format**: `[magic: 4][method: u8][payload_len: u64 LE][zstd(bincode(members))]`
//!
//! - `hash` is xxh3-128 of the uncompressed payload
//! - `crc` is CRC32 of the full file as written
//! - dependencies come from the request's reference map: a bundle depends on
//!   every other bundle that holds an asset one of its members references

use super::{ArchiveFailure, ArchiveOutput, ArchiveRequest, Archiver, BundleBuildResult};
use crate::error::{PackError, Result};
use crate::hashing::hash_bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Leading bytes of every bundle written by [`FileArchiver`]
pub const BUNDLE_MAGIC: &[u8; 4] = b"BPK1";

const METHOD_ZSTD: u8 = 2;
const HEADER_LEN: usize = 4 + 1 + 8;

/// Failure codes reported by [`FileArchiver`]
const CODE_MISSING_SOURCE: i32 = -2;
const CODE_WRITE_FAILED: i32 = -3;
const CODE_ENCODE_FAILED: i32 = -4;

/// One member stored in a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedMember {
    pub addressable_name: String,
    pub asset_path: String,
    pub data: Vec<u8>,
}

/// Archiver that reads members from a content root and writes one file per bundle
#[derive(Debug, Clone)]
pub struct FileArchiver {
    content_root: PathBuf,
    level: i32,
}

impl FileArchiver {
    pub fn new<P: AsRef<Path>>(content_root: P) -> Self {
        FileArchiver {
            content_root: content_root.as_ref().to_path_buf(),
            level: 3,
        }
    }

    /// Set the zstd compression level
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn encode(&self, members: &[ArchivedMember]) -> std::result::Result<(Vec<u8>, String), ArchiveFailure> {
        let payload = bincode::serialize(members)
            .map_err(|e| ArchiveFailure::new(CODE_ENCODE_FAILED, e.to_string()))?;
        let hash = hash_bytes(&payload);

        let compressed = zstd::bulk::compress(&payload, self.level)
            .map_err(|e| ArchiveFailure::new(CODE_ENCODE_FAILED, format!("Zstd compression failed: {}", e)))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + compressed.len());
        bytes.extend_from_slice(BUNDLE_MAGIC);
        bytes.push(METHOD_ZSTD);
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&compressed);

        Ok((bytes, hash))
    }
}

impl Archiver for FileArchiver {
    fn build(&mut self, request: &ArchiveRequest) -> std::result::Result<ArchiveOutput, ArchiveFailure> {
        std::fs::create_dir_all(&request.staging_dir).map_err(|e| {
            ArchiveFailure::new(
                CODE_WRITE_FAILED,
                format!("Failed to create staging dir {}: {}", request.staging_dir.display(), e),
            )
        })?;

        let mut owner: HashMap<&str, &str> = HashMap::new();
        for def in &request.definitions {
            for member in &def.members {
                owner.insert(member.as_str(), def.name.as_str());
            }
        }

        let mut output = ArchiveOutput::new();

        for def in &request.definitions {
            let mut members = Vec::with_capacity(def.members.len());
            let mut dependencies = BTreeSet::new();

            for (asset_path, addressable_name) in def.members.iter().zip(&def.addressable_names) {
                let source = self.content_root.join(asset_path);
                let data = std::fs::read(&source).map_err(|e| {
                    ArchiveFailure::new(
                        CODE_MISSING_SOURCE,
                        format!("Failed to read {}: {}", source.display(), e),
                    )
                })?;

                for referenced in request.references.get(asset_path).into_iter().flatten() {
                    if let Some(&bundle) = owner.get(referenced.as_str()) {
                        if bundle != def.name {
                            dependencies.insert(bundle.to_string());
                        }
                    }
                }

                members.push(ArchivedMember {
                    addressable_name: addressable_name.clone(),
                    asset_path: asset_path.clone(),
                    data,
                });
            }

            let (bytes, hash) = self.encode(&members)?;
            let target = request.staging_dir.join(&def.name);
            std::fs::write(&target, &bytes).map_err(|e| {
                ArchiveFailure::new(
                    CODE_WRITE_FAILED,
                    format!("Failed to write {}: {}", target.display(), e),
                )
            })?;

            debug!(
                "Archived {} ({} members, {} bytes)",
                def.name,
                members.len(),
                bytes.len()
            );

            output.insert(
                def.name.clone(),
                BundleBuildResult {
                    hash,
                    crc: crc32fast::hash(&bytes),
                    dependencies: dependencies.into_iter().collect(),
                    file_size: bytes.len() as u64,
                    file_name: target.to_string_lossy().into_owned(),
                },
            );
        }

        Ok(output)
    }
}

/// Read back the members of a bundle written by [`FileArchiver`]
pub fn read_bundle<P: AsRef<Path>>(path: P) -> Result<Vec<ArchivedMember>> {
    let bytes = std::fs::read(path.as_ref())?;
    if bytes.len() < HEADER_LEN || &bytes[..4] != BUNDLE_MAGIC {
        return Err(PackError::InvalidLocation(format!(
            "{} is not a bundle",
            path.as_ref().display()
        )));
    }
    if bytes[4] != METHOD_ZSTD {
        return Err(PackError::InvalidLocation(format!(
            "unknown compression method {}",
            bytes[4]
        )));
    }

    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[5..HEADER_LEN]);
    let payload_len = u64::from_le_bytes(len);

    // The header length is only checked, never used to size the buffer
    let payload = zstd::stream::decode_all(&bytes[HEADER_LEN..])?;
    if payload.len() as u64 != payload_len {
        return Err(PackError::InvalidLocation(format!(
            "{} declares {} payload bytes but holds {}",
            path.as_ref().display(),
            payload_len,
            payload.len()
        )));
    }
    Ok(bincode::deserialize(&payload)?)
}
