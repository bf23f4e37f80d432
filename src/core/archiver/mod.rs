//! Archiver boundary
//!
//! The pipeline hands every stabilized bundle definition to an [`Archiver`] in a
//! single blocking call and gets back one [`BundleBuildResult`] per working name.
//! Any failure aborts the build before a catalog is written.

mod file;

pub use file::{read_bundle, ArchivedMember, FileArchiver, BUNDLE_MAGIC};

use crate::error::PackError;
use crate::grouper::BundleInputDefinition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// What the archiver reports for one written bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleBuildResult {
    /// Content hash of the bundle payload
    pub hash: String,

    /// CRC32 of the bytes on disk
    pub crc: u32,

    /// Working names of the bundles this one depends on
    pub dependencies: Vec<String>,

    /// Size of the written file in bytes
    pub file_size: u64,

    /// Path of the written file
    pub file_name: String,
}

/// Working name -> build result
pub type ArchiveOutput = BTreeMap<String, BundleBuildResult>;

/// Everything the archiver needs for one build
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    /// Directory bundles are written to, named by working name
    pub staging_dir: PathBuf,

    pub definitions: Vec<BundleInputDefinition>,

    /// Asset path -> asset paths it references
    pub references: BTreeMap<String, Vec<String>>,
}

/// Non-success return from an archiver
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("archiver returned {code}: {reason}")]
pub struct ArchiveFailure {
    pub code: i32,
    pub reason: String,
}

impl ArchiveFailure {
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        ArchiveFailure {
            code,
            reason: reason.into(),
        }
    }
}

impl From<ArchiveFailure> for PackError {
    fn from(failure: ArchiveFailure) -> Self {
        PackError::Archiver {
            code: failure.code,
            reason: failure.reason,
        }
    }
}

/// Writes bundles for a set of definitions
pub trait Archiver {
    fn build(&mut self, request: &ArchiveRequest) -> Result<ArchiveOutput, ArchiveFailure>;
}

impl<A: Archiver + ?Sized> Archiver for Box<A> {
    fn build(&mut self, request: &ArchiveRequest) -> Result<ArchiveOutput, ArchiveFailure> {
        (**self).build(request)
    }
}
