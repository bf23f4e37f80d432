//! Per-build state
//!
//! One [`BuildContext`] is created for each build and passed by reference
//! through every stage. It owns the location table and all the side indices
//! the stages share; nothing outlives the build.

use crate::catalog::{LocationId, LocationTable};
use crate::registry::FileRegistry;
use crate::relocate::PendingRename;
use crate::stabilizer::NameStabilizer;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// What happened to one bundle, as reported in the build result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleReport {
    pub group_guid: String,

    /// Name the archiver wrote the bundle under
    pub working_name: String,

    /// Final name, with the temporary hash for hash-free groups
    pub final_name: String,

    /// Where the bundle was moved to
    pub file_path: PathBuf,

    /// File stem the runtime identifies the bundle by
    pub internal_bundle_name: String,

    pub hash: String,
    pub crc: u32,
}

/// Shared state of one build
#[derive(Debug, Default)]
pub struct BuildContext {
    pub table: LocationTable,
    pub stabilizer: NameStabilizer,
    pub registry: FileRegistry,

    /// Working bundle name -> internal id right after post-processing
    ///
    /// Content-update reverts rewrite the table but not this map.
    pub bundle_to_internal_id: HashMap<String, String>,

    /// Working bundle name -> bundle location
    pub bundle_locations: HashMap<String, LocationId>,

    /// Entry guid -> working name of the bundle holding it
    pub entry_bundle: HashMap<String, String>,

    /// Location -> owning group guid
    pub location_group: HashMap<LocationId, String>,

    /// Working bundle name -> final output name (hash-free for hash-free groups)
    pub rename_map: BTreeMap<String, String>,

    pub pending_renames: Vec<PendingRename>,
    pub reports: Vec<BundleReport>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group guid owning a location
    pub fn group_of(&self, id: LocationId) -> Option<&str> {
        self.location_group.get(&id).map(String::as_str)
    }
}
