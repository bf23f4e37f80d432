//! Catalogs: the build-time description of each output catalog and its serialized form
//!
//! A catalog is written as JSON to `{build_path}/{file_name}`. When a remote
//! catalog is requested, a mirror and a `.hash` sidecar holding the SHA-256 of
//! the serialized text are written to the remote build directory as well.

mod location;
mod options;

pub use location::{Location, LocationId, LocationTable, ResourceType};
pub use options::BundleRequestOptions;

use crate::error::Result;
use crate::hashing::content_hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Locator id of the main catalog
pub const MAIN_CATALOG_ID: &str = "AddressablesMainContentCatalog";

/// One output catalog before serialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogBuildInfo {
    pub identifier: String,

    /// Directory the catalog file is written to
    pub build_path: PathBuf,

    /// Runtime directory the catalog is loaded from
    pub load_path: String,

    pub file_name: String,

    /// Locations in this catalog, in insertion order
    pub locations: Vec<LocationId>,

    /// Whether the catalog is listed in the runtime settings
    pub register: bool,
}

impl CatalogBuildInfo {
    pub fn new(identifier: impl Into<String>, file_name: impl Into<String>) -> Self {
        CatalogBuildInfo {
            identifier: identifier.into(),
            build_path: PathBuf::new(),
            load_path: String::new(),
            file_name: file_name.into(),
            locations: Vec::new(),
            register: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.build_path.join(&self.file_name)
    }

    /// Runtime load path of the catalog file itself
    pub fn runtime_path(&self) -> String {
        format!("{}/{}", self.load_path, self.file_name)
    }

    /// Whether `id` is already part of this catalog
    pub fn contains(&self, id: LocationId) -> bool {
        self.locations.contains(&id)
    }

    /// Append `id` unless it is already present
    pub fn push_unique(&mut self, id: LocationId) -> bool {
        if self.contains(id) {
            return false;
        }
        self.locations.push(id);
        true
    }
}

/// Serialized catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub locator_id: String,

    /// SHA-256 over the hashes of the bundles this catalog references
    pub build_result_hash: String,

    pub provider_ids: Vec<String>,

    /// Sorted by internal id
    pub locations: Vec<Location>,
}

impl CatalogDocument {
    /// Materialize a catalog from its build info
    pub fn from_info(info: &CatalogBuildInfo, table: &LocationTable) -> Self {
        let mut locations: Vec<Location> = info
            .locations
            .iter()
            .filter_map(|id| table.get(*id).cloned())
            .collect();
        locations.sort_by(|a, b| a.internal_id.cmp(&b.internal_id));

        let bundle_hashes: String = locations
            .iter()
            .filter(|loc| loc.is_bundle())
            .filter_map(|loc| loc.data.as_ref().map(|data| data.hash.as_str()))
            .collect::<Vec<_>>()
            .join("");

        let provider_ids: BTreeSet<String> =
            locations.iter().map(|loc| loc.provider.clone()).collect();

        CatalogDocument {
            locator_id: info.identifier.clone(),
            build_result_hash: content_hash(bundle_hashes.as_bytes()),
            provider_ids: provider_ids.into_iter().collect(),
            locations,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a catalog written by [`write_catalog`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Where a remote mirror of a catalog goes
#[derive(Debug, Clone)]
pub struct RemoteCatalogTarget {
    pub build_dir: PathBuf,
    pub load_dir: String,

    /// File name without extension, e.g. `catalog_1.0.0`
    pub stem: String,
}

/// Files produced for one catalog
#[derive(Debug, Clone, Default)]
pub struct CatalogOutputs {
    pub catalog_path: PathBuf,
    pub content_hash: String,
    pub remote_json: Option<PathBuf>,
    pub remote_hash: Option<PathBuf>,

    /// Runtime path of the remote `.hash`, when it was written
    pub remote_hash_load_path: Option<String>,
}

/// Serialize a catalog and write it with its optional remote mirror
///
/// Failing to write the primary file is fatal. Remote mirror failures are
/// logged and leave the corresponding output unset.
pub fn write_catalog(
    info: &CatalogBuildInfo,
    table: &LocationTable,
    remote: Option<&RemoteCatalogTarget>,
) -> Result<CatalogOutputs> {
    let document = CatalogDocument::from_info(info, table);
    let json = document.to_json()?;
    let hash = content_hash(json.as_bytes());

    let catalog_path = info.catalog_path();
    write_file(&catalog_path, json.as_bytes())?;
    info!(
        "Wrote catalog '{}' ({} locations) to {}",
        info.identifier,
        document.locations.len(),
        catalog_path.display()
    );

    let mut outputs = CatalogOutputs {
        catalog_path,
        content_hash: hash.clone(),
        ..CatalogOutputs::default()
    };

    if let Some(remote) = remote {
        let json_path = remote.build_dir.join(format!("{}.json", remote.stem));
        let hash_path = remote.build_dir.join(format!("{}.hash", remote.stem));

        match write_file(&json_path, json.as_bytes()) {
            Ok(()) => outputs.remote_json = Some(json_path),
            Err(e) => error!("Failed to write remote catalog {}: {}", json_path.display(), e),
        }
        match write_file(&hash_path, hash.as_bytes()) {
            Ok(()) => {
                debug!("Wrote catalog hash {}", hash_path.display());
                outputs.remote_hash = Some(hash_path);
                outputs.remote_hash_load_path =
                    Some(format!("{}/{}.hash", remote.load_dir, remote.stem));
            }
            Err(e) => error!("Failed to write catalog hash {}: {}", hash_path.display(), e),
        }
    }

    Ok(outputs)
}

pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes)?;
    Ok(())
}
