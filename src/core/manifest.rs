//! Runtime settings manifest
//!
//! `settings.json` is what a player reads first: it names the catalogs to load
//! and how to fetch them.
//!
//! - **Catalog locations**: one per registered catalog, keyed by its locator id
//! - **Hash locations**: for a remote catalog, the remote and cached `.hash`
//!   files the runtime compares before downloading

use crate::catalog::write_file;
use crate::error::Result;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Provider that loads a serialized catalog
pub const CATALOG_PROVIDER: &str = "ContentCatalogProvider";

/// Provider that loads a plain text file
pub const TEXT_PROVIDER: &str = "TextDataProvider";

/// Where cached remote hashes live on the player
const CACHE_HASH_ROOT: &str = "{PersistentDataPath}/bundlepack";

/// Runtime location of a catalog or one of its hash files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogLocationData {
    pub keys: Vec<String>,
    pub internal_id: String,
    pub provider: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl CatalogLocationData {
    pub fn new(key: impl Into<String>, internal_id: impl Into<String>, provider: impl Into<String>) -> Self {
        CatalogLocationData {
            keys: vec![key.into()],
            internal_id: internal_id.into(),
            provider: provider.into(),
            dependencies: Vec::new(),
        }
    }
}

/// Contents of `settings.json`
///
/// # Examples
///
/// ```
/// use bundlepack::core::manifest::RuntimeSettings;
///
/// let mut settings = RuntimeSettings::new("StandaloneLinux64");
/// settings.add_catalog("AddressablesMainContentCatalog", "{RuntimePath}/catalog.json", None, "catalog_1.0.0");
///
/// assert_eq!(settings.catalog_locations.len(), 1);
/// assert_eq!(settings.catalog_locations[0].keys[0], "AddressablesMainContentCatalog");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Version of the tool that wrote the build
    pub builder_version: Version,

    pub build_target: String,
    pub catalog_locations: Vec<CatalogLocationData>,

    pub catalog_request_timeout: u32,
    pub max_concurrent_web_requests: u32,
    pub disable_catalog_update_on_startup: bool,

    /// Creation timestamp (ISO 8601)
    pub created: String,
}

impl RuntimeSettings {
    pub fn new(build_target: impl Into<String>) -> Self {
        let builder_version =
            Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or_else(|_| Version::new(0, 0, 0));

        RuntimeSettings {
            builder_version,
            build_target: build_target.into(),
            catalog_locations: Vec::new(),
            catalog_request_timeout: 0,
            max_concurrent_web_requests: 3,
            disable_catalog_update_on_startup: false,
            created: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Register a catalog
    ///
    /// With a remote hash load path, `{id}RemoteHash` and `{id}CacheHash` text
    /// locations are added and the catalog depends on both.
    pub fn add_catalog(
        &mut self,
        identifier: &str,
        runtime_path: &str,
        remote_hash_load_path: Option<&str>,
        remote_stem: &str,
    ) {
        let mut catalog = CatalogLocationData::new(identifier, runtime_path, CATALOG_PROVIDER);

        if let Some(remote_hash) = remote_hash_load_path {
            let remote_key = format!("{}RemoteHash", identifier);
            let cache_key = format!("{}CacheHash", identifier);
            self.catalog_locations
                .push(CatalogLocationData::new(&remote_key, remote_hash, TEXT_PROVIDER));
            self.catalog_locations.push(CatalogLocationData::new(
                &cache_key,
                format!("{}/{}.hash", CACHE_HASH_ROOT, remote_stem),
                TEXT_PROVIDER,
            ));
            catalog.dependencies = vec![remote_key, cache_key];
        }

        self.catalog_locations.push(catalog);
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_file(path.as_ref(), self.to_json()?.as_bytes())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}
