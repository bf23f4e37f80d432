//! Entries, groups and the per-group bundle schema
//!
//! Groups are build-time only: they decide how entries are packed and where the
//! resulting bundles go, but they never appear in a catalog.

use serde::{Deserialize, Serialize};

/// Profile variable holding the default local build directory
pub const LOCAL_BUILD_PATH: &str = "[Local.BuildPath]";

/// Profile variable holding the default local runtime load path
pub const LOCAL_LOAD_PATH: &str = "[Local.LoadPath]";

/// Default provider ids written into locations
pub const BUNDLE_PROVIDER: &str = "BundleProvider";
pub const ASSET_PROVIDER: &str = "BundledAssetProvider";
pub const SCENE_PROVIDER: &str = "SceneProvider";

/// Source kind of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Regular asset, packed into an `_assets_` bundle
    #[default]
    Asset,
    /// Scene/playable, packed into a `_scenes_` bundle
    Scene,
    /// Container that expands to its children
    Folder,
    /// Unrecognized file type
    Unknown,
}

/// A named content item to be packaged
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entry {
    /// Stable identifier
    pub guid: String,

    /// Logical address used as the first catalog key
    pub address: String,

    /// Source path relative to the content root
    pub asset_path: String,

    /// Labels in the order they were assigned
    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub kind: EntryKind,

    /// Children of a `Folder` entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Entry>,

    /// Source size in bytes
    #[serde(default)]
    pub size: u64,

    /// Hash of the entry and everything it depends on, used by content updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_hash: Option<String>,

    /// Asset paths this entry references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl Entry {
    /// Create a regular asset entry
    pub fn new(
        guid: impl Into<String>,
        address: impl Into<String>,
        asset_path: impl Into<String>,
    ) -> Self {
        Entry {
            guid: guid.into(),
            address: address.into(),
            asset_path: asset_path.into(),
            labels: Vec::new(),
            kind: EntryKind::Asset,
            children: Vec::new(),
            size: 0,
            dependency_hash: None,
            references: Vec::new(),
        }
    }

    /// Create a folder entry that expands to `children`
    pub fn folder(
        guid: impl Into<String>,
        address: impl Into<String>,
        asset_path: impl Into<String>,
        children: Vec<Entry>,
    ) -> Self {
        Entry {
            kind: EntryKind::Folder,
            children,
            ..Entry::new(guid, address, asset_path)
        }
    }

    pub fn with_kind(mut self, kind: EntryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_dependency_hash(mut self, hash: impl Into<String>) -> Self {
        self.dependency_hash = Some(hash.into());
        self
    }

    pub fn with_reference(mut self, asset_path: impl Into<String>) -> Self {
        self.references.push(asset_path.into());
        self
    }

    pub fn is_scene(&self) -> bool {
        self.kind == EntryKind::Scene
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    /// Recursively expand folders into their leaf entries
    pub fn gather_all(&self, out: &mut Vec<Entry>) {
        if self.is_folder() {
            for child in &self.children {
                child.gather_all(out);
            }
        } else {
            out.push(self.clone());
        }
    }
}

/// How the entries of a group are split into bundles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PackingPolicy {
    #[default]
    Together,
    Separately,
    ByLabelSet,
}

/// What the group hash prefix of a bundle name is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NamingMode {
    #[default]
    GroupGuid,
    GroupGuidProjectIdHash,
    GroupGuidProjectIdEntriesHash,
}

/// How the archiver hash shows up in the final bundle file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BundleNaming {
    /// `name_{hash}.bundle`
    #[default]
    AppendHash,
    /// `name.bundle`; the hash is carried temporarily and stripped after the move
    NoHash,
    /// `{hash}.bundle`
    OnlyHash,
    /// `{hash of name}.bundle`
    FileNameHash,
}

impl BundleNaming {
    /// Apply this naming style to a `.bundle` file name
    pub fn apply(self, hash: &str, bundle_name: &str) -> String {
        match self {
            BundleNaming::AppendHash => {
                bundle_name.replace(".bundle", &format!("_{}.bundle", hash))
            }
            BundleNaming::NoHash => bundle_name.to_string(),
            BundleNaming::OnlyHash => format!("{}.bundle", hash),
            BundleNaming::FileNameHash => {
                format!("{}.bundle", crate::hashing::hash_str(bundle_name))
            }
        }
    }
}

/// Runtime load options copied into each bundle location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub use_crc: bool,
    pub use_crc_for_cached_bundles: bool,
    pub use_cache: bool,
    pub chunked_transfer: bool,
    pub redirect_limit: i32,
    pub retry_count: u32,
    pub timeout: u32,
    pub clear_other_cached_versions: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            use_crc: true,
            use_crc_for_cached_bundles: true,
            use_cache: true,
            chunked_transfer: false,
            redirect_limit: -1,
            retry_count: 0,
            timeout: 0,
            clear_other_cached_versions: false,
        }
    }
}

/// Per-group packing and output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleSchema {
    pub packing: PackingPolicy,
    pub naming_mode: NamingMode,
    pub bundle_naming: BundleNaming,

    /// Profile path the bundles are written to
    pub build_path: String,

    /// Profile path the runtime loads bundles from
    pub load_path: String,

    pub include_in_build: bool,
    pub load_options: LoadOptions,
    pub bundle_provider: String,
    pub asset_provider: String,
}

impl Default for BundleSchema {
    fn default() -> Self {
        BundleSchema {
            packing: PackingPolicy::Together,
            naming_mode: NamingMode::GroupGuid,
            bundle_naming: BundleNaming::AppendHash,
            build_path: LOCAL_BUILD_PATH.to_string(),
            load_path: LOCAL_LOAD_PATH.to_string(),
            include_in_build: true,
            load_options: LoadOptions::default(),
            bundle_provider: BUNDLE_PROVIDER.to_string(),
            asset_provider: ASSET_PROVIDER.to_string(),
        }
    }
}

/// A named collection of entries sharing one schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub guid: String,
    pub name: String,
    #[serde(default)]
    pub entries: Vec<Entry>,
    #[serde(default)]
    pub schema: BundleSchema,
}

impl Group {
    pub fn new(guid: impl Into<String>, name: impl Into<String>) -> Self {
        Group {
            guid: guid.into(),
            name: name.into(),
            entries: Vec::new(),
            schema: BundleSchema::default(),
        }
    }

    pub fn with_entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn with_packing(mut self, packing: PackingPolicy) -> Self {
        self.schema.packing = packing;
        self
    }

    pub fn with_naming_mode(mut self, mode: NamingMode) -> Self {
        self.schema.naming_mode = mode;
        self
    }

    pub fn with_bundle_naming(mut self, naming: BundleNaming) -> Self {
        self.schema.bundle_naming = naming;
        self
    }

    pub fn with_paths(mut self, build_path: impl Into<String>, load_path: impl Into<String>) -> Self {
        self.schema.build_path = build_path.into();
        self.schema.load_path = load_path.into();
        self
    }

    /// Whether this group produces bundles in this build
    pub fn is_packed(&self) -> bool {
        self.schema.include_in_build && !self.entries.is_empty()
    }
}
