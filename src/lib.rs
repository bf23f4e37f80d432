//! # bundlepack - Bundle Packing and Multi-Catalog Builds
//!
//! `bundlepack` packs addressable content entries into bundle archives and
//! writes the catalogs a runtime uses to find them:
//!
//! - **Deterministic naming**: bundle names derive from group policy and are
//!   made unique build-wide before archiving
//! - **Hash-aware renames**: final names follow the archiver's content hash
//!   without breaking any catalog cross-reference
//! - **Multiple catalogs**: groups can be routed into extra catalogs, each
//!   closed over its dependencies
//! - **Content updates**: unchanged bundles are pointed back at shipped files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bundlepack::{PackerBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let mut pipeline = PackerBuilder::new()
//!     .config_file("bundlepack.toml")
//!     .content_root("content")
//!     .build()?;
//!
//! let result = pipeline.build(None);
//! if let Some(error) = &result.error {
//!     eprintln!("build failed: {}", error);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Content Updates
//!
//! ```rust,no_run
//! use bundlepack::{ContentState, PackerBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! let previous = ContentState::load("build/content_state.bin")?;
//! let mut pipeline = PackerBuilder::new()
//!     .config_file("bundlepack.toml")
//!     .content_root("content")
//!     .build()?;
//!
//! let result = pipeline.build(Some(&previous));
//! println!("reused {} entries", result.carry_over.len());
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use core::{
    archiver, assembler, catalog, config, content_state, context, error, group, grouper, hashing,
    manifest, partition, pipeline, registry, relocate, stabilizer, validation,
};

// Re-export core types that users need
pub use crate::core::{
    archiver::{ArchiveFailure, ArchiveOutput, ArchiveRequest, Archiver, BundleBuildResult, FileArchiver},
    catalog::{CatalogBuildInfo, CatalogDocument, Location, LocationId, LocationTable, ResourceType},
    config::{BuildSettings, ExternalCatalogConfig, Profile},
    content_state::{CachedAssetState, ContentState},
    error::{ErrorKind, PackError, Result},
    group::{BundleNaming, Entry, EntryKind, Group, NamingMode, PackingPolicy},
    manifest::RuntimeSettings,
    partition::{CatalogSetup, Membership},
    pipeline::{BuildPipeline, BuildResult},
};

use std::path::PathBuf;
use tracing::info;

/// Builder for a configured [`BuildPipeline`]
///
/// Settings come either from a value or from a TOML file. Without a custom
/// archiver, a [`FileArchiver`] reading from the content root is used. With
/// neither, the pipeline can still report on and clean existing output.
///
/// # Examples
///
/// ```rust
/// use bundlepack::{BuildSettings, PackerBuilder};
///
/// # fn main() -> bundlepack::Result<()> {
/// let pipeline = PackerBuilder::new()
///     .settings(BuildSettings::default())
///     .content_root("content")
///     .compression_level(9)
///     .build()?;
///
/// assert_eq!(pipeline.settings().catalog_file_name, "catalog.json");
/// # Ok(())
/// # }
/// ```
pub struct PackerBuilder {
    settings: Option<BuildSettings>,
    config_file: Option<PathBuf>,
    content_root: Option<PathBuf>,
    staging_path: Option<PathBuf>,
    compression_level: Option<i32>,
    archiver: Option<Box<dyn Archiver>>,
}

impl PackerBuilder {
    pub fn new() -> Self {
        PackerBuilder {
            settings: None,
            config_file: None,
            content_root: None,
            staging_path: None,
            compression_level: None,
            archiver: None,
        }
    }

    /// Use these settings (takes precedence over a config file)
    pub fn settings(mut self, settings: BuildSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Load settings from a TOML file
    pub fn config_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Directory entry asset paths are relative to
    pub fn content_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.content_root = Some(path.into());
        self
    }

    /// Override the staging directory from the settings
    pub fn staging_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.staging_path = Some(path.into());
        self
    }

    /// zstd level for the default archiver
    pub fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = Some(level);
        self
    }

    /// Use a custom archiver instead of [`FileArchiver`]
    pub fn archiver<A: Archiver + 'static>(mut self, archiver: A) -> Self {
        self.archiver = Some(Box::new(archiver));
        self
    }

    pub fn build(self) -> Result<BuildPipeline> {
        let mut settings = match (self.settings, self.config_file) {
            (Some(settings), _) => settings,
            (None, Some(path)) => BuildSettings::load(&path)?,
            (None, None) => {
                return Err(PackError::Configuration(
                    "either settings or a config file must be set".to_string(),
                ))
            }
        };
        if let Some(staging) = self.staging_path {
            settings.staging_path = staging;
        }

        let archiver: Option<Box<dyn Archiver>> = match (self.archiver, self.content_root) {
            (Some(archiver), _) => Some(archiver),
            (None, Some(root)) => {
                let mut archiver = FileArchiver::new(root);
                if let Some(level) = self.compression_level {
                    archiver = archiver.with_level(level);
                }
                Some(Box::new(archiver))
            }
            (None, None) => None,
        };

        info!(
            "Configured build for {} groups and {} extra catalogs",
            settings.groups.len(),
            settings.external_catalogs.len()
        );

        Ok(match archiver {
            Some(archiver) => BuildPipeline::new(settings, archiver),
            None => BuildPipeline::without_archiver(settings),
        })
    }
}

impl Default for PackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_settings() {
        let err = PackerBuilder::new().content_root("c").build().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_builder_without_content_root_cannot_build() {
        let mut pipeline = PackerBuilder::new()
            .settings(BuildSettings::default())
            .build()
            .unwrap();
        assert!(!pipeline.is_data_built());

        let result = pipeline.build(None);
        assert!(result.error.unwrap().contains("content root"));
        assert!(result.output_files.is_empty());
    }

    #[test]
    fn test_builder_staging_override() {
        let pipeline = PackerBuilder::new()
            .settings(BuildSettings::default())
            .content_root("content")
            .staging_path("tmp/staging")
            .build()
            .unwrap();
        assert_eq!(pipeline.settings().staging_path, PathBuf::from("tmp/staging"));
    }
}
