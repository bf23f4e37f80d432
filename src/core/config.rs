//! Build configuration
//!
//! A build is described by one TOML file:
//!
//! ```toml
//! player_version = "1.0.0"
//! build_target = "StandaloneLinux64"
//!
//! [profile]
//! "Local.BuildPath" = "build/[BuildTarget]"
//! "Local.LoadPath" = "{RuntimePath}/[BuildTarget]"
//!
//! [[groups]]
//! guid = "AAA1"
//! name = "Characters"
//!
//! [[external_catalogs]]
//! name = "dlc"
//! build_path = "build/dlc"
//! load_path = "https://cdn.example.com/dlc"
//! groups = ["Characters"]
//! ```
//!
//! Profile values may reference other variables as `[Name]`; `{Name}` tokens
//! are runtime placeholders and are left untouched.

use crate::error::{PackError, Result};
use crate::group::{Group, LOCAL_BUILD_PATH, LOCAL_LOAD_PATH};
use crate::grouper::PackOptions;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

pub const LOCAL_BUILD_PATH_VAR: &str = "Local.BuildPath";
pub const LOCAL_LOAD_PATH_VAR: &str = "Local.LoadPath";
pub const REMOTE_BUILD_PATH_VAR: &str = "Remote.BuildPath";
pub const REMOTE_LOAD_PATH_VAR: &str = "Remote.LoadPath";

/// Built-in variable holding the build target
pub const BUILD_TARGET_VAR: &str = "BuildTarget";

/// Runtime placeholder marking a load path inside the player's local data
pub const RUNTIME_PATH_TOKEN: &str = "{RuntimePath}";

const MAX_EXPANSION_DEPTH: usize = 16;

/// Named profile variables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Profile {
    pub variables: BTreeMap<String, String>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }
}

/// One extra catalog and the groups routed into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalCatalogConfig {
    pub name: String,

    /// Profile path the catalog and its bundles are moved to
    pub build_path: String,

    /// Runtime load path substituted for groups using the default local load path
    pub load_path: String,

    /// Names of the groups that belong to this catalog
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Everything a build needs besides the content itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Semver string; names the versioned remote catalog
    pub player_version: String,
    pub project_id: String,
    pub build_target: String,

    /// Directory the archiver writes working bundles to
    pub staging_path: PathBuf,

    pub settings_file_name: String,
    pub catalog_file_name: String,

    /// Where the content state snapshot of a full build is saved
    pub content_state_path: PathBuf,

    pub ignore_unsupported_files: bool,
    pub build_remote_catalog: bool,

    pub catalog_request_timeout: u32,
    pub max_concurrent_web_requests: u32,
    pub disable_catalog_update_on_startup: bool,

    pub profile: Profile,
    pub groups: Vec<Group>,
    pub external_catalogs: Vec<ExternalCatalogConfig>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        BuildSettings {
            player_version: "1.0.0".to_string(),
            project_id: String::new(),
            build_target: "StandaloneLinux64".to_string(),
            staging_path: PathBuf::from("build/staging"),
            settings_file_name: "settings.json".to_string(),
            catalog_file_name: "catalog.json".to_string(),
            content_state_path: PathBuf::from("build/content_state.bin"),
            ignore_unsupported_files: false,
            build_remote_catalog: false,
            catalog_request_timeout: 0,
            max_concurrent_web_requests: 3,
            disable_catalog_update_on_startup: false,
            profile: Profile::new(),
            groups: Vec::new(),
            external_catalogs: Vec::new(),
        }
    }
}

impl BuildSettings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            PackError::config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn pack_options(&self) -> PackOptions {
        PackOptions {
            project_id: self.project_id.clone(),
            ignore_unsupported_files: self.ignore_unsupported_files,
        }
    }

    /// Expand `[Name]` variables in a profile path
    ///
    /// # Examples
    ///
    /// ```
    /// use bundlepack::core::config::{BuildSettings, Profile};
    ///
    /// let settings = BuildSettings {
    ///     build_target: "Android".into(),
    ///     profile: Profile::new()
    ///         .with("Local.BuildPath", "build/[BuildTarget]")
    ///         .with("Local.LoadPath", "{RuntimePath}/[BuildTarget]"),
    ///     ..BuildSettings::default()
    /// };
    ///
    /// assert_eq!(settings.evaluate("[Local.BuildPath]").unwrap(), "build/Android");
    /// assert_eq!(settings.evaluate("[Local.LoadPath]").unwrap(), "{RuntimePath}/Android");
    /// assert!(settings.evaluate("[Missing]").is_err());
    /// ```
    pub fn evaluate(&self, raw: &str) -> Result<String> {
        let value = self.expand(raw, 0)?;
        if value.trim().is_empty() {
            return Err(PackError::config(format!(
                "profile path '{}' evaluates to an empty string",
                raw
            )));
        }
        Ok(value)
    }

    fn expand(&self, raw: &str, depth: usize) -> Result<String> {
        if depth > MAX_EXPANSION_DEPTH {
            return Err(PackError::config(format!(
                "profile variable expansion is too deep in '{}'",
                raw
            )));
        }

        let mut out = String::with_capacity(raw.len());
        let mut rest = raw;
        while let Some(start) = rest.find('[') {
            let Some(len) = rest[start..].find(']') else {
                break;
            };
            out.push_str(&rest[..start]);
            let name = &rest[start + 1..start + len];
            let value = if name == BUILD_TARGET_VAR {
                self.build_target.clone()
            } else {
                let value = self.profile.get(name).ok_or_else(|| {
                    PackError::config(format!("undefined profile variable '{}'", name))
                })?;
                self.expand(value, depth + 1)?
            };
            out.push_str(&value);
            rest = &rest[start + len + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    pub fn local_build_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(self.evaluate(LOCAL_BUILD_PATH)?))
    }

    pub fn local_load_path(&self) -> Result<String> {
        self.evaluate(LOCAL_LOAD_PATH)
    }

    /// Remote build directory and load path, if both are configured
    pub fn remote_paths(&self) -> Option<(PathBuf, String)> {
        let build = self.profile.get(REMOTE_BUILD_PATH_VAR)?;
        let load = self.profile.get(REMOTE_LOAD_PATH_VAR)?;
        let build = self.evaluate(build).ok()?;
        let load = self.evaluate(load).ok()?;
        Some((PathBuf::from(build), load))
    }

    pub fn settings_path(&self) -> Result<PathBuf> {
        Ok(self.local_build_path()?.join(&self.settings_file_name))
    }

    pub fn catalog_path(&self) -> Result<PathBuf> {
        Ok(self.local_build_path()?.join(&self.catalog_file_name))
    }

    pub fn find_group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Check paths and catalogs before anything is built
    pub fn validate(&self) -> Result<()> {
        semver::Version::parse(&self.player_version)
            .map_err(|_| PackError::InvalidVersion(self.player_version.clone()))?;

        for var in [LOCAL_BUILD_PATH_VAR, LOCAL_LOAD_PATH_VAR] {
            if self.profile.get(var).is_none() {
                return Err(PackError::config(format!(
                    "profile variable '{}' is not defined",
                    var
                )));
            }
        }
        let local_build = self.evaluate(LOCAL_BUILD_PATH)?;

        for group in self.groups.iter().filter(|g| g.schema.include_in_build) {
            let build_path = self.evaluate(&group.schema.build_path)?;
            let load_path = self.evaluate(&group.schema.load_path)?;

            let build_local = build_path == local_build;
            let load_local = load_path.contains(RUNTIME_PATH_TOKEN);
            if build_local != load_local {
                return Err(PackError::config(format!(
                    "group '{}' must build to and load from local paths together \
                     (BuildPath: '{}', LoadPath: '{}')",
                    group.name, build_path, load_path
                )));
            }
        }

        let mut names = HashSet::new();
        for catalog in &self.external_catalogs {
            if catalog.name.trim().is_empty() {
                return Err(PackError::config("external catalog name is empty"));
            }
            if !names.insert(catalog.name.as_str()) {
                return Err(PackError::config(format!(
                    "external catalog '{}' is defined twice",
                    catalog.name
                )));
            }
            self.evaluate(&catalog.build_path).map_err(|_| {
                PackError::config(format!(
                    "The catalog build path for external catalog '{}' is empty.",
                    catalog.name
                ))
            })?;
            self.evaluate(&catalog.load_path).map_err(|e| {
                PackError::config(format!(
                    "invalid load path for external catalog '{}': {}",
                    catalog.name, e
                ))
            })?;
            if let Some(missing) = catalog.groups.iter().find(|name| self.find_group(name).is_none()) {
                return Err(PackError::config(format!(
                    "external catalog '{}' names unknown group '{}'",
                    catalog.name, missing
                )));
            }
        }

        if self.build_remote_catalog {
            for var in [REMOTE_BUILD_PATH_VAR, REMOTE_LOAD_PATH_VAR] {
                if let Some(value) = self.profile.get(var) {
                    self.evaluate(value)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        player_version = "2.1.0"
        project_id = "proj"
        build_target = "Android"
        build_remote_catalog = true

        [profile]
        "Local.BuildPath" = "out/[BuildTarget]"
        "Local.LoadPath" = "{RuntimePath}/[BuildTarget]"
        "Remote.BuildPath" = "out/remote/[BuildTarget]"
        "Remote.LoadPath" = "https://cdn.example.com/[BuildTarget]"

        [[groups]]
        guid = "g1"
        name = "Characters"

        [[groups]]
        guid = "g2"
        name = "Music"
        [groups.schema]
        build_path = "[Remote.BuildPath]"
        load_path = "[Remote.LoadPath]"

        [[external_catalogs]]
        name = "dlc"
        build_path = "out/dlc"
        load_path = "https://cdn.example.com/dlc"
        groups = ["Characters"]
    "#;

    #[test]
    fn test_parse_and_validate() {
        let settings = BuildSettings::from_toml_str(SAMPLE).unwrap();
        assert_eq!(settings.groups.len(), 2);
        assert_eq!(settings.external_catalogs[0].groups, vec!["Characters"]);
        assert_eq!(settings.catalog_file_name, "catalog.json");
        settings.validate().unwrap();

        assert_eq!(settings.local_build_path().unwrap(), PathBuf::from("out/Android"));
        let (remote_build, remote_load) = settings.remote_paths().unwrap();
        assert_eq!(remote_build, PathBuf::from("out/remote/Android"));
        assert_eq!(remote_load, "https://cdn.example.com/Android");
    }

    #[test]
    fn test_local_mismatch_is_rejected() {
        let mut settings = BuildSettings::from_toml_str(SAMPLE).unwrap();
        settings.groups[1].schema.load_path = "[Local.LoadPath]".into();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("Music"));
    }

    #[test]
    fn test_missing_local_variables() {
        let settings = BuildSettings::default();
        let err = settings.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_invalid_player_version() {
        let mut settings = BuildSettings::from_toml_str(SAMPLE).unwrap();
        settings.player_version = "v-next".into();
        assert!(matches!(settings.validate(), Err(PackError::InvalidVersion(_))));
    }

    #[test]
    fn test_duplicate_catalog_names() {
        let mut settings = BuildSettings::from_toml_str(SAMPLE).unwrap();
        let dup = settings.external_catalogs[0].clone();
        settings.external_catalogs.push(dup);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_catalog_load_path_is_validated() {
        let mut settings = BuildSettings::from_toml_str(SAMPLE).unwrap();
        settings.external_catalogs[0].load_path = "[Undefined.Var]/dlc".into();
        let err = settings.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
        assert!(err.to_string().contains("Undefined.Var"));
    }

    #[test]
    fn test_catalog_with_unknown_group_is_rejected() {
        let mut settings = BuildSettings::from_toml_str(SAMPLE).unwrap();
        settings.external_catalogs[0].groups.push("Vehicles".into());
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("Vehicles"));
        assert!(settings.find_group("Music").is_some());
    }

    #[test]
    fn test_remote_variables_are_validated() {
        let mut settings = BuildSettings::from_toml_str(SAMPLE).unwrap();
        settings.groups.retain(|g| g.name != "Music");
        settings.profile = settings.profile.with("Remote.LoadPath", "https://[Cdn.Host]/x");
        assert!(settings.validate().is_err());

        settings.build_remote_catalog = false;
        settings.validate().unwrap();
    }

    #[test]
    fn test_recursive_expansion_is_bounded() {
        let settings = BuildSettings {
            profile: Profile::new().with("A", "[B]").with("B", "[A]"),
            ..BuildSettings::default()
        };
        assert!(settings.evaluate("[A]").is_err());
    }

    #[test]
    fn test_bad_toml() {
        let err = BuildSettings::from_toml_str("player_version = ").unwrap_err();
        assert!(matches!(err, PackError::ConfigParse(_)));
    }
}
