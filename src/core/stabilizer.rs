//! Bundle name stabilization
//!
//! Bundle names coming out of the grouper are human readable and may collide
//! across groups. The stabilizer makes each name unique for the whole build
//! (case-insensitively) and then swaps it for an opaque working name, the xxh3
//! hash of the unique name, which is what the archiver sees on disk.

use crate::error::{PackError, Result};
use crate::grouper::BundleInputDefinition;
use crate::hashing::hash_str;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Attempts at finding a free numeric suffix before giving up
pub const MAX_SUFFIX_ATTEMPTS: usize = 1000;

/// Build-wide bundle name registry
#[derive(Debug, Default)]
pub struct NameStabilizer {
    /// Lowercased unique names handed out so far
    handled: HashSet<String>,

    /// Working name -> unique pre-hash name
    original_by_hash: HashMap<String, String>,
}

impl NameStabilizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rename definitions in place to their working names
    ///
    /// Returns the unique pre-hash names, parallel to `defs`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bundlepack::core::grouper::BundleInputDefinition;
    /// use bundlepack::core::stabilizer::NameStabilizer;
    ///
    /// let mut stabilizer = NameStabilizer::new();
    /// let mut defs = vec![BundleInputDefinition {
    ///     name: "X_assets_all.bundle".into(),
    ///     members: vec![],
    ///     addressable_names: vec![],
    /// }];
    ///
    /// let unique = stabilizer.stabilize(&mut defs).unwrap();
    /// assert_eq!(unique, vec!["X_assets_all.bundle".to_string()]);
    /// assert_eq!(stabilizer.original_name(&defs[0].name), Some("X_assets_all.bundle"));
    /// ```
    pub fn stabilize(&mut self, defs: &mut [BundleInputDefinition]) -> Result<Vec<String>> {
        let mut unique_names = Vec::with_capacity(defs.len());

        for def in defs.iter_mut() {
            let unique = self.claim(&def.name)?;
            let working = format!("{}.bundle", hash_str(&unique));

            debug!("Bundle '{}' -> working name '{}'", unique, working);

            self.original_by_hash.insert(working.clone(), unique.clone());
            def.name = working;
            unique_names.push(unique);
        }

        Ok(unique_names)
    }

    /// Reserve a unique variant of `name`
    fn claim(&mut self, name: &str) -> Result<String> {
        let mut candidate = name.to_string();
        let mut count = 1;

        while self.handled.contains(&candidate.to_lowercase()) {
            if count > MAX_SUFFIX_ATTEMPTS {
                return Err(PackError::NamingConflict(name.to_string()));
            }
            candidate = name.replace(".bundle", &format!("{}.bundle", count));
            count += 1;
        }

        self.handled.insert(candidate.to_lowercase());
        Ok(candidate)
    }

    /// Unique pre-hash name for a working name
    pub fn original_name(&self, working: &str) -> Option<&str> {
        self.original_by_hash.get(working).map(String::as_str)
    }

    /// Map of working name to unique pre-hash name
    pub fn original_by_hash(&self) -> &HashMap<String, String> {
        &self.original_by_hash
    }
}
