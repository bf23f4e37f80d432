//! Catalog locations and the handle-based location table
//!
//! All locations of a build live in one [`LocationTable`] and are addressed by
//! [`LocationId`] handles. The table keeps two indices in sync:
//!
//! - primary key -> location
//! - primary key -> locations that list it as a dependency
//!
//! Keys are only ever changed through [`LocationTable::set_primary_key`], which
//! rewrites both indices and every depender in one step.

use super::options::BundleRequestOptions;
use crate::error::{PackError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// What a location resolves to at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Bundle,
    Asset,
    Scene,
}

/// A runtime-resolvable catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// `keys[0]` is the primary key; the rest are aliases
    pub keys: Vec<String>,
    pub resource_type: ResourceType,
    pub provider: String,
    pub internal_id: String,

    /// Primary keys of locations to load first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<BundleRequestOptions>,
}

impl Location {
    pub fn new(
        keys: Vec<String>,
        resource_type: ResourceType,
        provider: impl Into<String>,
        internal_id: impl Into<String>,
    ) -> Self {
        Location {
            keys,
            resource_type,
            provider: provider.into(),
            internal_id: internal_id.into(),
            dependencies: Vec::new(),
            data: None,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.keys.first().map(String::as_str)
    }

    pub fn is_bundle(&self) -> bool {
        self.resource_type == ResourceType::Bundle
    }
}

/// Handle into a [`LocationTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationId(usize);

impl LocationId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Arena of locations with primary-key and depender indices
#[derive(Debug, Default)]
pub struct LocationTable {
    locations: Vec<Location>,

    /// Whether the location participates in the primary key index
    indexed: Vec<bool>,

    by_key: HashMap<String, LocationId>,
    dependers: HashMap<String, BTreeSet<LocationId>>,
}

impl LocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a location and index it by its primary key
    ///
    /// # Examples
    ///
    /// ```
    /// use bundlepack::core::catalog::{Location, LocationTable, ResourceType};
    ///
    /// let mut table = LocationTable::new();
    /// let bundle = table
    ///     .insert(Location::new(vec!["b.bundle".into()], ResourceType::Bundle, "BundleProvider", "out/b.bundle"))
    ///     .unwrap();
    ///
    /// assert_eq!(table.lookup("b.bundle"), Some(bundle));
    /// assert!(table
    ///     .insert(Location::new(vec!["b.bundle".into()], ResourceType::Bundle, "BundleProvider", "x"))
    ///     .is_err());
    /// ```
    pub fn insert(&mut self, location: Location) -> Result<LocationId> {
        let key = match location.primary_key() {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => {
                return Err(PackError::InvalidLocation(format!(
                    "location '{}' has no primary key",
                    location.internal_id
                )))
            }
        };
        if self.by_key.contains_key(&key) {
            return Err(PackError::KeyCollision(key));
        }

        let id = self.push(location, true);
        self.by_key.insert(key, id);
        Ok(id)
    }

    /// Add a location that is not reachable through the primary key index
    ///
    /// Used for per-catalog variants of a location that share its keys.
    pub fn insert_detached(&mut self, location: Location) -> LocationId {
        self.push(location, false)
    }

    fn push(&mut self, location: Location, indexed: bool) -> LocationId {
        let id = LocationId(self.locations.len());
        for dep in &location.dependencies {
            self.dependers.entry(dep.clone()).or_default().insert(id);
        }
        self.locations.push(location);
        self.indexed.push(indexed);
        id
    }

    pub fn get(&self, id: LocationId) -> Option<&Location> {
        self.locations.get(id.0)
    }

    /// Location indexed under `key`
    pub fn lookup(&self, key: &str) -> Option<LocationId> {
        self.by_key.get(key).copied()
    }

    /// Locations that list `key` as a dependency
    pub fn dependers_of(&self, key: &str) -> impl Iterator<Item = LocationId> + '_ {
        self.dependers.get(key).into_iter().flatten().copied()
    }

    /// Indexed locations in creation order
    pub fn indexed_ids(&self) -> impl Iterator<Item = LocationId> + '_ {
        self.indexed
            .iter()
            .enumerate()
            .filter(|(_, indexed)| **indexed)
            .map(|(i, _)| LocationId(i))
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Number of locations in the primary key index
    pub fn indexed_len(&self) -> usize {
        self.by_key.len()
    }

    pub fn set_internal_id(&mut self, id: LocationId, internal_id: impl Into<String>) -> Result<()> {
        let location = self.get_mut(id)?;
        location.internal_id = internal_id.into();
        Ok(())
    }

    pub fn set_data(&mut self, id: LocationId, data: BundleRequestOptions) -> Result<()> {
        let location = self.get_mut(id)?;
        location.data = Some(data);
        Ok(())
    }

    fn get_mut(&mut self, id: LocationId) -> Result<&mut Location> {
        self.locations
            .get_mut(id.0)
            .ok_or_else(|| PackError::InvalidLocation(format!("no location with id {}", id.0)))
    }

    /// Rename a location's primary key and every reference to it
    ///
    /// Fails with `InvalidLocation` if the location has no usable primary key and
    /// with `KeyCollision` if `new_key` already belongs to a different location.
    pub fn set_primary_key(&mut self, id: LocationId, new_key: &str) -> Result<()> {
        let indexed = self.indexed.get(id.0).copied().unwrap_or(false);
        let location = self.get_mut(id)?;
        let old_key = match location.keys.first() {
            Some(key) if !key.is_empty() => key.clone(),
            _ => {
                return Err(PackError::InvalidLocation(format!(
                    "cannot change primary key of '{}'",
                    location.internal_id
                )))
            }
        };

        if old_key == new_key {
            return Ok(());
        }
        if let Some(owner) = self.by_key.get(new_key) {
            if *owner != id {
                return Err(PackError::KeyCollision(new_key.to_string()));
            }
        }

        self.locations[id.0].keys[0] = new_key.to_string();
        if indexed {
            if self.by_key.get(&old_key) == Some(&id) {
                self.by_key.remove(&old_key);
            }
            self.by_key.insert(new_key.to_string(), id);
        }

        let Some(dependers) = self.dependers.remove(&old_key) else {
            return Ok(());
        };
        for depender in &dependers {
            for dep in self.locations[depender.0].dependencies.iter_mut() {
                if *dep == old_key {
                    *dep = new_key.to_string();
                }
            }
        }
        self.dependers
            .entry(new_key.to_string())
            .or_default()
            .extend(dependers);

        Ok(())
    }
}

impl std::ops::Index<LocationId> for LocationTable {
    type Output = Location;

    fn index(&self, id: LocationId) -> &Location {
        &self.locations[id.0]
    }
}
