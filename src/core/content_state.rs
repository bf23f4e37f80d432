//! Content-update state
//!
//! A full build saves a [`ContentState`] snapshot recording, for every packed
//! entry, the bundle file it shipped in. A later content-update build compares
//! its entries against that snapshot: bundles whose members are all unchanged
//! point back at the shipped file instead of the freshly built one, and the
//! matching cached states are carried over into the result.
//!
//! Snapshots are bincode-encoded.

use crate::catalog::write_file;
use crate::context::BuildContext;
use crate::error::{PackError, Result};
use crate::group::{BundleNaming, Entry, Group};
use crate::validation::strip_hash_from_bundle_location;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// What a previous build knew about one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAssetState {
    pub guid: String,
    pub dependency_hash: Option<String>,

    /// Internal id of the bundle the entry shipped in
    pub bundle_file_id: String,

    pub group_guid: String,
}

/// Snapshot written by a full build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentState {
    pub player_version: String,
    pub remote_catalog_load_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub cached_infos: Vec<CachedAssetState>,
}

impl ContentState {
    pub fn new(player_version: impl Into<String>, remote_catalog_load_path: Option<String>) -> Self {
        ContentState {
            player_version: player_version.into(),
            remote_catalog_load_path,
            created_at: Utc::now(),
            cached_infos: Vec::new(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = bincode::serialize(self)?;
        write_file(path.as_ref(), &bytes)?;
        debug!("Saved content state to {}", path.as_ref().display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| {
            PackError::ContentState(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn find(&self, guid: &str) -> Option<&CachedAssetState> {
        self.cached_infos.iter().find(|state| state.guid == guid)
    }
}

/// Packed leaf entries of each included group, in group order
fn packed_entries<'a>(groups: &'a [Group], ctx: &BuildContext) -> Vec<(&'a Group, Entry)> {
    let mut out = Vec::new();
    for group in groups.iter().filter(|g| g.is_packed()) {
        let mut leaves = Vec::new();
        for entry in &group.entries {
            entry.gather_all(&mut leaves);
        }
        out.extend(
            leaves
                .into_iter()
                .filter(|entry| ctx.entry_bundle.contains_key(&entry.guid))
                .map(|entry| (group, entry)),
        );
    }
    out
}

/// Cached state of every packed entry after a full build
///
/// Hash-free groups record the bundle id without its temporary hash.
pub fn record_bundle_file_ids(ctx: &BuildContext, groups: &[Group]) -> Vec<CachedAssetState> {
    let hashes: HashMap<&str, &str> = ctx
        .reports
        .iter()
        .map(|report| (report.working_name.as_str(), report.hash.as_str()))
        .collect();

    packed_entries(groups, ctx)
        .into_iter()
        .filter_map(|(group, entry)| {
            let working = ctx.entry_bundle.get(&entry.guid)?;
            let internal_id = ctx.bundle_to_internal_id.get(working)?;

            let bundle_file_id = if group.schema.bundle_naming == BundleNaming::NoHash {
                hashes
                    .get(working.as_str())
                    .and_then(|hash| strip_hash_from_bundle_location(internal_id, hash))
                    .unwrap_or_else(|| internal_id.clone())
            } else {
                internal_id.clone()
            };

            Some(CachedAssetState {
                guid: entry.guid,
                dependency_hash: entry.dependency_hash,
                bundle_file_id,
                group_guid: group.guid.clone(),
            })
        })
        .collect()
}

/// Point unchanged bundles back at their shipped files
///
/// A bundle qualifies when every member matches the previous state by guid and
/// dependency hash and all members shipped in the same bundle file. Returns the
/// carried-over states.
pub fn revert_unchanged(
    ctx: &mut BuildContext,
    groups: &[Group],
    previous: &ContentState,
) -> Result<Vec<CachedAssetState>> {
    let previous_by_guid: HashMap<&str, &CachedAssetState> = previous
        .cached_infos
        .iter()
        .map(|state| (state.guid.as_str(), state))
        .collect();

    let mut members: BTreeMap<String, Vec<Entry>> = BTreeMap::new();
    for (_, entry) in packed_entries(groups, ctx) {
        if let Some(working) = ctx.entry_bundle.get(&entry.guid) {
            members.entry(working.clone()).or_default().push(entry);
        }
    }

    let mut carry_over = Vec::new();
    for (working, entries) in members {
        let cached: Option<Vec<&CachedAssetState>> = entries
            .iter()
            .map(|entry| {
                previous_by_guid
                    .get(entry.guid.as_str())
                    .copied()
                    .filter(|state| {
                        entry.dependency_hash.is_some() && state.dependency_hash == entry.dependency_hash
                    })
            })
            .collect();
        let Some(cached) = cached else {
            continue;
        };

        let file_ids: BTreeSet<&str> = cached.iter().map(|s| s.bundle_file_id.as_str()).collect();
        if file_ids.len() != 1 {
            continue;
        }
        let Some(&id) = ctx.bundle_locations.get(&working) else {
            continue;
        };

        let file_id = cached[0].bundle_file_id.clone();
        debug!("Bundle {} is unchanged, reusing {}", working, file_id);
        ctx.table.set_internal_id(id, file_id)?;
        carry_over.extend(cached.into_iter().cloned());
    }

    info!("Content update reuses {} cached entries", carry_over.len());
    Ok(carry_over)
}
