//! Entry grouper
//!
//! Turns the entries of one [`Group`] into bundle input definitions according
//! to the group's packing policy:
//!
//! - **Together**: one assets bundle and one scenes bundle for the whole group
//! - **Separately**: one assets/scenes pair per top-level entry
//! - **ByLabelSet**: one pair per label key, where the key is the labels
//!   concatenated in stored order (`[a, b]` and `[b, a]` are different buckets)
//!
//! Folders are expanded to their leaf entries before bucketing.

use crate::error::{PackError, Result};
use crate::group::{Entry, EntryKind, Group, NamingMode, PackingPolicy};
use crate::hashing::hash_parts;
use crate::validation::{normalize_bundle_name, validate_address};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Project-wide inputs to packing
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Mixed into group hashes for the project-id naming modes
    pub project_id: String,

    /// Drop `Unknown` entries with a warning instead of failing
    pub ignore_unsupported_files: bool,
}

/// Input to the archiver: a named bundle and the source paths it contains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInputDefinition {
    /// Bundle name; human readable until stabilized, then the working name
    pub name: String,

    /// Asset paths of the members, in pack order
    pub members: Vec<String>,

    /// Load-time alias of each member, parallel to `members`
    pub addressable_names: Vec<String>,
}

/// An entry that made it into a bundle
#[derive(Debug, Clone)]
pub struct PackedEntry {
    pub entry: Entry,

    /// Index into [`PackOutput::definitions`]
    pub definition: usize,
}

/// Result of packing one group
#[derive(Debug, Clone, Default)]
pub struct PackOutput {
    pub definitions: Vec<BundleInputDefinition>,
    pub entries: Vec<PackedEntry>,
}

impl PackOutput {
    /// Entries packed into the given definition
    pub fn entries_of(&self, definition: usize) -> impl Iterator<Item = &PackedEntry> {
        self.entries
            .iter()
            .filter(move |packed| packed.definition == definition)
    }
}

/// Pack a group's entries into bundle input definitions
///
/// # Examples
///
/// ```
/// use bundlepack::core::group::{Entry, Group};
/// use bundlepack::core::grouper::{pack, PackOptions};
///
/// let group = Group::new("AAA1", "Characters")
///     .with_entry(Entry::new("e1", "hero", "Assets/hero.prefab"))
///     .with_entry(Entry::new("e2", "villain", "Assets/villain.prefab"));
///
/// let output = pack(&group, &PackOptions::default()).unwrap();
/// assert_eq!(output.definitions.len(), 1);
/// assert_eq!(output.definitions[0].name, "AAA1_assets_all.bundle");
/// ```
pub fn pack(group: &Group, options: &PackOptions) -> Result<PackOutput> {
    let mut output = PackOutput::default();

    match group.schema.packing {
        PackingPolicy::Together => {
            let gathered = gather(&group.entries);
            let hash = group_hash(group, options, &gathered);
            emit_definitions(&mut output, gathered, &hash, "all", options)?;
        }
        PackingPolicy::Separately => {
            for entry in &group.entries {
                let gathered = gather(std::slice::from_ref(entry));
                let hash = group_hash(group, options, &gathered);
                emit_definitions(&mut output, gathered, &hash, &entry.address, options)?;
            }
        }
        PackingPolicy::ByLabelSet => {
            let mut order: Vec<String> = Vec::new();
            let mut buckets: HashMap<String, Vec<Entry>> = HashMap::new();
            for entry in &group.entries {
                let key = label_key(entry);
                buckets
                    .entry(key.clone())
                    .or_insert_with(|| {
                        order.push(key);
                        Vec::new()
                    })
                    .push(entry.clone());
            }

            for key in order {
                let members = buckets.remove(&key).unwrap_or_default();
                let gathered = gather(&members);
                let hash = group_hash(group, options, &gathered);
                emit_definitions(&mut output, gathered, &hash, &key, options)?;
            }
        }
    }

    debug!(
        "Packed group '{}' into {} bundle definitions ({} entries)",
        group.name,
        output.definitions.len(),
        output.entries.len()
    );

    Ok(output)
}

/// Bucket key for label-set packing: labels concatenated in stored order
pub fn label_key(entry: &Entry) -> String {
    entry.labels.concat()
}

/// Hash prefix used in bundle names for this group
pub fn group_hash(group: &Group, options: &PackOptions, entries: &[Entry]) -> String {
    match group.schema.naming_mode {
        NamingMode::GroupGuid => group.guid.clone(),
        NamingMode::GroupGuidProjectIdHash => {
            hash_parts([group.guid.as_str(), options.project_id.as_str()])
        }
        NamingMode::GroupGuidProjectIdEntriesHash => {
            let guids: BTreeSet<&str> = entries.iter().map(|e| e.guid.as_str()).collect();
            let mut parts = vec![group.guid.as_str(), options.project_id.as_str()];
            parts.extend(guids);
            hash_parts(parts)
        }
    }
}

fn gather(entries: &[Entry]) -> Vec<Entry> {
    let mut out = Vec::new();
    for entry in entries {
        entry.gather_all(&mut out);
    }
    out
}

/// Split gathered entries into an assets and a scenes bundle
fn emit_definitions(
    output: &mut PackOutput,
    gathered: Vec<Entry>,
    hash: &str,
    suffix: &str,
    options: &PackOptions,
) -> Result<()> {
    let mut assets = Vec::new();
    let mut scenes = Vec::new();

    for entry in gathered {
        if !check_entry(&entry, options)? {
            continue;
        }
        if entry.asset_path.is_empty() {
            continue;
        }
        if entry.is_scene() {
            scenes.push(entry);
        } else {
            assets.push(entry);
        }
    }

    for (kind, members) in [("assets", assets), ("scenes", scenes)] {
        if members.is_empty() {
            continue;
        }
        let name = format!("{}_{}_{}.bundle", hash, kind, suffix);
        let index = output.definitions.len();
        output.definitions.push(definition(&name, &members));
        output
            .entries
            .extend(members.into_iter().map(|entry| PackedEntry {
                entry,
                definition: index,
            }));
    }

    Ok(())
}

/// Structural checks; `Ok(false)` means the entry is dropped
fn check_entry(entry: &Entry, options: &PackOptions) -> Result<bool> {
    validate_address(&entry.address)?;

    if entry.kind == EntryKind::Unknown {
        if options.ignore_unsupported_files {
            warn!(
                "Cannot recognize file type for entry located at '{}'. Asset location will be ignored.",
                entry.asset_path
            );
            return Ok(false);
        }
        return Err(PackError::UnsupportedFileType(entry.asset_path.clone()));
    }

    Ok(true)
}

fn definition(name: &str, members: &[Entry]) -> BundleInputDefinition {
    let mut used = HashSet::new();
    let addressable_names = members
        .iter()
        .map(|entry| {
            if used.insert(entry.address.clone()) {
                entry.address.clone()
            } else {
                entry.asset_path.clone()
            }
        })
        .collect();

    BundleInputDefinition {
        name: normalize_bundle_name(name),
        members: members.iter().map(|e| e.asset_path.clone()).collect(),
        addressable_names,
    }
}
