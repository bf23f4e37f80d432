//! Catalog assembly
//!
//! Runs after the archiver:
//!
//! 1. [`create_locations`] adds one bundle location per working bundle and one
//!    asset location per packed entry
//! 2. [`post_process_bundles`] gives every bundle its final name, rewrites its
//!    primary key and internal id, and moves the file into the group's build path
//!
//! Hash-free groups keep a temporary `_{hash}` suffix through the rest of the
//! build; a [`PendingRename`] strips it once catalog entries are processed.

use crate::archiver::{ArchiveOutput, BundleBuildResult};
use crate::catalog::{BundleRequestOptions, Location, ResourceType};
use crate::context::{BuildContext, BundleReport};
use crate::error::{PackError, Result};
use crate::group::{BundleNaming, Group, SCENE_PROVIDER};
use crate::grouper::PackOutput;
use crate::relocate::{PendingRename, Relocator};
use crate::validation::{
    join_load_path, repair_internal_id, sanitize_group_name, strip_hash_from_bundle_location,
};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

fn result_for<'a>(results: &'a ArchiveOutput, working: &str) -> Result<&'a BundleBuildResult> {
    results.get(working).ok_or_else(|| PackError::Archiver {
        code: -1,
        reason: format!("no build result for bundle {}", working),
    })
}

/// Create bundle and asset locations for one packed group
///
/// `packed.definitions` must already carry working names and `load_path` is
/// the group's evaluated load path.
pub fn create_locations(
    ctx: &mut BuildContext,
    group: &Group,
    packed: &PackOutput,
    load_path: &str,
    results: &ArchiveOutput,
) -> Result<()> {
    for (index, def) in packed.definitions.iter().enumerate() {
        let working = def.name.as_str();
        let result = result_for(results, working)?;

        let bundle = Location::new(
            vec![working.to_string()],
            ResourceType::Bundle,
            group.schema.bundle_provider.clone(),
            join_load_path(load_path, working),
        );
        let bundle_id = ctx.table.insert(bundle)?;
        ctx.bundle_locations.insert(working.to_string(), bundle_id);
        ctx.location_group.insert(bundle_id, group.guid.clone());

        let mut dependencies = vec![working.to_string()];
        dependencies.extend(result.dependencies.iter().cloned());

        for packed_entry in packed.entries_of(index) {
            let entry = &packed_entry.entry;
            let (resource_type, provider) = if entry.is_scene() {
                (ResourceType::Scene, SCENE_PROVIDER.to_string())
            } else {
                (ResourceType::Asset, group.schema.asset_provider.clone())
            };

            let mut keys = if entry.address.is_empty() || ctx.table.lookup(&entry.address).is_some() {
                vec![entry.guid.clone(), entry.address.clone()]
            } else {
                vec![entry.address.clone(), entry.guid.clone()]
            };
            keys.retain(|key| !key.is_empty());
            keys.extend(entry.labels.iter().cloned());

            let location = Location::new(keys, resource_type, provider, entry.asset_path.clone())
                .with_dependencies(dependencies.clone());
            let id = ctx.table.insert(location)?;

            ctx.entry_bundle
                .insert(entry.guid.clone(), working.to_string());
            ctx.location_group.insert(id, group.guid.clone());
        }
    }

    Ok(())
}

/// Final output name of a bundle
///
/// The group-hash segment of the unique name is replaced by the sanitized group
/// name, then the group's hash-naming style is applied.
///
/// # Examples
///
/// ```
/// use bundlepack::core::assembler::construct_bundle_name;
/// use bundlepack::core::group::{BundleNaming, Group};
///
/// let group = Group::new("AAA1", "Foo").with_bundle_naming(BundleNaming::NoHash);
/// assert_eq!(
///     construct_bundle_name(&group, "AAA1_bar.bundle", "9f8c"),
///     "foo_bar_9f8c.bundle"
/// );
///
/// let group = Group::new("AAA1", "Foo");
/// assert_eq!(
///     construct_bundle_name(&group, "AAA1_assets_all.bundle", "9f8c"),
///     "foo_assets_all_9f8c.bundle"
/// );
/// ```
pub fn construct_bundle_name(group: &Group, unique_name: &str, hash: &str) -> String {
    let stem = unique_name.strip_suffix(".bundle").unwrap_or(unique_name);
    let rest: Vec<&str> = stem.split('_').skip(1).collect();
    let name = format!("{}_{}.bundle", sanitize_group_name(&group.name), rest.join("_"));

    let naming = group.schema.bundle_naming;
    let with_hash = naming.apply(hash, &name);
    if naming == BundleNaming::NoHash {
        with_hash.replace(".bundle", &format!("_{}.bundle", hash))
    } else {
        with_hash
    }
}

/// Finalize the bundles of one group
///
/// `working_names` and `unique_names` are parallel; `build_dir` is the group's
/// evaluated build path.
pub fn post_process_bundles(
    ctx: &mut BuildContext,
    group: &Group,
    working_names: &[String],
    unique_names: &[String],
    results: &ArchiveOutput,
    build_dir: &Path,
    relocator: &mut Relocator,
) -> Result<()> {
    let naming = group.schema.bundle_naming;

    for (working, unique) in working_names.iter().zip(unique_names) {
        let result = result_for(results, working)?;
        let Some(&id) = ctx.bundle_locations.get(working) else {
            warn!("Unable to find catalog location for bundle {}", unique);
            continue;
        };

        let options = BundleRequestOptions::from_build(&group.schema.load_options, result);
        let internal_bundle_name = options.bundle_name.clone();
        ctx.table.set_data(id, options)?;

        let final_name = construct_bundle_name(group, unique, &result.hash);

        let internal_id = ctx.table[id].internal_id.clone();
        let renamed = match internal_id.strip_suffix(working.as_str()) {
            Some(dir) => format!("{}{}", dir, final_name),
            None => join_load_path(&internal_id, &final_name),
        };
        let renamed = repair_internal_id(&renamed);
        ctx.table.set_primary_key(id, &final_name)?;
        ctx.bundle_to_internal_id.insert(working.clone(), renamed.clone());
        ctx.table.set_internal_id(id, renamed)?;

        let output_name = if naming == BundleNaming::NoHash {
            strip_hash_from_bundle_location(&final_name, &result.hash)
                .unwrap_or_else(|| final_name.clone())
        } else {
            final_name.clone()
        };
        ctx.rename_map.insert(working.clone(), output_name);

        let target = build_dir.join(&final_name);
        relocator.move_if_timestamp_differs(&PathBuf::from(&result.file_name), &target)?;

        if naming == BundleNaming::NoHash {
            ctx.pending_renames.push(PendingRename {
                location: id,
                target_path: target.clone(),
                hash: result.hash.clone(),
            });
        }

        debug!("Bundle {} -> {}", unique, target.display());

        ctx.reports.push(BundleReport {
            group_guid: group.guid.clone(),
            working_name: working.clone(),
            final_name,
            file_path: target.clone(),
            internal_bundle_name,
            hash: result.hash.clone(),
            crc: result.crc,
        });
        ctx.registry.add_file(&target);
    }

    Ok(())
}
