//! Multi-catalog partitioning
//!
//! Splits the locations of a build between the default catalog and any number
//! of extra catalogs, then restores dependency closure in each of them.
//!
//! Membership is first-match: setups are tried in order and the first one that
//! accepts a location takes it. Bundles moved into a setup are not moved in the
//! table; the setup gets a detached copy whose internal id points at the
//! setup's load path, and the original is remembered for relocation.

use crate::catalog::{CatalogBuildInfo, Location, LocationId, LocationTable};
use crate::config::{BuildSettings, ExternalCatalogConfig};
use crate::context::BuildContext;
use crate::error::{PackError, Result};
use crate::group::{Group, LOCAL_LOAD_PATH};
use crate::validation::{file_name_of, join_load_path, repair_internal_id};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// What a membership test sees of a location
#[derive(Debug, Clone, Copy)]
pub struct LocationView<'a> {
    pub location: &'a Location,

    /// Owning group, when known
    pub group: Option<&'a Group>,
}

/// Rule deciding which locations an extra catalog takes
#[derive(Clone)]
pub enum Membership {
    /// Locations owned by any of the named groups
    Groups(Vec<String>),

    /// Arbitrary test
    Predicate(fn(&LocationView) -> bool),
}

impl Membership {
    pub fn accepts(&self, view: &LocationView) -> bool {
        match self {
            Membership::Groups(names) => view
                .group
                .map(|group| names.iter().any(|name| *name == group.name))
                .unwrap_or(false),
            Membership::Predicate(test) => test(view),
        }
    }
}

impl fmt::Debug for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Membership::Groups(names) => f.debug_tuple("Groups").field(names).finish(),
            Membership::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// One extra catalog being assembled
#[derive(Debug, Clone)]
pub struct CatalogSetup {
    pub name: String,
    pub membership: Membership,

    /// Evaluated folder the catalog and its bundles end up in
    pub build_path: PathBuf,

    /// Runtime load path for bundles of groups using the default local load path
    pub load_path: String,

    pub info: CatalogBuildInfo,

    /// Original (indexed) bundle locations moved into this catalog
    pub catalog_bundles: Vec<LocationId>,
}

impl CatalogSetup {
    pub fn new(
        name: impl Into<String>,
        membership: Membership,
        build_path: impl Into<PathBuf>,
        load_path: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let build_path = build_path.into();
        let load_path = load_path.into();

        let mut info = CatalogBuildInfo::new(name.clone(), format!("{}.json", name));
        info.build_path = build_path.clone();
        info.load_path = load_path.clone();
        info.register = false;

        CatalogSetup {
            name,
            membership,
            build_path,
            load_path,
            info,
            catalog_bundles: Vec::new(),
        }
    }

    /// Setup for a configured external catalog, with its paths evaluated
    pub fn from_config(config: &ExternalCatalogConfig, settings: &BuildSettings) -> Result<Self> {
        let build_path = settings.evaluate(&config.build_path)?;
        let load_path = settings.evaluate(&config.load_path)?;
        Ok(Self::new(
            config.name.clone(),
            Membership::Groups(config.groups.clone()),
            build_path,
            load_path,
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }
}

/// Catalogs after partitioning
#[derive(Debug)]
pub struct Partition {
    pub default: CatalogBuildInfo,

    /// Non-empty extra catalogs, in setup order
    pub extras: Vec<CatalogSetup>,
}

/// Distribute every indexed location and close each catalog over its dependencies
///
/// Group load paths are evaluated against `settings`, which also supplies the
/// groups that own the locations.
pub fn partition(
    ctx: &mut BuildContext,
    settings: &BuildSettings,
    mut default: CatalogBuildInfo,
    mut setups: Vec<CatalogSetup>,
) -> Result<Partition> {
    let ids: Vec<LocationId> = ctx.table.indexed_ids().collect();

    for id in ids {
        let group = ctx
            .group_of(id)
            .and_then(|guid| settings.groups.iter().find(|g| g.guid == guid));
        let chosen = {
            let view = LocationView {
                location: &ctx.table[id],
                group,
            };
            setups.iter().position(|setup| setup.membership.accepts(&view))
        };

        let Some(index) = chosen else {
            default.push_unique(id);
            continue;
        };
        let setup = &mut setups[index];

        if !ctx.table[id].is_bundle() {
            setup.info.push_unique(id);
            continue;
        }

        let group = group.ok_or_else(|| {
            PackError::MissingGroup(ctx.table[id].primary_key().unwrap_or_default().to_string())
        })?;
        let load_path = if group.schema.load_path == LOCAL_LOAD_PATH {
            setup.load_path.clone()
        } else {
            settings.evaluate(&group.schema.load_path)?
        };

        let mut copy = ctx.table[id].clone();
        copy.internal_id =
            repair_internal_id(&join_load_path(&load_path, file_name_of(&copy.internal_id)));
        debug!(
            "Catalog '{}' takes bundle {} as {}",
            setup.name,
            copy.primary_key().unwrap_or_default(),
            copy.internal_id
        );

        let copy_id = ctx.table.insert_detached(copy);
        ctx.location_group.insert(copy_id, group.guid.clone());
        setup.info.push_unique(copy_id);
        setup.catalog_bundles.push(id);
    }

    for setup in setups.iter_mut() {
        close_over_default(&ctx.table, &default, &mut setup.info)?;
    }
    close_default(&ctx.table, &mut default, &setups)?;

    let before = setups.len();
    setups.retain(|setup| !setup.is_empty());
    if setups.len() != before {
        debug!("Dropped {} empty catalogs", before - setups.len());
    }

    info!(
        "Partitioned {} locations into the default catalog and {} extra catalogs",
        default.locations.len(),
        setups.len()
    );

    Ok(Partition {
        default,
        extras: setups,
    })
}

/// Primary key -> location for the members of one catalog
fn key_index(table: &LocationTable, ids: &[LocationId]) -> HashMap<String, LocationId> {
    ids.iter()
        .filter_map(|id| {
            table
                .get(*id)
                .and_then(Location::primary_key)
                .map(|key| (key.to_string(), *id))
        })
        .collect()
}

fn dependency_queue(table: &LocationTable, ids: &[LocationId]) -> VecDeque<String> {
    ids.iter()
        .filter_map(|id| table.get(*id))
        .flat_map(|location| location.dependencies.iter().cloned())
        .collect()
}

/// Pull dependencies of an extra catalog in from the default catalog
fn close_over_default(
    table: &LocationTable,
    default: &CatalogBuildInfo,
    info: &mut CatalogBuildInfo,
) -> Result<()> {
    let available = key_index(table, &default.locations);
    let mut present: HashSet<String> = key_index(table, &info.locations).into_keys().collect();
    let mut queue = dependency_queue(table, &info.locations);

    while let Some(key) = queue.pop_front() {
        if present.contains(&key) {
            continue;
        }
        let id = *available
            .get(&key)
            .ok_or_else(|| PackError::UnresolvedDependency {
                key: key.clone(),
                catalog: info.identifier.clone(),
            })?;

        info.push_unique(id);
        present.insert(key);
        queue.extend(table[id].dependencies.iter().cloned());
    }

    Ok(())
}

/// Borrow relocated variants into the default catalog where it depends on them
fn close_default(
    table: &LocationTable,
    default: &mut CatalogBuildInfo,
    setups: &[CatalogSetup],
) -> Result<()> {
    let extras: Vec<HashMap<String, LocationId>> = setups
        .iter()
        .map(|setup| key_index(table, &setup.info.locations))
        .collect();
    let mut present: HashSet<String> = key_index(table, &default.locations).into_keys().collect();
    let mut queue = dependency_queue(table, &default.locations);

    while let Some(key) = queue.pop_front() {
        if present.contains(&key) {
            continue;
        }
        let id = extras
            .iter()
            .find_map(|index| index.get(&key).copied())
            .ok_or_else(|| PackError::UnresolvedDependency {
                key: key.clone(),
                catalog: default.identifier.clone(),
            })?;

        default.push_unique(id);
        present.insert(key);
        queue.extend(table[id].dependencies.iter().cloned());
    }

    Ok(())
}
