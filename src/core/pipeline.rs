//! Build pipeline
//!
//! Runs one build from configured groups to files on disk:
//!
//! 1. pack and stabilize every included group
//! 2. archive all definitions in one call
//! 3. create locations and post-process bundles
//! 4. record or revert bundle ids for content updates
//! 5. strip temporary hashes from hash-free bundles
//! 6. partition locations into catalogs
//! 7. write catalogs, `settings.json` and the content state
//! 8. move extra catalogs' files into their own folders
//!
//! Hash stripping happens before catalogs are written and folder moves after,
//! so a written catalog never points at a file that is about to move.

use crate::archiver::{ArchiveRequest, Archiver};
use crate::assembler::{create_locations, post_process_bundles};
use crate::catalog::{
    write_catalog, CatalogBuildInfo, CatalogOutputs, LocationId, LocationTable, RemoteCatalogTarget,
    MAIN_CATALOG_ID,
};
use crate::config::BuildSettings;
use crate::content_state::{record_bundle_file_ids, revert_unchanged, CachedAssetState, ContentState};
use crate::context::{BuildContext, BundleReport};
use crate::error::{PackError, Result};
use crate::group::{Group, LOCAL_BUILD_PATH};
use crate::grouper::{pack, PackOutput};
use crate::manifest::RuntimeSettings;
use crate::partition::{partition, CatalogSetup, Partition};
use crate::registry::FileRegistry;
use crate::relocate::{CatalogRelocation, Relocator};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, info_span, warn};

/// Outcome of a build
///
/// A build never returns an error directly; `error` is the only failure signal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildResult {
    /// Locations in the primary key index
    pub location_count: usize,

    /// Path of `settings.json`
    pub output_path: Option<PathBuf>,

    /// Seconds spent in the build
    pub duration: f64,

    pub bundle_results: Vec<BundleReport>,

    /// Where the content state of a full build was saved
    pub content_state_path: Option<PathBuf>,

    pub is_update_build: bool,

    /// Cached states of entries whose bundles were reused
    pub carry_over: Vec<CachedAssetState>,

    /// Every file the build left on disk
    pub output_files: Vec<PathBuf>,

    pub error: Option<String>,
}

impl BuildResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// A group that has been packed and stabilized
struct StagedGroup<'a> {
    group: &'a Group,
    output: PackOutput,
    unique_names: Vec<String>,
    load_path: String,
    build_dir: PathBuf,
}

/// Packs configured groups with an [`Archiver`] and writes the catalogs
pub struct BuildPipeline {
    settings: BuildSettings,
    archiver: Option<Box<dyn Archiver>>,
}

impl BuildPipeline {
    pub fn new<A: Archiver + 'static>(settings: BuildSettings, archiver: A) -> Self {
        BuildPipeline {
            settings,
            archiver: Some(Box::new(archiver)),
        }
    }

    /// Pipeline that can inspect and clean build output but not build
    pub fn without_archiver(settings: BuildSettings) -> Self {
        BuildPipeline {
            settings,
            archiver: None,
        }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Run a build
    ///
    /// With `previous`, this is a content-update build: unchanged bundles are
    /// pointed back at their shipped files and no new content state is saved.
    pub fn build(&mut self, previous: Option<&ContentState>) -> BuildResult {
        let start = Instant::now();
        let mut result = BuildResult {
            is_update_build: previous.is_some(),
            ..BuildResult::default()
        };

        if let Err(e) = self.run(previous, &mut result) {
            error!("Build failed: {}", e);
            result.error = Some(e.to_string());
        }

        result.duration = start.elapsed().as_secs_f64();
        info!(
            "Build finished in {:.3}s ({} locations, {} bundles)",
            result.duration,
            result.location_count,
            result.bundle_results.len()
        );
        result
    }

    fn run(&mut self, previous: Option<&ContentState>, result: &mut BuildResult) -> Result<()> {
        let archiver = self.archiver.as_mut().ok_or_else(|| {
            PackError::config("no archiver configured: set a content root or an archiver")
        })?;
        let settings = &self.settings;
        settings.validate()?;

        let local_build = settings.local_build_path()?;
        let mut default = CatalogBuildInfo::new(MAIN_CATALOG_ID, settings.catalog_file_name.clone());
        default.build_path = local_build.clone();
        default.load_path = settings.local_load_path()?;
        let setups = settings
            .external_catalogs
            .iter()
            .map(|config| CatalogSetup::from_config(config, settings))
            .collect::<Result<Vec<_>>>()?;

        let options = settings.pack_options();
        let mut ctx = BuildContext::new();
        let mut relocator = Relocator::new();

        let mut staged = Vec::new();
        for group in settings.groups.iter().filter(|g| g.is_packed()) {
            let _span = info_span!("pack", group = %group.name).entered();
            let mut output = pack(group, &options)?;
            let unique_names = ctx.stabilizer.stabilize(&mut output.definitions)?;
            staged.push(StagedGroup {
                group,
                output,
                unique_names,
                load_path: settings.evaluate(&group.schema.load_path)?,
                build_dir: PathBuf::from(settings.evaluate(&group.schema.build_path)?),
            });
        }

        let request = archive_request(&settings.staging_path, &staged);
        info!("Archiving {} bundles", request.definitions.len());
        let archived = {
            let _span = info_span!("archive").entered();
            archiver.build(&request)?
        };

        for stage in &staged {
            create_locations(&mut ctx, stage.group, &stage.output, &stage.load_path, &archived)?;
        }
        for stage in &staged {
            let working: Vec<String> = stage.output.definitions.iter().map(|d| d.name.clone()).collect();
            post_process_bundles(
                &mut ctx,
                stage.group,
                &working,
                &stage.unique_names,
                &archived,
                &stage.build_dir,
                &mut relocator,
            )?;
        }

        let (carry_over, cached_states) = match previous {
            Some(previous) => (revert_unchanged(&mut ctx, &settings.groups, previous)?, None),
            None => (Vec::new(), Some(record_bundle_file_ids(&ctx, &settings.groups))),
        };

        let pending = std::mem::take(&mut ctx.pending_renames);
        let failures = relocator.apply_pending_renames(&pending, &mut ctx.table, &mut ctx.registry);
        let rename_error = (!failures.is_empty()).then(|| {
            let paths: Vec<String> = failures.iter().map(|f| f.path.display().to_string()).collect();
            format!("Failed to strip hash from bundles: {}", paths.join(", "))
        });

        let partitioned = partition(&mut ctx, settings, default, setups)?;

        let remote = if settings.build_remote_catalog {
            let paths = settings.remote_paths();
            if paths.is_none() {
                warn!("Remote catalog requested but Remote.BuildPath/Remote.LoadPath are not set");
            }
            paths
        } else {
            None
        };

        let (runtime, main_remote_hash) = write_catalogs(
            settings,
            &ctx.table,
            &partitioned,
            remote.as_ref(),
            &mut ctx.registry,
        )?;

        let settings_path = settings.settings_path()?;
        runtime.save(&settings_path)?;
        ctx.registry.add_file(&settings_path);
        result.output_path = Some(settings_path);

        if let Some(states) = cached_states {
            let mut state = ContentState::new(settings.player_version.clone(), main_remote_hash);
            state.cached_infos = states;
            match state.save(&settings.content_state_path) {
                Ok(()) => result.content_state_path = Some(settings.content_state_path.clone()),
                Err(e) => error!(
                    "Failed to save content state to {}: {}",
                    settings.content_state_path.display(),
                    e
                ),
            }
        }

        let relocations = catalog_relocations(&ctx, settings, &partitioned);
        let remote_build = remote.as_ref().map(|(build, _)| build.as_path());
        relocator.relocate_catalog_outputs(&local_build, remote_build, &relocations)?;
        register_relocated(&mut ctx.registry, &local_build, remote_build, &relocations);

        result.location_count = ctx.table.indexed_len();
        result.bundle_results = std::mem::take(&mut ctx.reports);
        result.carry_over = carry_over;
        result.output_files = ctx.registry.files().map(Path::to_path_buf).collect();

        if let Some(message) = rename_error {
            error!("{}", message);
            result.error = Some(message);
        }
        Ok(())
    }

    /// Whether the settings file and the main catalog of a previous build exist
    pub fn is_data_built(&self) -> bool {
        match (self.settings.settings_path(), self.settings.catalog_path()) {
            (Ok(settings), Ok(catalog)) => settings.exists() && catalog.exists(),
            _ => false,
        }
    }

    /// Remove everything a build wrote
    ///
    /// Refuses to delete a build directory that is the current working directory.
    pub fn clear_cached_data(&self) -> Result<()> {
        let settings = &self.settings;
        for file in [settings.settings_path()?, settings.catalog_path()?] {
            if file.exists() {
                fs::remove_file(&file)?;
            }
        }

        let mut dirs = vec![settings.local_build_path()?, settings.staging_path.clone()];
        for catalog in &settings.external_catalogs {
            dirs.push(PathBuf::from(settings.evaluate(&catalog.build_path)?));
        }

        for dir in dirs {
            remove_build_dir(&dir)?;
        }
        info!("Cleared cached build data");
        Ok(())
    }
}

fn archive_request(staging_dir: &Path, staged: &[StagedGroup<'_>]) -> ArchiveRequest {
    let mut references = BTreeMap::new();
    for stage in staged {
        for packed in &stage.output.entries {
            if !packed.entry.references.is_empty() {
                references.insert(packed.entry.asset_path.clone(), packed.entry.references.clone());
            }
        }
    }

    ArchiveRequest {
        staging_dir: staging_dir.to_path_buf(),
        definitions: staged
            .iter()
            .flat_map(|stage| stage.output.definitions.iter().cloned())
            .collect(),
        references,
    }
}

/// Write every catalog and collect the runtime settings
///
/// Returns the settings and the runtime path of the main catalog's remote hash.
fn write_catalogs(
    settings: &BuildSettings,
    table: &LocationTable,
    partitioned: &Partition,
    remote: Option<&(PathBuf, String)>,
    registry: &mut FileRegistry,
) -> Result<(RuntimeSettings, Option<String>)> {
    let mut runtime = RuntimeSettings::new(settings.build_target.clone());
    runtime.catalog_request_timeout = settings.catalog_request_timeout;
    runtime.max_concurrent_web_requests = settings.max_concurrent_web_requests;
    runtime.disable_catalog_update_on_startup = settings.disable_catalog_update_on_startup;

    let target = |stem: String| {
        remote.map(|(build_dir, load_dir)| RemoteCatalogTarget {
            build_dir: build_dir.clone(),
            load_dir: load_dir.clone(),
            stem,
        })
    };

    let main_stem = format!("catalog_{}", settings.player_version);
    let outputs = write_catalog(&partitioned.default, table, target(main_stem.clone()).as_ref())?;
    register_catalog(registry, &outputs);
    runtime.add_catalog(
        MAIN_CATALOG_ID,
        &partitioned.default.runtime_path(),
        outputs.remote_hash_load_path.as_deref(),
        &main_stem,
    );
    let main_remote_hash = outputs.remote_hash_load_path.clone();

    for setup in &partitioned.extras {
        let outputs = write_catalog(&setup.info, table, target(setup.name.clone()).as_ref())?;
        register_catalog(registry, &outputs);
        if setup.info.register {
            runtime.add_catalog(
                &setup.info.identifier,
                &setup.info.runtime_path(),
                outputs.remote_hash_load_path.as_deref(),
                &setup.name,
            );
        }
    }

    Ok((runtime, main_remote_hash))
}

fn register_catalog(registry: &mut FileRegistry, outputs: &CatalogOutputs) {
    registry.add_file(&outputs.catalog_path);
    for path in [&outputs.remote_json, &outputs.remote_hash].into_iter().flatten() {
        registry.add_file(path);
    }
}

/// Bundle files each extra catalog takes out of the global build folder
///
/// Only groups writing to the default local build path are moved.
fn catalog_relocations(
    ctx: &BuildContext,
    settings: &BuildSettings,
    partitioned: &Partition,
) -> Vec<CatalogRelocation> {
    let working_of: HashMap<LocationId, &String> = ctx
        .bundle_locations
        .iter()
        .map(|(working, id)| (*id, working))
        .collect();

    partitioned
        .extras
        .iter()
        .map(|setup| {
            let bundles = setup
                .catalog_bundles
                .iter()
                .filter(|id| {
                    ctx.group_of(**id)
                        .and_then(|guid| settings.groups.iter().find(|g| g.guid == guid))
                        .map(|group| group.schema.build_path == LOCAL_BUILD_PATH)
                        .unwrap_or(false)
                })
                .filter_map(|id| working_of.get(id).and_then(|working| ctx.rename_map.get(*working)))
                .cloned()
                .collect();

            CatalogRelocation {
                name: setup.name.clone(),
                build_dir: setup.build_path.clone(),
                bundles,
            }
        })
        .collect()
}

fn register_relocated(
    registry: &mut FileRegistry,
    local_build: &Path,
    remote_build: Option<&Path>,
    relocations: &[CatalogRelocation],
) {
    for relocation in relocations {
        for bundle in &relocation.bundles {
            registry.replace_bundle_entry(local_build.join(bundle), relocation.build_dir.join(bundle));
        }
        if let Some(remote) = remote_build {
            for ext in ["json", "hash"] {
                let file = format!("{}.{}", relocation.name, ext);
                registry.replace_bundle_entry(remote.join(&file), remote.join(&relocation.name).join(&file));
            }
        }
    }
}

fn remove_build_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let cwd = std::env::current_dir()?;
    if dir.canonicalize()? == cwd.canonicalize()? {
        return Err(PackError::config(format!(
            "refusing to delete {}: it is the working directory",
            dir.display()
        )));
    }
    fs::remove_dir_all(dir)?;
    Ok(())
}
