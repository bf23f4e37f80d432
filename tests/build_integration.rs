//! End-to-end builds with the file archiver

use bundlepack::core::archiver::read_bundle;
use bundlepack::{
    ArchiveFailure, ArchiveOutput, ArchiveRequest, Archiver, BuildSettings, BundleNaming, CatalogDocument,
    ContentState, Entry, EntryKind, ExternalCatalogConfig, Group, PackerBuilder, Profile, RuntimeSettings,
};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_content(root: &Path) {
    let assets = root.join("Assets");
    fs::create_dir_all(&assets).unwrap();
    fs::write(assets.join("hero.prefab"), b"hero").unwrap();
    fs::write(assets.join("villain.prefab"), b"villain").unwrap();
    fs::write(assets.join("tex.png"), b"texture bytes").unwrap();
    fs::write(assets.join("level1.unity"), b"scene").unwrap();
}

fn groups() -> Vec<Group> {
    vec![
        Group::new("AAA1", "Characters")
            .with_entry(
                Entry::new("e-hero", "hero", "Assets/hero.prefab")
                    .with_label("chars")
                    .with_reference("Assets/tex.png")
                    .with_dependency_hash("h-hero"),
            )
            .with_entry(Entry::new("e-villain", "villain", "Assets/villain.prefab").with_dependency_hash("h-villain")),
        Group::new("BBB2", "Shared")
            .with_bundle_naming(BundleNaming::NoHash)
            .with_entry(Entry::new("e-tex", "tex", "Assets/tex.png").with_dependency_hash("h-tex")),
        Group::new("CCC3", "Levels").with_entry(
            Entry::new("e-level1", "level1", "Assets/level1.unity")
                .with_kind(EntryKind::Scene)
                .with_dependency_hash("h-level1"),
        ),
    ]
}

fn settings(root: &Path) -> BuildSettings {
    BuildSettings {
        build_target: "linux".into(),
        staging_path: root.join("staging"),
        content_state_path: root.join("state/content_state.bin"),
        profile: Profile::new()
            .with("Local.BuildPath", format!("{}/build/[BuildTarget]", root.display()))
            .with("Local.LoadPath", "{RuntimePath}/[BuildTarget]")
            .with("Remote.BuildPath", format!("{}/remote", root.display()))
            .with("Remote.LoadPath", "https://cdn.example.com/[BuildTarget]"),
        groups: groups(),
        ..BuildSettings::default()
    }
}

fn dlc(root: &Path) -> ExternalCatalogConfig {
    ExternalCatalogConfig {
        name: "dlc".into(),
        build_path: format!("{}/dlc", root.display()),
        load_path: "{RuntimePath}/dlc".into(),
        groups: vec!["Characters".into()],
    }
}

fn assert_closed(doc: &CatalogDocument) {
    let keys: HashSet<&str> = doc.locations.iter().map(|l| l.keys[0].as_str()).collect();
    assert_eq!(keys.len(), doc.locations.len(), "duplicate primary keys in {}", doc.locator_id);
    for location in &doc.locations {
        for dep in &location.dependencies {
            assert!(keys.contains(dep.as_str()), "{} is missing {}", doc.locator_id, dep);
        }
    }
}

fn find<'a>(doc: &'a CatalogDocument, key: &str) -> Option<&'a bundlepack::Location> {
    doc.locations.iter().find(|l| l.keys.iter().any(|k| k == key))
}

#[test]
fn test_full_build_writes_catalog_and_bundles() {
    let dir = TempDir::new().unwrap();
    write_content(dir.path());

    let mut pipeline = PackerBuilder::new()
        .settings(settings(dir.path()))
        .content_root(dir.path())
        .build()
        .unwrap();
    let result = pipeline.build(None);

    assert!(result.succeeded(), "{:?}", result.error);
    assert!(!result.is_update_build);
    assert_eq!(result.bundle_results.len(), 3);
    assert_eq!(result.location_count, 3 + 4);
    assert!(pipeline.is_data_built());

    let build_dir = dir.path().join("build/linux");
    let doc = CatalogDocument::load(build_dir.join("catalog.json")).unwrap();
    assert_closed(&doc);

    // Hash-free group: file renamed, key keeps the hash, internal id does not
    assert!(build_dir.join("shared_assets_all.bundle").exists());
    let shared = doc
        .locations
        .iter()
        .find(|l| l.keys[0].starts_with("shared_assets_all_"))
        .unwrap();
    assert_eq!(shared.internal_id, "{RuntimePath}/linux/shared_assets_all.bundle");

    let hero = find(&doc, "hero").unwrap();
    assert_eq!(hero.keys, vec!["hero", "e-hero", "chars"]);
    assert!(hero.dependencies[0].starts_with("characters_assets_all_"));
    assert!(hero.dependencies.contains(&shared.keys[0]));

    let level = find(&doc, "level1").unwrap();
    assert_eq!(level.provider, "SceneProvider");

    let chars_report = result
        .bundle_results
        .iter()
        .find(|r| r.group_guid == "AAA1")
        .unwrap();
    let members = read_bundle(&chars_report.file_path).unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].data, b"hero");

    let runtime = RuntimeSettings::load(result.output_path.as_ref().unwrap()).unwrap();
    assert_eq!(runtime.catalog_locations.len(), 1);
    assert_eq!(runtime.catalog_locations[0].internal_id, "{RuntimePath}/linux/catalog.json");
    assert_eq!(runtime.build_target, "linux");

    let state = ContentState::load(result.content_state_path.as_ref().unwrap()).unwrap();
    assert_eq!(state.cached_infos.len(), 4);
    assert_eq!(
        state.find("e-tex").unwrap().bundle_file_id,
        "{RuntimePath}/linux/shared_assets_all.bundle"
    );

    for file in &result.output_files {
        assert!(file.exists(), "{} was registered but is missing", file.display());
    }
}

#[test]
fn test_extra_catalog_gets_its_own_folder() {
    let dir = TempDir::new().unwrap();
    write_content(dir.path());

    let mut settings = settings(dir.path());
    settings.external_catalogs.push(dlc(dir.path()));

    let mut pipeline = PackerBuilder::new()
        .settings(settings)
        .content_root(dir.path())
        .build()
        .unwrap();
    let result = pipeline.build(None);
    assert!(result.succeeded(), "{:?}", result.error);

    let main = CatalogDocument::load(dir.path().join("build/linux/catalog.json")).unwrap();
    let extra = CatalogDocument::load(dir.path().join("dlc/dlc.json")).unwrap();
    assert_closed(&main);
    assert_closed(&extra);

    assert!(find(&main, "hero").is_none());
    assert!(find(&extra, "hero").is_some());
    // Pulled in from the default catalog for closure
    assert!(extra.locations.iter().any(|l| l.keys[0].starts_with("shared_assets_all_")));

    let chars = extra
        .locations
        .iter()
        .find(|l| l.keys[0].starts_with("characters_assets_all_"))
        .unwrap();
    assert!(chars.internal_id.starts_with("{RuntimePath}/dlc/characters_assets_all_"));

    let file = chars.internal_id.rsplit('/').next().unwrap();
    assert!(dir.path().join("dlc").join(file).exists());
    assert!(!dir.path().join("build/linux").join(file).exists());

    let runtime = RuntimeSettings::load(result.output_path.as_ref().unwrap()).unwrap();
    assert_eq!(runtime.catalog_locations.len(), 1);

    for file in &result.output_files {
        assert!(file.exists(), "{} was registered but is missing", file.display());
    }
}

#[test]
fn test_remote_catalog_mirror_and_hash() {
    let dir = TempDir::new().unwrap();
    write_content(dir.path());

    let mut settings = settings(dir.path());
    settings.build_remote_catalog = true;
    settings.external_catalogs.push(dlc(dir.path()));

    let mut pipeline = PackerBuilder::new()
        .settings(settings)
        .content_root(dir.path())
        .build()
        .unwrap();
    let result = pipeline.build(None);
    assert!(result.succeeded(), "{:?}", result.error);

    let remote = dir.path().join("remote");
    let local = fs::read_to_string(dir.path().join("build/linux/catalog.json")).unwrap();
    assert_eq!(fs::read_to_string(remote.join("catalog_1.0.0.json")).unwrap(), local);
    assert!(remote.join("catalog_1.0.0.hash").exists());
    assert!(remote.join("dlc/dlc.json").exists());
    assert!(remote.join("dlc/dlc.hash").exists());
    assert!(!remote.join("dlc.json").exists());

    let runtime = RuntimeSettings::load(result.output_path.as_ref().unwrap()).unwrap();
    let keys: Vec<_> = runtime.catalog_locations.iter().map(|l| l.keys[0].as_str()).collect();
    assert!(keys.contains(&"AddressablesMainContentCatalogRemoteHash"));
    assert!(keys.contains(&"AddressablesMainContentCatalogCacheHash"));

    let state = ContentState::load(result.content_state_path.as_ref().unwrap()).unwrap();
    assert_eq!(
        state.remote_catalog_load_path.as_deref(),
        Some("https://cdn.example.com/linux/catalog_1.0.0.hash")
    );
}

#[test]
fn test_content_update_reuses_unchanged_bundles() {
    let dir = TempDir::new().unwrap();
    write_content(dir.path());

    let mut pipeline = PackerBuilder::new()
        .settings(settings(dir.path()))
        .content_root(dir.path())
        .build()
        .unwrap();
    let first = pipeline.build(None);
    assert!(first.succeeded(), "{:?}", first.error);
    let previous = ContentState::load(first.content_state_path.as_ref().unwrap()).unwrap();
    let old_chars = previous.find("e-hero").unwrap().bundle_file_id.clone();

    // Same content: everything is carried over
    let update = pipeline.build(Some(&previous));
    assert!(update.succeeded(), "{:?}", update.error);
    assert!(update.is_update_build);
    assert!(update.content_state_path.is_none());
    assert_eq!(update.carry_over.len(), 4);

    // Change one character: only the characters bundle is rebuilt
    let mut changed = settings(dir.path());
    changed.groups[0].entries[0].dependency_hash = Some("h-hero-2".into());
    fs::write(dir.path().join("Assets/hero.prefab"), b"hero v2").unwrap();

    let mut pipeline = PackerBuilder::new()
        .settings(changed)
        .content_root(dir.path())
        .build()
        .unwrap();
    let partial = pipeline.build(Some(&previous));
    assert!(partial.succeeded(), "{:?}", partial.error);

    let guids: HashSet<_> = partial.carry_over.iter().map(|s| s.guid.as_str()).collect();
    assert_eq!(guids, HashSet::from(["e-tex", "e-level1"]));

    let doc = CatalogDocument::load(dir.path().join("build/linux/catalog.json")).unwrap();
    let level_dep = &find(&doc, "level1").unwrap().dependencies[0];
    let level_bundle = doc.locations.iter().find(|l| &l.keys[0] == level_dep).unwrap();
    assert_eq!(
        level_bundle.internal_id,
        previous.find("e-level1").unwrap().bundle_file_id
    );

    let chars_dep = &find(&doc, "hero").unwrap().dependencies[0];
    let chars_bundle = doc.locations.iter().find(|l| &l.keys[0] == chars_dep).unwrap();
    assert_ne!(chars_bundle.internal_id, old_chars);
}

struct FailingArchiver;

impl Archiver for FailingArchiver {
    fn build(&mut self, _request: &ArchiveRequest) -> Result<ArchiveOutput, ArchiveFailure> {
        Err(ArchiveFailure::new(-7, "disk full"))
    }
}

#[test]
fn test_archiver_failure_writes_no_catalog() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = PackerBuilder::new()
        .settings(settings(dir.path()))
        .archiver(FailingArchiver)
        .build()
        .unwrap();

    let result = pipeline.build(None);
    let error = result.error.unwrap();
    assert!(error.contains("-7"), "{}", error);
    assert!(error.contains("disk full"), "{}", error);
    assert!(!dir.path().join("build/linux/catalog.json").exists());
    assert!(!pipeline.is_data_built());
}

#[test]
fn test_missing_source_fails_build() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = PackerBuilder::new()
        .settings(settings(dir.path()))
        .content_root(dir.path().join("nowhere"))
        .build()
        .unwrap();

    let result = pipeline.build(None);
    assert!(result.error.unwrap().contains("Archiver failed"));
}

#[test]
fn test_invalid_configuration_is_reported() {
    let dir = TempDir::new().unwrap();
    let mut settings = settings(dir.path());
    settings.profile = Profile::new();

    let mut pipeline = PackerBuilder::new()
        .settings(settings)
        .content_root(dir.path())
        .build()
        .unwrap();
    let result = pipeline.build(None);
    assert!(result.error.unwrap().contains("Local.BuildPath"));
    assert_eq!(result.location_count, 0);
}

#[test]
fn test_bad_catalog_load_path_stops_before_archiving() {
    let dir = TempDir::new().unwrap();
    write_content(dir.path());
    let mut settings = settings(dir.path());
    let mut catalog = dlc(dir.path());
    catalog.load_path = "[Undefined.Var]/dlc".into();
    settings.external_catalogs.push(catalog);

    let mut pipeline = PackerBuilder::new()
        .settings(settings)
        .content_root(dir.path())
        .build()
        .unwrap();
    let result = pipeline.build(None);

    let error = result.error.unwrap();
    assert!(error.contains("Undefined.Var"), "{}", error);
    assert!(!dir.path().join("staging").exists());
    assert!(!dir.path().join("build").exists());
    assert!(result.bundle_results.is_empty());
}

#[test]
fn test_dependency_between_extra_catalogs_fails_build() {
    let dir = TempDir::new().unwrap();
    write_content(dir.path());
    let mut settings = settings(dir.path());
    settings.external_catalogs.push(ExternalCatalogConfig {
        name: "one".into(),
        build_path: format!("{}/one", dir.path().display()),
        load_path: "{RuntimePath}/one".into(),
        groups: vec!["Characters".into()],
    });
    settings.external_catalogs.push(ExternalCatalogConfig {
        name: "two".into(),
        build_path: format!("{}/two", dir.path().display()),
        load_path: "{RuntimePath}/two".into(),
        groups: vec!["Shared".into()],
    });

    let mut pipeline = PackerBuilder::new()
        .settings(settings)
        .content_root(dir.path())
        .build()
        .unwrap();
    let result = pipeline.build(None);

    let error = result.error.unwrap();
    assert!(error.contains("Could not find location for dependency"), "{}", error);
    assert!(error.contains("shared_assets_all"), "{}", error);
    assert!(error.contains("of catalog 'one'"), "{}", error);
    assert!(!pipeline.is_data_built());
}

#[test]
fn test_unknown_entry_strict_and_tolerant() {
    let dir = TempDir::new().unwrap();
    write_content(dir.path());
    fs::write(dir.path().join("Assets/odd.xyz"), b"?").unwrap();

    let mut settings = settings(dir.path());
    settings.groups[0]
        .entries
        .push(Entry::new("e-odd", "odd", "Assets/odd.xyz").with_kind(EntryKind::Unknown));

    let mut strict = PackerBuilder::new()
        .settings(settings.clone())
        .content_root(dir.path())
        .build()
        .unwrap();
    let result = strict.build(None);
    assert!(result.error.unwrap().contains("Assets/odd.xyz"));

    settings.ignore_unsupported_files = true;
    let mut tolerant = PackerBuilder::new()
        .settings(settings)
        .content_root(dir.path())
        .build()
        .unwrap();
    let result = tolerant.build(None);
    assert!(result.succeeded(), "{:?}", result.error);
    assert_eq!(result.location_count, 3 + 4);
}

#[test]
fn test_clear_cached_data() {
    let dir = TempDir::new().unwrap();
    write_content(dir.path());

    let mut settings = settings(dir.path());
    settings.external_catalogs.push(dlc(dir.path()));
    let mut pipeline = PackerBuilder::new()
        .settings(settings)
        .content_root(dir.path())
        .build()
        .unwrap();
    assert!(pipeline.build(None).succeeded());
    assert!(pipeline.is_data_built());

    pipeline.clear_cached_data().unwrap();
    assert!(!pipeline.is_data_built());
    assert!(!dir.path().join("build/linux").exists());
    assert!(!dir.path().join("staging").exists());
    assert!(!dir.path().join("dlc").exists());
}

#[test]
fn test_settings_from_toml_build() {
    let dir = TempDir::new().unwrap();
    write_content(dir.path());

    let root = dir.path().display();
    let config = format!(
        r#"
        player_version = "3.2.1"
        build_target = "linux"
        staging_path = "{root}/staging"
        content_state_path = "{root}/state.bin"

        [profile]
        "Local.BuildPath" = "{root}/out"
        "Local.LoadPath" = "{{RuntimePath}}"

        [[groups]]
        guid = "g1"
        name = "Everything"

        [[groups.entries]]
        guid = "a"
        address = "hero"
        asset_path = "Assets/hero.prefab"
        labels = ["x"]

        [[groups.entries]]
        guid = "b"
        address = "villain"
        asset_path = "Assets/villain.prefab"
        "#
    );
    let path = dir.path().join("bundlepack.toml");
    fs::write(&path, config).unwrap();

    let mut pipeline = PackerBuilder::new()
        .config_file(&path)
        .content_root(dir.path())
        .build()
        .unwrap();
    let result = pipeline.build(None);
    assert!(result.succeeded(), "{:?}", result.error);

    let doc = CatalogDocument::load(dir.path().join("out/catalog.json")).unwrap();
    assert_closed(&doc);
    assert_eq!(doc.locations.len(), 3);
    assert!(dir.path().join("state.bin").exists());
}
