//! Property-based tests for naming, key and closure invariants
//!
//! Uses proptest to check the catalog invariants over random groups and dependency graphs

use bundlepack::core::catalog::{CatalogBuildInfo, Location, LocationId, LocationTable, ResourceType, MAIN_CATALOG_ID};
use bundlepack::core::context::BuildContext;
use bundlepack::core::grouper::{pack, PackOptions};
use bundlepack::core::partition::{partition, CatalogSetup, Membership};
use bundlepack::core::stabilizer::NameStabilizer;
use bundlepack::{BuildSettings, Entry, Group, PackError, PackingPolicy, Profile};
use proptest::prelude::*;
use std::collections::HashSet;

fn policy() -> impl Strategy<Value = PackingPolicy> {
    prop_oneof![
        Just(PackingPolicy::Together),
        Just(PackingPolicy::Separately),
        Just(PackingPolicy::ByLabelSet),
    ]
}

fn group_strategy() -> impl Strategy<Value = Group> {
    (
        policy(),
        prop::collection::vec(("[a-z]{1,6}", prop::collection::vec("[A-C]", 0..3)), 1..20),
    )
        .prop_map(|(policy, entries)| {
            let mut group = Group::new("G1", "Prop Group").with_packing(policy);
            for (i, (address, labels)) in entries.into_iter().enumerate() {
                let mut entry = Entry::new(format!("guid-{}", i), address, format!("Assets/{}.asset", i));
                for label in labels {
                    entry = entry.with_label(label);
                }
                group = group.with_entry(entry);
            }
            group
        })
}

fn keys_resolve(table: &LocationTable) -> bool {
    table
        .indexed_ids()
        .all(|id| table[id].dependencies.iter().all(|dep| table.lookup(dep).is_some()))
}

proptest! {
    #[test]
    fn prop_pack_and_stabilize_are_deterministic(group in group_strategy()) {
        let run = || {
            let mut out = pack(&group, &PackOptions::default()).unwrap();
            let unique = NameStabilizer::new().stabilize(&mut out.definitions).unwrap();
            let names: Vec<String> = out.definitions.iter().map(|d| d.name.clone()).collect();
            (names, unique)
        };
        prop_assert_eq!(run(), run());
    }

    #[test]
    fn prop_stabilized_names_are_unique(groups in prop::collection::vec(group_strategy(), 1..4)) {
        let mut stabilizer = NameStabilizer::new();
        let mut seen = HashSet::new();
        for group in &groups {
            let mut out = pack(group, &PackOptions::default()).unwrap();
            for name in stabilizer.stabilize(&mut out.definitions).unwrap() {
                prop_assert!(seen.insert(name.to_lowercase()), "duplicate name {}", name);
            }
        }
    }

    #[test]
    fn prop_primary_key_renames_keep_references(
        bundle_count in 1usize..8,
        assets in prop::collection::vec(prop::collection::vec(0usize..8, 1..4), 1..20),
        renames in prop::collection::vec(0usize..8, 0..10),
    ) {
        let mut table = LocationTable::new();
        let bundles: Vec<LocationId> = (0..bundle_count)
            .map(|i| {
                table
                    .insert(Location::new(vec![format!("w{}.bundle", i)], ResourceType::Bundle, "BundleProvider", "x"))
                    .unwrap()
            })
            .collect();
        for (i, deps) in assets.iter().enumerate() {
            let deps = deps.iter().map(|d| format!("w{}.bundle", d % bundle_count)).collect();
            table
                .insert(Location::new(vec![format!("asset{}", i)], ResourceType::Asset, "p", "y").with_dependencies(deps))
                .unwrap();
        }

        for (round, target) in renames.iter().enumerate() {
            let id = bundles[target % bundle_count];
            table.set_primary_key(id, &format!("final{}_{}.bundle", round, target)).unwrap();
        }

        prop_assert!(keys_resolve(&table));
        let keys: HashSet<&str> = table.indexed_ids().map(|id| table[id].keys[0].as_str()).collect();
        prop_assert_eq!(keys.len(), table.indexed_len());
        for id in table.indexed_ids() {
            for dep in &table[id].dependencies {
                prop_assert!(table.dependers_of(dep).any(|d| d == id));
            }
        }
    }

    #[test]
    fn prop_partitioned_catalogs_are_closed(
        owners in prop::collection::vec(0usize..3, 1..6),
        assets in prop::collection::vec((0usize..3, 0usize..6), 1..20),
    ) {
        let groups: Vec<Group> = (0..3).map(|g| Group::new(format!("g{}", g), format!("Group{}", g))).collect();
        let settings = BuildSettings {
            profile: Profile::new()
                .with("Local.BuildPath", "out")
                .with("Local.LoadPath", "{RuntimePath}"),
            groups,
            ..BuildSettings::default()
        };

        let mut ctx = BuildContext::new();
        for (b, owner) in owners.iter().enumerate() {
            let id = ctx
                .table
                .insert(Location::new(
                    vec![format!("b{}.bundle", b)],
                    ResourceType::Bundle,
                    "BundleProvider",
                    format!("{{RuntimePath}}/b{}.bundle", b),
                ))
                .unwrap();
            ctx.location_group.insert(id, format!("g{}", owner));
        }
        for (i, (owner, bundle)) in assets.iter().enumerate() {
            let dep = format!("b{}.bundle", bundle % owners.len());
            let id = ctx
                .table
                .insert(Location::new(vec![format!("a{}", i)], ResourceType::Asset, "p", format!("Assets/{}", i))
                    .with_dependencies(vec![dep]))
                .unwrap();
            ctx.location_group.insert(id, format!("g{}", owner));
        }

        let setups = vec![
            CatalogSetup::new("one", Membership::Groups(vec!["Group1".into()]), "out/one", "{RuntimePath}/one"),
            CatalogSetup::new("two", Membership::Groups(vec!["Group2".into()]), "out/two", "{RuntimePath}/two"),
        ];
        let default = CatalogBuildInfo::new(MAIN_CATALOG_ID, "catalog.json");

        // Assets in one extra catalog depending on a bundle of the other cannot be closed
        let crosses_extras = assets.iter().any(|(owner, bundle)| {
            let bundle_owner = owners[bundle % owners.len()];
            *owner != 0 && bundle_owner != 0 && *owner != bundle_owner
        });
        let result = match partition(&mut ctx, &settings, default, setups) {
            Ok(result) => {
                prop_assert!(!crosses_extras, "cross-catalog dependency was accepted");
                result
            }
            Err(err) => {
                prop_assert!(crosses_extras, "unexpected error: {}", err);
                prop_assert!(matches!(err, PackError::UnresolvedDependency { .. }), "unexpected error variant: {:?}", err);
                return Ok(());
            }
        };

        let mut infos = vec![&result.default];
        infos.extend(result.extras.iter().map(|s| &s.info));
        for info in infos {
            let keys: HashSet<&str> = info
                .locations
                .iter()
                .map(|id| ctx.table[*id].keys[0].as_str())
                .collect();
            prop_assert_eq!(keys.len(), info.locations.len());
            for id in &info.locations {
                for dep in &ctx.table[*id].dependencies {
                    prop_assert!(keys.contains(dep.as_str()), "{} misses {}", info.identifier, dep);
                }
            }
        }
    }
}
