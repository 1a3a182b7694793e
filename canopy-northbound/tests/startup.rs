//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::PathBuf;
use std::sync::Arc;

use canopy_northbound::changelog::{
    Changelog, ChangelogEntry, ChangelogOp, ChangelogStep,
};
use canopy_northbound::datastore::DatastoreId;
use canopy_northbound::engine::{Engine, EngineOptions};
use canopy_northbound::error::Error;
use canopy_northbound::plugin::{
    PluginBuilder, PluginContext, PluginRegistry,
};
use canopy_tree::ConfigTree;
use canopy_yang::modstate::{ModstateDiff, ModuleState};
use canopy_yang::types::TypeSpec;
use canopy_yang::{SpecBuilder, YangSpec};
use serde_json::json;

fn spec() -> Arc<YangSpec> {
    let mut builder = SpecBuilder::new();
    let sys = builder.add_module("sys", "urn:test:sys", "2024-06-01");
    let system = builder.container(sys, None, "system");
    builder.leaf(sys, Some(system), "hostname", TypeSpec::string());
    let timers = builder.container(sys, Some(system), "timers");
    builder.must(timers, "interval != 0");
    let interval =
        builder.leaf(sys, Some(timers), "interval", TypeSpec::uint16());
    builder.default_value(interval, "30");
    builder.build()
}

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("canopy-startup-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn engine(name: &str, plugins: PluginRegistry) -> Engine {
    Engine::new(spec(), test_dir(name), EngineOptions::default(), plugins)
        .unwrap()
}

fn write_datastore(
    engine: &Engine,
    id: &DatastoreId,
    config: serde_json::Value,
) {
    let envelope = json!({
        "module-state": ModuleState::of_spec(engine.spec()),
        "config": config,
    });
    let path = engine.store().dir().join(id.file_name());
    std::fs::write(path, serde_json::to_string_pretty(&envelope).unwrap())
        .unwrap();
}

fn hostname(tree: &ConfigTree) -> Option<String> {
    let system = tree.find_child(tree.root(), "system")?;
    let leaf = tree.find_child(system, "hostname")?;
    tree.body(leaf).map(str::to_owned)
}

#[test]
fn startup_commits_to_running() {
    let engine = &mut engine("ok", PluginRegistry::new());
    write_datastore(
        engine,
        &DatastoreId::Startup,
        json!({"sys:system": {"hostname": "rt1"}}),
    );

    engine.startup_replay().unwrap();
    assert_eq!(hostname(engine.running()), Some("rt1".to_owned()));

    // The committed running carries the filled-in defaults.
    let system = engine
        .running()
        .find_child(engine.running().root(), "system")
        .unwrap();
    let timers = engine.running().find_child(system, "timers").unwrap();
    let interval = engine.running().find_child(timers, "interval").unwrap();
    assert_eq!(engine.running().body(interval), Some("30"));
}

#[test]
fn missing_startup_yields_empty_running() {
    let engine = &mut engine("missing", PluginRegistry::new());
    engine.startup_replay().unwrap();
    assert!(engine.running().is_empty());
}

#[test]
fn invalid_startup_engages_failsafe() {
    let engine = &mut engine("failsafe", PluginRegistry::new());
    // The startup configuration violates the must constraint.
    write_datastore(
        engine,
        &DatastoreId::Startup,
        json!({"sys:system": {
            "hostname": "rt1",
            "timers": {"interval": "0"},
        }}),
    );
    write_datastore(
        engine,
        &DatastoreId::Failsafe,
        json!({"sys:system": {"hostname": "failsafe"}}),
    );

    engine.startup_replay().unwrap();
    assert_eq!(hostname(engine.running()), Some("failsafe".to_owned()));
}

#[test]
fn broken_failsafe_is_fatal() {
    let engine = &mut engine("fatal", PluginRegistry::new());
    write_datastore(
        engine,
        &DatastoreId::Startup,
        json!({"sys:system": {"timers": {"interval": "0"}}}),
    );
    write_datastore(
        engine,
        &DatastoreId::Failsafe,
        json!({"sys:system": {"timers": {"interval": "0"}}}),
    );

    assert!(matches!(engine.startup_replay(), Err(Error::Fatal(_))));
}

#[test]
fn changelog_upgrades_old_startup_content() {
    // The stored tree was authored against an older module revision
    // using a leaf that no longer exists.
    let mut plugins = PluginRegistry::new();
    Changelog {
        entries: vec![ChangelogEntry {
            namespace: "urn:test:sys".to_owned(),
            revfrom: "2023-01-01".to_owned(),
            revision: "2024-06-01".to_owned(),
            steps: vec![ChangelogStep {
                op: ChangelogOp::Rename,
                r#where: "/system/fqdn".to_owned(),
                when: None,
                tag: Some("'hostname'".to_owned()),
                dst: None,
                new: None,
            }],
        }],
    }
    .register(&mut plugins);

    let engine = &mut engine("changelog", plugins);
    let envelope = json!({
        "module-state": [{"module": "sys", "revision": "2023-01-01"}],
        "config": {"sys:system": {"fqdn": "rt1.example.com"}},
    });
    let path = engine
        .store()
        .dir()
        .join(DatastoreId::Startup.file_name());
    std::fs::write(path, serde_json::to_string(&envelope).unwrap()).unwrap();

    engine.startup_replay().unwrap();
    assert_eq!(
        hostname(engine.running()),
        Some("rt1.example.com".to_owned())
    );
}

#[test]
fn datastore_upgrade_callback_prunes_obsolete_nodes() {
    fn prune(
        _context: &mut PluginContext,
        tree: &mut ConfigTree,
        _msdiff: &ModstateDiff,
    ) -> Result<(), String> {
        let root = tree.root();
        if let Some(system) = tree.find_child(root, "system")
            && let Some(obsolete) = tree.find_child(system, "obsolete")
        {
            tree.remove(obsolete);
        }
        Ok(())
    }

    let mut plugins = PluginRegistry::new();
    PluginBuilder::new("pruner")
        .datastore_upgrade(prune)
        .register(&mut plugins);

    let engine = &mut engine("prune", plugins);
    write_datastore(
        engine,
        &DatastoreId::Startup,
        json!({"sys:system": {
            "hostname": "rt1",
            "obsolete": "x",
        }}),
    );

    engine.startup_replay().unwrap();
    assert_eq!(hostname(engine.running()), Some("rt1".to_owned()));
}
