//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use canopy_northbound::datastore::DatastoreId;
use canopy_northbound::engine::{
    CommitParams, EditOperation, Engine, EngineOptions,
};
use canopy_northbound::error::Error;
use canopy_northbound::plugin::{
    CallbackArgs, PluginBuilder, PluginContext, PluginRegistry,
};
use canopy_tree::ConfigTree;
use canopy_utils::netconf::ErrorTag;
use canopy_yang::types::TypeSpec;
use canopy_yang::{SpecBuilder, YangSpec};
use serde_json::json;

fn spec() -> Arc<YangSpec> {
    let mut builder = SpecBuilder::new();
    let sys = builder.add_module("sys", "urn:test:sys", "2024-01-10");
    let a = builder.container(sys, None, "a");
    builder.leaf(sys, Some(a), "b", TypeSpec::uint8());
    builder.leaf(sys, Some(a), "c", TypeSpec::uint8());
    let system = builder.container(sys, None, "system");
    builder.leaf(sys, Some(system), "hostname", TypeSpec::string());
    let user = builder.list(sys, Some(system), "user", &["name"]);
    builder.leaf(sys, Some(user), "name", TypeSpec::string());
    builder.leaf(sys, Some(user), "uid", TypeSpec::uint32());
    builder.build()
}

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("canopy-engine-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn engine(name: &str, plugins: PluginRegistry) -> Engine {
    Engine::new(spec(), test_dir(name), EngineOptions::default(), plugins)
        .unwrap()
}

fn set_candidate(engine: &mut Engine, config: serde_json::Value) {
    engine
        .edit_config(1, &DatastoreId::Candidate, EditOperation::Replace, &config)
        .unwrap();
}

fn commit(engine: &mut Engine, session: u32) -> Result<u32, Error> {
    engine
        .commit(CommitParams {
            session,
            ..Default::default()
        })
        .map(|outcome| outcome.transaction_id)
}

fn body_of(tree: &ConfigTree, path: &[&str]) -> Option<String> {
    let mut node = tree.root();
    for name in path {
        node = tree.find_child(node, name)?;
    }
    tree.body(node).map(str::to_owned)
}

// ===== plugins used by the tests =====

type Log = Arc<Mutex<Vec<String>>>;

struct Recorder {
    log: Log,
    fail_commit: bool,
}

fn record(
    context: &mut PluginContext,
    phase: &'static str,
) -> Result<(), String> {
    let recorder = context.data.downcast_ref::<Recorder>().unwrap();
    recorder.log.lock().unwrap().push(phase.to_owned());
    if recorder.fail_commit && phase == "commit" {
        return Err("resource allocation failed".to_owned());
    }
    Ok(())
}

fn rec_begin(
    context: &mut PluginContext,
    _args: CallbackArgs<'_>,
) -> Result<(), String> {
    record(context, "begin")
}

fn rec_validate(
    context: &mut PluginContext,
    _args: CallbackArgs<'_>,
) -> Result<(), String> {
    record(context, "validate")
}

fn rec_commit(
    context: &mut PluginContext,
    _args: CallbackArgs<'_>,
) -> Result<(), String> {
    record(context, "commit")
}

fn rec_end(
    context: &mut PluginContext,
    _args: CallbackArgs<'_>,
) -> Result<(), String> {
    record(context, "end")
}

fn rec_abort(context: &mut PluginContext, _args: CallbackArgs<'_>) {
    let _ = record(context, "abort");
}

fn recorder(log: Log, fail_commit: bool) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    PluginBuilder::new("recorder")
        .data(Box::new(Recorder { log, fail_commit }))
        .begin(rec_begin)
        .validate(rec_validate)
        .commit(rec_commit)
        .end(rec_end)
        .abort(rec_abort)
        .register(&mut registry);
    registry
}

fn annotate_begin(
    _context: &mut PluginContext,
    args: CallbackArgs<'_>,
) -> Result<(), String> {
    let root = args.target.root();
    if let Some(a) = args.target.find_child(root, "a")
        && args.target.find_child(a, "c").is_none()
    {
        args.target.add_leaf(a, None, "c", "5");
    }
    Ok(())
}

// ===== tests =====

#[test]
fn basic_commit() {
    let mut engine = engine("basic-commit", PluginRegistry::new());
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));

    let transaction_id = commit(&mut engine, 1).unwrap();
    assert!(transaction_id > 0);
    assert_eq!(body_of(engine.running(), &["a", "b"]), Some("1".to_owned()));
    assert!(!engine.candidate_dirty());

    // The running datastore was persisted.
    let (tree, _) = engine.store().load(&DatastoreId::Running).unwrap();
    let a = tree.find_child(tree.root(), "a").unwrap();
    let b = tree.find_child(a, "b").unwrap();
    assert_eq!(tree.body(b), Some("1"));
}

#[test]
fn validation_failure_leaves_running_untouched() {
    let mut engine = engine("validation-failure", PluginRegistry::new());
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    commit(&mut engine, 1).unwrap();

    set_candidate(&mut engine, json!({"sys:a": {"b": "x"}}));
    let error = commit(&mut engine, 1).unwrap_err();
    let Error::Validation(errors) = error else {
        panic!("expected a validation error");
    };
    let first = errors.first().unwrap();
    assert_eq!(first.error_tag, ErrorTag::InvalidValue);
    assert_eq!(first.error_path.as_deref(), Some("/sys:a/b"));

    // Running still holds the previous configuration.
    assert_eq!(body_of(engine.running(), &["a", "b"]), Some("1".to_owned()));
}

#[test]
fn commit_lock_denied() {
    let mut engine = engine("lock-denied", PluginRegistry::new());
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));

    engine.lock(1, &DatastoreId::Running).unwrap();
    let error = commit(&mut engine, 2).unwrap_err();
    assert!(matches!(error, Error::LockDenied { holder: 1, .. }));
    assert_eq!(error.rpc_errors().first().unwrap().error_tag, ErrorTag::InUse);
    assert!(engine.running().is_empty());

    // The lock holder itself may commit.
    commit(&mut engine, 1).unwrap();
    assert!(!engine.running().is_empty());
}

#[test]
fn lock_unlock_lifecycle() {
    let mut engine = engine("lock-lifecycle", PluginRegistry::new());
    engine.lock(1, &DatastoreId::Running).unwrap();
    // Re-locking by the same session is idempotent.
    engine.lock(1, &DatastoreId::Running).unwrap();
    assert!(engine.lock(2, &DatastoreId::Running).is_err());
    assert!(engine.unlock(2, &DatastoreId::Running).is_err());
    engine.unlock(1, &DatastoreId::Running).unwrap();
    engine.lock(2, &DatastoreId::Running).unwrap();
}

#[test]
fn locking_dirty_candidate_is_denied() {
    let mut engine = engine("lock-dirty", PluginRegistry::new());
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    assert!(engine.candidate_dirty());
    let error = engine.lock(1, &DatastoreId::Candidate).unwrap_err();
    assert_eq!(
        error.rpc_errors().first().unwrap().error_tag,
        ErrorTag::LockDenied
    );
}

#[test]
fn empty_candidate_commit_produces_empty_running() {
    let mut engine = engine("empty-commit", PluginRegistry::new());
    commit(&mut engine, 1).unwrap();
    assert!(engine.running().is_empty());
}

#[test]
fn empty_commit_still_runs_plugin_phases() {
    let log: Log = Default::default();
    let mut engine = engine("empty-phases", recorder(log.clone(), false));
    commit(&mut engine, 1).unwrap();
    let log = log.lock().unwrap();
    assert!(log.contains(&"begin".to_owned()));
    assert!(log.contains(&"commit".to_owned()));
    assert!(log.contains(&"end".to_owned()));
}

#[test]
fn plugin_commit_failure_aborts_and_preserves_running() {
    let log: Log = Default::default();
    let mut engine = engine("plugin-failure", recorder(log.clone(), true));
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));

    let error = commit(&mut engine, 1).unwrap_err();
    assert!(matches!(error, Error::PluginCallback { .. }));
    assert_eq!(
        error.rpc_errors().first().unwrap().error_tag,
        ErrorTag::OperationFailed
    );
    assert!(engine.running().is_empty());

    let log = log.lock().unwrap();
    assert_eq!(
        *log,
        vec!["begin", "validate", "commit", "abort"]
    );
}

#[test]
fn discard_changes_resets_candidate() {
    let mut engine = engine("discard", PluginRegistry::new());
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    commit(&mut engine, 1).unwrap();

    set_candidate(&mut engine, json!({"sys:a": {"b": "7"}}));
    assert!(engine.candidate_dirty());
    engine.discard_changes(1).unwrap();
    assert!(!engine.candidate_dirty());

    // Committing the discarded candidate is a no-op.
    commit(&mut engine, 1).unwrap();
    assert_eq!(body_of(engine.running(), &["a", "b"]), Some("1".to_owned()));
}

#[test]
fn copy_config_then_commit_is_identity() {
    let mut engine = engine("copy-config", PluginRegistry::new());
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    commit(&mut engine, 1).unwrap();
    let before = engine.running().deep_copy();

    engine
        .copy_config(1, &DatastoreId::Running, &DatastoreId::Candidate)
        .unwrap();
    assert!(!engine.candidate_dirty());
    commit(&mut engine, 1).unwrap();
    assert!(engine.running().data_eq(&before));
}

#[test]
fn copy_onto_running_is_rejected() {
    let mut engine = engine("copy-running", PluginRegistry::new());
    let error = engine
        .copy_config(1, &DatastoreId::Candidate, &DatastoreId::Running)
        .unwrap_err();
    assert_eq!(
        error.rpc_errors().first().unwrap().error_tag,
        ErrorTag::InvalidValue
    );
}

#[test]
fn delete_config_rejects_running() {
    let mut engine = engine("delete-running", PluginRegistry::new());
    assert!(engine.delete_config(1, &DatastoreId::Running).is_err());
    engine.delete_config(1, &DatastoreId::Startup).unwrap();
}

#[test]
fn edit_config_merge_and_delete() {
    let mut engine = engine("edit-config", PluginRegistry::new());
    set_candidate(
        &mut engine,
        json!({"sys:system": {"user": [{"name": "bob", "uid": "1000"}]}}),
    );

    // Merge a second user in.
    engine
        .edit_config(
            1,
            &DatastoreId::Candidate,
            EditOperation::Merge,
            &json!({"sys:system": {"user": [{"name": "alice", "uid": "1001"}]}}),
        )
        .unwrap();
    commit(&mut engine, 1).unwrap();
    let system = engine
        .running()
        .find_child(engine.running().root(), "system")
        .unwrap();
    assert_eq!(engine.running().find_children(system, "user").count(), 2);

    // Delete one entry by key.
    engine
        .edit_config(
            1,
            &DatastoreId::Candidate,
            EditOperation::Delete,
            &json!({"sys:system": {"user": [{"name": "bob"}]}}),
        )
        .unwrap();
    commit(&mut engine, 1).unwrap();
    let system = engine
        .running()
        .find_child(engine.running().root(), "system")
        .unwrap();
    assert_eq!(engine.running().find_children(system, "user").count(), 1);

    // Strict delete of missing data is an error; remove is not.
    let error = engine
        .edit_config(
            1,
            &DatastoreId::Candidate,
            EditOperation::Delete,
            &json!({"sys:system": {"user": [{"name": "mallory"}]}}),
        )
        .unwrap_err();
    assert_eq!(
        error.rpc_errors().first().unwrap().error_tag,
        ErrorTag::DataMissing
    );
    engine
        .edit_config(
            1,
            &DatastoreId::Candidate,
            EditOperation::Remove,
            &json!({"sys:system": {"user": [{"name": "mallory"}]}}),
        )
        .unwrap();
}

#[test]
fn edit_config_create_rejects_existing() {
    let mut engine = engine("edit-create", PluginRegistry::new());
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));

    let error = engine
        .edit_config(
            1,
            &DatastoreId::Candidate,
            EditOperation::Create,
            &json!({"sys:a": {"b": "2"}}),
        )
        .unwrap_err();
    assert_eq!(
        error.rpc_errors().first().unwrap().error_tag,
        ErrorTag::DataExists
    );

    engine
        .edit_config(
            1,
            &DatastoreId::Candidate,
            EditOperation::Create,
            &json!({"sys:a": {"c": "3"}}),
        )
        .unwrap();
}

#[test]
fn edit_config_rejects_unknown_elements() {
    let mut engine = engine("edit-unknown", PluginRegistry::new());
    let error = engine
        .edit_config(
            1,
            &DatastoreId::Candidate,
            EditOperation::Merge,
            &json!({"sys:bogus": {"x": "1"}}),
        )
        .unwrap_err();
    assert_eq!(
        error.rpc_errors().first().unwrap().error_tag,
        ErrorTag::UnknownElement
    );
}

#[test]
fn plugin_annotations_become_part_of_running() {
    let mut registry = PluginRegistry::new();
    PluginBuilder::new("annotator")
        .begin(annotate_begin)
        .register(&mut registry);
    let mut engine = engine("annotations", registry);

    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    commit(&mut engine, 1).unwrap();
    assert_eq!(body_of(engine.running(), &["a", "c"]), Some("5".to_owned()));
}

#[test]
fn validate_does_not_touch_running() {
    let mut engine = engine("validate-only", PluginRegistry::new());
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    engine.validate(&DatastoreId::Candidate).unwrap();
    assert!(engine.running().is_empty());

    set_candidate(&mut engine, json!({"sys:a": {"b": "x"}}));
    assert!(engine.validate(&DatastoreId::Candidate).is_err());
}

#[test]
fn plugin_restart_replays_running_to_one_plugin() {
    let log: Log = Default::default();
    let mut engine = engine("restart", recorder(log.clone(), false));
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    commit(&mut engine, 1).unwrap();
    log.lock().unwrap().clear();

    engine.plugin_restart("recorder").unwrap();
    let log = log.lock().unwrap();
    assert_eq!(*log, vec!["begin", "validate", "commit", "end"]);

    assert!(matches!(
        engine.plugin_restart("nonexistent"),
        Err(Error::PluginNotFound(_))
    ));
}

#[test]
fn session_close_releases_locks() {
    let mut engine = engine("session-close", PluginRegistry::new());
    engine.lock(7, &DatastoreId::Running).unwrap();
    engine.session_closed(7).unwrap();
    engine.lock(8, &DatastoreId::Running).unwrap();
}
