//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use canopy_northbound::confirmed::{
    CommitKind, ConfirmedCommit, ConfirmedPhase, RecoverAction,
};
use canopy_northbound::datastore::DatastoreId;
use canopy_northbound::engine::{
    CommitParams, EditOperation, Engine, EngineOptions, TimerAction,
};
use canopy_northbound::error::Error;
use canopy_northbound::plugin::PluginRegistry;
use canopy_utils::netconf::ErrorTag;
use canopy_yang::types::TypeSpec;
use canopy_yang::{SpecBuilder, YangSpec};
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

fn spec() -> Arc<YangSpec> {
    let mut builder = SpecBuilder::new();
    let sys = builder.add_module("sys", "urn:test:sys", "2024-01-10");
    let a = builder.container(sys, None, "a");
    builder.leaf(sys, Some(a), "b", TypeSpec::uint8());
    builder.build()
}

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("canopy-confirmed-{}-{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn engine(name: &str) -> Engine {
    Engine::new(
        spec(),
        test_dir(name),
        EngineOptions::default(),
        PluginRegistry::new(),
    )
    .unwrap()
}

fn set_candidate(engine: &mut Engine, config: serde_json::Value) {
    engine
        .edit_config(1, &DatastoreId::Candidate, EditOperation::Replace, &config)
        .unwrap();
}

fn running_b(engine: &Engine) -> Option<String> {
    let running = engine.running();
    let a = running.find_child(running.root(), "a")?;
    let b = running.find_child(a, "b")?;
    running.body(b).map(str::to_owned)
}

// ===== state machine =====

#[test]
fn classify_inactive() {
    let dir = test_dir("classify-inactive");
    std::fs::create_dir_all(&dir).unwrap();
    let state = ConfirmedCommit::load(&dir);
    assert!(!state.is_active());
    assert_eq!(state.classify(1, None, false).unwrap(), CommitKind::Plain);
    assert_eq!(state.classify(1, None, true).unwrap(), CommitKind::Initial);
}

#[test]
fn classify_pending_with_persist_token() {
    let dir = test_dir("classify-persist");
    std::fs::create_dir_all(&dir).unwrap();
    let mut state = ConfirmedCommit::load(&dir);
    let deadline = Utc::now() + ChronoDuration::seconds(600);
    state
        .activate(1, Some("tok-42".to_owned()), deadline, "tok-42".to_owned())
        .unwrap();

    // Any session presenting the token may confirm or extend.
    assert_eq!(
        state.classify(2, Some("tok-42"), false).unwrap(),
        CommitKind::Confirming
    );
    assert_eq!(
        state.classify(2, Some("tok-42"), true).unwrap(),
        CommitKind::Extending
    );
    // Without the token the commit is rejected, even from the issuer.
    assert!(state.classify(1, None, false).is_err());
    assert!(state.classify(2, Some("wrong"), false).is_err());
}

#[test]
fn classify_pending_without_persist_token() {
    let dir = test_dir("classify-session");
    std::fs::create_dir_all(&dir).unwrap();
    let mut state = ConfirmedCommit::load(&dir);
    let deadline = Utc::now() + ChronoDuration::seconds(600);
    state.activate(1, None, deadline, "1".to_owned()).unwrap();

    assert_eq!(
        state.classify(1, None, false).unwrap(),
        CommitKind::Confirming
    );
    assert!(state.classify(2, None, false).is_err());
    assert!(state.session_end_triggers_rollback(1));
    assert!(!state.session_end_triggers_rollback(2));
}

#[test]
fn recover_decisions() {
    let dir = test_dir("recover");
    std::fs::create_dir_all(&dir).unwrap();
    let mut state = ConfirmedCommit::load(&dir);
    let now = Utc::now();
    assert_eq!(state.recover(now), RecoverAction::None);

    state
        .activate(1, None, now + ChronoDuration::seconds(300), "1".to_owned())
        .unwrap();
    match state.recover(now) {
        RecoverAction::Rearm(remaining) => {
            assert!(remaining <= Duration::from_secs(300));
            assert!(remaining > Duration::from_secs(290));
        }
        action => panic!("unexpected action {action:?}"),
    }

    // A deadline in the past triggers the rollback immediately.
    state
        .activate(1, None, now - ChronoDuration::seconds(1), "1".to_owned())
        .unwrap();
    assert_eq!(state.recover(now), RecoverAction::RollbackNow);

    // A crash mid-rollback resumes the rollback.
    state.enter_rollback().unwrap();
    assert_eq!(state.recover(now), RecoverAction::RollbackNow);
}

#[test]
fn state_survives_reload() {
    let dir = test_dir("persistence");
    std::fs::create_dir_all(&dir).unwrap();
    let deadline = Utc::now() + ChronoDuration::seconds(600);
    {
        let mut state = ConfirmedCommit::load(&dir);
        state
            .activate(
                3,
                Some("tok".to_owned()),
                deadline,
                "tok".to_owned(),
            )
            .unwrap();
    }

    let state = ConfirmedCommit::load(&dir);
    assert_eq!(state.state().phase, ConfirmedPhase::ConfirmedWait);
    assert_eq!(state.state().session_id, 3);
    assert_eq!(state.state().persist.as_deref(), Some("tok"));
    assert_eq!(state.snapshot(), Some("tok"));
    // Timestamps round-trip at second precision.
    assert_eq!(
        state.state().deadline.unwrap().timestamp(),
        deadline.timestamp()
    );
}

// ===== engine integration =====

#[test]
fn confirmed_commit_arms_timer_and_snapshots() {
    let mut engine = engine("arm");
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    commit_plain(&mut engine);

    set_candidate(&mut engine, json!({"sys:a": {"b": "2"}}));
    let outcome = engine
        .commit(CommitParams {
            session: 1,
            confirmed: true,
            confirm_timeout: Some(5),
            persist: Some("tok-42".to_owned()),
            persist_id: None,
        })
        .unwrap();
    assert_eq!(outcome.timer, TimerAction::Arm(Duration::from_secs(5)));
    assert_eq!(running_b(&engine), Some("2".to_owned()));
    assert!(engine.confirmed().is_active());
    assert!(
        engine
            .store()
            .exists(&DatastoreId::Rollback("tok-42".to_owned()))
    );
}

#[test]
fn rollback_restores_previous_running() {
    let mut engine = engine("rollback");
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    commit_plain(&mut engine);

    set_candidate(&mut engine, json!({"sys:a": {"b": "2"}}));
    engine
        .commit(CommitParams {
            session: 1,
            confirmed: true,
            confirm_timeout: Some(5),
            persist: Some("tok-42".to_owned()),
            persist_id: None,
        })
        .unwrap();

    // Timer fired with no confirming commit.
    engine.apply_rollback().unwrap();
    assert_eq!(running_b(&engine), Some("1".to_owned()));
    assert!(!engine.confirmed().is_active());
    assert!(
        !engine
            .store()
            .exists(&DatastoreId::Rollback("tok-42".to_owned()))
    );
}

#[test]
fn persisted_confirming_commit_cancels_rollback() {
    let mut engine = engine("confirm");
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    commit_plain(&mut engine);

    set_candidate(&mut engine, json!({"sys:a": {"b": "2"}}));
    engine
        .commit(CommitParams {
            session: 1,
            confirmed: true,
            confirm_timeout: Some(5),
            persist: Some("tok-42".to_owned()),
            persist_id: None,
        })
        .unwrap();

    // A different session presents the persist token.
    let outcome = engine
        .commit(CommitParams {
            session: 2,
            persist_id: Some("tok-42".to_owned()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(outcome.timer, TimerAction::Cancel);
    assert_eq!(running_b(&engine), Some("2".to_owned()));
    assert!(!engine.confirmed().is_active());
    assert!(
        !engine
            .store()
            .exists(&DatastoreId::Rollback("tok-42".to_owned()))
    );
}

#[test]
fn extending_commit_keeps_snapshot() {
    let mut engine = engine("extend");
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    commit_plain(&mut engine);

    set_candidate(&mut engine, json!({"sys:a": {"b": "2"}}));
    engine
        .commit(CommitParams {
            session: 1,
            confirmed: true,
            confirm_timeout: Some(5),
            persist: Some("tok-42".to_owned()),
            persist_id: None,
        })
        .unwrap();

    let outcome = engine
        .commit(CommitParams {
            session: 1,
            confirmed: true,
            confirm_timeout: Some(60),
            persist: None,
            persist_id: Some("tok-42".to_owned()),
        })
        .unwrap();
    assert_eq!(outcome.timer, TimerAction::Arm(Duration::from_secs(60)));
    assert!(engine.confirmed().is_active());
    assert!(
        engine
            .store()
            .exists(&DatastoreId::Rollback("tok-42".to_owned()))
    );

    // The snapshot still reverts to the original configuration.
    engine.apply_rollback().unwrap();
    assert_eq!(running_b(&engine), Some("1".to_owned()));
}

#[test]
fn unrelated_commit_is_rejected_while_pending() {
    let mut engine = engine("unrelated");
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    engine
        .commit(CommitParams {
            session: 1,
            confirmed: true,
            confirm_timeout: Some(5),
            persist: Some("tok-42".to_owned()),
            persist_id: None,
        })
        .unwrap();

    let error = engine
        .commit(CommitParams {
            session: 2,
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(error, Error::ConfirmedCommitPending));
}

#[test]
fn zero_confirm_timeout_is_rejected() {
    let mut engine = engine("zero-timeout");
    let error = engine
        .commit(CommitParams {
            session: 1,
            confirmed: true,
            confirm_timeout: Some(0),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(
        error.rpc_errors().first().unwrap().error_tag,
        ErrorTag::InvalidValue
    );
}

#[test]
fn confirmed_commit_requires_the_feature() {
    let mut engine = Engine::new(
        spec(),
        test_dir("feature-off"),
        EngineOptions {
            confirmed_commit: false,
            ..Default::default()
        },
        PluginRegistry::new(),
    )
    .unwrap();
    let error = engine
        .commit(CommitParams {
            session: 1,
            confirmed: true,
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(error, Error::ConfirmedCommitDisabled));
}

#[test]
fn cancel_commit_rolls_back_immediately() {
    let mut engine = engine("cancel");
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    commit_plain(&mut engine);

    set_candidate(&mut engine, json!({"sys:a": {"b": "2"}}));
    engine
        .commit(CommitParams {
            session: 1,
            confirmed: true,
            confirm_timeout: Some(600),
            persist: Some("tok-42".to_owned()),
            persist_id: None,
        })
        .unwrap();

    // Wrong token is rejected, right token rolls back.
    assert!(engine.cancel_commit(2, Some("wrong")).is_err());
    engine.cancel_commit(2, Some("tok-42")).unwrap();
    assert_eq!(running_b(&engine), Some("1".to_owned()));
}

#[test]
fn session_end_rolls_back_non_persisted_commit() {
    let mut engine = engine("session-end");
    set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
    commit_plain(&mut engine);

    set_candidate(&mut engine, json!({"sys:a": {"b": "2"}}));
    engine
        .commit(CommitParams {
            session: 5,
            confirmed: true,
            confirm_timeout: Some(600),
            persist: None,
            persist_id: None,
        })
        .unwrap();

    // An unrelated session going away changes nothing.
    assert_eq!(engine.session_closed(9).unwrap(), TimerAction::None);
    assert_eq!(running_b(&engine), Some("2".to_owned()));

    // The issuing session going away triggers the rollback.
    assert_eq!(engine.session_closed(5).unwrap(), TimerAction::Cancel);
    assert_eq!(running_b(&engine), Some("1".to_owned()));
}

#[test]
fn recover_after_restart_honors_expired_deadline() {
    let dir = test_dir("restart-recover");
    {
        let mut engine = Engine::new(
            spec(),
            &dir,
            EngineOptions::default(),
            PluginRegistry::new(),
        )
        .unwrap();
        set_candidate(&mut engine, json!({"sys:a": {"b": "1"}}));
        commit_plain(&mut engine);
        set_candidate(&mut engine, json!({"sys:a": {"b": "2"}}));
        engine
            .commit(CommitParams {
                session: 1,
                confirmed: true,
                confirm_timeout: Some(1),
                persist: Some("tok".to_owned()),
                persist_id: None,
            })
            .unwrap();
    }

    // "Restart" with the deadline already expired.
    std::thread::sleep(Duration::from_millis(1100));
    let mut engine = Engine::new(
        spec(),
        &dir,
        EngineOptions::default(),
        PluginRegistry::new(),
    )
    .unwrap();
    engine.startup_replay().unwrap();
    assert_eq!(engine.recover_confirmed().unwrap(), TimerAction::None);
    assert_eq!(running_b(&engine), Some("1".to_owned()));
}

fn commit_plain(engine: &mut Engine) {
    engine
        .commit(CommitParams {
            session: 1,
            ..Default::default()
        })
        .unwrap();
}
