//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::{Path, PathBuf};
use std::time::Duration;

use canopy_utils::lock::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::error::{Error, Result};

/// Default `<confirm-timeout>`, in seconds (RFC 6241).
pub const DFLT_CONFIRM_TIMEOUT: u32 = 600;

const STATE_FILE: &str = "confirmed-commit.json";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfirmedPhase {
    #[default]
    Inactive,
    ConfirmedWait,
    Rollback,
}

/// Persisted confirmed-commit record. Written atomically on every state
/// change so a crash inside the confirmation window still honors the
/// rollback on restart.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ConfirmedCommitState {
    pub phase: ConfirmedPhase,
    pub persist: Option<String>,
    pub session_id: SessionId,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub deadline: Option<DateTime<Utc>>,
    // Rollback snapshot token (`rollback_<token>` datastore).
    pub snapshot: Option<String>,
}

/// How an incoming commit relates to the pending confirmed commit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommitKind {
    // No confirmed-commit interplay.
    Plain,
    // First confirmed commit: snapshot running and arm the timer.
    Initial,
    // Matching follow-up without `<confirmed/>`: cancel and clean up.
    Confirming,
    // Matching follow-up carrying `<confirmed/>`: re-arm, keep snapshot.
    Extending,
}

/// Action to take for a persisted record found at process start.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecoverAction {
    None,
    Rearm(Duration),
    RollbackNow,
}

#[derive(Debug)]
pub struct ConfirmedCommit {
    state: ConfirmedCommitState,
    path: PathBuf,
}

// ===== impl ConfirmedCommit =====

impl ConfirmedCommit {
    pub fn load(dir: &Path) -> ConfirmedCommit {
        let path = dir.join(STATE_FILE);
        let state = std::fs::read_to_string(&path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default();
        ConfirmedCommit { state, path }
    }

    pub fn state(&self) -> &ConfirmedCommitState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.phase != ConfirmedPhase::Inactive
    }

    pub fn snapshot(&self) -> Option<&str> {
        self.state.snapshot.as_deref()
    }

    /// Relates an incoming commit to the pending confirmed commit, if
    /// any. A commit that neither presents the recorded `<persist>` token
    /// nor originates from the issuing session is rejected while a
    /// confirmed commit is pending.
    pub fn classify(
        &self,
        session: SessionId,
        persist_id: Option<&str>,
        confirmed: bool,
    ) -> Result<CommitKind> {
        match self.state.phase {
            ConfirmedPhase::Inactive => {
                if confirmed {
                    Ok(CommitKind::Initial)
                } else {
                    Ok(CommitKind::Plain)
                }
            }
            ConfirmedPhase::ConfirmedWait => {
                let authorized = match &self.state.persist {
                    Some(persist) => persist_id == Some(persist.as_str()),
                    None => session == self.state.session_id,
                };
                if !authorized {
                    return Err(Error::ConfirmedCommitPending);
                }
                if confirmed {
                    Ok(CommitKind::Extending)
                } else {
                    Ok(CommitKind::Confirming)
                }
            }
            // A rollback transaction is already underway.
            ConfirmedPhase::Rollback => Err(Error::ConfirmedCommitPending),
        }
    }

    /// Whether a `cancel-commit` request is authorized.
    pub fn cancel_authorized(
        &self,
        session: SessionId,
        persist_id: Option<&str>,
    ) -> bool {
        match &self.state.persist {
            Some(persist) => persist_id == Some(persist.as_str()),
            None => session == self.state.session_id,
        }
    }

    /// Session disconnect semantics: an unconfirmed commit without
    /// `<persist>` rolls back as soon as its issuing session goes away.
    pub fn session_end_triggers_rollback(&self, session: SessionId) -> bool {
        self.state.phase == ConfirmedPhase::ConfirmedWait
            && self.state.persist.is_none()
            && self.state.session_id == session
    }

    /// Restart decision for the persisted record.
    pub fn recover(&self, now: DateTime<Utc>) -> RecoverAction {
        match self.state.phase {
            ConfirmedPhase::Inactive => RecoverAction::None,
            ConfirmedPhase::ConfirmedWait => match self.state.deadline {
                Some(deadline) if deadline > now => {
                    let remaining = (deadline - now)
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    RecoverAction::Rearm(remaining)
                }
                _ => RecoverAction::RollbackNow,
            },
            // Crashed mid-rollback; finish the job.
            ConfirmedPhase::Rollback => RecoverAction::RollbackNow,
        }
    }

    pub fn activate(
        &mut self,
        session: SessionId,
        persist: Option<String>,
        deadline: DateTime<Utc>,
        snapshot: String,
    ) -> Result<()> {
        Debug::ConfirmedCommit("armed").log();
        self.state = ConfirmedCommitState {
            phase: ConfirmedPhase::ConfirmedWait,
            persist,
            session_id: session,
            deadline: Some(deadline),
            snapshot: Some(snapshot),
        };
        self.persist_state()
    }

    /// Re-arms the timer of an extending commit; the snapshot stays.
    pub fn extend(&mut self, deadline: DateTime<Utc>) -> Result<()> {
        Debug::ConfirmedCommit("extended").log();
        self.state.deadline = Some(deadline);
        self.persist_state()
    }

    pub fn enter_rollback(&mut self) -> Result<()> {
        Debug::ConfirmedCommit("rolling back").log();
        self.state.phase = ConfirmedPhase::Rollback;
        self.persist_state()
    }

    pub fn deactivate(&mut self) -> Result<()> {
        Debug::ConfirmedCommit("cleared").log();
        self.state = ConfirmedCommitState::default();
        self.persist_state()
    }

    fn persist_state(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.state)
            .expect("JSON encoding");
        let tmp_path = self.path.with_extension("json.tmp");
        let access_error = |error| Error::DatastoreAccess {
            datastore: "confirmed-commit".to_owned(),
            error,
        };
        std::fs::write(&tmp_path, text).map_err(access_error)?;
        std::fs::rename(&tmp_path, &self.path).map_err(access_error)?;
        Ok(())
    }
}
