//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use canopy_tree::{ConfigTree, NodeId, defaults, serialize, validate};
use canopy_utils::lock::{LockError, LockRegistry, SessionId};
use canopy_utils::netconf::{ErrorTag, RpcError, RpcErrors};
use canopy_yang::YangSpec;
use canopy_yang::modstate::ModuleState;
use chrono::Utc;
use tracing::info;

use crate::confirmed::{
    CommitKind, ConfirmedCommit, DFLT_CONFIRM_TIMEOUT, RecoverAction,
};
use crate::datastore::{DatastoreId, DatastoreStore};
use crate::debug::Debug;
use crate::error::{Error, Result};
use crate::plugin::PluginRegistry;
use crate::transaction::Transaction;

/// Engine behavior knobs, loaded from the daemon configuration.
#[derive(Clone, Debug)]
pub struct EngineOptions {
    // Record module-state into saved datastores.
    pub modstate: bool,
    // Detect module revision mismatches when replaying startup.
    pub upgrade_checkold: bool,
    // The :confirmed-commit capability.
    pub confirmed_commit: bool,
}

/// Parameters of a commit RPC.
#[derive(Debug, Default)]
pub struct CommitParams {
    pub session: SessionId,
    pub confirmed: bool,
    // Seconds; `None` selects the RFC default of 600.
    pub confirm_timeout: Option<u32>,
    pub persist: Option<String>,
    pub persist_id: Option<String>,
}

#[derive(Debug)]
pub struct CommitOutcome {
    pub transaction_id: u32,
    pub timer: TimerAction,
}

/// Rollback-timer instruction for the event loop driving the engine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimerAction {
    None,
    Arm(Duration),
    Cancel,
}

/// NETCONF edit-config operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EditOperation {
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
}

/// The configuration transaction engine: owns the datastores, the plugin
/// registry, the locks and the confirmed-commit state. All entry points
/// take `&mut self`; the single event loop driving the engine serializes
/// transactions by construction.
pub struct Engine {
    spec: Arc<YangSpec>,
    store: DatastoreStore,
    locks: LockRegistry,
    plugins: PluginRegistry,
    options: EngineOptions,
    confirmed: ConfirmedCommit,
    // In-memory running configuration, authoritative between commits.
    running: ConfigTree,
    candidate_dirty: bool,
    next_transaction_id: u32,
}

// ===== impl EngineOptions =====

impl Default for EngineOptions {
    fn default() -> EngineOptions {
        EngineOptions {
            modstate: true,
            upgrade_checkold: true,
            confirmed_commit: true,
        }
    }
}

// ===== impl EditOperation =====

impl EditOperation {
    pub fn from_name(name: &str) -> Option<EditOperation> {
        match name {
            "merge" => Some(EditOperation::Merge),
            "replace" => Some(EditOperation::Replace),
            "create" => Some(EditOperation::Create),
            "delete" => Some(EditOperation::Delete),
            "remove" => Some(EditOperation::Remove),
            _ => None,
        }
    }
}

// ===== impl Engine =====

impl Engine {
    pub fn new<P: AsRef<Path>>(
        spec: Arc<YangSpec>,
        dir: P,
        options: EngineOptions,
        plugins: PluginRegistry,
    ) -> Result<Engine> {
        let store = DatastoreStore::new(dir)?;
        let confirmed = ConfirmedCommit::load(store.dir());
        Ok(Engine {
            spec,
            store,
            locks: LockRegistry::default(),
            plugins,
            options,
            confirmed,
            running: ConfigTree::new(),
            candidate_dirty: false,
            next_transaction_id: 0,
        })
    }

    pub fn spec(&self) -> &Arc<YangSpec> {
        &self.spec
    }

    pub fn store(&self) -> &DatastoreStore {
        &self.store
    }

    pub fn running(&self) -> &ConfigTree {
        &self.running
    }

    pub fn candidate_dirty(&self) -> bool {
        self.candidate_dirty
    }

    pub fn confirmed(&self) -> &ConfirmedCommit {
        &self.confirmed
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn plugins_mut(&mut self) -> &mut PluginRegistry {
        &mut self.plugins
    }

    fn next_id(&mut self) -> u32 {
        self.next_transaction_id += 1;
        self.next_transaction_id
    }

    fn modstate(&self) -> ModuleState {
        if self.options.modstate {
            ModuleState::of_spec(&self.spec)
        } else {
            ModuleState::default()
        }
    }

    // ===== tree loading =====

    fn load_bound(&self, id: &DatastoreId) -> Result<ConfigTree> {
        let (mut tree, _) = self.store.load(id)?;
        self.prepare(&mut tree)?;
        Ok(tree)
    }

    // Binds, sorts and fills defaults on a freshly loaded tree.
    pub(crate) fn prepare(&self, tree: &mut ConfigTree) -> Result<()> {
        tree.bind(&self.spec, true).map_err(|reason| {
            Error::Validation(
                RpcError::new(ErrorTag::UnknownElement, reason).into(),
            )
        })?;
        tree.sort(&self.spec);
        defaults::fill_defaults(tree, &self.spec);
        Ok(())
    }

    // ===== shared pipeline =====

    // Runs `begin`, generic validation and the plugin `validate` and
    // `complete` phases. The caller aborts the transaction on error.
    fn pipeline_validate(&mut self, t: &mut Transaction) -> Result<()> {
        t.begin(&mut self.plugins)?;

        // An empty target skips generic validation; plugin phases still
        // run, since some plugins derive state from an empty config.
        if !t.target.is_empty() {
            // Plugins may have annotated the target during `begin`.
            t.target.bind(&self.spec, true).map_err(|reason| {
                Error::Validation(
                    RpcError::new(ErrorTag::UnknownElement, reason).into(),
                )
            })?;
            let mut errors = RpcErrors::default();
            validate::validate_all_top(&self.spec, &t.target, &mut errors);
            if !errors.is_empty() {
                return Err(Error::Validation(errors));
            }
        }

        t.validate(&mut self.plugins)?;
        t.complete(&mut self.plugins)?;
        Ok(())
    }

    fn validate_common(
        &mut self,
        source: ConfigTree,
        target: ConfigTree,
    ) -> Result<Transaction> {
        let mut transaction =
            Transaction::new(self.next_id(), &self.spec, source, target);
        if let Err(error) = self.pipeline_validate(&mut transaction) {
            transaction.abort(&mut self.plugins);
            return Err(error);
        }
        Ok(transaction)
    }

    // Replay pipeline shared by startup, failsafe and plugin restart:
    // an all-added transaction from an empty source.
    pub(crate) fn run_replay(
        &mut self,
        target: ConfigTree,
        filter: Option<usize>,
        install: bool,
    ) -> Result<u32> {
        let mut transaction =
            Transaction::new_replay(self.next_id(), target, filter);
        Debug::TransactionStart(transaction.id, "replay").log();

        if let Err(error) = self.pipeline_validate(&mut transaction) {
            transaction.abort(&mut self.plugins);
            return Err(error);
        }
        if let Err(error) = transaction.commit(&mut self.plugins) {
            transaction.abort(&mut self.plugins);
            return Err(error);
        }
        if let Err(error) = transaction.commit_done(&mut self.plugins) {
            error.log();
            return Err(error);
        }
        if install {
            self.install_running(&transaction)?;
        }
        if let Err(error) = transaction.end(&mut self.plugins) {
            error.log();
            return Err(error);
        }
        Debug::TransactionEnd(transaction.id).log();
        Ok(transaction.id)
    }

    fn install_running(&mut self, transaction: &Transaction) -> Result<()> {
        self.store.save(
            &DatastoreId::Running,
            &transaction.target,
            &self.spec,
            &self.modstate(),
        )?;
        self.running = transaction.target.deep_copy();
        Ok(())
    }

    // ===== RPC operations =====

    /// `validate(source)`: the full validation pipeline, no commit.
    pub fn validate(&mut self, source: &DatastoreId) -> Result<()> {
        let target = self.load_bound(source)?;
        let running = self.running.deep_copy();
        let mut transaction = self.validate_common(running, target)?;
        if let Err(error) = transaction.end(&mut self.plugins) {
            error.log();
        }
        Debug::TransactionEnd(transaction.id).log();
        Ok(())
    }

    /// `commit`: the candidate→running transition, with optional
    /// confirmed-commit semantics.
    pub fn commit(&mut self, params: CommitParams) -> Result<CommitOutcome> {
        let CommitParams {
            session,
            confirmed,
            confirm_timeout,
            persist,
            persist_id,
        } = params;

        if let Some(holder) = self.locks.locked_by_other("running", session)
        {
            return Err(Error::LockDenied {
                datastore: "running".to_owned(),
                holder,
            });
        }

        let timeout = confirm_timeout.unwrap_or(DFLT_CONFIRM_TIMEOUT);
        if confirmed {
            if !self.options.confirmed_commit {
                return Err(Error::ConfirmedCommitDisabled);
            }
            if timeout == 0 {
                return Err(Error::Validation(
                    RpcError::new(
                        ErrorTag::InvalidValue,
                        "confirm-timeout must be positive",
                    )
                    .protocol()
                    .into(),
                ));
            }
        }
        let kind =
            self.confirmed.classify(session, persist_id.as_deref(), confirmed)?;

        let target = self.load_bound(&DatastoreId::Candidate)?;
        let source = self.running.deep_copy();
        let mut transaction = self.validate_common(source, target)?;
        Debug::TransactionStart(transaction.id, "commit").log();

        if let Err(error) = transaction.commit(&mut self.plugins) {
            transaction.abort(&mut self.plugins);
            return Err(error);
        }

        // Confirmed-commit bookkeeping sits between `commit` and
        // installation: the snapshot must capture the pre-commit running.
        let timer = match kind {
            CommitKind::Initial => {
                let token =
                    persist.clone().unwrap_or_else(|| session.to_string());
                let snapshot = DatastoreId::Rollback(token.clone());
                self.store.save(
                    &snapshot,
                    &self.running,
                    &self.spec,
                    &self.modstate(),
                )?;
                let deadline =
                    Utc::now() + chrono::Duration::seconds(timeout as i64);
                self.confirmed.activate(session, persist, deadline, token)?;
                TimerAction::Arm(Duration::from_secs(timeout as u64))
            }
            CommitKind::Extending => {
                let deadline =
                    Utc::now() + chrono::Duration::seconds(timeout as i64);
                self.confirmed.extend(deadline)?;
                TimerAction::Arm(Duration::from_secs(timeout as u64))
            }
            CommitKind::Confirming => {
                if let Some(token) =
                    self.confirmed.snapshot().map(str::to_owned)
                {
                    self.store.delete(&DatastoreId::Rollback(token))?;
                }
                self.confirmed.deactivate()?;
                TimerAction::Cancel
            }
            CommitKind::Plain => TimerAction::None,
        };

        // A `commit_done` or `end` failure past this point is not
        // recoverable from inside the transaction; it is surfaced and any
        // rollback snapshot stays intact.
        if let Err(error) = transaction.commit_done(&mut self.plugins) {
            error.log();
            return Err(error);
        }

        self.install_running(&transaction)?;
        self.candidate_dirty = false;

        if let Err(error) = transaction.end(&mut self.plugins) {
            error.log();
            return Err(error);
        }
        Debug::TransactionEnd(transaction.id).log();

        Ok(CommitOutcome {
            transaction_id: transaction.id,
            timer,
        })
    }

    /// `discard-changes`: reset the candidate from running.
    pub fn discard_changes(&mut self, session: SessionId) -> Result<()> {
        if let Some(holder) =
            self.locks.locked_by_other("candidate", session)
        {
            return Err(Error::LockDenied {
                datastore: "candidate".to_owned(),
                holder,
            });
        }
        self.store.save(
            &DatastoreId::Candidate,
            &self.running,
            &self.spec,
            &self.modstate(),
        )?;
        self.candidate_dirty = false;
        Ok(())
    }

    /// `copy-config(source, target)`. Copying onto running is rejected;
    /// that transition always goes through commit.
    pub fn copy_config(
        &mut self,
        session: SessionId,
        source: &DatastoreId,
        target: &DatastoreId,
    ) -> Result<()> {
        if *target == DatastoreId::Running {
            return Err(Error::Validation(
                RpcError::new(
                    ErrorTag::InvalidValue,
                    "cannot copy onto running; use commit",
                )
                .protocol()
                .into(),
            ));
        }
        if let Some(holder) =
            self.locks.locked_by_other(&target.to_string(), session)
        {
            return Err(Error::LockDenied {
                datastore: target.to_string(),
                holder,
            });
        }

        match source {
            // The in-memory running is authoritative.
            DatastoreId::Running => self.store.save(
                target,
                &self.running,
                &self.spec,
                &self.modstate(),
            )?,
            _ => self.store.copy(source, target)?,
        }

        if *target == DatastoreId::Candidate {
            self.candidate_dirty = *source != DatastoreId::Running;
        }
        Ok(())
    }

    /// `delete-config(target)`. Running cannot be deleted.
    pub fn delete_config(
        &mut self,
        session: SessionId,
        target: &DatastoreId,
    ) -> Result<()> {
        if *target == DatastoreId::Running {
            return Err(Error::Validation(
                RpcError::new(
                    ErrorTag::InvalidValue,
                    "cannot delete the running datastore",
                )
                .protocol()
                .into(),
            ));
        }
        if let Some(holder) =
            self.locks.locked_by_other(&target.to_string(), session)
        {
            return Err(Error::LockDenied {
                datastore: target.to_string(),
                holder,
            });
        }
        self.store.delete(target)?;
        if *target == DatastoreId::Candidate {
            self.candidate_dirty = !self.running.is_empty();
        }
        Ok(())
    }

    /// `lock(target)`. Locking a modified candidate is refused, as its
    /// content could not be attributed to the locking session.
    pub fn lock(
        &mut self,
        session: SessionId,
        target: &DatastoreId,
    ) -> Result<()> {
        if *target == DatastoreId::Candidate && self.candidate_dirty {
            return Err(Error::LockDenied {
                datastore: "candidate".to_owned(),
                holder: 0,
            });
        }
        self.locks
            .lock(&target.to_string(), session)
            .map_err(|error| match error {
                LockError::Denied(holder) => Error::LockDenied {
                    datastore: target.to_string(),
                    holder,
                },
                LockError::NotHeld => unreachable!(),
            })
    }

    pub fn unlock(
        &mut self,
        session: SessionId,
        target: &DatastoreId,
    ) -> Result<()> {
        self.locks
            .unlock(&target.to_string(), session)
            .map_err(|error| match error {
                LockError::Denied(holder) => Error::LockDenied {
                    datastore: target.to_string(),
                    holder,
                },
                LockError::NotHeld => Error::Validation(
                    RpcError::new(
                        ErrorTag::OperationFailed,
                        format!("lock on \"{target}\" is not held"),
                    )
                    .protocol()
                    .into(),
                ),
            })
    }

    /// `edit-config(target, operation, config)`.
    pub fn edit_config(
        &mut self,
        session: SessionId,
        target: &DatastoreId,
        operation: EditOperation,
        config: &serde_json::Value,
    ) -> Result<()> {
        if *target != DatastoreId::Candidate {
            return Err(Error::Validation(
                RpcError::new(
                    ErrorTag::InvalidValue,
                    "edit-config target must be the candidate",
                )
                .protocol()
                .into(),
            ));
        }
        if let Some(holder) =
            self.locks.locked_by_other("candidate", session)
        {
            return Err(Error::LockDenied {
                datastore: "candidate".to_owned(),
                holder,
            });
        }

        let mut payload =
            serialize::tree_from_value(config).map_err(|reason| {
                Error::Validation(
                    RpcError::new(ErrorTag::InvalidValue, reason).into(),
                )
            })?;
        payload.bind(&self.spec, true).map_err(|reason| {
            Error::Validation(
                RpcError::new(ErrorTag::UnknownElement, reason).into(),
            )
        })?;

        let (mut tree, _) = self.store.load(&DatastoreId::Candidate)?;
        tree.bind(&self.spec, true).map_err(|reason| {
            Error::DatastoreFormat {
                datastore: "candidate".to_owned(),
                reason,
            }
        })?;

        let tree_root = tree.root();
        let payload_root = payload.root();
        match operation {
            EditOperation::Merge => tree.merge(&self.spec, &payload),
            EditOperation::Replace => tree = payload,
            EditOperation::Create => {
                self.edit_create(&mut tree, tree_root, &payload, payload_root)?
            }
            EditOperation::Delete => self.edit_delete(
                &mut tree,
                tree_root,
                &payload,
                payload_root,
                true,
            )?,
            EditOperation::Remove => self.edit_delete(
                &mut tree,
                tree_root,
                &payload,
                payload_root,
                false,
            )?,
        }

        tree.sort(&self.spec);
        self.store.save(
            &DatastoreId::Candidate,
            &tree,
            &self.spec,
            &self.modstate(),
        )?;
        self.candidate_dirty = !tree.data_eq(&self.running);
        Ok(())
    }

    fn edit_create(
        &self,
        tree: &mut ConfigTree,
        tree_parent: NodeId,
        payload: &ConfigTree,
        payload_parent: NodeId,
    ) -> Result<()> {
        for pchild in payload.elements(payload_parent).collect::<Vec<_>>() {
            let key = payload.match_key(&self.spec, pchild);
            let matched = tree
                .elements(tree_parent)
                .find(|&child| tree.match_key(&self.spec, child) == key);
            match matched {
                Some(node) => {
                    if payload.elements(pchild).next().is_none() {
                        return Err(Error::Validation(
                            RpcError::new(
                                ErrorTag::DataExists,
                                "data to be created already exists",
                            )
                            .with_path(
                                payload.instance_path(&self.spec, pchild),
                            )
                            .into(),
                        ));
                    }
                    self.edit_create(tree, node, payload, pchild)?;
                }
                None => {
                    tree.copy_subtree(payload, pchild, tree_parent);
                }
            }
        }
        Ok(())
    }

    fn edit_delete(
        &self,
        tree: &mut ConfigTree,
        tree_parent: NodeId,
        payload: &ConfigTree,
        payload_parent: NodeId,
        strict: bool,
    ) -> Result<()> {
        for pchild in payload.elements(payload_parent).collect::<Vec<_>>() {
            let key = payload.match_key(&self.spec, pchild);
            let matched = tree
                .elements(tree_parent)
                .find(|&child| tree.match_key(&self.spec, child) == key);
            match matched {
                Some(node) => {
                    // List-entry payloads carrying only their keys select
                    // the entry itself for deletion.
                    let keys = payload
                        .snode(pchild)
                        .map(|snode| self.spec.stmt(snode).keys())
                        .unwrap_or(&[]);
                    let descend = payload.elements(pchild).any(|child| {
                        !keys.iter().any(|k| k == payload.name(child))
                    });
                    if descend {
                        self.edit_delete(tree, node, payload, pchild, strict)?;
                    } else {
                        tree.remove(node);
                    }
                }
                None if strict => {
                    return Err(Error::Validation(
                        RpcError::new(
                            ErrorTag::DataMissing,
                            "data to be deleted does not exist",
                        )
                        .with_path(
                            payload.instance_path(&self.spec, pchild),
                        )
                        .into(),
                    ));
                }
                None => {}
            }
        }
        Ok(())
    }

    /// Hot-restart of a single plugin: `reset`, then an all-added replay
    /// of the running configuration scoped to that plugin.
    pub fn plugin_restart(&mut self, name: &str) -> Result<()> {
        let index = self
            .plugins
            .index_of(name)
            .ok_or_else(|| Error::PluginNotFound(name.to_owned()))?;

        {
            let (plugin, context) = self.plugins.parts_mut(index);
            if let Some(reset) = plugin.reset {
                (reset)(context).map_err(|reason| Error::PluginReset {
                    plugin: name.to_owned(),
                    reason,
                })?;
            }
        }

        info!(%name, "replaying running configuration to plugin");
        let target = self.running.deep_copy();
        self.run_replay(target, Some(index), false)?;
        Ok(())
    }

    // ===== confirmed commit =====

    /// Installs the rollback snapshot as running, bypassing the
    /// confirmed-commit logic itself.
    pub fn apply_rollback(&mut self) -> Result<u32> {
        let Some(token) = self.confirmed.snapshot().map(str::to_owned)
        else {
            return Err(Error::Fatal(
                "no rollback snapshot is armed".to_owned(),
            ));
        };
        info!("rolling back to the pre-commit configuration");
        self.confirmed.enter_rollback()?;

        let snapshot = DatastoreId::Rollback(token);
        let target = self.load_bound(&snapshot)?;
        let source = self.running.deep_copy();
        let mut transaction = self.validate_common(source, target)?;

        if let Err(error) = transaction.commit(&mut self.plugins) {
            transaction.abort(&mut self.plugins);
            return Err(error);
        }
        if let Err(error) = transaction.commit_done(&mut self.plugins) {
            error.log();
            return Err(error);
        }
        self.install_running(&transaction)?;
        if let Err(error) = transaction.end(&mut self.plugins) {
            error.log();
        }

        self.store.delete(&snapshot)?;
        self.confirmed.deactivate()?;
        Ok(transaction.id)
    }

    /// `cancel-commit [persist-id]`: immediate rollback of the pending
    /// confirmed commit.
    pub fn cancel_commit(
        &mut self,
        session: SessionId,
        persist_id: Option<&str>,
    ) -> Result<u32> {
        if !self.confirmed.is_active() {
            return Err(Error::Validation(
                RpcError::new(
                    ErrorTag::OperationFailed,
                    "no confirmed commit is pending",
                )
                .protocol()
                .into(),
            ));
        }
        if !self.confirmed.cancel_authorized(session, persist_id) {
            return Err(Error::Validation(
                RpcError::new(
                    ErrorTag::AccessDenied,
                    "cancel-commit is not authorized for this session",
                )
                .protocol()
                .into(),
            ));
        }
        self.apply_rollback()
    }

    /// Session teardown: release the session's locks and, when the
    /// session issued a pending non-persisted confirmed commit, roll
    /// back immediately.
    pub fn session_closed(
        &mut self,
        session: SessionId,
    ) -> Result<TimerAction> {
        for name in self.locks.release_session(session) {
            info!(%name, %session, "lock released at session end");
        }
        if self.confirmed.session_end_triggers_rollback(session) {
            self.apply_rollback()?;
            return Ok(TimerAction::Cancel);
        }
        Ok(TimerAction::None)
    }

    /// Restart recovery of a persisted confirmed-commit record: rolls
    /// back when the deadline has passed, re-arms the timer otherwise.
    pub fn recover_confirmed(&mut self) -> Result<TimerAction> {
        match self.confirmed.recover(Utc::now()) {
            RecoverAction::None => Ok(TimerAction::None),
            RecoverAction::Rearm(remaining) => {
                info!(?remaining, "re-armed confirmed commit timer");
                Ok(TimerAction::Arm(remaining))
            }
            RecoverAction::RollbackNow => {
                self.apply_rollback()?;
                Ok(TimerAction::None)
            }
        }
    }
}
