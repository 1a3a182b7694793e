//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use canopy_tree::diff::TreeDiff;
use canopy_tree::{ConfigTree, NodeId};
use canopy_yang::YangSpec;

use crate::Phase;
use crate::debug::Debug;
use crate::error::{Error, Result};
use crate::plugin::{CallbackArgs, PluginRegistry};

/// Lifecycle state of an in-flight transaction.
///
/// ```text
/// Idle -> Open -> Validated -> Ready -> Committed -> Installed -> Idle
/// ```
///
/// Any error edge before `Installed` leads through `Aborting` back to
/// `Idle`; `end` is also accepted from `Ready` for validate-only runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransactionState {
    Idle,
    Open,
    Validated,
    Ready,
    Committed,
    Installed,
    Aborting,
}

/// A short-lived record spanning one validate/commit pipeline: the source
/// and target trees plus the four diff vectors indexing into them. Source
/// and target stay immutable from the plugins' point of view for the
/// whole lifecycle (targets accept annotations through the callback
/// arguments only).
pub struct Transaction {
    pub id: u32,
    pub source: ConfigTree,
    pub target: ConfigTree,
    pub added: Vec<NodeId>,
    pub deleted: Vec<NodeId>,
    pub src_changed: Vec<NodeId>,
    pub tgt_changed: Vec<NodeId>,
    state: TransactionState,
    // Number of plugins whose `begin` returned success.
    begun: usize,
    // Restrict the bus to a single plugin (hot-restart replays).
    filter: Option<usize>,
}

// ===== impl Transaction =====

impl Transaction {
    /// Creates a transaction from two loaded trees, computing the diff
    /// and flagging both sides.
    pub fn new(
        id: u32,
        spec: &YangSpec,
        mut source: ConfigTree,
        mut target: ConfigTree,
    ) -> Transaction {
        let diff = TreeDiff::compute(spec, &source, &target);
        diff.mark(&mut source, &mut target);
        Transaction::from_parts(id, source, target, diff, None)
    }

    /// Creates a replay transaction: an all-added diff against an empty
    /// source (startup replay and plugin hot-restart).
    pub fn new_replay(
        id: u32,
        target: ConfigTree,
        filter: Option<usize>,
    ) -> Transaction {
        let mut source = ConfigTree::new();
        let mut target = target;
        let diff = TreeDiff::all_added(&target);
        diff.mark(&mut source, &mut target);
        Transaction::from_parts(id, source, target, diff, filter)
    }

    fn from_parts(
        id: u32,
        source: ConfigTree,
        target: ConfigTree,
        diff: TreeDiff,
        filter: Option<usize>,
    ) -> Transaction {
        Transaction {
            id,
            source,
            target,
            added: diff.added,
            deleted: diff.deleted,
            src_changed: diff.src_changed,
            tgt_changed: diff.tgt_changed,
            state: TransactionState::Idle,
            begun: 0,
            filter,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    // ===== bus operations =====

    pub fn begin(&mut self, plugins: &mut PluginRegistry) -> Result<()> {
        self.step(plugins, Phase::Begin, TransactionState::Open, &[
            TransactionState::Idle,
        ])
    }

    pub fn validate(&mut self, plugins: &mut PluginRegistry) -> Result<()> {
        self.step(plugins, Phase::Validate, TransactionState::Validated, &[
            TransactionState::Open,
        ])
    }

    pub fn complete(&mut self, plugins: &mut PluginRegistry) -> Result<()> {
        self.step(plugins, Phase::Complete, TransactionState::Ready, &[
            TransactionState::Validated,
        ])
    }

    pub fn commit(&mut self, plugins: &mut PluginRegistry) -> Result<()> {
        self.step(plugins, Phase::Commit, TransactionState::Committed, &[
            TransactionState::Ready,
        ])
    }

    pub fn commit_done(
        &mut self,
        plugins: &mut PluginRegistry,
    ) -> Result<()> {
        self.step(plugins, Phase::CommitDone, TransactionState::Installed, &[
            TransactionState::Committed,
        ])
    }

    pub fn end(&mut self, plugins: &mut PluginRegistry) -> Result<()> {
        self.step(plugins, Phase::End, TransactionState::Idle, &[
            TransactionState::Ready,
            TransactionState::Installed,
        ])
    }

    /// Best-effort abort: runs in reverse registry order over every
    /// plugin whose `begin` succeeded, never short-circuits.
    pub fn abort(&mut self, plugins: &mut PluginRegistry) {
        self.state = TransactionState::Aborting;
        for index in self.indices(plugins.len())[..self.begun]
            .iter()
            .copied()
            .rev()
            .collect::<Vec<_>>()
        {
            let (plugin, context) = plugins.parts_mut(index);
            Debug::PluginCallback(self.id, Phase::Abort, &plugin.name).log();
            if let Some(cb) = plugin.abort {
                let args = CallbackArgs {
                    source: &self.source,
                    target: &mut self.target,
                    added: &self.added,
                    deleted: &self.deleted,
                    src_changed: &self.src_changed,
                    tgt_changed: &self.tgt_changed,
                };
                (cb)(context, args);
            }
        }
        self.begun = 0;
        self.state = TransactionState::Idle;
    }

    fn step(
        &mut self,
        plugins: &mut PluginRegistry,
        phase: Phase,
        next: TransactionState,
        accepted: &[TransactionState],
    ) -> Result<()> {
        if !accepted.contains(&self.state) {
            return Err(Error::InvalidTransition {
                state: self.state,
                phase,
            });
        }
        match self.run_phase(plugins, phase) {
            Ok(()) => {
                self.state = next;
                if phase == Phase::End {
                    self.begun = 0;
                }
                Ok(())
            }
            Err(error) => {
                self.state = TransactionState::Aborting;
                Err(error)
            }
        }
    }

    fn run_phase(
        &mut self,
        plugins: &mut PluginRegistry,
        phase: Phase,
    ) -> Result<()> {
        for (position, index) in
            self.indices(plugins.len()).into_iter().enumerate()
        {
            let (plugin, context) = plugins.parts_mut(index);
            let cb = match phase {
                Phase::Begin => plugin.begin,
                Phase::Validate => plugin.validate,
                Phase::Complete => plugin.complete,
                Phase::Commit => plugin.commit,
                Phase::CommitDone => plugin.commit_done,
                Phase::End => plugin.end,
                Phase::Abort => unreachable!(),
            };

            if let Some(cb) = cb {
                Debug::PluginCallback(self.id, phase, &plugin.name).log();
                if !context.fence_ok() {
                    return Err(Error::PluginFence {
                        plugin: plugin.name.clone(),
                        phase,
                    });
                }
                let args = CallbackArgs {
                    source: &self.source,
                    target: &mut self.target,
                    added: &self.added,
                    deleted: &self.deleted,
                    src_changed: &self.src_changed,
                    tgt_changed: &self.tgt_changed,
                };
                (cb)(context, args).map_err(|reason| {
                    Error::PluginCallback {
                        plugin: plugin.name.clone(),
                        phase,
                        reason,
                    }
                })?;
                if !context.fence_ok() {
                    return Err(Error::PluginFence {
                        plugin: plugin.name.clone(),
                        phase,
                    });
                }
            }

            if phase == Phase::Begin {
                self.begun = position + 1;
            }
        }
        Ok(())
    }

    fn indices(&self, count: usize) -> Vec<usize> {
        match self.filter {
            Some(index) => vec![index],
            None => (0..count).collect(),
        }
    }
}
