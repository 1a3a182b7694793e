//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::any::Any;

use canopy_tree::{ConfigTree, NodeId};
use canopy_yang::modstate::{ModstateDiff, ModstateDiffEntry};

/// Opaque per-plugin state, downcast inside the plugin's own callbacks.
pub type PluginData = Box<dyn Any + Send>;

/// Arguments passed to every transaction callback. The source tree is
/// immutable from the plugin's point of view; target annotations made
/// during `begin` or `complete` become part of the committed tree.
pub struct CallbackArgs<'a> {
    pub source: &'a ConfigTree,
    pub target: &'a mut ConfigTree,
    // Diff vectors: `added` indexes into the target, `deleted` into the
    // source; the changed vectors are parallel.
    pub added: &'a [NodeId],
    pub deleted: &'a [NodeId],
    pub src_changed: &'a [NodeId],
    pub tgt_changed: &'a [NodeId],
}

pub type TransactionCb =
    fn(&mut PluginContext, CallbackArgs<'_>) -> Result<(), String>;

pub type AbortCb = fn(&mut PluginContext, CallbackArgs<'_>);

pub type ResetCb = fn(&mut PluginContext) -> Result<(), String>;

pub type DatastoreUpgradeCb = fn(
    &mut PluginContext,
    &mut ConfigTree,
    &ModstateDiff,
) -> Result<(), String>;

pub type ModuleUpgradeCb = fn(
    &mut PluginContext,
    &mut ConfigTree,
    &ModstateDiffEntry,
    &str,
) -> Result<(), String>;

/// A registered plugin: a record of optional callback capabilities.
pub struct Plugin {
    pub name: String,
    pub begin: Option<TransactionCb>,
    pub validate: Option<TransactionCb>,
    pub complete: Option<TransactionCb>,
    pub commit: Option<TransactionCb>,
    pub commit_done: Option<TransactionCb>,
    pub end: Option<TransactionCb>,
    pub abort: Option<AbortCb>,
    pub reset: Option<ResetCb>,
    pub datastore_upgrade: Option<DatastoreUpgradeCb>,
    pub module_upgrade: Option<ModuleUpgradeCb>,
}

/// Mutable per-plugin state handed to callbacks, guarded by a fence word
/// checked before and after each invocation of untrusted extension code.
pub struct PluginContext {
    pub name: String,
    pub data: PluginData,
    fence: u64,
}

const FENCE: u64 = 0x436e_7079_466e_6365;

/// Ordered plugin collection. Registration order is the total ordering
/// transactions traverse for every phase except `abort`, which runs in
/// reverse.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
    contexts: Vec<PluginContext>,
}

pub struct PluginBuilder {
    plugin: Plugin,
    data: PluginData,
}

// ===== impl PluginContext =====

impl PluginContext {
    fn new(name: String, data: PluginData) -> PluginContext {
        PluginContext {
            name,
            data,
            fence: FENCE,
        }
    }

    pub(crate) fn fence_ok(&self) -> bool {
        self.fence == FENCE
    }
}

// ===== impl PluginRegistry =====

impl PluginRegistry {
    pub fn new() -> PluginRegistry {
        PluginRegistry::default()
    }

    pub fn register(&mut self, plugin: Plugin, data: PluginData) {
        self.contexts
            .push(PluginContext::new(plugin.name.clone(), data));
        self.plugins.push(plugin);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.plugins.iter().position(|plugin| plugin.name == name)
    }

    pub fn plugin(&self, index: usize) -> &Plugin {
        &self.plugins[index]
    }

    pub fn parts_mut(
        &mut self,
        index: usize,
    ) -> (&Plugin, &mut PluginContext) {
        (&self.plugins[index], &mut self.contexts[index])
    }

    pub fn context_mut(&mut self, name: &str) -> Option<&mut PluginContext> {
        let index = self.index_of(name)?;
        Some(&mut self.contexts[index])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|plugin| plugin.name.as_str())
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginRegistry({:?})", self.names().collect::<Vec<_>>())
    }
}

// ===== impl PluginBuilder =====

impl PluginBuilder {
    pub fn new(name: &str) -> PluginBuilder {
        PluginBuilder {
            plugin: Plugin {
                name: name.to_owned(),
                begin: None,
                validate: None,
                complete: None,
                commit: None,
                commit_done: None,
                end: None,
                abort: None,
                reset: None,
                datastore_upgrade: None,
                module_upgrade: None,
            },
            data: Box::new(()),
        }
    }

    #[must_use]
    pub fn data(mut self, data: PluginData) -> Self {
        self.data = data;
        self
    }

    #[must_use]
    pub fn begin(mut self, cb: TransactionCb) -> Self {
        self.plugin.begin = Some(cb);
        self
    }

    #[must_use]
    pub fn validate(mut self, cb: TransactionCb) -> Self {
        self.plugin.validate = Some(cb);
        self
    }

    #[must_use]
    pub fn complete(mut self, cb: TransactionCb) -> Self {
        self.plugin.complete = Some(cb);
        self
    }

    #[must_use]
    pub fn commit(mut self, cb: TransactionCb) -> Self {
        self.plugin.commit = Some(cb);
        self
    }

    #[must_use]
    pub fn commit_done(mut self, cb: TransactionCb) -> Self {
        self.plugin.commit_done = Some(cb);
        self
    }

    #[must_use]
    pub fn end(mut self, cb: TransactionCb) -> Self {
        self.plugin.end = Some(cb);
        self
    }

    #[must_use]
    pub fn abort(mut self, cb: AbortCb) -> Self {
        self.plugin.abort = Some(cb);
        self
    }

    #[must_use]
    pub fn reset(mut self, cb: ResetCb) -> Self {
        self.plugin.reset = Some(cb);
        self
    }

    #[must_use]
    pub fn datastore_upgrade(mut self, cb: DatastoreUpgradeCb) -> Self {
        self.plugin.datastore_upgrade = Some(cb);
        self
    }

    #[must_use]
    pub fn module_upgrade(mut self, cb: ModuleUpgradeCb) -> Self {
        self.plugin.module_upgrade = Some(cb);
        self
    }

    pub fn register(self, registry: &mut PluginRegistry) {
        registry.register(self.plugin, self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_intact_after_data_swap() {
        let mut context =
            PluginContext::new("test".to_owned(), Box::new(42u32));
        context.data = Box::new("swapped");
        assert!(context.fence_ok());
    }

    #[test]
    fn registry_order_is_registration_order() {
        let mut registry = PluginRegistry::new();
        PluginBuilder::new("one").register(&mut registry);
        PluginBuilder::new("two").register(&mut registry);
        PluginBuilder::new("three").register(&mut registry);
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["one", "two", "three"]
        );
        assert_eq!(registry.index_of("two"), Some(1));
    }
}
