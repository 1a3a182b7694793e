//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

//! Declarative upgrade changelog: an ordered list of per-module entries,
//! each transforming stored configuration authored against an older
//! module revision into the current one. Registered on the plugin bus as
//! a module-upgrade capability.

use canopy_tree::path;
use canopy_tree::serialize;
use canopy_tree::{ConfigTree, NodeId};
use canopy_yang::modstate::ModstateDiffEntry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::plugin::{PluginBuilder, PluginContext, PluginRegistry};

#[derive(Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct Changelog {
    pub entries: Vec<ChangelogEntry>,
}

#[derive(Debug)]
#[derive(Deserialize, Serialize)]
pub struct ChangelogEntry {
    pub namespace: String,
    pub revfrom: String,
    pub revision: String,
    pub steps: Vec<ChangelogStep>,
}

#[derive(Debug)]
#[derive(Deserialize, Serialize)]
pub struct ChangelogStep {
    pub op: ChangelogOp,
    // Path selecting the nodes to transform.
    pub r#where: String,
    // Optional boolean guard, evaluated per matched node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    // `rename`: the new tag, as a quoted literal or a path evaluated at
    // the matched node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    // `move`: destination parent path, evaluated at the matched node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst: Option<String>,
    // `replace`/`insert`: embedded configuration subtree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangelogOp {
    Rename,
    Replace,
    Insert,
    Delete,
    Move,
}

// ===== impl Changelog =====

impl Changelog {
    pub fn load(path: &std::path::Path) -> Result<Changelog, String> {
        let text = std::fs::read_to_string(path).map_err(|error| {
            format!("cannot read changelog {}: {error}", path.display())
        })?;
        serde_json::from_str(&text)
            .map_err(|error| format!("invalid changelog: {error}"))
    }

    /// Applies, in document order, every entry of the given namespace
    /// whose `[revfrom, revision]` interval overlaps the span between the
    /// stored content's author revision and the running schema revision.
    /// The first failing operation aborts the upgrade.
    pub fn upgrade(
        &self,
        tree: &mut ConfigTree,
        namespace: &str,
        author_revision: &str,
        schema_revision: &str,
    ) -> Result<(), String> {
        for entry in self.entries.iter().filter(|entry| {
            entry.namespace == namespace
                && entry.revfrom.as_str() <= schema_revision
                && entry.revision.as_str() >= author_revision
        }) {
            for step in &entry.steps {
                apply_step(tree, step)?;
            }
        }
        Ok(())
    }

    /// Wraps the changelog as a registered plugin carrying only the
    /// module-upgrade capability.
    pub fn register(self, registry: &mut PluginRegistry) {
        PluginBuilder::new("changelog")
            .data(Box::new(self))
            .module_upgrade(changelog_module_upgrade)
            .register(registry);
    }
}

// ===== helper functions =====

fn changelog_module_upgrade(
    context: &mut PluginContext,
    tree: &mut ConfigTree,
    entry: &ModstateDiffEntry,
    namespace: &str,
) -> Result<(), String> {
    let changelog = context
        .data
        .downcast_ref::<Changelog>()
        .ok_or("changelog plugin data missing")?;
    changelog.upgrade(
        tree,
        namespace,
        &entry.author_revision,
        &entry.current_revision,
    )
}

fn apply_step(tree: &mut ConfigTree, step: &ChangelogStep) -> Result<(), String> {
    let where_path = path::parse_path(&step.r#where)?;
    let targets = path::select(tree, tree.root(), &where_path);

    for target in targets {
        if let Some(when) = &step.when {
            let guard = path::parse(when)?;
            if !path::eval_bool(tree, target, &guard) {
                continue;
            }
        }

        match step.op {
            ChangelogOp::Rename => {
                let tag = step
                    .tag
                    .as_deref()
                    .ok_or("rename step is missing \"tag\"")?;
                let new_name = resolve_tag(tree, target, tag)?;
                if new_name != tree.name(target) {
                    tree.rename(target, &new_name);
                }
            }
            ChangelogOp::Replace => {
                let new = parse_new(step)?;
                let parent = tree
                    .parent(target)
                    .ok_or("cannot replace the tree root")?;
                tree.remove(target);
                graft(tree, parent, &new);
            }
            ChangelogOp::Insert => {
                let new = parse_new(step)?;
                graft(tree, target, &new);
            }
            ChangelogOp::Delete => {
                tree.remove(target);
            }
            ChangelogOp::Move => {
                let dst = step
                    .dst
                    .as_deref()
                    .ok_or("move step is missing \"dst\"")?;
                let dst_path = path::parse_path(dst)?;
                let destination = path::select(tree, target, &dst_path)
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        format!("move destination \"{dst}\" not found")
                    })?;
                tree.reattach(target, destination);
            }
        }
    }

    Ok(())
}

// A rename tag is either a quoted literal or a path yielding the new
// name, evaluated at the matched node.
fn resolve_tag(
    tree: &ConfigTree,
    target: NodeId,
    tag: &str,
) -> Result<String, String> {
    if let Some(stripped) = tag
        .strip_prefix('\'')
        .and_then(|tag| tag.strip_suffix('\''))
        .or_else(|| {
            tag.strip_prefix('"').and_then(|tag| tag.strip_suffix('"'))
        })
    {
        return Ok(stripped.to_owned());
    }
    let parsed = path::parse_path(tag)?;
    path::values(tree, target, &parsed)
        .into_iter()
        .next()
        .ok_or_else(|| format!("rename tag \"{tag}\" yields no value"))
}

fn parse_new(step: &ChangelogStep) -> Result<ConfigTree, String> {
    let value = step
        .new
        .as_ref()
        .ok_or("step is missing the \"new\" subtree")?;
    serialize::tree_from_value(value)
}

// Copies every top-level element of a parsed subtree under the given
// parent.
fn graft(tree: &mut ConfigTree, parent: NodeId, new: &ConfigTree) {
    for child in new.elements(new.root()).collect::<Vec<_>>() {
        tree.copy_subtree(new, child, parent);
    }
}
