//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::HashMap;

use canopy_yang::YangSpec;

use crate::tree::{ConfigTree, NodeFlags, NodeId};

/// Result of diffing two configuration trees: four disjoint vectors.
/// `src_changed` and `tgt_changed` are parallel; entry `i` of each is the
/// same leaf on both sides with differing bodies.
#[derive(Debug, Default)]
pub struct TreeDiff {
    // Present in the source only.
    pub deleted: Vec<NodeId>,
    // Present in the target only.
    pub added: Vec<NodeId>,
    pub src_changed: Vec<NodeId>,
    pub tgt_changed: Vec<NodeId>,
}

// ===== impl TreeDiff =====

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
            && self.added.is_empty()
            && self.src_changed.is_empty()
    }

    /// Diffs two sorted, spec-bound trees. Identity for sibling matching:
    /// list key tuple, leaf-list body, or (namespace, name).
    pub fn compute(
        spec: &YangSpec,
        src: &ConfigTree,
        tgt: &ConfigTree,
    ) -> TreeDiff {
        let mut diff = TreeDiff::default();
        diff.compare_children(spec, src, src.root(), tgt, tgt.root());
        diff
    }

    /// Synthesizes the diff of a startup replay: every top-level element
    /// of the target is added, the source being empty.
    pub fn all_added(tgt: &ConfigTree) -> TreeDiff {
        TreeDiff {
            added: tgt.elements(tgt.root()).collect(),
            ..Default::default()
        }
    }

    fn compare_children(
        &mut self,
        spec: &YangSpec,
        src: &ConfigTree,
        src_parent: NodeId,
        tgt: &ConfigTree,
        tgt_parent: NodeId,
    ) {
        let mut unmatched = HashMap::new();
        for child in src.elements(src_parent) {
            unmatched.insert(src.match_key(spec, child), child);
        }

        for tgt_child in tgt.elements(tgt_parent) {
            let key = tgt.match_key(spec, tgt_child);
            match unmatched.remove(&key) {
                Some(src_child) => {
                    if src.body(src_child) != tgt.body(tgt_child) {
                        self.src_changed.push(src_child);
                        self.tgt_changed.push(tgt_child);
                    }
                    self.compare_children(
                        spec, src, src_child, tgt, tgt_child,
                    );
                }
                None => self.added.push(tgt_child),
            }
        }

        // Left-overs exist in the source only. Report them in document
        // order rather than hash order.
        let mut deleted = unmatched.into_values().collect::<Vec<_>>();
        deleted.sort();
        self.deleted.extend(deleted);
    }

    /// Flags both trees from the diff vectors: `DEL`/`ADD` recursively
    /// downward, `CHANGE` on changed leaves and propagated upward on
    /// ancestors.
    pub fn mark(&self, src: &mut ConfigTree, tgt: &mut ConfigTree) {
        for &node in &self.deleted {
            src.set_flags_recursive(node, NodeFlags::DEL);
            src.set_flags_ancestors(node, NodeFlags::CHANGE);
        }
        for &node in &self.added {
            tgt.set_flags_recursive(node, NodeFlags::ADD);
            tgt.set_flags_ancestors(node, NodeFlags::CHANGE);
        }
        for &node in &self.src_changed {
            src.set_flags(node, NodeFlags::CHANGE);
            src.set_flags_ancestors(node, NodeFlags::CHANGE);
        }
        for &node in &self.tgt_changed {
            tgt.set_flags(node, NodeFlags::CHANGE);
            tgt.set_flags_ancestors(node, NodeFlags::CHANGE);
        }
    }
}
