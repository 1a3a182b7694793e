//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use canopy_yang::{SnodeId, StatementKind, YangSpec};

use crate::tree::{ConfigTree, NodeId};

/// Fills in YANG-declared default values on a bound tree: missing leaves
/// with defaults receive them, and non-presence containers holding
/// defaulted descendants are created so the defaults cascade. Runs before
/// validation.
pub fn fill_defaults(tree: &mut ConfigTree, spec: &YangSpec) {
    fill_element(tree, spec, tree.root(), None);
}

fn fill_element(
    tree: &mut ConfigTree,
    spec: &YangSpec,
    node: NodeId,
    snode: Option<SnodeId>,
) {
    let stmts: Vec<SnodeId> = match snode {
        Some(snode) => spec.stmt(snode).children.to_vec(),
        None => spec.roots().to_vec(),
    };

    for stmt_id in stmts {
        let stmt = spec.stmt(stmt_id);
        let module = spec.module(stmt.module).name.clone();
        let instances = tree
            .elements(node)
            .filter(|&child| tree.snode(child) == Some(stmt_id))
            .collect::<Vec<_>>();

        match &stmt.kind {
            StatementKind::Leaf {
                default: Some(default),
                ..
            } if instances.is_empty() => {
                let default = default.clone();
                let leaf =
                    tree.add_leaf(node, Some(&module), &stmt.name, &default);
                tree.set_snode(leaf, Some(stmt_id));
            }
            StatementKind::Container { presence: false } => {
                let instance = match instances.first() {
                    Some(&instance) => Some(instance),
                    None if has_defaults(spec, stmt_id) => {
                        let container = tree.add_element(
                            node,
                            Some(&module),
                            &stmt.name,
                        );
                        tree.set_snode(container, Some(stmt_id));
                        Some(container)
                    }
                    None => None,
                };
                if let Some(instance) = instance {
                    fill_element(tree, spec, instance, Some(stmt_id));
                }
            }
            StatementKind::Container { presence: true }
            | StatementKind::List { .. } => {
                // Presence containers and list entries cascade defaults
                // only into instances that already exist.
                for instance in instances {
                    fill_element(tree, spec, instance, Some(stmt_id));
                }
            }
            _ => {}
        }
    }
}

// Whether a statement subtree carries any default, without crossing
// presence containers or lists.
fn has_defaults(spec: &YangSpec, id: SnodeId) -> bool {
    let stmt = spec.stmt(id);
    match &stmt.kind {
        StatementKind::Leaf { default, .. } => default.is_some(),
        StatementKind::Container { presence: false } => stmt
            .children
            .iter()
            .any(|&child| has_defaults(spec, child)),
        _ => false,
    }
}
