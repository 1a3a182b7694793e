//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

//! Generic YANG validation: structural, type and cardinality constraints
//! over a bound configuration tree. Defaults are expected to be filled in
//! beforehand. Failures accumulate as NETCONF error elements; callers
//! decide whether to stop at the first.

use std::collections::HashMap;

use canopy_utils::netconf::{ErrorTag, RpcError, RpcErrors};
use canopy_yang::types::TypeSpec;
use canopy_yang::{SnodeId, StatementKind, YangSpec};

use crate::path;
use crate::tree::{ConfigTree, NodeId};

/// Validates the entire tree.
pub fn validate_all_top(
    spec: &YangSpec,
    tree: &ConfigTree,
    errors: &mut RpcErrors,
) {
    let validator = Validator { spec, tree };
    validator.validate_children(tree.root(), None, errors);
}

/// Validates a single subtree (incremental edits and the added-vector
/// pass of commit).
pub fn validate_add(
    spec: &YangSpec,
    tree: &ConfigTree,
    node: NodeId,
    errors: &mut RpcErrors,
) {
    let validator = Validator { spec, tree };
    validator.validate_element(node, errors);
}

struct Validator<'a> {
    spec: &'a YangSpec,
    tree: &'a ConfigTree,
}

impl Validator<'_> {
    fn validate_element(&self, node: NodeId, errors: &mut RpcErrors) {
        let Some(snode) = self.tree.snode(node) else {
            errors.push(
                RpcError::new(
                    ErrorTag::UnknownElement,
                    format!("unknown element \"{}\"", self.tree.name(node)),
                )
                .with_path(self.tree.instance_path(self.spec, node)),
            );
            return;
        };
        let stmt = self.spec.stmt(snode);

        // `when` guard.
        if let Some(when) = &stmt.when {
            match path::parse(when) {
                Ok(expr) => {
                    if !path::eval_bool(self.tree, node, &expr) {
                        errors.push(
                            RpcError::new(
                                ErrorTag::UnknownElement,
                                format!(
                                    "when condition \"{when}\" not satisfied"
                                ),
                            )
                            .with_path(
                                self.tree.instance_path(self.spec, node),
                            ),
                        );
                    }
                }
                Err(error) => errors.push(
                    RpcError::new(
                        ErrorTag::OperationFailed,
                        format!("invalid when expression: {error}"),
                    )
                    .with_path(self.tree.instance_path(self.spec, node)),
                ),
            }
        }

        // `must` constraints.
        for must in &stmt.musts {
            match path::parse(&must.expr) {
                Ok(expr) => {
                    if !path::eval_bool(self.tree, node, &expr) {
                        let message = must.error_message.clone().unwrap_or(
                            format!(
                                "must \"{}\" not satisfied",
                                must.expr
                            ),
                        );
                        let mut error =
                            RpcError::new(ErrorTag::OperationFailed, message)
                                .with_path(
                                    self.tree
                                        .instance_path(self.spec, node),
                                );
                        if let Some(app_tag) = &must.error_app_tag {
                            error = error.with_app_tag(app_tag.clone());
                        }
                        errors.push(error);
                    }
                }
                Err(error) => errors.push(
                    RpcError::new(
                        ErrorTag::OperationFailed,
                        format!("invalid must expression: {error}"),
                    )
                    .with_path(self.tree.instance_path(self.spec, node)),
                ),
            }
        }

        match &stmt.kind {
            StatementKind::Leaf { typ, .. }
            | StatementKind::LeafList { typ, .. } => {
                self.validate_value(node, typ, errors);
            }
            StatementKind::Container { .. } | StatementKind::List { .. } => {
                self.validate_children(node, Some(snode), errors);
            }
        }
    }

    fn validate_value(
        &self,
        node: NodeId,
        typ: &TypeSpec,
        errors: &mut RpcErrors,
    ) {
        let body = self.tree.body(node).unwrap_or("");

        if let Err(reason) = typ.check_value(self.spec, body) {
            errors.push(
                RpcError::new(ErrorTag::InvalidValue, reason)
                    .with_path(self.tree.instance_path(self.spec, node)),
            );
            return;
        }

        // Leafref referential integrity.
        if let TypeSpec::LeafRef { path: target } = typ {
            match path::parse_path(target) {
                Ok(parsed) => {
                    let values = path::values(self.tree, node, &parsed);
                    if !values.iter().any(|value| value == body) {
                        errors.push(
                            RpcError::new(
                                ErrorTag::DataMissing,
                                format!(
                                    "required leafref instance \"{body}\" \
                                     does not exist"
                                ),
                            )
                            .with_path(
                                self.tree.instance_path(self.spec, node),
                            ),
                        );
                    }
                }
                Err(error) => errors.push(
                    RpcError::new(
                        ErrorTag::OperationFailed,
                        format!("invalid leafref path: {error}"),
                    )
                    .with_path(self.tree.instance_path(self.spec, node)),
                ),
            }
        }
    }

    fn validate_children(
        &self,
        parent: NodeId,
        parent_snode: Option<SnodeId>,
        errors: &mut RpcErrors,
    ) {
        let stmts: Vec<SnodeId> = match parent_snode {
            Some(snode) => self.spec.stmt(snode).children.to_vec(),
            None => self.spec.roots().to_vec(),
        };

        for stmt_id in stmts {
            let stmt = self.spec.stmt(stmt_id);
            let instances = self
                .tree
                .elements(parent)
                .filter(|&child| self.tree.snode(child) == Some(stmt_id))
                .collect::<Vec<_>>();

            match &stmt.kind {
                StatementKind::Leaf { mandatory, .. } => {
                    if instances.is_empty() && *mandatory {
                        errors.push(
                            RpcError::new(
                                ErrorTag::MissingElement,
                                format!(
                                    "mandatory leaf \"{}\" is missing",
                                    stmt.name
                                ),
                            )
                            .with_path(self.child_path(parent, &stmt.name)),
                        );
                    }
                    if instances.len() > 1 {
                        errors.push(
                            RpcError::new(
                                ErrorTag::DataExists,
                                format!(
                                    "leaf \"{}\" occurs more than once",
                                    stmt.name
                                ),
                            )
                            .with_path(self.child_path(parent, &stmt.name)),
                        );
                    }
                }
                StatementKind::Container { .. } => {
                    if instances.len() > 1 {
                        errors.push(
                            RpcError::new(
                                ErrorTag::DataExists,
                                format!(
                                    "container \"{}\" occurs more than once",
                                    stmt.name
                                ),
                            )
                            .with_path(self.child_path(parent, &stmt.name)),
                        );
                    }
                }
                StatementKind::List {
                    keys,
                    min_elements,
                    max_elements,
                    unique,
                    ..
                } => {
                    self.check_cardinality(
                        parent,
                        &stmt.name,
                        instances.len(),
                        *min_elements,
                        *max_elements,
                        errors,
                    );

                    // Key presence.
                    for &instance in &instances {
                        for key in keys {
                            if self.tree.find_child(instance, key).is_none()
                            {
                                errors.push(
                                    RpcError::new(
                                        ErrorTag::MissingElement,
                                        format!(
                                            "list key \"{key}\" is missing"
                                        ),
                                    )
                                    .with_path(
                                        self.tree.instance_path(
                                            self.spec, instance,
                                        ),
                                    ),
                                );
                            }
                        }
                    }

                    // Key uniqueness.
                    let mut seen = HashMap::new();
                    for &instance in &instances {
                        let tuple = keys
                            .iter()
                            .map(|key| {
                                self.tree
                                    .find_child(instance, key)
                                    .and_then(|leaf| self.tree.body(leaf))
                                    .unwrap_or("")
                                    .to_owned()
                            })
                            .collect::<Vec<_>>();
                        if seen.insert(tuple, instance).is_some() {
                            errors.push(
                                RpcError::new(
                                    ErrorTag::DataExists,
                                    format!(
                                        "duplicate \"{}\" list entry",
                                        stmt.name
                                    ),
                                )
                                .with_path(
                                    self.tree
                                        .instance_path(self.spec, instance),
                                ),
                            );
                        }
                    }

                    // `unique` constraints.
                    for tuple_spec in unique {
                        let mut seen = HashMap::new();
                        for &instance in &instances {
                            let tuple = tuple_spec
                                .iter()
                                .map(|leaf| {
                                    self.tree
                                        .find_child(instance, leaf)
                                        .and_then(|leaf| {
                                            self.tree.body(leaf)
                                        })
                                        .map(str::to_owned)
                                })
                                .collect::<Option<Vec<_>>>();
                            // Entries missing any of the leaves don't
                            // participate in the uniqueness check.
                            let Some(tuple) = tuple else {
                                continue;
                            };
                            if seen.insert(tuple, instance).is_some() {
                                errors.push(
                                    RpcError::new(
                                        ErrorTag::OperationFailed,
                                        format!(
                                            "\"{}\" violates unique \
                                             constraint",
                                            stmt.name
                                        ),
                                    )
                                    .with_app_tag("data-not-unique")
                                    .with_path(
                                        self.tree.instance_path(
                                            self.spec, instance,
                                        ),
                                    ),
                                );
                            }
                        }
                    }
                }
                StatementKind::LeafList {
                    min_elements,
                    max_elements,
                    user_ordered,
                    ..
                } => {
                    self.check_cardinality(
                        parent,
                        &stmt.name,
                        instances.len(),
                        *min_elements,
                        *max_elements,
                        errors,
                    );

                    if !user_ordered {
                        let mut seen = HashMap::new();
                        for &instance in &instances {
                            let value = self
                                .tree
                                .body(instance)
                                .unwrap_or("")
                                .to_owned();
                            if seen.insert(value, instance).is_some() {
                                errors.push(
                                    RpcError::new(
                                        ErrorTag::DataExists,
                                        format!(
                                            "duplicate \"{}\" leaf-list \
                                             value",
                                            stmt.name
                                        ),
                                    )
                                    .with_path(
                                        self.tree.instance_path(
                                            self.spec, instance,
                                        ),
                                    ),
                                );
                            }
                        }
                    }
                }
            }
        }

        for child in self.tree.elements(parent) {
            self.validate_element(child, errors);
        }
    }

    fn check_cardinality(
        &self,
        parent: NodeId,
        name: &str,
        count: usize,
        min_elements: Option<u32>,
        max_elements: Option<u32>,
        errors: &mut RpcErrors,
    ) {
        if let Some(min) = min_elements
            && (count as u32) < min
        {
            errors.push(
                RpcError::new(
                    ErrorTag::DataMissing,
                    format!(
                        "\"{name}\" requires at least {min} element(s), \
                         {count} present"
                    ),
                )
                .with_app_tag("too-few-elements")
                .with_path(self.child_path(parent, name)),
            );
        }
        if let Some(max) = max_elements
            && (count as u32) > max
        {
            errors.push(
                RpcError::new(
                    ErrorTag::OperationFailed,
                    format!(
                        "\"{name}\" allows at most {max} element(s), \
                         {count} present"
                    ),
                )
                .with_app_tag("too-many-elements")
                .with_path(self.child_path(parent, name)),
            );
        }
    }

    fn child_path(&self, parent: NodeId, name: &str) -> String {
        if parent == self.tree.root() {
            format!("/{name}")
        } else {
            format!(
                "{}/{name}",
                self.tree.instance_path(self.spec, parent)
            )
        }
    }
}
