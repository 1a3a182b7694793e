//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

//! JSON tree serialization. Datastore files carry an envelope with the
//! module-state record and the configuration itself:
//!
//! ```json
//! {
//!   "module-state": [{"module": "sys", "revision": "2024-01-10"}],
//!   "config": {"sys:system": {"hostname": "rt1"}}
//! }
//! ```
//!
//! Child names are module-qualified when the module differs from the
//! parent's (top-level names always are). Lists and leaf-lists encode as
//! arrays, leaves as strings. Sibling names are emitted in sorted order,
//! which together with canonical tree sorting makes the encoding stable
//! under parse/serialize round-trips.

use canopy_yang::StatementKind;
use canopy_yang::YangSpec;
use canopy_yang::modstate::ModuleState;
use serde_json::{Map, Value, json};

use crate::tree::{ConfigTree, NodeId};

// ===== encoding =====

/// Serializes a datastore file: envelope + configuration.
pub fn encode(
    tree: &ConfigTree,
    spec: &YangSpec,
    modstate: &ModuleState,
) -> String {
    let envelope = json!({
        "module-state": modstate,
        "config": tree_to_value(tree, spec),
    });
    // Stable, human-diffable output.
    serde_json::to_string_pretty(&envelope).expect("JSON encoding")
}

/// JSON value of the configuration data alone.
pub fn tree_to_value(tree: &ConfigTree, spec: &YangSpec) -> Value {
    children_to_value(tree, spec, tree.root())
}

fn children_to_value(
    tree: &ConfigTree,
    spec: &YangSpec,
    parent: NodeId,
) -> Value {
    let mut object = Map::new();

    if let Some(body) = tree.body(parent) {
        object.insert("#".to_owned(), Value::String(body.to_owned()));
    }
    let attrs = tree
        .attributes(parent)
        .map(|(name, value)| {
            (name.to_owned(), Value::String(value.to_owned()))
        })
        .collect::<Map<_, _>>();
    if !attrs.is_empty() {
        object.insert("@".to_owned(), Value::Object(attrs));
    }

    for child in tree.elements(parent) {
        let key = qualified_name(tree, parent, child);
        let value = element_to_value(tree, spec, child);

        let multi = tree
            .snode(child)
            .map(|snode| {
                matches!(
                    spec.stmt(snode).kind,
                    StatementKind::List { .. }
                        | StatementKind::LeafList { .. }
                )
            })
            .unwrap_or(false);

        match object.get_mut(&key) {
            Some(Value::Array(array)) => array.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None if multi => {
                object.insert(key, Value::Array(vec![value]));
            }
            None => {
                object.insert(key, value);
            }
        }
    }

    Value::Object(object)
}

fn element_to_value(
    tree: &ConfigTree,
    spec: &YangSpec,
    node: NodeId,
) -> Value {
    let has_elements = tree.elements(node).next().is_some();
    let has_attrs = tree.attributes(node).next().is_some();
    if has_elements || has_attrs {
        children_to_value(tree, spec, node)
    } else {
        Value::String(tree.body(node).unwrap_or("").to_owned())
    }
}

fn qualified_name(
    tree: &ConfigTree,
    parent: NodeId,
    child: NodeId,
) -> String {
    match tree.namespace(child) {
        Some(namespace) if tree.namespace(parent) != Some(namespace) => {
            format!("{}:{}", namespace, tree.name(child))
        }
        _ => tree.name(child).to_owned(),
    }
}

// ===== decoding =====

/// Parses a datastore file: envelope + configuration. The resulting tree
/// is unbound; callers bind and sort as needed.
pub fn decode(text: &str) -> Result<(ConfigTree, ModuleState), String> {
    let envelope: Value = serde_json::from_str(text)
        .map_err(|error| format!("invalid JSON: {error}"))?;
    let modstate = match envelope.get("module-state") {
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|error| format!("invalid module-state: {error}"))?,
        None => ModuleState::default(),
    };
    let config = envelope
        .get("config")
        .ok_or_else(|| "missing \"config\" member".to_owned())?;
    let tree = tree_from_value(config)?;
    Ok((tree, modstate))
}

/// Builds an unbound tree from a configuration JSON value.
pub fn tree_from_value(value: &Value) -> Result<ConfigTree, String> {
    let mut tree = ConfigTree::new();
    let root = tree.root();
    let object = value
        .as_object()
        .ok_or_else(|| "configuration must be a JSON object".to_owned())?;
    children_from_object(&mut tree, root, object)?;
    Ok(tree)
}

fn children_from_object(
    tree: &mut ConfigTree,
    parent: NodeId,
    object: &Map<String, Value>,
) -> Result<(), String> {
    for (key, value) in object {
        match key.as_str() {
            "#" => {
                let body = value
                    .as_str()
                    .ok_or_else(|| "body must be a string".to_owned())?;
                tree.set_body(parent, body);
            }
            "@" => {
                let attrs = value.as_object().ok_or_else(|| {
                    "attributes must be an object".to_owned()
                })?;
                for (name, value) in attrs {
                    let value = value.as_str().ok_or_else(|| {
                        "attribute values must be strings".to_owned()
                    })?;
                    tree.add_attribute(parent, name, value);
                }
            }
            _ => {
                let (namespace, name) = match key.split_once(':') {
                    Some((namespace, name)) => (Some(namespace), name),
                    None => (None, key.as_str()),
                };
                match value {
                    Value::Array(items) => {
                        for item in items {
                            element_from_value(
                                tree, parent, namespace, name, item,
                            )?;
                        }
                    }
                    _ => {
                        element_from_value(
                            tree, parent, namespace, name, value,
                        )?;
                    }
                }
            }
        }
    }
    Ok(())
}

fn element_from_value(
    tree: &mut ConfigTree,
    parent: NodeId,
    namespace: Option<&str>,
    name: &str,
    value: &Value,
) -> Result<(), String> {
    let element = tree.add_element(parent, namespace, name);
    match value {
        Value::String(text) => tree.set_body(element, text),
        Value::Null => tree.set_body(element, ""),
        Value::Number(number) => {
            tree.set_body(element, &number.to_string())
        }
        Value::Bool(flag) => {
            tree.set_body(element, if *flag { "true" } else { "false" })
        }
        Value::Object(object) => {
            children_from_object(tree, element, object)?;
        }
        Value::Array(_) => {
            return Err(format!("nested array under \"{name}\""));
        }
    }
    Ok(())
}
