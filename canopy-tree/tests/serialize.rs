//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use canopy_tree::serialize;
use canopy_tree::ConfigTree;
use canopy_yang::modstate::ModuleState;
use canopy_yang::types::TypeSpec;
use canopy_yang::{SpecBuilder, YangSpec};
use serde_json::json;

fn spec() -> Arc<YangSpec> {
    let mut builder = SpecBuilder::new();
    let sys = builder.add_module("sys", "urn:test:sys", "2024-01-10");
    let system = builder.container(sys, None, "system");
    builder.leaf(sys, Some(system), "hostname", TypeSpec::string());
    let user = builder.list(sys, Some(system), "user", &["name"]);
    builder.leaf(sys, Some(user), "name", TypeSpec::string());
    builder.leaf(sys, Some(user), "uid", TypeSpec::uint32());
    builder.leaf_list(sys, Some(system), "search", TypeSpec::string());
    builder.build()
}

fn sample(spec: &YangSpec) -> ConfigTree {
    let mut tree = ConfigTree::new();
    let root = tree.root();
    let system = tree.add_element(root, Some("sys"), "system");
    tree.add_leaf(system, None, "hostname", "rt1");
    let user = tree.add_element(system, None, "user");
    tree.add_leaf(user, None, "name", "bob");
    tree.add_leaf(user, None, "uid", "1000");
    tree.add_leaf(system, None, "search", "example.com");
    tree.add_leaf(system, None, "search", "example.net");
    tree.bind(spec, true).unwrap();
    tree.sort(spec);
    tree
}

#[test]
fn value_shape() {
    let spec = spec();
    let tree = sample(&spec);
    let value = serialize::tree_to_value(&tree, &spec);

    assert_eq!(
        value,
        json!({
            "sys:system": {
                "hostname": "rt1",
                "search": ["example.com", "example.net"],
                "user": [{"name": "bob", "uid": "1000"}],
            }
        })
    );
}

#[test]
fn round_trip_is_identity() {
    let spec = spec();
    let tree = sample(&spec);
    let modstate = ModuleState::of_spec(&spec);

    let encoded = serialize::encode(&tree, &spec, &modstate);
    let (mut reparsed, reparsed_modstate) =
        serialize::decode(&encoded).unwrap();
    reparsed.bind(&spec, true).unwrap();
    reparsed.sort(&spec);

    assert!(tree.data_eq(&reparsed));
    assert_eq!(modstate, reparsed_modstate);

    // serialize(parse(x)) == x for canonical-form input.
    let re_encoded = serialize::encode(&reparsed, &spec, &reparsed_modstate);
    assert_eq!(encoded, re_encoded);
}

#[test]
fn single_entry_list_stays_an_array() {
    let spec = spec();
    let tree = sample(&spec);
    let value = serialize::tree_to_value(&tree, &spec);
    assert!(value["sys:system"]["user"].is_array());
}

#[test]
fn missing_modstate_decodes_empty() {
    let text = r#"{"config": {"sys:system": {"hostname": "rt1"}}}"#;
    let (tree, modstate) = serialize::decode(text).unwrap();
    assert!(modstate.is_empty());
    let system = tree.find_child(tree.root(), "system").unwrap();
    assert_eq!(tree.namespace(system), Some("sys"));
    let hostname = tree.find_child(system, "hostname").unwrap();
    assert_eq!(tree.body(hostname), Some("rt1"));
    // The namespace is inherited from the qualified parent.
    assert_eq!(tree.namespace(hostname), Some("sys"));
}

#[test]
fn scalar_coercions() {
    let value = json!({
        "sys:system": {
            "hostname": "rt1",
            "port": 8080,
            "enabled": true,
        }
    });
    let tree = serialize::tree_from_value(&value).unwrap();
    let system = tree.find_child(tree.root(), "system").unwrap();
    let port = tree.find_child(system, "port").unwrap();
    assert_eq!(tree.body(port), Some("8080"));
    let enabled = tree.find_child(system, "enabled").unwrap();
    assert_eq!(tree.body(enabled), Some("true"));
}

#[test]
fn attributes_round_trip() {
    let mut tree = ConfigTree::new();
    let root = tree.root();
    let system = tree.add_element(root, Some("sys"), "system");
    tree.add_attribute(system, "inactive", "true");
    tree.add_leaf(system, None, "hostname", "rt1");

    let spec = spec();
    let value = serialize::tree_to_value(&tree, &spec);
    let reparsed = serialize::tree_from_value(&value).unwrap();
    assert!(tree.data_eq(&reparsed));
    let system = reparsed.find_child(reparsed.root(), "system").unwrap();
    assert_eq!(reparsed.attribute(system, "inactive"), Some("true"));
}

#[test]
fn malformed_input_is_rejected() {
    assert!(serialize::decode("not json").is_err());
    assert!(serialize::decode(r#"{"module-state": []}"#).is_err());
    // Nested arrays have no tree meaning.
    let value = json!({"sys:system": {"x": [["nested"]]}});
    assert!(serialize::tree_from_value(&value).is_err());
}
