//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use canopy_tree::diff::TreeDiff;
use canopy_tree::{ConfigTree, NodeFlags, NodeId};
use canopy_yang::types::TypeSpec;
use canopy_yang::{SpecBuilder, YangSpec};

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

fn base_tree(spec: &YangSpec) -> (ConfigTree, NodeId) {
    let mut tree = ConfigTree::new();
    let root = tree.root();
    let system = tree.add_element(root, Some("sys"), "system");
    tree.add_leaf(system, None, "hostname", "rt1");
    tree.bind(spec, true).unwrap();
    tree.sort(spec);
    (tree, system)
}

fn add_user(tree: &mut ConfigTree, system: NodeId, name: &str, uid: &str) {
    let user = tree.add_element(system, None, "user");
    tree.add_leaf(user, None, "name", name);
    tree.add_leaf(user, None, "uid", uid);
}

#[test]
fn self_diff_is_empty() {
    let spec = spec();
    let (tree, _) = base_tree(&spec);
    let copy = tree.deep_copy();
    let diff = TreeDiff::compute(&spec, &tree, &copy);
    assert!(diff.is_empty());
    assert!(diff.added.is_empty());
    assert!(diff.deleted.is_empty());
    assert!(diff.tgt_changed.is_empty());
}

#[test]
fn added_subtree() {
    let spec = spec();
    let (src, _) = base_tree(&spec);
    let (mut tgt, system) = base_tree(&spec);
    add_user(&mut tgt, system, "bob", "1000");
    tgt.bind(&spec, true).unwrap();
    tgt.sort(&spec);

    let diff = TreeDiff::compute(&spec, &src, &tgt);
    assert_eq!(diff.added.len(), 1);
    assert!(diff.deleted.is_empty());
    assert!(diff.src_changed.is_empty());
    assert_eq!(tgt.name(diff.added[0]), "user");
}

#[test]
fn deleted_subtree_flags() {
    let spec = spec();
    let (mut src, system) = base_tree(&spec);
    add_user(&mut src, system, "bob", "1000");
    src.bind(&spec, true).unwrap();
    src.sort(&spec);
    let (mut tgt, _) = base_tree(&spec);

    let diff = TreeDiff::compute(&spec, &src, &tgt);
    assert_eq!(diff.deleted.len(), 1);
    diff.mark(&mut src, &mut tgt);

    // DEL propagates downward, CHANGE upward.
    let user = diff.deleted[0];
    assert!(src.flags(user).contains(NodeFlags::DEL));
    let name = src.find_child(user, "name").unwrap();
    assert!(src.flags(name).contains(NodeFlags::DEL));
    let system = src.parent(user).unwrap();
    assert!(src.flags(system).contains(NodeFlags::CHANGE));
    assert!(!src.flags(system).contains(NodeFlags::DEL));
}

#[test]
fn changed_leaf_pairs_are_parallel() {
    let spec = spec();
    let (mut src, _) = base_tree(&spec);
    let (mut tgt, _) = base_tree(&spec);
    let tgt_system = tgt.find_child(tgt.root(), "system").unwrap();
    let hostname = tgt.find_child(tgt_system, "hostname").unwrap();
    tgt.set_body(hostname, "rt2");

    let diff = TreeDiff::compute(&spec, &src, &tgt);
    assert_eq!(diff.src_changed.len(), 1);
    assert_eq!(diff.tgt_changed.len(), 1);
    assert_eq!(src.body(diff.src_changed[0]), Some("rt1"));
    assert_eq!(tgt.body(diff.tgt_changed[0]), Some("rt2"));

    diff.mark(&mut src, &mut tgt);
    assert!(src.flags(diff.src_changed[0]).contains(NodeFlags::CHANGE));
    assert!(tgt.flags(diff.tgt_changed[0]).contains(NodeFlags::CHANGE));
    let tgt_system = tgt.parent(diff.tgt_changed[0]).unwrap();
    assert!(tgt.flags(tgt_system).contains(NodeFlags::CHANGE));
}

#[test]
fn list_entries_match_by_key() {
    let spec = spec();
    let (mut src, src_system) = base_tree(&spec);
    add_user(&mut src, src_system, "bob", "1000");
    src.bind(&spec, true).unwrap();
    let (mut tgt, tgt_system) = base_tree(&spec);
    add_user(&mut tgt, tgt_system, "alice", "1001");
    tgt.bind(&spec, true).unwrap();

    // Different keys: one entry added, one deleted, nothing changed.
    let diff = TreeDiff::compute(&spec, &src, &tgt);
    assert_eq!(diff.added.len(), 1);
    assert_eq!(diff.deleted.len(), 1);
    assert!(diff.src_changed.is_empty());
}

#[test]
fn same_key_different_leaf_is_changed() {
    let spec = spec();
    let (mut src, src_system) = base_tree(&spec);
    add_user(&mut src, src_system, "bob", "1000");
    src.bind(&spec, true).unwrap();
    let (mut tgt, tgt_system) = base_tree(&spec);
    add_user(&mut tgt, tgt_system, "bob", "2000");
    tgt.bind(&spec, true).unwrap();

    let diff = TreeDiff::compute(&spec, &src, &tgt);
    assert!(diff.added.is_empty());
    assert!(diff.deleted.is_empty());
    assert_eq!(diff.src_changed.len(), 1);
    assert_eq!(src.name(diff.src_changed[0]), "uid");
}

#[test]
fn leaf_list_matches_by_value() {
    let spec = spec();
    let (mut src, src_system) = base_tree(&spec);
    src.add_leaf(src_system, None, "search", "example.com");
    src.bind(&spec, true).unwrap();
    let (mut tgt, tgt_system) = base_tree(&spec);
    tgt.add_leaf(tgt_system, None, "search", "example.net");
    tgt.bind(&spec, true).unwrap();

    // Leaf-list values are identities, not bodies to compare.
    let diff = TreeDiff::compute(&spec, &src, &tgt);
    assert_eq!(diff.added.len(), 1);
    assert_eq!(diff.deleted.len(), 1);
    assert!(diff.src_changed.is_empty());
}

#[test]
fn all_added_replay_diff() {
    let spec = spec();
    let (tree, _) = base_tree(&spec);
    let diff = TreeDiff::all_added(&tree);
    assert_eq!(diff.added.len(), 1);
    assert_eq!(tree.name(diff.added[0]), "system");
    assert!(diff.deleted.is_empty());
}
