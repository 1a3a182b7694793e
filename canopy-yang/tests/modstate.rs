//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Arc;

use canopy_yang::modstate::{
    ModstateDiff, ModstateStatus, ModuleState, ModuleStateEntry,
};
use canopy_yang::{SpecBuilder, YangSpec};

fn spec() -> Arc<YangSpec> {
    let mut builder = SpecBuilder::new();
    builder.add_module("sys", "urn:test:sys", "2024-06-01");
    builder.add_module("net", "urn:test:net", "2023-11-15");
    builder.build()
}

fn stored(entries: &[(&str, &str)]) -> ModuleState {
    ModuleState(
        entries
            .iter()
            .map(|(module, revision)| ModuleStateEntry {
                module: (*module).to_owned(),
                revision: (*revision).to_owned(),
            })
            .collect(),
    )
}

#[test]
fn of_spec_snapshots_all_modules() {
    let spec = spec();
    let modstate = ModuleState::of_spec(&spec);
    assert_eq!(modstate.revision_of("sys"), Some("2024-06-01"));
    assert_eq!(modstate.revision_of("net"), Some("2023-11-15"));
    assert_eq!(modstate.revision_of("other"), None);
}

#[test]
fn matching_revisions_produce_no_entries() {
    let spec = spec();
    let modstate = ModuleState::of_spec(&spec);
    let diff = ModstateDiff::compute(&spec, &modstate);
    assert!(diff.recorded);
    assert!(diff.is_empty());
    assert_eq!(diff.status(), ModstateStatus::None);
}

#[test]
fn revision_mismatch_is_nomatch() {
    let spec = spec();
    let diff = ModstateDiff::compute(
        &spec,
        &stored(&[("sys", "2023-01-01"), ("net", "2023-11-15")]),
    );
    assert_eq!(diff.status(), ModstateStatus::Nomatch);
    let entry = diff.entry("sys").unwrap();
    assert_eq!(entry.status, ModstateStatus::Nomatch);
    assert_eq!(entry.author_revision, "2023-01-01");
    assert_eq!(entry.current_revision, "2024-06-01");
    assert!(diff.entry("net").is_none());
}

#[test]
fn unknown_module_is_other() {
    let spec = spec();
    let diff =
        ModstateDiff::compute(&spec, &stored(&[("legacy", "2020-05-05")]));
    assert_eq!(diff.status(), ModstateStatus::Other);
    let entry = diff.entry("legacy").unwrap();
    assert_eq!(entry.status, ModstateStatus::Other);
    assert!(entry.current_revision.is_empty());
}

#[test]
fn missing_modstate_is_none() {
    let spec = spec();
    let diff = ModstateDiff::compute(&spec, &ModuleState::default());
    assert!(!diff.recorded);
    assert_eq!(diff.status(), ModstateStatus::None);
}
