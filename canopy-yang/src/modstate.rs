//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

use crate::YangSpec;

/// Module-state record embedded in a persisted datastore: the YANG module
/// revisions its content was authored against.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ModuleState(pub Vec<ModuleStateEntry>);

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ModuleStateEntry {
    pub module: String,
    pub revision: String,
}

/// Per-module revision mismatch between a stored tree and the running
/// schema. Created during load, dropped after upgrade.
#[derive(Clone, Debug, Default)]
pub struct ModstateDiff {
    // Whether the stored tree carried a module-state record at all.
    pub recorded: bool,
    pub entries: Vec<ModstateDiffEntry>,
}

#[derive(Clone, Debug)]
pub struct ModstateDiffEntry {
    pub module: String,
    pub status: ModstateStatus,
    // Revision the stored content was authored against.
    pub author_revision: String,
    // Revision of the running schema (empty when the module is unknown).
    pub current_revision: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ModstateStatus {
    // Module present in both, revisions differ.
    Nomatch,
    // Module recorded in the file but absent from the running schema.
    Other,
    // No module-state record at all.
    None,
}

// ===== impl ModuleState =====

impl ModuleState {
    /// Snapshot of the running schema's module revisions, recorded into
    /// every saved datastore.
    pub fn of_spec(spec: &YangSpec) -> ModuleState {
        ModuleState(
            spec.modules()
                .map(|(_, module)| ModuleStateEntry {
                    module: module.name.clone(),
                    revision: module.revision.clone(),
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn revision_of(&self, module: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|entry| entry.module == module)
            .map(|entry| entry.revision.as_str())
    }
}

// ===== impl ModstateDiff =====

impl ModstateDiff {
    /// Compares the module-state of a stored tree against the running
    /// schema. Modules matching revision-for-revision produce no entry.
    pub fn compute(spec: &YangSpec, stored: &ModuleState) -> ModstateDiff {
        if stored.is_empty() {
            return ModstateDiff {
                recorded: false,
                entries: vec![],
            };
        }

        let mut entries = vec![];
        for entry in &stored.0 {
            match spec.module_by_name(&entry.module) {
                Some(id) => {
                    let current = &spec.module(id).revision;
                    if *current != entry.revision {
                        entries.push(ModstateDiffEntry {
                            module: entry.module.clone(),
                            status: ModstateStatus::Nomatch,
                            author_revision: entry.revision.clone(),
                            current_revision: current.clone(),
                        });
                    }
                }
                None => {
                    entries.push(ModstateDiffEntry {
                        module: entry.module.clone(),
                        status: ModstateStatus::Other,
                        author_revision: entry.revision.clone(),
                        current_revision: String::new(),
                    });
                }
            }
        }

        ModstateDiff {
            recorded: true,
            entries,
        }
    }

    pub fn status(&self) -> ModstateStatus {
        if !self.recorded {
            ModstateStatus::None
        } else if self
            .entries
            .iter()
            .any(|entry| entry.status == ModstateStatus::Nomatch)
        {
            ModstateStatus::Nomatch
        } else if !self.entries.is_empty() {
            ModstateStatus::Other
        } else {
            ModstateStatus::None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, module: &str) -> Option<&ModstateDiffEntry> {
        self.entries.iter().find(|entry| entry.module == module)
    }
}
