//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

mod debug;

pub mod api;
pub mod changelog;
pub mod confirmed;
pub mod datastore;
pub mod engine;
pub mod error;
pub mod plugin;
pub mod startup;
pub mod transaction;

use serde::{Deserialize, Serialize};

/// Transaction lifecycle phase, as seen by the plugin bus.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Phase {
    Begin,
    Validate,
    Complete,
    Commit,
    CommitDone,
    End,
    Abort,
}

// ===== impl Phase =====

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Begin => write!(f, "begin"),
            Phase::Validate => write!(f, "validate"),
            Phase::Complete => write!(f, "complete"),
            Phase::Commit => write!(f, "commit"),
            Phase::CommitDone => write!(f, "commit-done"),
            Phase::End => write!(f, "end"),
            Phase::Abort => write!(f, "abort"),
        }
    }
}
