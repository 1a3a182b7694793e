//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{debug, debug_span};

use crate::Phase;

#[derive(Debug)]
pub enum Debug<'a> {
    TransactionStart(u32, &'a str),
    TransactionEnd(u32),
    PluginCallback(u32, Phase, &'a str),
    DatastoreSave(&'a str),
    DatastoreCopy(&'a str, &'a str),
    StartupStep(&'a str),
    UpgradeModule(&'a str, &'a str, &'a str),
    ConfirmedCommit(&'a str),
}

// ===== impl Debug =====

impl Debug<'_> {
    pub fn log(&self) {
        match self {
            Debug::TransactionStart(id, operation) => {
                debug_span!("transaction").in_scope(|| {
                    debug!(%id, %operation, "{}", self);
                });
            }
            Debug::TransactionEnd(id) => {
                debug_span!("transaction").in_scope(|| {
                    debug!(%id, "{}", self);
                });
            }
            Debug::PluginCallback(id, phase, plugin) => {
                debug_span!("transaction").in_scope(|| {
                    debug!(%id, %phase, %plugin, "{}", self);
                });
            }
            Debug::DatastoreSave(name) => {
                debug_span!("datastore").in_scope(|| {
                    debug!(%name, "{}", self);
                });
            }
            Debug::DatastoreCopy(from, to) => {
                debug_span!("datastore").in_scope(|| {
                    debug!(%from, %to, "{}", self);
                });
            }
            Debug::StartupStep(step) => {
                debug_span!("startup").in_scope(|| {
                    debug!(%step, "{}", self);
                });
            }
            Debug::UpgradeModule(module, from, to) => {
                debug_span!("startup").in_scope(|| {
                    debug!(%module, %from, %to, "{}", self);
                });
            }
            Debug::ConfirmedCommit(event) => {
                debug_span!("confirmed-commit").in_scope(|| {
                    debug!(%event, "{}", self);
                });
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::TransactionStart(..) => {
                write!(f, "transaction started")
            }
            Debug::TransactionEnd(..) => {
                write!(f, "transaction finished")
            }
            Debug::PluginCallback(..) => {
                write!(f, "plugin callback")
            }
            Debug::DatastoreSave(..) => {
                write!(f, "saving datastore")
            }
            Debug::DatastoreCopy(..) => {
                write!(f, "copying datastore")
            }
            Debug::StartupStep(..) => {
                write!(f, "startup step")
            }
            Debug::UpgradeModule(..) => {
                write!(f, "upgrading module")
            }
            Debug::ConfirmedCommit(..) => {
                write!(f, "confirmed commit event")
            }
        }
    }
}
