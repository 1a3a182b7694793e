//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::{Path, PathBuf};

use canopy_tree::ConfigTree;
use canopy_tree::serialize;
use canopy_yang::modstate::ModuleState;

use crate::debug::Debug;
use crate::error::{Error, Result};

/// Identity of a persisted datastore.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum DatastoreId {
    Candidate,
    Running,
    Startup,
    Failsafe,
    Tmp,
    // Confirmed-commit snapshot, keyed by persist token or session id.
    Rollback(String),
}

/// File-backed datastore persistence: one JSON file per datastore in a
/// single directory, each carrying an embedded module-state record.
/// Writes go through a temporary file and a rename, so a crash never
/// leaves a half-written datastore behind.
#[derive(Debug)]
pub struct DatastoreStore {
    dir: PathBuf,
}

// ===== impl DatastoreId =====

impl DatastoreId {
    pub fn file_name(&self) -> String {
        format!("{self}.json")
    }

    /// Parses an RPC `target`/`source` datastore name.
    pub fn from_name(name: &str) -> Option<DatastoreId> {
        match name {
            "candidate" => Some(DatastoreId::Candidate),
            "running" => Some(DatastoreId::Running),
            "startup" => Some(DatastoreId::Startup),
            "failsafe" => Some(DatastoreId::Failsafe),
            "tmp" => Some(DatastoreId::Tmp),
            _ => name
                .strip_prefix("rollback_")
                .map(|token| DatastoreId::Rollback(token.to_owned())),
        }
    }
}

impl std::fmt::Display for DatastoreId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatastoreId::Candidate => write!(f, "candidate"),
            DatastoreId::Running => write!(f, "running"),
            DatastoreId::Startup => write!(f, "startup"),
            DatastoreId::Failsafe => write!(f, "failsafe"),
            DatastoreId::Tmp => write!(f, "tmp"),
            DatastoreId::Rollback(token) => write!(f, "rollback_{token}"),
        }
    }
}

// ===== impl DatastoreStore =====

impl DatastoreStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<DatastoreStore> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|error| {
            Error::DatastoreAccess {
                datastore: dir.display().to_string(),
                error,
            }
        })?;
        Ok(DatastoreStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, id: &DatastoreId) -> PathBuf {
        self.dir.join(id.file_name())
    }

    pub fn exists(&self, id: &DatastoreId) -> bool {
        self.path(id).exists()
    }

    /// Loads a datastore. A missing file yields an empty tree with no
    /// module-state, which is how fresh installations boot.
    pub fn load(
        &self,
        id: &DatastoreId,
    ) -> Result<(ConfigTree, ModuleState)> {
        let path = self.path(id);
        if !path.exists() {
            return Ok((ConfigTree::new(), ModuleState::default()));
        }
        let text = std::fs::read_to_string(&path).map_err(|error| {
            Error::DatastoreAccess {
                datastore: id.to_string(),
                error,
            }
        })?;
        serialize::decode(&text).map_err(|reason| Error::DatastoreFormat {
            datastore: id.to_string(),
            reason,
        })
    }

    /// Saves a datastore atomically (write-then-rename).
    pub fn save(
        &self,
        id: &DatastoreId,
        tree: &ConfigTree,
        spec: &canopy_yang::YangSpec,
        modstate: &ModuleState,
    ) -> Result<()> {
        Debug::DatastoreSave(&id.to_string()).log();

        let text = serialize::encode(tree, spec, modstate);
        let path = self.path(id);
        let tmp_path = self.dir.join(format!("{}.tmp", id.file_name()));

        let access_error = |error| Error::DatastoreAccess {
            datastore: id.to_string(),
            error,
        };
        std::fs::write(&tmp_path, text).map_err(access_error)?;
        std::fs::rename(&tmp_path, &path).map_err(access_error)?;
        Ok(())
    }

    pub fn copy(&self, from: &DatastoreId, to: &DatastoreId) -> Result<()> {
        Debug::DatastoreCopy(&from.to_string(), &to.to_string()).log();

        let text = std::fs::read_to_string(self.path(from)).map_err(
            |error| Error::DatastoreAccess {
                datastore: from.to_string(),
                error,
            },
        )?;
        let tmp_path = self.dir.join(format!("{}.tmp", to.file_name()));
        let access_error = |error| Error::DatastoreAccess {
            datastore: to.to_string(),
            error,
        };
        std::fs::write(&tmp_path, text).map_err(access_error)?;
        std::fs::rename(&tmp_path, self.path(to)).map_err(access_error)?;
        Ok(())
    }

    pub fn delete(&self, id: &DatastoreId) -> Result<()> {
        let path = self.path(id);
        if !path.exists() {
            return Ok(());
        }
        std::fs::remove_file(&path).map_err(|error| {
            Error::DatastoreAccess {
                datastore: id.to_string(),
                error,
            }
        })
    }
}
