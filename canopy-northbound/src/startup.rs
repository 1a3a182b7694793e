//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

//! Startup replay: load the startup datastore, apply module-version
//! upgrades, and commit the result to running through the regular
//! transaction pipeline. When that fails, fall back to the failsafe
//! datastore.

use canopy_tree::ConfigTree;
use canopy_yang::modstate::{ModstateDiff, ModstateStatus};
use tracing::{info, warn};

use crate::datastore::DatastoreId;
use crate::debug::Debug;
use crate::engine::Engine;
use crate::error::{Error, Result};

// ===== impl Engine =====

impl Engine {
    /// Boot-time replay of the startup datastore. On success the system
    /// runs on the startup configuration; on failure the failsafe
    /// datastore is committed instead.
    pub fn startup_replay(&mut self) -> Result<()> {
        match self.try_startup() {
            Ok(()) => Ok(()),
            Err(error) => {
                error.log();
                warn!("startup replay failed, engaging failsafe recovery");
                self.failsafe()
            }
        }
    }

    fn try_startup(&mut self) -> Result<()> {
        Debug::StartupStep("load").log();
        let (mut tree, modstate) =
            self.store().load(&DatastoreId::Startup)?;

        // Detect module revision mismatches ("check old" policy) and run
        // the upgrade callbacks before binding to the current schema.
        let msdiff = if self.options().modstate
            && self.options().upgrade_checkold
        {
            ModstateDiff::compute(self.spec(), &modstate)
        } else {
            ModstateDiff::default()
        };
        self.upgrade(&mut tree, &msdiff)?;

        Debug::StartupStep("bind").log();
        self.prepare(&mut tree)?;

        Debug::StartupStep("replay").log();
        self.run_replay(tree, None, true)?;
        info!("startup configuration committed to running");
        Ok(())
    }

    fn upgrade(
        &mut self,
        tree: &mut ConfigTree,
        msdiff: &ModstateDiff,
    ) -> Result<()> {
        // Generic datastore upgrade callbacks see the whole tree and the
        // full mismatch report.
        for index in 0..self.plugins_mut().len() {
            let (plugin, context) = self.plugins_mut().parts_mut(index);
            let name = plugin.name.clone();
            if let Some(cb) = plugin.datastore_upgrade {
                (cb)(context, tree, msdiff).map_err(|reason| {
                    Error::Upgrade {
                        module: name,
                        reason,
                    }
                })?;
            }
        }

        // Module-specific upgrade callbacks run once per mismatched
        // module, in plugin registry order.
        for entry in msdiff
            .entries
            .iter()
            .filter(|entry| entry.status == ModstateStatus::Nomatch)
        {
            let namespace = self
                .spec()
                .module_by_name(&entry.module)
                .map(|id| self.spec().module(id).namespace.clone())
                .unwrap_or_default();
            Debug::UpgradeModule(
                &entry.module,
                &entry.author_revision,
                &entry.current_revision,
            )
            .log();

            for index in 0..self.plugins_mut().len() {
                let (plugin, context) = self.plugins_mut().parts_mut(index);
                if let Some(cb) = plugin.module_upgrade {
                    (cb)(context, tree, entry, &namespace).map_err(
                        |reason| Error::Upgrade {
                            module: entry.module.clone(),
                            reason,
                        },
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Failsafe recovery: back up running, then commit the failsafe
    /// datastore. If even that fails, restore the backup and give up.
    pub fn failsafe(&mut self) -> Result<()> {
        Debug::StartupStep("failsafe").log();
        if self.store().exists(&DatastoreId::Running) {
            self.store().copy(&DatastoreId::Running, &DatastoreId::Tmp)?;
        }

        let mut target = match self.store().load(&DatastoreId::Failsafe) {
            Ok((tree, _)) => tree,
            Err(error) => {
                error.log();
                ConfigTree::new()
            }
        };
        let prepared = self.prepare(&mut target);

        match prepared.and_then(|()| self.run_replay(target, None, true)) {
            Ok(_) => {
                info!("failsafe configuration committed to running");
                Ok(())
            }
            Err(error) => {
                error.log();
                if self.store().exists(&DatastoreId::Tmp) {
                    let _ = self
                        .store()
                        .copy(&DatastoreId::Tmp, &DatastoreId::Running);
                }
                Err(Error::Fatal(
                    "failsafe recovery failed; previous running restored"
                        .to_owned(),
                ))
            }
        }
    }
}
