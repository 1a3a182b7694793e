//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use canopy_utils::lock::SessionId;
use canopy_utils::netconf::{ErrorTag, RpcError, RpcErrors};
use tracing::{error, warn};

use crate::Phase;
use crate::transaction::TransactionState;

//
// Type aliases.
//
pub type Result<T> = std::result::Result<T, Error>;

//
// Transaction engine errors.
//
#[derive(Debug)]
pub enum Error {
    // The candidate (or startup) content failed validation.
    Validation(RpcErrors),
    // A plugin callback returned an error during a lifecycle phase.
    PluginCallback {
        plugin: String,
        phase: Phase,
        reason: String,
    },
    // A plugin context failed its fence check around a callback.
    PluginFence {
        plugin: String,
        phase: Phase,
    },
    PluginNotFound(String),
    PluginReset {
        plugin: String,
        reason: String,
    },
    // A bus operation was invoked in the wrong lifecycle state.
    InvalidTransition {
        state: TransactionState,
        phase: Phase,
    },
    LockDenied {
        datastore: String,
        holder: SessionId,
    },
    DatastoreAccess {
        datastore: String,
        error: std::io::Error,
    },
    DatastoreFormat {
        datastore: String,
        reason: String,
    },
    // Commit attempted while an unrelated confirmed commit is pending.
    ConfirmedCommitPending,
    ConfirmedCommitDisabled,
    Upgrade {
        module: String,
        reason: String,
    },
    Fatal(String),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::Validation(errors) => {
                warn!(%errors, "{}", self);
            }
            Error::PluginCallback {
                plugin,
                phase,
                reason,
            } => {
                warn!(%plugin, %phase, %reason, "{}", self);
            }
            Error::PluginFence { plugin, phase } => {
                error!(%plugin, %phase, "{}", self);
            }
            Error::PluginNotFound(name) => {
                warn!(%name, "{}", self);
            }
            Error::PluginReset { plugin, reason } => {
                warn!(%plugin, %reason, "{}", self);
            }
            Error::InvalidTransition { state, phase } => {
                error!(?state, %phase, "{}", self);
            }
            Error::LockDenied { datastore, holder } => {
                warn!(%datastore, %holder, "{}", self);
            }
            Error::DatastoreAccess { datastore, error } => {
                error!(%datastore, %error, "{}", self);
            }
            Error::DatastoreFormat { datastore, reason } => {
                error!(%datastore, %reason, "{}", self);
            }
            Error::ConfirmedCommitPending => warn!("{}", self),
            Error::ConfirmedCommitDisabled => warn!("{}", self),
            Error::Upgrade { module, reason } => {
                error!(%module, %reason, "{}", self);
            }
            Error::Fatal(reason) => {
                error!(%reason, "{}", self);
            }
        }
    }

    /// NETCONF error element(s) for the RPC error reply.
    pub fn rpc_errors(&self) -> RpcErrors {
        match self {
            Error::Validation(errors) => errors.clone(),
            Error::PluginCallback { plugin, reason, .. } => RpcError::new(
                ErrorTag::OperationFailed,
                format!("plugin \"{plugin}\": {reason}"),
            )
            .into(),
            Error::PluginFence { plugin, .. } => RpcError::new(
                ErrorTag::OperationFailed,
                format!("plugin \"{plugin}\" context corrupted"),
            )
            .into(),
            Error::PluginNotFound(name) => RpcError::new(
                ErrorTag::UnknownElement,
                format!("plugin \"{name}\" is not registered"),
            )
            .into(),
            Error::PluginReset { plugin, reason } => RpcError::new(
                ErrorTag::OperationFailed,
                format!("plugin \"{plugin}\" reset failed: {reason}"),
            )
            .into(),
            Error::InvalidTransition { .. } => {
                RpcError::new(ErrorTag::OperationFailed, self.to_string())
                    .into()
            }
            Error::LockDenied { datastore, holder } if *holder != 0 => {
                RpcError::new(
                    ErrorTag::InUse,
                    format!(
                        "datastore \"{datastore}\" is locked by session \
                         {holder}"
                    ),
                )
                .protocol()
                .into()
            }
            Error::LockDenied { datastore, .. } => RpcError::new(
                ErrorTag::LockDenied,
                format!(
                    "datastore \"{datastore}\" has uncommitted changes"
                ),
            )
            .protocol()
            .into(),
            Error::DatastoreAccess { datastore, error } => RpcError::new(
                ErrorTag::OperationFailed,
                format!("datastore \"{datastore}\": {error}"),
            )
            .into(),
            Error::DatastoreFormat { datastore, reason } => RpcError::new(
                ErrorTag::OperationFailed,
                format!("datastore \"{datastore}\": {reason}"),
            )
            .into(),
            Error::ConfirmedCommitPending => RpcError::new(
                ErrorTag::InUse,
                "a confirmed commit by another session is pending",
            )
            .protocol()
            .into(),
            Error::ConfirmedCommitDisabled => RpcError::new(
                ErrorTag::OperationFailed,
                "the confirmed-commit capability is not enabled",
            )
            .protocol()
            .into(),
            Error::Upgrade { module, reason } => RpcError::new(
                ErrorTag::OperationFailed,
                format!("module \"{module}\" upgrade failed: {reason}"),
            )
            .into(),
            Error::Fatal(reason) => {
                RpcError::new(ErrorTag::OperationFailed, reason.clone())
                    .into()
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Validation(..) => {
                write!(f, "validation failed")
            }
            Error::PluginCallback { phase, .. } => {
                write!(f, "plugin callback failed during {phase}")
            }
            Error::PluginFence { .. } => {
                write!(f, "plugin context fence violated")
            }
            Error::PluginNotFound(..) => {
                write!(f, "plugin not found")
            }
            Error::PluginReset { .. } => {
                write!(f, "plugin reset failed")
            }
            Error::InvalidTransition { state, phase } => {
                write!(f, "invalid {phase} invocation in state {state:?}")
            }
            Error::LockDenied { .. } => {
                write!(f, "datastore lock denied")
            }
            Error::DatastoreAccess { .. } => {
                write!(f, "datastore access failed")
            }
            Error::DatastoreFormat { .. } => {
                write!(f, "datastore content malformed")
            }
            Error::ConfirmedCommitPending => {
                write!(f, "confirmed commit pending")
            }
            Error::ConfirmedCommitDisabled => {
                write!(f, "confirmed commit not enabled")
            }
            Error::Upgrade { .. } => {
                write!(f, "datastore upgrade failed")
            }
            Error::Fatal(..) => {
                write!(f, "fatal engine error")
            }
        }
    }
}

impl std::error::Error for Error {}
