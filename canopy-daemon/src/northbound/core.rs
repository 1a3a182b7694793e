//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::path::Path;

use canopy_northbound::api::Responder;
use canopy_northbound::api::client as capi;
use canopy_northbound::changelog::Changelog;
use canopy_northbound::datastore::DatastoreId;
use canopy_northbound::engine::{
    CommitParams, EditOperation, Engine, EngineOptions, TimerAction,
};
use canopy_northbound::error::Error;
use canopy_northbound::plugin::PluginRegistry;
use canopy_tree::serialize;
use canopy_utils::netconf::{ErrorTag, RpcError, RpcErrors};
use canopy_utils::timer::RollbackTimer;
use chrono::Utc;
use pickledb::PickleDb;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{info, instrument, trace, warn};

use crate::config::Config;
use crate::northbound::{db, yang};

pub struct Northbound {
    // The configuration transaction engine.
    engine: Engine,
    // Non-volatile transaction history log.
    history: db::TransactionLog,
    // Channel used to receive messages from the external clients.
    rx_clients: Receiver<capi::Request>,
    // Confirmed commit rollback timer.
    confirmed_commit: ConfirmedCommit,
}

struct ConfirmedCommit {
    // Channels used to send and receive timeout notifications.
    tx: Sender<()>,
    rx: Receiver<()>,

    // Armed rollback timer, if any.
    timer: Option<RollbackTimer>,
}

// ===== impl Northbound =====

impl Northbound {
    pub(crate) fn init(
        config: &Config,
        db: PickleDb,
    ) -> Result<(Northbound, Sender<capi::Request>), Error> {
        let history = db::TransactionLog::new(db);

        // Compiled device schema.
        let spec = yang::create_spec();

        // Register plugins. The upgrade changelog participates in the
        // transaction bus as a module-upgrade capability.
        let mut plugins = PluginRegistry::new();
        if let Some(path) = &config.changelog_path {
            match Changelog::load(Path::new(path)) {
                Ok(changelog) => changelog.register(&mut plugins),
                Err(error) => {
                    warn!(%error, "failed to load upgrade changelog")
                }
            }
        }

        let options = EngineOptions {
            modstate: config.startup.modstate,
            upgrade_checkold: config.startup.upgrade_checkold,
            confirmed_commit: config.features.confirmed_commit,
        };
        let mut engine =
            Engine::new(spec, &config.datastore_dir, options, plugins)?;

        // Replay the startup configuration (failsafe on failure).
        engine.startup_replay()?;

        let (client_tx, rx_clients) = mpsc::channel(4);
        let mut nb = Northbound {
            engine,
            history,
            rx_clients,
            confirmed_commit: Default::default(),
        };

        // Honor a confirmed commit interrupted by a restart.
        let action = nb.engine.recover_confirmed()?;
        nb.apply_timer_action(action);

        Ok((nb, client_tx))
    }

    // Main event loop. Requests are processed one at a time, which
    // serializes transactions.
    #[instrument(skip_all, "northbound")]
    pub(crate) async fn run(mut self, mut signal_rx: Receiver<()>) {
        loop {
            tokio::select! {
                Some(request) = self.rx_clients.recv() => {
                    self.process_client_msg(request);
                }
                Some(_) = self.confirmed_commit.rx.recv() => {
                    self.process_confirmed_commit_timeout();
                }
                _ = signal_rx.recv() => {
                    self.rx_clients.close();
                    break;
                }
                else => break,
            }
        }
    }

    // Processes a message received from an external client.
    fn process_client_msg(&mut self, request: capi::Request) {
        trace!(?request, "received client request");

        match request {
            capi::Request::Validate(request) => {
                let result = parse_datastore(&request.source).and_then(
                    |source| self.engine.validate(&source),
                );
                respond(
                    request.responder,
                    result.map(|()| capi::ValidateResponse {}),
                );
            }
            capi::Request::Commit(request) => {
                let result = self.process_client_commit(
                    CommitParams {
                        session: request.session,
                        confirmed: request.confirmed,
                        confirm_timeout: request.confirm_timeout,
                        persist: request.persist,
                        persist_id: request.persist_id,
                    },
                    request.comment,
                );
                respond(request.responder, result);
            }
            capi::Request::DiscardChanges(request) => {
                let result = self.engine.discard_changes(request.session);
                respond(
                    request.responder,
                    result.map(|()| capi::DiscardChangesResponse {}),
                );
            }
            capi::Request::EditConfig(request) => {
                let result = parse_datastore(&request.target)
                    .and_then(|target| {
                        let operation =
                            EditOperation::from_name(&request.operation)
                                .ok_or_else(|| {
                                    Error::Validation(
                                        RpcError::new(
                                            ErrorTag::BadAttribute,
                                            format!(
                                                "unknown operation \"{}\"",
                                                request.operation
                                            ),
                                        )
                                        .protocol()
                                        .into(),
                                    )
                                })?;
                        self.engine.edit_config(
                            request.session,
                            &target,
                            operation,
                            &request.config,
                        )
                    });
                respond(
                    request.responder,
                    result.map(|()| capi::EditConfigResponse {}),
                );
            }
            capi::Request::CopyConfig(request) => {
                let result = parse_datastore(&request.source)
                    .and_then(|source| {
                        let target = parse_datastore(&request.target)?;
                        self.engine.copy_config(
                            request.session,
                            &source,
                            &target,
                        )
                    });
                respond(
                    request.responder,
                    result.map(|()| capi::CopyConfigResponse {}),
                );
            }
            capi::Request::DeleteConfig(request) => {
                let result = parse_datastore(&request.target).and_then(
                    |target| {
                        self.engine.delete_config(request.session, &target)
                    },
                );
                respond(
                    request.responder,
                    result.map(|()| capi::DeleteConfigResponse {}),
                );
            }
            capi::Request::Lock(request) => {
                let result = parse_datastore(&request.target).and_then(
                    |target| self.engine.lock(request.session, &target),
                );
                respond(
                    request.responder,
                    result.map(|()| capi::LockResponse {}),
                );
            }
            capi::Request::Unlock(request) => {
                let result = parse_datastore(&request.target).and_then(
                    |target| self.engine.unlock(request.session, &target),
                );
                respond(
                    request.responder,
                    result.map(|()| capi::UnlockResponse {}),
                );
            }
            capi::Request::CancelCommit(request) => {
                let result = self
                    .engine
                    .cancel_commit(
                        request.session,
                        request.persist_id.as_deref(),
                    )
                    .map(|_| {
                        self.apply_timer_action(TimerAction::Cancel);
                        capi::CancelCommitResponse {}
                    });
                respond(request.responder, result);
            }
            capi::Request::PluginRestart(request) => {
                let result = self.engine.plugin_restart(&request.plugin);
                respond(
                    request.responder,
                    result.map(|()| capi::PluginRestartResponse {}),
                );
            }
            capi::Request::ListTransactions(request) => {
                let transactions = self
                    .history
                    .list()
                    .into_iter()
                    .map(|record| capi::TransactionSummary {
                        id: record.id,
                        date: record.date,
                        comment: record.comment,
                    })
                    .collect();
                respond(
                    request.responder,
                    Ok(capi::ListTransactionsResponse { transactions }),
                );
            }
            capi::Request::GetTransaction(request) => {
                let result = self
                    .history
                    .get(request.transaction_id)
                    .map(|record| capi::GetTransactionResponse {
                        config: record.configuration,
                    })
                    .ok_or_else(|| {
                        Error::Validation(
                            RpcError::new(
                                ErrorTag::DataMissing,
                                format!(
                                    "transaction {} not found",
                                    request.transaction_id
                                ),
                            )
                            .into(),
                        )
                    });
                respond(request.responder, result);
            }
            capi::Request::SessionClosed(request) => {
                match self.engine.session_closed(request.session) {
                    Ok(action) => self.apply_timer_action(action),
                    Err(error) => error.log(),
                }
            }
        }
    }

    fn process_client_commit(
        &mut self,
        params: CommitParams,
        comment: String,
    ) -> Result<capi::CommitResponse, Error> {
        let outcome = self.engine.commit(params)?;
        self.apply_timer_action(outcome.timer);

        // Record the new running configuration in the history log; the
        // returned ID is what list-transactions and get-transaction use.
        let configuration = serialize::tree_to_value(
            self.engine.running(),
            self.engine.spec(),
        );
        let transaction_id =
            self.history.record(Utc::now(), comment, configuration);

        Ok(capi::CommitResponse { transaction_id })
    }

    // Processes a confirmed commit timeout.
    fn process_confirmed_commit_timeout(&mut self) {
        info!(
            "confirmed commit has timed out, rolling back to previous \
             configuration"
        );
        self.confirmed_commit.timer = None;
        if let Err(error) = self.engine.apply_rollback() {
            error.log();
        }
    }

    fn apply_timer_action(&mut self, action: TimerAction) {
        match action {
            TimerAction::None => {}
            TimerAction::Arm(duration) => {
                // An extending commit moves the armed deadline; an
                // initial one arms a fresh timer.
                match &self.confirmed_commit.timer {
                    Some(timer) => timer.extend(duration),
                    None => {
                        let tx = self.confirmed_commit.tx.clone();
                        self.confirmed_commit.timer = Some(
                            RollbackTimer::arm(duration, move || async move {
                                let _ = tx.send(()).await;
                            }),
                        );
                    }
                }
            }
            TimerAction::Cancel => {
                self.confirmed_commit.timer = None;
            }
        }
    }
}

// ===== impl ConfirmedCommit =====

impl Default for ConfirmedCommit {
    fn default() -> ConfirmedCommit {
        let (tx, rx) = mpsc::channel(4);

        ConfirmedCommit {
            tx,
            rx,
            timer: None,
        }
    }
}

// ===== helper functions =====

fn parse_datastore(name: &str) -> Result<DatastoreId, Error> {
    DatastoreId::from_name(name).ok_or_else(|| {
        Error::Validation(
            RpcError::new(
                ErrorTag::InvalidValue,
                format!("unknown datastore \"{name}\""),
            )
            .protocol()
            .into(),
        )
    })
}

fn respond<T>(
    responder: Option<Responder<Result<T, RpcErrors>>>,
    result: Result<T, Error>,
) {
    let result = result.map_err(|error| {
        error.log();
        error.rpc_errors()
    });
    if let Some(responder) = responder {
        let _ = responder.send(result);
    }
}
