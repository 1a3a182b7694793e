//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use canopy_utils::lock::SessionId;
use canopy_utils::netconf::RpcErrors;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::oneshot;

pub type Responder<T> = oneshot::Sender<T>;

// Client -> Engine requests.
pub mod client {
    use super::*;

    #[derive(Debug)]
    pub enum Request {
        // Request to run the validation pipeline over a datastore.
        Validate(ValidateRequest),
        // Request to commit the candidate to running.
        Commit(CommitRequest),
        // Request to reset the candidate from running.
        DiscardChanges(DiscardChangesRequest),
        // Request to edit a datastore.
        EditConfig(EditConfigRequest),
        // Request to copy one datastore onto another.
        CopyConfig(CopyConfigRequest),
        // Request to delete a datastore.
        DeleteConfig(DeleteConfigRequest),
        Lock(LockRequest),
        Unlock(UnlockRequest),
        // Request to cancel a pending confirmed commit.
        CancelCommit(CancelCommitRequest),
        // Request to hot-restart a plugin.
        PluginRestart(PluginRestartRequest),
        // Requests against the transaction history log.
        ListTransactions(ListTransactionsRequest),
        GetTransaction(GetTransactionRequest),
        // Notification that a client session has gone away.
        SessionClosed(SessionClosedRequest),
    }

    #[derive(Debug)]
    pub struct ValidateRequest {
        pub session: SessionId,
        pub source: String,
        pub responder: Option<Responder<Result<ValidateResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct ValidateResponse {}

    #[derive(Debug)]
    pub struct CommitRequest {
        pub session: SessionId,
        pub confirmed: bool,
        pub confirm_timeout: Option<u32>,
        pub persist: Option<String>,
        pub persist_id: Option<String>,
        pub comment: String,
        pub responder: Option<Responder<Result<CommitResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct CommitResponse {
        pub transaction_id: u32,
    }

    #[derive(Debug)]
    pub struct DiscardChangesRequest {
        pub session: SessionId,
        pub responder:
            Option<Responder<Result<DiscardChangesResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct DiscardChangesResponse {}

    #[derive(Debug)]
    pub struct EditConfigRequest {
        pub session: SessionId,
        pub target: String,
        pub operation: String,
        pub config: Value,
        pub responder:
            Option<Responder<Result<EditConfigResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct EditConfigResponse {}

    #[derive(Debug)]
    pub struct CopyConfigRequest {
        pub session: SessionId,
        pub source: String,
        pub target: String,
        pub responder:
            Option<Responder<Result<CopyConfigResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct CopyConfigResponse {}

    #[derive(Debug)]
    pub struct DeleteConfigRequest {
        pub session: SessionId,
        pub target: String,
        pub responder:
            Option<Responder<Result<DeleteConfigResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct DeleteConfigResponse {}

    #[derive(Debug)]
    pub struct LockRequest {
        pub session: SessionId,
        pub target: String,
        pub responder: Option<Responder<Result<LockResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct LockResponse {}

    #[derive(Debug)]
    pub struct UnlockRequest {
        pub session: SessionId,
        pub target: String,
        pub responder: Option<Responder<Result<UnlockResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct UnlockResponse {}

    #[derive(Debug)]
    pub struct CancelCommitRequest {
        pub session: SessionId,
        pub persist_id: Option<String>,
        pub responder:
            Option<Responder<Result<CancelCommitResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct CancelCommitResponse {}

    #[derive(Debug)]
    pub struct PluginRestartRequest {
        pub session: SessionId,
        pub plugin: String,
        pub responder:
            Option<Responder<Result<PluginRestartResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct PluginRestartResponse {}

    #[derive(Debug)]
    pub struct ListTransactionsRequest {
        pub session: SessionId,
        pub responder:
            Option<Responder<Result<ListTransactionsResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct ListTransactionsResponse {
        pub transactions: Vec<TransactionSummary>,
    }

    #[derive(Debug)]
    pub struct GetTransactionRequest {
        pub session: SessionId,
        pub transaction_id: u32,
        pub responder:
            Option<Responder<Result<GetTransactionResponse, RpcErrors>>>,
    }

    #[derive(Debug)]
    pub struct GetTransactionResponse {
        pub config: Value,
    }

    #[derive(Debug)]
    pub struct SessionClosedRequest {
        pub session: SessionId,
    }

    /// Entry of the transaction history log.
    #[derive(Clone, Debug)]
    pub struct TransactionSummary {
        pub id: u32,
        pub date: DateTime<Utc>,
        pub comment: String,
    }
}
