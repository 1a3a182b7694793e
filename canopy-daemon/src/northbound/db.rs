//
// Copyright (c) The Canopy Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use pickledb::PickleDb;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

// Storage layout: one record per commit under "txn/<id>", plus the
// "txn-seq" allocation counter.
const RECORD_PREFIX: &str = "txn/";
const SEQ_KEY: &str = "txn-seq";

/// One entry of the transaction history log.
#[derive(Debug)]
#[derive(Deserialize, Serialize)]
pub struct TransactionRecord {
    pub id: u32,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    pub comment: String,
    // The committed configuration, in the tree JSON encoding.
    pub configuration: Value,
}

/// Non-volatile log of committed configurations.
pub(crate) struct TransactionLog {
    db: Mutex<PickleDb>,
}

// ===== impl TransactionLog =====

impl TransactionLog {
    pub(crate) fn new(db: PickleDb) -> TransactionLog {
        TransactionLog {
            db: Mutex::new(db),
        }
    }

    /// Allocates the next transaction ID and stores a record under it.
    /// The commit itself already succeeded, so a storage failure is
    /// logged rather than propagated.
    pub(crate) fn record(
        &self,
        date: DateTime<Utc>,
        comment: String,
        configuration: Value,
    ) -> u32 {
        let mut db = self.db.lock().unwrap();
        let id = db.get::<u32>(SEQ_KEY).unwrap_or(0) + 1;
        let record = TransactionRecord {
            id,
            date,
            comment,
            configuration,
        };

        let mut stored = db.set(SEQ_KEY, &id);
        if stored.is_ok() {
            stored = db.set(&format!("{RECORD_PREFIX}{id}"), &record);
        }
        if let Err(error) = stored {
            warn!(%error, %id, "failed to store transaction record");
        }
        id
    }

    pub(crate) fn get(&self, id: u32) -> Option<TransactionRecord> {
        let db = self.db.lock().unwrap();
        db.get(&format!("{RECORD_PREFIX}{id}"))
    }

    /// All records, oldest first.
    pub(crate) fn list(&self) -> Vec<TransactionRecord> {
        let db = self.db.lock().unwrap();
        let mut records = db
            .iter()
            .filter(|entry| entry.get_key().starts_with(RECORD_PREFIX))
            .filter_map(|entry| entry.get_value::<TransactionRecord>())
            .collect::<Vec<_>>();
        records.sort_by_key(|record| record.id);
        records
    }
}
