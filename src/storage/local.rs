// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded record store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `mappings`: mapping id → serialized EmailWalletRow
//! - `mapping_by_hash`: email_hash → mapping id (active rows only)
//! - `mapping_by_wallet`: wallet_address → mapping id (active rows only)
//! - `intents`: intent id → serialized TransferIntentRow
//! - `intents_by_recipient`: composite key (email|!created_at|id) → intent id
//! - `intents_by_sender`: composite key (wallet|!created_at|id) → intent id
//! - `notifications`: composite key (intent_id|sent_at|id) → serialized row
//! - `payment_requests`: request id → serialized PaymentRequestRow
//! - `payment_requests_by_requester`: composite key → request id
//!
//! Uniqueness of the active email hash and wallet is checked inside the
//! same write transaction as the insert, so concurrent writers cannot both
//! succeed.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use uuid::Uuid;

use super::{
    DeliveryStatus, EmailWalletRow, IntentTransition, PaymentRequestRow, RecordStore,
    StorageError, StorageResult, TransferIntentRow, TransferNotificationRow,
    EMAIL_HASH_CONSTRAINT, WALLET_ADDRESS_CONSTRAINT,
};

// =============================================================================
// Table Definitions
// =============================================================================

const MAPPINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("mappings");
const MAPPING_BY_HASH: TableDefinition<&str, &str> = TableDefinition::new("mapping_by_hash");
const MAPPING_BY_WALLET: TableDefinition<&str, &str> = TableDefinition::new("mapping_by_wallet");

const INTENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("intents");
const INTENTS_BY_RECIPIENT: TableDefinition<&[u8], &str> =
    TableDefinition::new("intents_by_recipient");
const INTENTS_BY_SENDER: TableDefinition<&[u8], &str> = TableDefinition::new("intents_by_sender");

/// Ascending time order within one intent.
const NOTIFICATIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("notifications");

const PAYMENT_REQUESTS: TableDefinition<&str, &[u8]> = TableDefinition::new("payment_requests");
const PAYMENT_REQUESTS_BY_REQUESTER: TableDefinition<&[u8], &str> =
    TableDefinition::new("payment_requests_by_requester");

// =============================================================================
// redb error conversion
// =============================================================================

macro_rules! backend_error_from {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl From<$ty> for StorageError {
                fn from(e: $ty) -> Self {
                    StorageError::Backend(format!("redb: {e}"))
                }
            }
        )+
    };
}

backend_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

// =============================================================================
// Index Key Helpers
// =============================================================================

/// Build a composite index key: `scope | inverted_micros_be | id`.
///
/// The inverted timestamp yields newest-first ordering on a forward scan.
fn make_index_key(scope: &str, at: DateTime<Utc>, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(scope.len() + 1 + 8 + 1 + id.len());
    key.extend_from_slice(scope.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(!(at.timestamp_micros() as u64)).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(id.as_bytes());
    key
}

/// Same layout without inversion, for oldest-first scans.
fn make_ascending_key(scope: &str, at: DateTime<Utc>, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(scope.len() + 1 + 8 + 1 + id.len());
    key.extend_from_slice(scope.as_bytes());
    key.push(b'|');
    key.extend_from_slice(&(at.timestamp_micros() as u64).to_be_bytes());
    key.push(b'|');
    key.extend_from_slice(id.as_bytes());
    key
}

/// `[scope|, scope})` covers every key of a scope.
fn scope_range(scope: &str) -> (Vec<u8>, Vec<u8>) {
    let mut start = Vec::with_capacity(scope.len() + 1);
    start.extend_from_slice(scope.as_bytes());
    start.push(b'|');
    let mut end = start.clone();
    if let Some(last) = end.last_mut() {
        *last = b'|' + 1;
    }
    (start, end)
}

// =============================================================================
// LocalStore
// =============================================================================

pub struct LocalStore {
    db: Database,
}

impl LocalStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Volatile database, used when no data directory is configured and in tests.
    pub fn in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(MAPPINGS)?;
            let _ = write_txn.open_table(MAPPING_BY_HASH)?;
            let _ = write_txn.open_table(MAPPING_BY_WALLET)?;
            let _ = write_txn.open_table(INTENTS)?;
            let _ = write_txn.open_table(INTENTS_BY_RECIPIENT)?;
            let _ = write_txn.open_table(INTENTS_BY_SENDER)?;
            let _ = write_txn.open_table(NOTIFICATIONS)?;
            let _ = write_txn.open_table(PAYMENT_REQUESTS)?;
            let _ = write_txn.open_table(PAYMENT_REQUESTS_BY_REQUESTER)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    fn mapping_by_index(
        &self,
        index: TableDefinition<&str, &str>,
        key: &str,
    ) -> StorageResult<Option<EmailWalletRow>> {
        let read_txn = self.db.begin_read()?;
        let idx = read_txn.open_table(index)?;
        let Some(id) = idx.get(key)?.map(|v| v.value().to_string()) else {
            return Ok(None);
        };
        let rows = read_txn.open_table(MAPPINGS)?;
        match rows.get(id.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    fn intents_by_index(
        &self,
        index: TableDefinition<&[u8], &str>,
        scope: &str,
        mut keep: impl FnMut(&TransferIntentRow) -> bool,
        limit: usize,
    ) -> StorageResult<Vec<TransferIntentRow>> {
        let read_txn = self.db.begin_read()?;
        let idx = read_txn.open_table(index)?;
        let rows = read_txn.open_table(INTENTS)?;
        let (start, end) = scope_range(scope);

        let mut out = Vec::new();
        for entry in idx.range(start.as_slice()..end.as_slice())? {
            let (_, id) = entry?;
            let Some(value) = rows.get(id.value())? else {
                continue;
            };
            let row: TransferIntentRow = serde_json::from_slice(value.value())?;
            if keep(&row) {
                out.push(row);
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl RecordStore for LocalStore {
    async fn ping(&self) -> StorageResult<()> {
        let read_txn = self.db.begin_read()?;
        let _ = read_txn.open_table(MAPPINGS)?;
        Ok(())
    }

    async fn find_mapping_by_hash(&self, email_hash: &str) -> StorageResult<Option<EmailWalletRow>> {
        self.mapping_by_index(MAPPING_BY_HASH, email_hash)
    }

    async fn find_mapping_by_wallet(&self, wallet: &str) -> StorageResult<Option<EmailWalletRow>> {
        self.mapping_by_index(MAPPING_BY_WALLET, wallet)
    }

    async fn insert_mapping(&self, row: EmailWalletRow) -> StorageResult<EmailWalletRow> {
        let json = serde_json::to_vec(&row)?;
        let id = row.id.to_string();

        let write_txn = self.db.begin_write()?;
        {
            let mut by_hash = write_txn.open_table(MAPPING_BY_HASH)?;
            let mut by_wallet = write_txn.open_table(MAPPING_BY_WALLET)?;
            if row.is_active {
                if by_hash.get(row.email_hash.as_str())?.is_some() {
                    return Err(StorageError::Conflict {
                        constraint: EMAIL_HASH_CONSTRAINT.to_string(),
                    });
                }
                if by_wallet.get(row.wallet_address.as_str())?.is_some() {
                    return Err(StorageError::Conflict {
                        constraint: WALLET_ADDRESS_CONSTRAINT.to_string(),
                    });
                }
                by_hash.insert(row.email_hash.as_str(), id.as_str())?;
                by_wallet.insert(row.wallet_address.as_str(), id.as_str())?;
            }

            let mut rows = write_txn.open_table(MAPPINGS)?;
            rows.insert(id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(row)
    }

    async fn update_mapping_wallet(
        &self,
        email_hash: &str,
        wallet: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<EmailWalletRow>> {
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut by_hash = write_txn.open_table(MAPPING_BY_HASH)?;
            let mut by_wallet = write_txn.open_table(MAPPING_BY_WALLET)?;
            let mut rows = write_txn.open_table(MAPPINGS)?;

            let Some(id) = by_hash.get(email_hash)?.map(|v| v.value().to_string()) else {
                return Ok(None);
            };
            let existing_bytes = rows
                .get(id.as_str())?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StorageError::NotFound(format!("Mapping {id}")))?;
            let mut row: EmailWalletRow = serde_json::from_slice(&existing_bytes)?;

            if row.wallet_address == wallet {
                return Ok(Some(row));
            }
            let owner = by_wallet.get(wallet)?.map(|v| v.value().to_string());
            if owner.is_some_and(|owner| owner != id) {
                return Err(StorageError::Conflict {
                    constraint: WALLET_ADDRESS_CONSTRAINT.to_string(),
                });
            }

            by_wallet.remove(row.wallet_address.as_str())?;
            by_wallet.insert(wallet, id.as_str())?;
            // Keep the hash index pointing at the same row.
            by_hash.insert(email_hash, id.as_str())?;

            row.wallet_address = wallet.to_string();
            row.last_updated_at = now;
            let json = serde_json::to_vec(&row)?;
            rows.insert(id.as_str(), json.as_slice())?;
            row
        };
        write_txn.commit()?;
        Ok(Some(updated))
    }

    async fn deactivate_mapping(&self, email_hash: &str, now: DateTime<Utc>) -> StorageResult<bool> {
        let write_txn = self.db.begin_write()?;
        {
            let mut by_hash = write_txn.open_table(MAPPING_BY_HASH)?;
            let mut by_wallet = write_txn.open_table(MAPPING_BY_WALLET)?;
            let mut rows = write_txn.open_table(MAPPINGS)?;

            let Some(id) = by_hash.remove(email_hash)?.map(|v| v.value().to_string()) else {
                return Ok(false);
            };
            let existing_bytes = rows
                .get(id.as_str())?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StorageError::NotFound(format!("Mapping {id}")))?;
            let mut row: EmailWalletRow = serde_json::from_slice(&existing_bytes)?;
            by_wallet.remove(row.wallet_address.as_str())?;

            row.is_active = false;
            row.last_updated_at = now;
            let json = serde_json::to_vec(&row)?;
            rows.insert(id.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(true)
    }

    async fn insert_intent(&self, row: TransferIntentRow) -> StorageResult<TransferIntentRow> {
        let json = serde_json::to_vec(&row)?;
        let id = row.id.to_string();

        let write_txn = self.db.begin_write()?;
        {
            let mut rows = write_txn.open_table(INTENTS)?;
            rows.insert(id.as_str(), json.as_slice())?;

            let mut by_recipient = write_txn.open_table(INTENTS_BY_RECIPIENT)?;
            let key = make_index_key(&row.recipient_email, row.created_at, &id);
            by_recipient.insert(key.as_slice(), id.as_str())?;

            let mut by_sender = write_txn.open_table(INTENTS_BY_SENDER)?;
            let key = make_index_key(&row.sender_wallet, row.created_at, &id);
            by_sender.insert(key.as_slice(), id.as_str())?;
        }
        write_txn.commit()?;
        Ok(row)
    }

    async fn get_intent(&self, id: Uuid) -> StorageResult<Option<TransferIntentRow>> {
        let read_txn = self.db.begin_read()?;
        let rows = read_txn.open_table(INTENTS)?;
        let key = id.to_string();
        match rows.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    async fn list_pending_intents(
        &self,
        recipient_email: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<TransferIntentRow>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.intents_by_index(
            INTENTS_BY_RECIPIENT,
            recipient_email,
            |row| {
                row.recipient_email == recipient_email
                    && row.status == super::IntentStatus::Pending
                    && row.expires_at > now
            },
            limit,
        )
    }

    async fn list_intents_by_sender(&self, sender_wallet: &str) -> StorageResult<Vec<TransferIntentRow>> {
        self.intents_by_index(
            INTENTS_BY_SENDER,
            sender_wallet,
            |row| row.sender_wallet == sender_wallet,
            usize::MAX,
        )
    }

    async fn transition_intent(
        &self,
        id: Uuid,
        transition: IntentTransition,
    ) -> StorageResult<Option<TransferIntentRow>> {
        let key = id.to_string();
        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut rows = write_txn.open_table(INTENTS)?;
            let Some(existing_bytes) = rows.get(key.as_str())?.map(|v| v.value().to_vec()) else {
                return Ok(None);
            };
            let mut row: TransferIntentRow = serde_json::from_slice(&existing_bytes)?;
            if !transition.admits(&row) {
                return Ok(None);
            }
            transition.apply(&mut row);
            let json = serde_json::to_vec(&row)?;
            rows.insert(key.as_str(), json.as_slice())?;
            row
        };
        write_txn.commit()?;
        Ok(Some(updated))
    }

    async fn insert_notification(&self, row: TransferNotificationRow) -> StorageResult<()> {
        let json = serde_json::to_vec(&row)?;
        let key = make_ascending_key(&row.transfer_intent_id.to_string(), row.sent_at, &row.id.to_string());

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(NOTIFICATIONS)?;
            table.insert(key.as_slice(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    async fn list_notifications(&self, intent_id: Uuid) -> StorageResult<Vec<TransferNotificationRow>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(NOTIFICATIONS)?;
        let (start, end) = scope_range(&intent_id.to_string());

        let mut out = Vec::new();
        for entry in table.range(start.as_slice()..end.as_slice())? {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(value.value())?);
        }
        Ok(out)
    }

    async fn insert_payment_request(&self, row: PaymentRequestRow) -> StorageResult<PaymentRequestRow> {
        let json = serde_json::to_vec(&row)?;
        let id = row.id.to_string();

        let write_txn = self.db.begin_write()?;
        {
            let mut rows = write_txn.open_table(PAYMENT_REQUESTS)?;
            rows.insert(id.as_str(), json.as_slice())?;

            let mut by_requester = write_txn.open_table(PAYMENT_REQUESTS_BY_REQUESTER)?;
            let key = make_index_key(&row.requester_wallet, row.created_at, &id);
            by_requester.insert(key.as_slice(), id.as_str())?;
        }
        write_txn.commit()?;
        Ok(row)
    }

    async fn update_payment_request_status(&self, id: Uuid, status: DeliveryStatus) -> StorageResult<()> {
        let key = id.to_string();
        let write_txn = self.db.begin_write()?;
        {
            let mut rows = write_txn.open_table(PAYMENT_REQUESTS)?;
            let existing_bytes = rows
                .get(key.as_str())?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| StorageError::NotFound(format!("Payment request {id}")))?;
            let mut row: PaymentRequestRow = serde_json::from_slice(&existing_bytes)?;
            row.status = status;
            let json = serde_json::to_vec(&row)?;
            rows.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    async fn get_payment_request(&self, id: Uuid) -> StorageResult<Option<PaymentRequestRow>> {
        let read_txn = self.db.begin_read()?;
        let rows = read_txn.open_table(PAYMENT_REQUESTS)?;
        let key = id.to_string();
        match rows.get(key.as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    async fn list_payment_requests_by_requester(
        &self,
        requester_wallet: &str,
    ) -> StorageResult<Vec<PaymentRequestRow>> {
        let read_txn = self.db.begin_read()?;
        let idx = read_txn.open_table(PAYMENT_REQUESTS_BY_REQUESTER)?;
        let rows = read_txn.open_table(PAYMENT_REQUESTS)?;
        let (start, end) = scope_range(requester_wallet);

        let mut out = Vec::new();
        for entry in idx.range(start.as_slice()..end.as_slice())? {
            let (_, id) = entry?;
            if let Some(value) = rows.get(id.value())? {
                let row: PaymentRequestRow = serde_json::from_slice(value.value())?;
                if row.requester_wallet == requester_wallet {
                    out.push(row);
                }
            }
        }
        Ok(out)
    }
}

// =============================================================================
// Tests
// =============================================================================
