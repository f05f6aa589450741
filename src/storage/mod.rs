// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Record Storage
//!
//! Persistence for the four tables the service owns:
//!
//! ```text
//! email_wallets            email_hash → wallet_address (soft-deletable)
//! transfer_intents         funds promised to unregistered emails
//! transfer_notifications   append-only log of notification attempts
//! payment_requests         requests for funds sent by email
//! ```
//!
//! Two backends implement [`RecordStore`]:
//!
//! - [`LocalStore`] - embedded redb database, file-backed or in-memory
//! - [`RestStore`] - hosted Postgres behind a PostgREST-style HTTP API
//!
//! Both enforce uniqueness of the active `email_hash` and `wallet_address`
//! and surface violations as [`StorageError::Conflict`].

pub mod balance_cache;
pub mod local;
pub mod records;
pub mod rest;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use balance_cache::BalanceCache;
pub use local::LocalStore;
pub use records::*;
pub use rest::RestStore;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// A unique constraint rejected the write.
    #[error("unique constraint violated: {constraint}")]
    Conflict { constraint: String },

    /// The transport rejected the request (HTTP 406 from the backend).
    /// The write may still have committed.
    #[error("request rejected by backend with status {status}")]
    Rejected { status: u16 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StorageError {
    /// True when the conflict names the wallet address constraint.
    pub fn is_wallet_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { constraint } if constraint.contains("wallet_address"))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Cheap round trip used by readiness probes.
    async fn ping(&self) -> StorageResult<()>;

    // -------------------------------------------------------------------------
    // email_wallets
    // -------------------------------------------------------------------------

    /// Active mapping for an email hash.
    async fn find_mapping_by_hash(&self, email_hash: &str) -> StorageResult<Option<EmailWalletRow>>;

    /// Active mapping for a wallet address.
    async fn find_mapping_by_wallet(&self, wallet: &str) -> StorageResult<Option<EmailWalletRow>>;

    async fn insert_mapping(&self, row: EmailWalletRow) -> StorageResult<EmailWalletRow>;

    /// Rebind the active mapping for `email_hash` to `wallet`.
    /// Returns `None` when there is no active mapping.
    async fn update_mapping_wallet(
        &self,
        email_hash: &str,
        wallet: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<EmailWalletRow>>;

    /// Soft delete. Returns whether an active mapping was deactivated.
    async fn deactivate_mapping(&self, email_hash: &str, now: DateTime<Utc>) -> StorageResult<bool>;

    // -------------------------------------------------------------------------
    // transfer_intents
    // -------------------------------------------------------------------------

    async fn insert_intent(&self, row: TransferIntentRow) -> StorageResult<TransferIntentRow>;

    async fn get_intent(&self, id: Uuid) -> StorageResult<Option<TransferIntentRow>>;

    /// Pending intents for `recipient_email` with `expires_at > now`,
    /// newest first, at most `limit`.
    async fn list_pending_intents(
        &self,
        recipient_email: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<TransferIntentRow>>;

    /// Every intent created by `sender_wallet`, newest first.
    async fn list_intents_by_sender(&self, sender_wallet: &str) -> StorageResult<Vec<TransferIntentRow>>;

    /// Conditionally move a pending intent. Returns `None` when the row is
    /// missing or no longer admits the transition.
    async fn transition_intent(
        &self,
        id: Uuid,
        transition: IntentTransition,
    ) -> StorageResult<Option<TransferIntentRow>>;

    // -------------------------------------------------------------------------
    // transfer_notifications
    // -------------------------------------------------------------------------

    async fn insert_notification(&self, row: TransferNotificationRow) -> StorageResult<()>;

    async fn list_notifications(&self, intent_id: Uuid) -> StorageResult<Vec<TransferNotificationRow>>;

    // -------------------------------------------------------------------------
    // payment_requests
    // -------------------------------------------------------------------------

    async fn insert_payment_request(&self, row: PaymentRequestRow) -> StorageResult<PaymentRequestRow>;

    async fn update_payment_request_status(&self, id: Uuid, status: DeliveryStatus) -> StorageResult<()>;

    async fn get_payment_request(&self, id: Uuid) -> StorageResult<Option<PaymentRequestRow>>;

    async fn list_payment_requests_by_requester(
        &self,
        requester_wallet: &str,
    ) -> StorageResult<Vec<PaymentRequestRow>>;
}
