// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Email Directory
//!
//! Maps email addresses to registered wallet addresses.
//!
//! ## Registration protocol
//!
//! 1. Validate the email shape and the wallet address.
//! 2. Collapse concurrent calls for the same `(email, wallet)` pair into one
//!    execution (see [`inflight::InFlight`]).
//! 3. Look up by email hash: same wallet returns the existing record, a
//!    different wallet is `EMAIL_EXISTS`.
//! 4. Look up by wallet: bound to another email is `WALLET_EXISTS`.
//! 5. Insert. A unique violation or a transport rejection is resolved by
//!    re-querying before an error is reported, since a rejected write may
//!    have committed.
//!
//! Every store call is bounded by the configured external-call timeout.

pub mod email;
pub mod inflight;

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use email::{is_valid_email, normalize_email, EmailHasher};
use inflight::InFlight;

use crate::storage::{EmailWalletRow, RecordStore, StorageError, StorageResult};

/// Public view of a directory entry.
pub type EmailWalletMapping = EmailWalletRow;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("This email is already registered with a different wallet")]
    EmailExists,

    #[error("This wallet is already registered with a different email")]
    WalletExists,

    #[error("No active registration found for this email")]
    NotFound,

    #[error("Directory storage error: {0}")]
    Database(String),

    #[error("Directory request timed out")]
    Timeout,
}

impl DirectoryError {
    /// Machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DirectoryError::InvalidInput(_) => "INVALID_INPUT",
            DirectoryError::EmailExists => "EMAIL_EXISTS",
            DirectoryError::WalletExists => "WALLET_EXISTS",
            DirectoryError::NotFound => "NOT_FOUND",
            DirectoryError::Database(_) => "DATABASE_ERROR",
            DirectoryError::Timeout => "TIMEOUT",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DirectoryError::Database(_) | DirectoryError::Timeout)
    }

    /// Message safe to show a caller. Storage detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            DirectoryError::Database(_) => "Directory temporarily unavailable. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StorageError> for DirectoryError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict { .. } if e.is_wallet_conflict() => DirectoryError::WalletExists,
            StorageError::Conflict { .. } => DirectoryError::EmailExists,
            other => DirectoryError::Database(other.to_string()),
        }
    }
}

/// Validate and parse a Solana wallet address.
pub fn parse_wallet(wallet: &str) -> Result<Pubkey, DirectoryError> {
    Pubkey::from_str(wallet.trim())
        .map_err(|_| DirectoryError::InvalidInput(format!("Invalid wallet address: {wallet}")))
}

/// Short, non-reversible tag for log lines.
fn hash_tag(hash: &str) -> &str {
    hash.get(..10).unwrap_or(hash)
}

pub struct EmailDirectory {
    store: Arc<dyn RecordStore>,
    hasher: EmailHasher,
    timeout: Duration,
    inflight: InFlight<Result<EmailWalletMapping, DirectoryError>>,
}

impl EmailDirectory {
    pub fn new(store: Arc<dyn RecordStore>, hasher: EmailHasher, timeout: Duration) -> Self {
        Self {
            store,
            hasher,
            timeout,
            inflight: InFlight::new(),
        }
    }

    /// Normalize and validate, returning `(normalized, hash)`.
    fn key_for(&self, email: &str) -> Result<(String, String), DirectoryError> {
        let normalized = normalize_email(email);
        if !is_valid_email(&normalized) {
            return Err(DirectoryError::InvalidInput("Invalid email format".to_string()));
        }
        let hash = self.hasher.hash(&normalized);
        Ok((normalized, hash))
    }

    /// Keyed hash of an email, for callers that need to correlate rows.
    pub fn email_hash(&self, email: &str) -> Result<String, DirectoryError> {
        self.key_for(email).map(|(_, hash)| hash)
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = StorageResult<T>>,
    ) -> Result<StorageResult<T>, DirectoryError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| DirectoryError::Timeout)
    }

    /// Wallet address registered for `email`, if any.
    pub async fn resolve(&self, email: &str) -> Result<Option<String>, DirectoryError> {
        Ok(self.lookup(email).await?.map(|m| m.wallet_address))
    }

    /// Full active record for `email`, if any.
    pub async fn lookup(&self, email: &str) -> Result<Option<EmailWalletMapping>, DirectoryError> {
        let (_, hash) = self.key_for(email)?;
        let found = self.bounded(self.store.find_mapping_by_hash(&hash)).await??;
        debug!(email_hash = hash_tag(&hash), found = found.is_some(), "Directory lookup");
        Ok(found)
    }

    /// Malformed input reads as "not registered".
    pub async fn is_registered(&self, email: &str) -> Result<bool, DirectoryError> {
        match self.lookup(email).await {
            Ok(found) => Ok(found.is_some()),
            Err(DirectoryError::InvalidInput(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Register `email` → `wallet`. Idempotent for an identical pair.
    pub async fn register(&self, email: &str, wallet: &str) -> Result<EmailWalletMapping, DirectoryError> {
        let (normalized, hash) = self.key_for(email)?;
        let wallet = parse_wallet(wallet)?.to_string();

        let key = format!("{normalized}-{wallet}");
        self.inflight
            .run(&key, || self.register_once(normalized.clone(), hash.clone(), wallet.clone()))
            .await
    }

    async fn register_once(
        &self,
        email: String,
        hash: String,
        wallet: String,
    ) -> Result<EmailWalletMapping, DirectoryError> {
        match self.bounded(self.store.find_mapping_by_hash(&hash)).await? {
            Ok(Some(existing)) if existing.wallet_address == wallet => {
                debug!(email_hash = hash_tag(&hash), "Registration already present");
                return Ok(existing);
            }
            Ok(Some(_)) => return Err(DirectoryError::EmailExists),
            Ok(None) => {}
            Err(StorageError::Rejected { status }) => {
                // Treated as "not found"; the insert below settles it.
                debug!(status, "Email lookup rejected by backend, continuing");
            }
            Err(e) => return Err(e.into()),
        }

        match self.bounded(self.store.find_mapping_by_wallet(&wallet)).await? {
            Ok(Some(existing)) if existing.email_hash != hash => return Err(DirectoryError::WalletExists),
            Ok(Some(existing)) => return Ok(existing),
            Ok(None) | Err(StorageError::Rejected { .. }) => {}
            Err(e) => return Err(e.into()),
        }

        let now = Utc::now();
        let row = EmailWalletRow {
            id: Uuid::new_v4(),
            email,
            email_hash: hash.clone(),
            wallet_address: wallet.clone(),
            first_registered_at: now,
            last_updated_at: now,
            is_active: true,
        };

        match self.bounded(self.store.insert_mapping(row)).await? {
            Ok(inserted) => {
                info!(
                    email_hash = hash_tag(&hash),
                    wallet = %wallet,
                    "Registered email wallet mapping"
                );
                Ok(inserted)
            }
            Err(e @ (StorageError::Conflict { .. } | StorageError::Rejected { .. })) => {
                warn!(email_hash = hash_tag(&hash), error = %e, "Insert not accepted, re-querying");
                self.reconcile(&hash, &wallet, e).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Decide the outcome of an insert the store did not accept.
    async fn reconcile(
        &self,
        hash: &str,
        wallet: &str,
        cause: StorageError,
    ) -> Result<EmailWalletMapping, DirectoryError> {
        match self.bounded(self.store.find_mapping_by_hash(hash)).await?? {
            Some(existing) if existing.wallet_address == wallet => Ok(existing),
            Some(_) => Err(DirectoryError::EmailExists),
            None => match cause {
                StorageError::Rejected { status } => Err(DirectoryError::Database(format!(
                    "registration could not be confirmed (status {status})"
                ))),
                conflict => Err(conflict.into()),
            },
        }
    }

    /// Move the active mapping for `email` to `new_wallet`.
    pub async fn update_wallet(
        &self,
        email: &str,
        new_wallet: &str,
    ) -> Result<EmailWalletMapping, DirectoryError> {
        let (_, hash) = self.key_for(email)?;
        let wallet = parse_wallet(new_wallet)?.to_string();

        if let Some(owner) = self.bounded(self.store.find_mapping_by_wallet(&wallet)).await?? {
            if owner.email_hash != hash {
                return Err(DirectoryError::WalletExists);
            }
            return Ok(owner);
        }

        let updated = self
            .bounded(self.store.update_mapping_wallet(&hash, &wallet, Utc::now()))
            .await??
            .ok_or(DirectoryError::NotFound)?;
        info!(email_hash = hash_tag(&hash), wallet = %wallet, "Updated wallet mapping");
        Ok(updated)
    }

    /// Soft delete. Returns whether an active mapping existed.
    pub async fn deactivate(&self, email: &str) -> Result<bool, DirectoryError> {
        let (_, hash) = self.key_for(email)?;
        let deactivated = self
            .bounded(self.store.deactivate_mapping(&hash, Utc::now()))
            .await??;
        if deactivated {
            info!(email_hash = hash_tag(&hash), "Deactivated wallet mapping");
        }
        Ok(deactivated)
    }

    /// Number of registrations currently in flight.
    pub fn pending_registrations(&self) -> usize {
        self.inflight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::testing::{InsertFault, InstrumentedStore};
    use crate::storage::LocalStore;
    use std::sync::atomic::Ordering;

    fn directory_over(store: Arc<dyn RecordStore>) -> EmailDirectory {
        EmailDirectory::new(
            store,
            EmailHasher::new(b"test-key").unwrap(),
            Duration::from_secs(5),
        )
    }

    fn directory() -> EmailDirectory {
        directory_over(Arc::new(LocalStore::in_memory().unwrap()))
    }

    fn wallet() -> String {
        Pubkey::new_unique().to_string()
    }

    #[tokio::test]
    async fn register_then_resolve_normalizes_email() {
        let dir = directory();
        let w = wallet();
        let record = dir.register("  Alice@Example.com ", &w).await.unwrap();
        assert_eq!(record.email, "alice@example.com");
        assert!(record.is_active);

        assert_eq!(dir.resolve("ALICE@example.COM").await.unwrap(), Some(w));
        assert_eq!(dir.resolve("nobody@example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn registering_same_pair_twice_is_idempotent() {
        let store = Arc::new(InstrumentedStore::new());
        let dir = directory_over(store.clone());
        let w = wallet();

        let first = dir.register("alice@example.com", &w).await.unwrap();
        let second = dir.register("alice@example.com", &w).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.inserts(), 1);
    }

    #[tokio::test]
    async fn email_bound_to_other_wallet_is_rejected_and_kept() {
        let dir = directory();
        let (wa, wb) = (wallet(), wallet());
        dir.register("alice@example.com", &wa).await.unwrap();

        let err = dir.register("alice@example.com", &wb).await.unwrap_err();
        assert_eq!(err, DirectoryError::EmailExists);
        assert_eq!(err.code(), "EMAIL_EXISTS");
        assert_eq!(dir.resolve("alice@example.com").await.unwrap(), Some(wa));
    }

    #[tokio::test]
    async fn wallet_bound_to_other_email_is_rejected() {
        let dir = directory();
        let w = wallet();
        dir.register("alice@example.com", &w).await.unwrap();

        let err = dir.register("bob@example.com", &w).await.unwrap_err();
        assert_eq!(err, DirectoryError::WalletExists);
        assert!(!dir.is_registered("bob@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_identical_registrations_collapse_into_one_write() {
        let store = Arc::new(InstrumentedStore::new().with_insert_delay(Duration::from_millis(50)));
        let dir = directory_over(store.clone());
        let w = wallet();

        let (a, b) = tokio::join!(
            dir.register("alice@example.com", &w),
            dir.register("Alice@Example.com", &w)
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a, b);
        assert_eq!(store.inserts(), 1);
        assert_eq!(dir.pending_registrations(), 0);
    }

    #[tokio::test]
    async fn rejected_write_that_committed_is_reported_as_success() {
        let store = Arc::new(InstrumentedStore::new().with_insert_fault(InsertFault::RejectAfterCommit));
        let dir = directory_over(store);
        let w = wallet();

        let record = dir.register("alice@example.com", &w).await.unwrap();
        assert_eq!(record.wallet_address, w);
    }

    #[tokio::test]
    async fn rejected_write_that_did_not_commit_is_a_database_error() {
        let store = Arc::new(InstrumentedStore::new().with_insert_fault(InsertFault::RejectWithoutCommit));
        let dir = directory_over(store);

        let err = dir.register("alice@example.com", &wallet()).await.unwrap_err();
        assert_eq!(err.code(), "DATABASE_ERROR");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn failed_registration_can_be_retried() {
        let store = Arc::new(InstrumentedStore::new());
        let dir = directory_over(store.clone());
        let w = wallet();

        store.unavailable.store(true, Ordering::SeqCst);
        assert!(dir.register("alice@example.com", &w).await.is_err());

        store.unavailable.store(false, Ordering::SeqCst);
        assert!(dir.register("alice@example.com", &w).await.is_ok());
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store = Arc::new(InstrumentedStore::new().with_read_delay(Duration::from_millis(200)));
        let dir = EmailDirectory::new(
            store,
            EmailHasher::new(b"test-key").unwrap(),
            Duration::from_millis(20),
        );
        let err = dir.resolve("alice@example.com").await.unwrap_err();
        assert_eq!(err, DirectoryError::Timeout);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn invalid_input_is_reported_before_store_access() {
        let store = Arc::new(InstrumentedStore::new());
        let dir = directory_over(store.clone());

        let err = dir.register("not-an-email", &wallet()).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        let err = dir.register("alice@example.com", "0xnot-solana").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert_eq!(store.inserts(), 0);

        assert!(!dir.is_registered("not-an-email").await.unwrap());
    }

    #[tokio::test]
    async fn update_wallet_rechecks_uniqueness() {
        let dir = directory();
        let (wa, wb, wc) = (wallet(), wallet(), wallet());
        dir.register("alice@example.com", &wa).await.unwrap();
        dir.register("bob@example.com", &wb).await.unwrap();

        let err = dir.update_wallet("alice@example.com", &wb).await.unwrap_err();
        assert_eq!(err, DirectoryError::WalletExists);

        let updated = dir.update_wallet("alice@example.com", &wc).await.unwrap();
        assert_eq!(updated.wallet_address, wc);
        assert_eq!(dir.resolve("alice@example.com").await.unwrap(), Some(wc));

        let err = dir.update_wallet("carol@example.com", &wallet()).await.unwrap_err();
        assert_eq!(err, DirectoryError::NotFound);
    }

    #[tokio::test]
    async fn deactivated_email_no_longer_resolves() {
        let dir = directory();
        let w = wallet();
        dir.register("alice@example.com", &w).await.unwrap();

        assert!(dir.deactivate("alice@example.com").await.unwrap());
        assert_eq!(dir.resolve("alice@example.com").await.unwrap(), None);
        assert!(!dir.deactivate("alice@example.com").await.unwrap());

        // The wallet is free again.
        dir.register("alice2@example.com", &w).await.unwrap();
    }
}
