// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Account data summary and deletion.
//!
//! Deletion is soft: the directory entry is deactivated (freeing both the
//! email and the wallet for a later registration) and every pending intent
//! the wallet sent is cancelled. Claimed history stays as an audit trail.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;

use crate::directory::{normalize_email, parse_wallet, DirectoryError, EmailDirectory};
use crate::intents::{IntentError, TransferIntentStore};
use crate::storage::{IntentStatus, RecordStore};

/// Upper bound on incoming intents counted for a summary.
const INCOMING_SCAN_LIMIT: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Email is registered to a different wallet")]
    WalletMismatch,

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Intent(#[from] IntentError),

    #[error("Account storage error: {0}")]
    Database(String),

    #[error("Account request timed out")]
    Timeout,
}

impl AccountError {
    pub fn code(&self) -> &'static str {
        match self {
            AccountError::InvalidInput(_) => "INVALID_INPUT",
            AccountError::WalletMismatch => "WALLET_MISMATCH",
            AccountError::Directory(e) => e.code(),
            AccountError::Intent(e) => e.code(),
            AccountError::Database(_) => "DATABASE_ERROR",
            AccountError::Timeout => "TIMEOUT",
        }
    }

    /// Message safe to show a caller. Storage detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AccountError::Directory(e) => e.user_message(),
            AccountError::Intent(e) => e.user_message(),
            AccountError::Database(_) => "Account data temporarily unavailable. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

/// What the service holds for an email/wallet pair.
#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq, Eq)]
pub struct AccountSummary {
    pub registered: bool,
    pub sent_intents: usize,
    pub pending_outgoing: usize,
    pub pending_incoming: usize,
    pub payment_requests: usize,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq, Eq)]
pub struct DeletionResult {
    pub mappings_deactivated: usize,
    pub intents_cancelled: usize,
}

pub struct AccountService {
    store: Arc<dyn RecordStore>,
    directory: Arc<EmailDirectory>,
    intents: Arc<TransferIntentStore>,
    timeout: Duration,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        directory: Arc<EmailDirectory>,
        intents: Arc<TransferIntentStore>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            intents,
            timeout,
        }
    }

    fn validate(email: &str, wallet: &str) -> Result<(), AccountError> {
        if email.trim().is_empty() || wallet.trim().is_empty() {
            return Err(AccountError::InvalidInput(
                "Email and wallet address are required".to_string(),
            ));
        }
        parse_wallet(wallet).map_err(|_| AccountError::InvalidInput("Invalid wallet address".to_string()))?;
        Ok(())
    }

    pub async fn summary(&self, email: &str, wallet: &str) -> Result<AccountSummary, AccountError> {
        Self::validate(email, wallet)?;
        let wallet = wallet.trim();

        let registered = self
            .directory
            .lookup(email)
            .await?
            .is_some_and(|m| m.wallet_address == wallet);

        let sent = self.intents.list_sent(wallet).await?;
        let pending_outgoing = sent.iter().filter(|i| i.status == IntentStatus::Pending).count();

        let recipient = normalize_email(email);
        let incoming = tokio::time::timeout(
            self.timeout,
            self.store.list_pending_intents(&recipient, Utc::now(), INCOMING_SCAN_LIMIT),
        )
        .await
        .map_err(|_| AccountError::Timeout)?
        .map_err(|e| AccountError::Database(e.to_string()))?;

        let requests = tokio::time::timeout(
            self.timeout,
            self.store.list_payment_requests_by_requester(wallet),
        )
        .await
        .map_err(|_| AccountError::Timeout)?
        .map_err(|e| AccountError::Database(e.to_string()))?;

        Ok(AccountSummary {
            registered,
            sent_intents: sent.len(),
            pending_outgoing,
            pending_incoming: incoming.len(),
            payment_requests: requests.len(),
        })
    }

    /// Deactivate the directory entry and cancel the wallet's pending intents.
    /// Refuses when the email is bound to some other wallet.
    pub async fn delete(&self, email: &str, wallet: &str) -> Result<DeletionResult, AccountError> {
        Self::validate(email, wallet)?;
        let wallet = wallet.trim();

        let mut result = DeletionResult::default();
        if let Some(mapping) = self.directory.lookup(email).await? {
            if mapping.wallet_address != wallet {
                return Err(AccountError::WalletMismatch);
            }
            if self.directory.deactivate(email).await? {
                result.mappings_deactivated = 1;
            }
        }
        result.intents_cancelled = self.intents.cancel_all_from(wallet).await?;

        info!(
            wallet = %wallet,
            mappings = result.mappings_deactivated,
            intents = result.intents_cancelled,
            "Account data removed"
        );
        Ok(result)
    }
}
