// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Transfer Intents
//!
//! Durable promises to pay an email address that has no wallet yet.
//!
//! ## Lifecycle
//!
//! ```text
//! pending ──claim──▶ claimed
//!    │
//!    ├──cancel──▶ cancelled
//!    └──(30 days)──▶ expired   (read-time only, no sweep)
//! ```
//!
//! Every transition is a conditional update against `status = pending`, so
//! two racing claims cannot both win and a terminal row never moves again.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::blockchain::amount::{base_units_to_decimal, display_amount};
use crate::blockchain::USDC_SYMBOL;
use crate::directory::{is_valid_email, normalize_email};
use crate::storage::{
    IntentStatus, IntentTransition, RecordStore, StorageError, StorageResult, TransferIntentRow,
};

pub type TransferIntent = TransferIntentRow;

/// Days until an unclaimed intent stops being claimable.
pub const INTENT_TTL_DAYS: i64 = 30;

/// Maximum number of intents returned to a recipient at once.
pub const UNCLAIMED_PAGE_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Transfer not found")]
    NotFound,

    #[error("Transfer can no longer be claimed")]
    NotClaimable,

    #[error("Transfer can no longer be cancelled")]
    NotCancellable,

    #[error("Claiming not yet implemented")]
    ClaimsDisabled,

    #[error("Only the sender can cancel this transfer")]
    NotSender,

    #[error("Failed to access transfer intents: {0}")]
    Database(String),

    #[error("Transfer intent request timed out")]
    Timeout,
}

impl IntentError {
    pub fn code(&self) -> &'static str {
        match self {
            IntentError::InvalidInput(_) => "INVALID_INPUT",
            IntentError::NotFound => "NOT_FOUND",
            IntentError::NotClaimable => "NOT_CLAIMABLE",
            IntentError::NotCancellable => "NOT_CANCELLABLE",
            IntentError::ClaimsDisabled => "CLAIMS_DISABLED",
            IntentError::NotSender => "NOT_SENDER",
            IntentError::Database(_) => "DATABASE_ERROR",
            IntentError::Timeout => "TIMEOUT",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, IntentError::Database(_) | IntentError::Timeout)
    }

    /// Message safe to show a caller. Storage detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            IntentError::Database(_) => "Transfers temporarily unavailable. Please try again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StorageError> for IntentError {
    fn from(e: StorageError) -> Self {
        IntentError::Database(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct NewTransferIntent {
    pub sender_wallet: String,
    pub sender_email: Option<String>,
    pub recipient_email: String,
    pub amount_base_units: u64,
    pub creation_tx_hash: Option<String>,
}

/// What a recipient sees waiting for them.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UnclaimedSummary {
    pub intents: Vec<TransferIntent>,
    pub count: usize,
    pub total_amount: Decimal,
    /// Total with two decimals, e.g. `"35.00"`.
    pub total_display: String,
}

pub struct TransferIntentStore {
    store: Arc<dyn RecordStore>,
    token_mint: String,
    timeout: Duration,
    claims_enabled: bool,
}

impl TransferIntentStore {
    pub fn new(
        store: Arc<dyn RecordStore>,
        token_mint: &Pubkey,
        timeout: Duration,
        claims_enabled: bool,
    ) -> Self {
        Self {
            store,
            token_mint: token_mint.to_string(),
            timeout,
            claims_enabled,
        }
    }

    pub fn claims_enabled(&self) -> bool {
        self.claims_enabled
    }

    async fn bounded<T>(&self, fut: impl Future<Output = StorageResult<T>>) -> Result<T, IntentError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| IntentError::Timeout)?
            .map_err(IntentError::from)
    }

    fn recipient_key(email: &str) -> Result<String, IntentError> {
        let normalized = normalize_email(email);
        if !is_valid_email(&normalized) {
            return Err(IntentError::InvalidInput("Invalid recipient email".to_string()));
        }
        Ok(normalized)
    }

    pub async fn create(&self, new: NewTransferIntent) -> Result<TransferIntent, IntentError> {
        let recipient_email = Self::recipient_key(&new.recipient_email)?;
        if new.amount_base_units == 0 {
            return Err(IntentError::InvalidInput("Amount must be greater than zero".to_string()));
        }
        new.sender_wallet
            .parse::<Pubkey>()
            .map_err(|_| IntentError::InvalidInput("Invalid sender wallet".to_string()))?;

        let now = Utc::now();
        let row = TransferIntentRow {
            id: Uuid::new_v4(),
            sender_wallet: new.sender_wallet,
            sender_email: new.sender_email.map(|e| normalize_email(&e)),
            recipient_email,
            token_mint: self.token_mint.clone(),
            token_symbol: USDC_SYMBOL.to_string(),
            amount: base_units_to_decimal(new.amount_base_units),
            status: IntentStatus::Pending,
            created_at: now,
            expires_at: now + chrono::Duration::days(INTENT_TTL_DAYS),
            claimed_at: None,
            claimed_by_wallet: None,
            creation_tx_hash: new.creation_tx_hash,
            claim_tx_hash: None,
        };

        let created = self.bounded(self.store.insert_intent(row)).await?;
        info!(
            intent_id = %created.id,
            sender = %created.sender_wallet,
            amount = %created.amount,
            expires_at = %created.expires_at,
            "Created transfer intent"
        );
        Ok(created)
    }

    /// Claimable intents for `recipient_email`, newest first.
    pub async fn list_unclaimed(&self, recipient_email: &str) -> Result<Vec<TransferIntent>, IntentError> {
        let recipient = Self::recipient_key(recipient_email)?;
        self.bounded(
            self.store
                .list_pending_intents(&recipient, Utc::now(), UNCLAIMED_PAGE_SIZE),
        )
        .await
    }

    pub async fn unclaimed_summary(&self, recipient_email: &str) -> Result<UnclaimedSummary, IntentError> {
        let intents = self.list_unclaimed(recipient_email).await?;
        let total_amount: Decimal = intents.iter().map(|i| i.amount).sum();
        Ok(UnclaimedSummary {
            count: intents.len(),
            total_display: display_amount(total_amount),
            total_amount,
            intents,
        })
    }

    /// Intent by id, with its effective status.
    pub async fn get(&self, id: Uuid) -> Result<Option<TransferIntent>, IntentError> {
        let now = Utc::now();
        Ok(self.bounded(self.store.get_intent(id)).await?.map(|mut row| {
            row.status = row.effective_status(now);
            row
        }))
    }

    /// Intents created by `sender_wallet`, newest first, with effective status.
    pub async fn list_sent(&self, sender_wallet: &str) -> Result<Vec<TransferIntent>, IntentError> {
        let now = Utc::now();
        let mut rows = self.bounded(self.store.list_intents_by_sender(sender_wallet)).await?;
        for row in &mut rows {
            row.status = row.effective_status(now);
        }
        Ok(rows)
    }

    pub async fn claim(&self, id: Uuid, claimant_wallet: &str) -> Result<TransferIntent, IntentError> {
        if !self.claims_enabled {
            return Err(IntentError::ClaimsDisabled);
        }
        let wallet = claimant_wallet
            .trim()
            .parse::<Pubkey>()
            .map_err(|_| IntentError::InvalidInput("Invalid claimant wallet".to_string()))?
            .to_string();

        let transition = IntentTransition::claim(wallet.clone(), Utc::now());
        match self.bounded(self.store.transition_intent(id, transition)).await? {
            Some(claimed) => {
                info!(intent_id = %id, claimed_by = %wallet, "Transfer intent claimed");
                Ok(claimed)
            }
            None => match self.bounded(self.store.get_intent(id)).await? {
                Some(_) => Err(IntentError::NotClaimable),
                None => Err(IntentError::NotFound),
            },
        }
    }

    /// Cancel a pending, unexpired intent. Only its sender may do so.
    pub async fn cancel(&self, id: Uuid, sender_wallet: &str) -> Result<TransferIntent, IntentError> {
        let existing = self
            .bounded(self.store.get_intent(id))
            .await?
            .ok_or(IntentError::NotFound)?;
        if existing.sender_wallet != sender_wallet.trim() {
            return Err(IntentError::NotSender);
        }

        let cancelled = self
            .bounded(self.store.transition_intent(id, IntentTransition::cancel(Utc::now())))
            .await?
            .ok_or(IntentError::NotCancellable)?;
        info!(intent_id = %id, "Transfer intent cancelled");
        Ok(cancelled)
    }

    /// Cancel every pending intent from `sender_wallet`. Returns how many moved.
    pub async fn cancel_all_from(&self, sender_wallet: &str) -> Result<usize, IntentError> {
        let now = Utc::now();
        let rows = self.bounded(self.store.list_intents_by_sender(sender_wallet)).await?;
        let mut cancelled = 0;
        for row in rows
            .into_iter()
            .filter(|r| r.effective_status(now) == IntentStatus::Pending)
        {
            match self
                .bounded(self.store.transition_intent(row.id, IntentTransition::cancel(Utc::now())))
                .await?
            {
                Some(_) => cancelled += 1,
                None => warn!(intent_id = %row.id, "Intent changed state before cancellation"),
            }
        }
        Ok(cancelled)
    }
}
