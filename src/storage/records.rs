// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Row types for the four persisted tables.
//!
//! Field names match the column names of the hosted backend so the same
//! serde representation is used by every [`RecordStore`](super::RecordStore)
//! implementation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Table names on the hosted backend.
pub const EMAIL_WALLETS_TABLE: &str = "email_wallets";
pub const TRANSFER_INTENTS_TABLE: &str = "transfer_intents";
pub const TRANSFER_NOTIFICATIONS_TABLE: &str = "transfer_notifications";
pub const PAYMENT_REQUESTS_TABLE: &str = "payment_requests";

/// Unique constraint names reported in conflict errors.
pub const EMAIL_HASH_CONSTRAINT: &str = "email_wallets_email_hash_key";
pub const WALLET_ADDRESS_CONSTRAINT: &str = "email_wallets_wallet_address_key";

// =============================================================================
// email_wallets
// =============================================================================

/// Binding of a normalized email to a wallet address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct EmailWalletRow {
    pub id: Uuid,
    /// Normalized (NFKC, trimmed, lower-cased) email.
    pub email: String,
    /// Keyed hash of `email`, used as the lookup key.
    pub email_hash: String,
    pub wallet_address: String,
    pub first_registered_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub is_active: bool,
}

// =============================================================================
// transfer_intents
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Claimed,
    Cancelled,
    Expired,
}

impl IntentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, IntentStatus::Pending)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Claimed => "claimed",
            IntentStatus::Cancelled => "cancelled",
            IntentStatus::Expired => "expired",
        }
    }
}

/// Funds promised to an email address that has no wallet yet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TransferIntentRow {
    pub id: Uuid,
    pub sender_wallet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
    pub recipient_email: String,
    pub token_mint: String,
    pub token_symbol: String,
    /// Amount in human units (6 fractional digits for USDC).
    pub amount: Decimal,
    pub status: IntentStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by_wallet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_tx_hash: Option<String>,
}

impl TransferIntentRow {
    /// Status as observed at `now`. A pending row past its expiry reads as
    /// expired even though the stored status is never rewritten.
    pub fn effective_status(&self, now: DateTime<Utc>) -> IntentStatus {
        if self.status == IntentStatus::Pending && self.expires_at <= now {
            IntentStatus::Expired
        } else {
            self.status
        }
    }
}

/// Conditional update applied to a pending intent.
///
/// Stores only apply the update if the row is still `pending` and
/// `expires_at > now`. An expired row reads as terminal and never moves.
#[derive(Debug, Clone)]
pub struct IntentTransition {
    pub to: IntentStatus,
    pub now: DateTime<Utc>,
    pub claimed_by_wallet: Option<String>,
    pub claim_tx_hash: Option<String>,
}

impl IntentTransition {
    pub fn claim(wallet: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            to: IntentStatus::Claimed,
            now,
            claimed_by_wallet: Some(wallet.into()),
            claim_tx_hash: None,
        }
    }

    pub fn cancel(now: DateTime<Utc>) -> Self {
        Self {
            to: IntentStatus::Cancelled,
            now,
            claimed_by_wallet: None,
            claim_tx_hash: None,
        }
    }

    /// Apply to a row already known to satisfy the precondition.
    pub fn apply(&self, row: &mut TransferIntentRow) {
        row.status = self.to;
        if self.to == IntentStatus::Claimed {
            row.claimed_at = Some(self.now);
            row.claimed_by_wallet = self.claimed_by_wallet.clone();
            row.claim_tx_hash = self.claim_tx_hash.clone();
        }
    }

    /// Whether `row` is eligible for this transition.
    pub fn admits(&self, row: &TransferIntentRow) -> bool {
        row.status == IntentStatus::Pending && row.expires_at > self.now
    }
}

// =============================================================================
// transfer_notifications
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Created,
    Reminder,
    Expired,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// One row per notification dispatch attempt.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TransferNotificationRow {
    pub id: Uuid,
    pub transfer_intent_id: Uuid,
    pub notification_type: NotificationType,
    pub email: String,
    pub sent_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

// =============================================================================
// payment_requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct PaymentRequestRow {
    pub id: Uuid,
    pub requester_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_name: Option<String>,
    pub requester_wallet: String,
    pub target_email: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status: DeliveryStatus,
    pub created_at: DateTime<Utc>,
}
