// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Notifications
//!
//! Emails sent on behalf of the send flow:
//!
//! | Kind | Trigger | Persisted |
//! |------|---------|-----------|
//! | invitation | intent created | `transfer_notifications` row, type `created` |
//! | reminder | explicit request | `transfer_notifications` row, type `reminder` |
//! | payment request | user asks someone for funds | `payment_requests` row |
//!
//! Delivery failures never fail the caller. They are recorded and reported
//! in the returned outcome.

pub mod sender;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

pub use sender::{EmailSender, HttpEmailFunction, OutgoingEmail};

use crate::blockchain::amount::{base_units_to_decimal, display_amount, parse_amount};
use crate::directory::{is_valid_email, normalize_email};
use crate::storage::{
    DeliveryStatus, IntentStatus, NotificationType, PaymentRequestRow, RecordStore,
    TransferIntentRow, TransferNotificationRow,
};

const NOT_CONFIGURED: &str = "Email service not configured";
const SEND_FAILED: &str = "Failed to send email";

#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    #[error("Email service not configured")]
    NotConfigured,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Email request failed: {0}")]
    Request(String),

    #[error("Email rejected: {0}")]
    Rejected(String),

    #[error("Invalid email function response: {0}")]
    InvalidResponse(String),

    #[error("Email request timed out")]
    Timeout,
}

impl NotifyError {
    pub fn code(&self) -> &'static str {
        match self {
            NotifyError::NotConfigured => "NOT_CONFIGURED",
            NotifyError::InvalidInput(_) => "INVALID_INPUT",
            NotifyError::Timeout => "TIMEOUT",
            _ => "SEND_FAILED",
        }
    }

    /// Message safe to show a caller. Email function responses stay in the
    /// logs and the notification log.
    pub fn user_message(&self) -> String {
        match self {
            NotifyError::Request(_) | NotifyError::Rejected(_) | NotifyError::InvalidResponse(_) => {
                SEND_FAILED.to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct InvitationOutcome {
    pub email_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InvitationOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            email_id: String::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Request for funds, as entered by the requester.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PaymentRequest {
    pub requester_email: String,
    #[serde(default)]
    pub requester_name: Option<String>,
    pub requester_wallet: String,
    pub target_email: String,
    /// Human units, e.g. `"25"` or `"12.50"`.
    pub amount: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct PaymentRequestOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `Month D, YYYY`
fn long_date(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y").to_string()
}

fn long_timestamp(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y at %-I:%M %p").to_string()
}

/// `AbCdEf...WxYz`
pub fn short_wallet(wallet: &str) -> String {
    match (wallet.get(..6), wallet.len().checked_sub(4).and_then(|i| wallet.get(i..))) {
        (Some(head), Some(tail)) if wallet.len() > 10 => format!("{head}...{tail}"),
        _ => wallet.to_string(),
    }
}

pub struct NotificationDispatcher {
    store: Arc<dyn RecordStore>,
    sender: Option<Arc<dyn EmailSender>>,
    app_url: Url,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn RecordStore>,
        sender: Option<Arc<dyn EmailSender>>,
        app_url: Url,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            sender,
            app_url,
            timeout,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.sender.is_some()
    }

    pub fn claim_url(&self, recipient_email: &str) -> Url {
        let mut url = self.app_url.clone();
        url.query_pairs_mut().append_pair("email", recipient_email);
        url
    }

    pub fn payment_url(&self, requester_email: &str, amount: &str) -> Url {
        let mut url = self.app_url.clone();
        url.query_pairs_mut()
            .append_pair("send_to", requester_email)
            .append_pair("amount", amount);
        url
    }

    async fn deliver(&self, email: &OutgoingEmail) -> Result<String, NotifyError> {
        let sender = self.sender.as_ref().ok_or(NotifyError::NotConfigured)?;
        tokio::time::timeout(self.timeout, sender.send(email))
            .await
            .map_err(|_| NotifyError::Timeout)?
    }

    /// Tell the recipient of a new intent that funds are waiting.
    ///
    /// `sender_label` is shown as "from"; the shortened sender wallet is
    /// used when absent.
    pub async fn send_invitation(
        &self,
        intent: &TransferIntentRow,
        sender_label: Option<&str>,
    ) -> InvitationOutcome {
        let amount = display_amount(intent.amount);
        let subject = format!("You've received {amount} USDC!");
        self.dispatch(intent, NotificationType::Created, subject, sender_label)
            .await
    }

    /// Remind the recipient of a still-pending intent.
    pub async fn send_reminder(&self, intent: &TransferIntentRow) -> InvitationOutcome {
        if intent.effective_status(Utc::now()) != IntentStatus::Pending {
            return InvitationOutcome::failed("Transfer is no longer pending");
        }
        let amount = display_amount(intent.amount);
        let subject = format!("Reminder: {amount} USDC is waiting for you");
        self.dispatch(intent, NotificationType::Reminder, subject, None)
            .await
    }

    async fn dispatch(
        &self,
        intent: &TransferIntentRow,
        kind: NotificationType,
        subject: String,
        sender_label: Option<&str>,
    ) -> InvitationOutcome {
        let sender_label = sender_label
            .map(str::to_string)
            .or_else(|| intent.sender_email.clone())
            .unwrap_or_else(|| short_wallet(&intent.sender_wallet));

        let email = OutgoingEmail {
            to: intent.recipient_email.clone(),
            subject,
            app_url: self.app_url.to_string(),
            template_data: json!({
                "senderEmail": sender_label,
                "recipientEmail": intent.recipient_email,
                "amount": display_amount(intent.amount),
                "claimUrl": self.claim_url(&intent.recipient_email).to_string(),
                "expirationDate": long_date(intent.expires_at),
                "currentDate": long_timestamp(Utc::now()),
            }),
        };

        let (outcome, detail) = match self.deliver(&email).await {
            Ok(email_id) => {
                info!(intent_id = %intent.id, email_id = %email_id, kind = ?kind, "Notification sent");
                let outcome = InvitationOutcome {
                    email_id,
                    success: true,
                    error: None,
                };
                (outcome, None)
            }
            Err(NotifyError::NotConfigured) => {
                warn!(intent_id = %intent.id, "Email service not configured, skipping notification");
                (InvitationOutcome::failed(NOT_CONFIGURED), Some(NOT_CONFIGURED.to_string()))
            }
            Err(e) => {
                warn!(intent_id = %intent.id, error = %e, kind = ?kind, "Notification failed");
                (InvitationOutcome::failed(e.user_message()), Some(e.to_string()))
            }
        };

        self.log_attempt(intent, kind, &outcome, detail).await;
        outcome
    }

    async fn log_attempt(
        &self,
        intent: &TransferIntentRow,
        kind: NotificationType,
        outcome: &InvitationOutcome,
        detail: Option<String>,
    ) {
        let row = TransferNotificationRow {
            id: Uuid::new_v4(),
            transfer_intent_id: intent.id,
            notification_type: kind,
            email: intent.recipient_email.clone(),
            sent_at: Utc::now(),
            status: if outcome.success {
                DeliveryStatus::Sent
            } else {
                DeliveryStatus::Failed
            },
            error_message: detail,
        };
        match tokio::time::timeout(self.timeout, self.store.insert_notification(row)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(intent_id = %intent.id, error = %e, "Failed to log notification"),
            Err(_) => warn!(intent_id = %intent.id, "Timed out logging notification"),
        }
    }

    /// Persist a payment request, then email it. The row survives a failed
    /// send with status `failed`.
    pub async fn send_payment_request(&self, request: PaymentRequest) -> PaymentRequestOutcome {
        let row = match self.payment_request_row(&request) {
            Ok(row) => row,
            Err(e) => {
                return PaymentRequestOutcome {
                    success: false,
                    request_id: None,
                    error: Some(e.to_string()),
                }
            }
        };
        let saved = match tokio::time::timeout(self.timeout, self.store.insert_payment_request(row)).await {
            Ok(Ok(saved)) => saved,
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to save payment request");
                return PaymentRequestOutcome {
                    success: false,
                    request_id: None,
                    error: Some("Failed to save payment request".to_string()),
                };
            }
            Err(_) => {
                return PaymentRequestOutcome {
                    success: false,
                    request_id: None,
                    error: Some("Failed to save payment request".to_string()),
                }
            }
        };

        let amount = saved.amount.normalize().to_string();
        let display_name = saved
            .requester_name
            .clone()
            .unwrap_or_else(|| saved.requester_email.clone());
        let email = OutgoingEmail {
            to: saved.target_email.clone(),
            subject: format!("Payment request for ${amount} USDC from {display_name}"),
            app_url: self.app_url.to_string(),
            template_data: json!({
                "type": "payment_request",
                "requesterEmail": saved.requester_email,
                "requesterName": display_name,
                "targetEmail": saved.target_email,
                "amount": amount,
                "message": saved.message.clone().unwrap_or_else(|| "No message".to_string()),
                "paymentUrl": self.payment_url(&saved.requester_email, &amount).to_string(),
                "currentDate": long_timestamp(Utc::now()),
            }),
        };

        match self.deliver(&email).await {
            Ok(email_id) => {
                info!(request_id = %saved.id, email_id = %email_id, "Payment request sent");
                PaymentRequestOutcome {
                    success: true,
                    request_id: Some(saved.id),
                    error: None,
                }
            }
            Err(e) => {
                warn!(request_id = %saved.id, error = %e, "Payment request email failed");
                let update = self
                    .store
                    .update_payment_request_status(saved.id, DeliveryStatus::Failed);
                match tokio::time::timeout(self.timeout, update).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(request_id = %saved.id, error = %err, "Failed to mark payment request failed"),
                    Err(_) => warn!(request_id = %saved.id, "Timed out marking payment request failed"),
                }
                PaymentRequestOutcome {
                    success: false,
                    request_id: Some(saved.id),
                    error: Some(e.user_message()),
                }
            }
        }
    }

    fn payment_request_row(&self, request: &PaymentRequest) -> Result<PaymentRequestRow, NotifyError> {
        let requester_email = normalize_email(&request.requester_email);
        let target_email = normalize_email(&request.target_email);
        if !is_valid_email(&requester_email) || !is_valid_email(&target_email) {
            return Err(NotifyError::InvalidInput("Invalid email format".to_string()));
        }
        let base_units = parse_amount(&request.amount)
            .map_err(|e| NotifyError::InvalidInput(e.to_string()))?;
        Ok(PaymentRequestRow {
            id: Uuid::new_v4(),
            requester_email,
            requester_name: request
                .requester_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            requester_wallet: request.requester_wallet.trim().to_string(),
            target_email,
            amount: base_units_to_decimal(base_units),
            message: request
                .message
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string),
            status: DeliveryStatus::Sent,
            created_at: Utc::now(),
        })
    }
}
