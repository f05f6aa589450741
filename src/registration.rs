// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Directory registration driven by the auth provider's success event.
//!
//! The event is validated into a typed registration before anything touches
//! the directory. Events without an authenticated user, an email, or a Solana
//! wallet are skipped, not failed.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::directory::{normalize_email, DirectoryError, EmailDirectory, EmailWalletMapping};
use crate::wallet::WalletChain;

/// Auth-success payload with every field the provider may omit.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthSuccessEvent {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    /// Chain tag of the primary wallet, e.g. `"SOL"`.
    #[serde(default)]
    pub chain: Option<String>,
    #[serde(default)]
    pub is_authenticated: bool,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotAuthenticated,
    MissingEmail,
    MissingWallet,
    NotSolanaWallet,
}

/// An event that carries everything registration needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub wallet_address: String,
}

impl TryFrom<&AuthSuccessEvent> for Registration {
    type Error = SkipReason;

    fn try_from(event: &AuthSuccessEvent) -> Result<Self, Self::Error> {
        if !event.is_authenticated {
            return Err(SkipReason::NotAuthenticated);
        }
        let email = event
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(SkipReason::MissingEmail)?;
        let wallet_address = event
            .wallet_address
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .ok_or(SkipReason::MissingWallet)?;
        let is_solana = event
            .chain
            .as_deref()
            .and_then(WalletChain::from_tag)
            .is_some_and(|c| c == WalletChain::Solana);
        if !is_solana {
            return Err(SkipReason::NotSolanaWallet);
        }
        Ok(Self {
            email: email.to_string(),
            wallet_address: wallet_address.to_string(),
        })
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    Registered { mapping: EmailWalletMapping },
    AlreadyRegistered,
    Skipped { reason: SkipReason },
}

/// Email-wallet pairs remembered as registered. Older pairs fall out and
/// are checked against the directory again.
const REMEMBERED_REGISTRATIONS: usize = 10_000;

pub struct RegistrationHandler {
    directory: Arc<EmailDirectory>,
    completed: Mutex<LruCache<String, ()>>,
}

impl RegistrationHandler {
    pub fn new(directory: Arc<EmailDirectory>) -> Self {
        Self::with_capacity(directory, REMEMBERED_REGISTRATIONS)
    }

    pub fn with_capacity(directory: Arc<EmailDirectory>, capacity: usize) -> Self {
        Self {
            directory,
            completed: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    fn key(registration: &Registration) -> String {
        format!(
            "{}-{}",
            normalize_email(&registration.email),
            registration.wallet_address
        )
    }

    fn is_completed(&self, key: &str) -> bool {
        self.completed
            .lock()
            .map(|mut done| done.get(key).is_some())
            .unwrap_or(false)
    }

    /// Register the pair carried by `event`. A pair that registered once in
    /// this process is not sent to the directory again; a failed attempt
    /// leaves no trace and can be retried.
    pub async fn handle(&self, event: &AuthSuccessEvent) -> Result<RegistrationOutcome, DirectoryError> {
        let registration = match Registration::try_from(event) {
            Ok(r) => r,
            Err(reason) => {
                debug!(reason = ?reason, "Skipping registration for auth event");
                return Ok(RegistrationOutcome::Skipped { reason });
            }
        };

        let key = Self::key(&registration);
        if self.is_completed(&key) {
            return Ok(RegistrationOutcome::AlreadyRegistered);
        }

        match self
            .directory
            .register(&registration.email, &registration.wallet_address)
            .await
        {
            Ok(mapping) => {
                if let Ok(mut done) = self.completed.lock() {
                    done.put(key, ());
                }
                info!(wallet = %mapping.wallet_address, "Registered wallet from auth event");
                Ok(RegistrationOutcome::Registered { mapping })
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "Registration from auth event failed");
                Err(e)
            }
        }
    }
}
