// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared application state.
//!
//! Every service is built once at startup and shared behind an `Arc`; the
//! state itself is cheap to clone into handlers.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};
use url::Url;

use crate::account::AccountService;
use crate::auth::{ChallengeStore, CHALLENGE_TTL};
use crate::blockchain::{
    BalanceReader, ChainError, ChainRpc, FeePayerError, FeePayerProvisioner, SolanaRpc,
    TransactionBuilder,
};
use crate::config::{AppConfig, StoreConfig};
use crate::directory::{EmailDirectory, EmailHasher};
use crate::intents::TransferIntentStore;
use crate::notify::sender::{EmailSender, HttpEmailFunction};
use crate::notify::{NotificationDispatcher, NotifyError};
use crate::registration::RegistrationHandler;
use crate::send::{SendOrchestrator, SendServices};
use crate::storage::{LocalStore, RecordStore, RestStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Failed to open record store: {0}")]
    Store(#[from] StorageError),

    #[error("Invalid chain settings: {0}")]
    Chain(#[from] ChainError),

    #[error("Invalid fee payer settings: {0}")]
    FeePayer(#[from] FeePayerError),

    #[error("Invalid email function settings: {0}")]
    Email(#[from] NotifyError),

    #[error("Invalid email hash key")]
    HashKey,
}

/// Already-constructed backends the services are wired over.
pub struct StateParts {
    pub store: Arc<dyn RecordStore>,
    pub rpc: Arc<dyn ChainRpc>,
    pub fee_payer: FeePayerProvisioner,
    pub email: Option<Arc<dyn EmailSender>>,
    pub mint: Pubkey,
    pub app_url: Url,
    pub hasher: EmailHasher,
    pub timeout: Duration,
    pub claims_enabled: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub rpc: Arc<dyn ChainRpc>,
    pub directory: Arc<EmailDirectory>,
    pub intents: Arc<TransferIntentStore>,
    pub notifier: Arc<NotificationDispatcher>,
    pub fee_payer: Arc<FeePayerProvisioner>,
    pub builder: Arc<TransactionBuilder>,
    pub balances: Arc<BalanceReader>,
    pub sends: Arc<SendOrchestrator>,
    pub registration: Arc<RegistrationHandler>,
    pub account: Arc<AccountService>,
    pub challenges: Arc<ChallengeStore>,
    pub timeout: Duration,
}

impl AppState {
    pub fn new(parts: StateParts) -> Self {
        let StateParts {
            store,
            rpc,
            fee_payer,
            email,
            mint,
            app_url,
            hasher,
            timeout,
            claims_enabled,
        } = parts;

        let fee_payer = Arc::new(fee_payer);
        let directory = Arc::new(EmailDirectory::new(store.clone(), hasher, timeout));
        let intents = Arc::new(TransferIntentStore::new(
            store.clone(),
            &mint,
            timeout,
            claims_enabled,
        ));
        let notifier = Arc::new(NotificationDispatcher::new(
            store.clone(),
            email,
            app_url,
            timeout,
        ));
        let builder = Arc::new(TransactionBuilder::new(rpc.clone(), fee_payer.clone(), mint));
        let balances = Arc::new(BalanceReader::new(rpc.clone(), mint));
        let sends = Arc::new(SendOrchestrator::new(
            SendServices {
                directory: directory.clone(),
                intents: intents.clone(),
                notifier: notifier.clone(),
                builder: builder.clone(),
                fee_payer: fee_payer.clone(),
                rpc: rpc.clone(),
                balances: balances.clone(),
            },
            timeout,
        ));
        let registration = Arc::new(RegistrationHandler::new(directory.clone()));
        let account = Arc::new(AccountService::new(
            store.clone(),
            directory.clone(),
            intents.clone(),
            timeout,
        ));

        Self {
            store,
            rpc,
            directory,
            intents,
            notifier,
            fee_payer,
            builder,
            balances,
            sends,
            registration,
            account,
            challenges: Arc::new(ChallengeStore::new(CHALLENGE_TTL)),
            timeout,
        }
    }

    /// Open the configured backends and wire the services over them.
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let timeout = config.external_call_timeout;

        let store: Arc<dyn RecordStore> = match &config.store {
            StoreConfig::Rest { url, api_key } => {
                info!(url = %url, "Using hosted REST record store");
                Arc::new(RestStore::new(url, api_key.clone(), timeout)?)
            }
            StoreConfig::LocalFile(path) => {
                info!(path = %path.display(), "Using local record store");
                Arc::new(LocalStore::open(path)?)
            }
            StoreConfig::InMemory => {
                warn!("No DATA_DIR or STORE_URL set, records will not survive a restart");
                Arc::new(LocalStore::in_memory()?)
            }
        };

        let rpc: Arc<dyn ChainRpc> = Arc::new(SolanaRpc::new(&config.chain.rpc_url, timeout)?);

        let fee_payer =
            FeePayerProvisioner::new(config.fee_payer_enabled, config.fee_payer_secret.as_deref())?;
        match fee_payer.pubkey() {
            Some(key) => info!(fee_payer = %key, enabled = fee_payer.is_enabled(), "Fee payer loaded"),
            None => info!("No fee payer configured, senders pay their own fees"),
        }

        let email: Option<Arc<dyn EmailSender>> = match &config.email_function {
            Some(function) => Some(Arc::new(HttpEmailFunction::new(
                function.url.clone(),
                function.api_key.clone(),
                timeout,
            )?)),
            None => {
                warn!("EMAIL_FUNCTION_URL not set, invitation emails are disabled");
                None
            }
        };

        if config.email_hash_key.is_none() {
            warn!("EMAIL_HASH_KEY not set, using the development key");
        }
        let hasher = EmailHasher::new(config.email_hash_key()).map_err(|_| StartupError::HashKey)?;

        Ok(Self::new(StateParts {
            store,
            rpc,
            fee_payer,
            email,
            mint: config.chain.usdc_mint,
            app_url: config.app_url.clone(),
            hasher,
            timeout,
            claims_enabled: config.claims_enabled,
        }))
    }
}
