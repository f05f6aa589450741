// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Send Orchestration
//!
//! Drives one "send USDC to an email" invocation:
//!
//! 1. Validate both fields before touching the network.
//! 2. Resolve the email through the directory.
//! 3. Registered recipient: build the transfer (sponsored when the fee payer
//!    is enabled and funded), have the wallet sign, submit, confirm.
//! 4. Otherwise: record a transfer intent and email an invitation. A failed
//!    lookup lands here too, with the lookup error kept on the outcome.
//!
//! Steps of one invocation are strictly sequential. Invocations share no
//! state except the last result per sender wallet. Balance is not reserved
//! across concurrent sends; two sends validated against the same balance
//! can both pass validation.
//!
//! The flow is also exposed split at the signing boundary
//! ([`SendOrchestrator::prepare`] / [`SendOrchestrator::submit_signed`]) for
//! clients whose wallet signs outside this process.

pub mod progress;
pub mod validate;

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::Transaction};
use spl_token::instruction::TokenInstruction;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub use progress::{ProgressReporter, SendProgress, SendState};
pub use validate::{validate, ValidSend, ValidationErrors};

use crate::blockchain::amount::{base_units_to_decimal, display_amount};
use crate::blockchain::transactions::{GENERIC_FAILURE_MESSAGE, TIMEOUT_MESSAGE};
use crate::blockchain::{
    BalanceReader, ChainError, ChainRpc, FeeMode, FeePayerProvisioner, PreparedTransfer,
    TransactionBuilder, TransferError, TransferRequest,
};
use crate::directory::EmailDirectory;
use crate::intents::{IntentError, NewTransferIntent, TransferIntentStore, INTENT_TTL_DAYS};
use crate::notify::{InvitationOutcome, NotificationDispatcher};
use crate::wallet::{ConnectedWallet, SignerError};

const UNSUPPORTED_WALLET_MESSAGE: &str = "Wallet not ready for USDC transactions";
const INTENT_FAILURE_MESSAGE: &str = "Failed to create transfer invitation. Please try again.";
const INVALID_REGISTERED_WALLET: &str = "INVALID_WALLET";

#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("Wallet not ready for USDC transactions")]
    UnsupportedWallet,

    #[error("Invalid signed transaction: {0}")]
    InvalidTransaction(String),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Intent(#[from] IntentError),
}

impl SendError {
    pub fn code(&self) -> &'static str {
        match self {
            SendError::Validation(_) => "VALIDATION_ERROR",
            SendError::UnsupportedWallet => "UNSUPPORTED_WALLET",
            SendError::InvalidTransaction(_) => "INVALID_TRANSACTION",
            SendError::Transfer(e) => e.code(),
            SendError::Intent(e) => e.code(),
        }
    }

    /// Message safe to show the sender.
    pub fn user_message(&self) -> String {
        match self {
            SendError::Validation(errors) => errors.to_string(),
            SendError::UnsupportedWallet => UNSUPPORTED_WALLET_MESSAGE.to_string(),
            SendError::InvalidTransaction(_) => GENERIC_FAILURE_MESSAGE.to_string(),
            SendError::Transfer(e) => e.user_message().to_string(),
            SendError::Intent(IntentError::Timeout) => TIMEOUT_MESSAGE.to_string(),
            SendError::Intent(_) => INTENT_FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SendError::Transfer(e) => e.is_retryable(),
            SendError::Intent(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<ChainError> for SendError {
    fn from(e: ChainError) -> Self {
        SendError::Transfer(e.into())
    }
}

impl From<SignerError> for SendError {
    fn from(e: SignerError) -> Self {
        SendError::Transfer(TransferError::Signing(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SendRequest {
    pub recipient_email: String,
    /// Human units, e.g. `"25.00"`.
    pub amount: String,
    /// Shown to the recipient as the sender of an invitation.
    #[serde(default)]
    pub sender_email: Option<String>,
    /// Sender balance in base units as last displayed to the user.
    #[serde(default)]
    pub known_balance: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SendPath {
    Direct,
    Intent,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SendOutcome {
    pub path: SendPath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_wallet: Option<String>,
    pub amount_base_units: u64,
    pub amount_display: String,
    pub sponsored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<InvitationOutcome>,
    /// Error code of the directory lookup, when it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_error: Option<String>,
    pub message: String,
}

/// First half of a split send.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PreparedSend {
    pub path: SendPath,
    /// Base64 bincode transaction awaiting the sender's signature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fee_payer: Option<String>,
    pub sponsored: bool,
    pub creates_recipient_account: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_wallet: Option<String>,
    pub amount_base_units: u64,
    /// Set when the intent path already completed the send.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<SendOutcome>,
}

/// Last terminal result for a sender wallet.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct LastSend {
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub finished_at: DateTime<Utc>,
}

enum Route {
    Direct(Pubkey),
    Intent { resolution_error: Option<String> },
}

/// Components the orchestrator drives.
pub struct SendServices {
    pub directory: Arc<EmailDirectory>,
    pub intents: Arc<TransferIntentStore>,
    pub notifier: Arc<NotificationDispatcher>,
    pub builder: Arc<TransactionBuilder>,
    pub fee_payer: Arc<FeePayerProvisioner>,
    pub rpc: Arc<dyn ChainRpc>,
    pub balances: Arc<BalanceReader>,
}

/// Sender wallets whose last result is kept; the oldest results go first.
const REMEMBERED_SENDERS: usize = 10_000;

pub struct SendOrchestrator {
    services: SendServices,
    timeout: Duration,
    last: Mutex<LruCache<String, LastSend>>,
}

impl SendOrchestrator {
    pub fn new(services: SendServices, timeout: Duration) -> Self {
        Self::with_capacity(services, timeout, REMEMBERED_SENDERS)
    }

    pub fn with_capacity(services: SendServices, timeout: Duration, capacity: usize) -> Self {
        Self {
            services,
            timeout,
            last: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    async fn bounded<T, E>(&self, fut: impl Future<Output = Result<T, E>>) -> Result<T, SendError>
    where
        SendError: From<E>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(SendError::from),
            Err(_) => Err(TransferError::Timeout.into()),
        }
    }

    /// Sponsored when the fee payer is enabled and can afford it.
    pub async fn choose_fee_mode(&self) -> FeeMode {
        let fee_payer = &self.services.fee_payer;
        if !fee_payer.is_enabled() {
            return FeeMode::SenderPays;
        }
        let check = fee_payer.check_availability(self.services.rpc.as_ref());
        match tokio::time::timeout(self.timeout, check).await {
            Ok(true) => FeeMode::Sponsored,
            Ok(false) => {
                warn!("Fee payer below minimum balance, sender pays fees");
                FeeMode::SenderPays
            }
            Err(_) => {
                warn!("Fee payer balance check timed out, sender pays fees");
                FeeMode::SenderPays
            }
        }
    }

    async fn resolve_route(&self, recipient_email: &str) -> Route {
        match self.services.directory.resolve(recipient_email).await {
            Ok(Some(wallet)) => match wallet.parse::<Pubkey>() {
                Ok(recipient) => Route::Direct(recipient),
                Err(_) => {
                    warn!(wallet = %wallet, "Registered wallet is not a valid address, falling back to transfer intent");
                    Route::Intent {
                        resolution_error: Some(INVALID_REGISTERED_WALLET.to_string()),
                    }
                }
            },
            Ok(None) => Route::Intent {
                resolution_error: None,
            },
            Err(e) => {
                warn!(error = %e, code = e.code(), "Recipient lookup failed, falling back to transfer intent");
                Route::Intent {
                    resolution_error: Some(e.code().to_string()),
                }
            }
        }
    }

    async fn build_direct(
        &self,
        sender: Pubkey,
        recipient: Pubkey,
        amount_base_units: u64,
    ) -> Result<PreparedTransfer, SendError> {
        let fee_mode = self.choose_fee_mode().await;
        let request = TransferRequest {
            sender,
            recipient,
            amount_base_units,
            fee_mode,
        };
        self.bounded(self.services.builder.build(request)).await
    }

    async fn submit(&self, rpc: &dyn ChainRpc, transaction: &Transaction) -> Result<Signature, SendError> {
        let signature = self.bounded(rpc.send_transaction(transaction)).await?;
        self.bounded(rpc.confirm_transaction(&signature)).await?;
        Ok(signature)
    }

    async fn create_intent(
        &self,
        sender_wallet: &Pubkey,
        sender_email: Option<&str>,
        valid: &ValidSend,
        resolution_error: Option<String>,
        progress: &dyn ProgressReporter,
    ) -> Result<SendOutcome, SendError> {
        progress.report(SendProgress::new(SendState::CreatingIntent, progress::CREATING_INTENT_MESSAGE));
        let intent = self
            .services
            .intents
            .create(NewTransferIntent {
                sender_wallet: sender_wallet.to_string(),
                sender_email: sender_email.map(str::to_string),
                recipient_email: valid.recipient_email.clone(),
                amount_base_units: valid.amount_base_units,
                creation_tx_hash: None,
            })
            .await?;

        progress.report(SendProgress::new(SendState::Submitting, "Sending invitation..."));
        let notification = self.services.notifier.send_invitation(&intent, sender_email).await;

        let amount_display = display_amount(intent.amount);
        let message = if notification.success {
            format!(
                "Invitation sent to {}. They have {INTENT_TTL_DAYS} days to claim {amount_display} USDC.",
                intent.recipient_email
            )
        } else {
            format!(
                "{amount_display} USDC is waiting for {}. The invitation email could not be sent.",
                intent.recipient_email
            )
        };

        Ok(SendOutcome {
            path: SendPath::Intent,
            signature: None,
            intent_id: Some(intent.id),
            recipient_email: Some(intent.recipient_email),
            recipient_wallet: None,
            amount_base_units: valid.amount_base_units,
            amount_display,
            sponsored: false,
            notification: Some(notification),
            resolution_error,
            message,
        })
    }

    fn direct_outcome(
        &self,
        signature: Signature,
        recipient_email: Option<String>,
        recipient_wallet: Option<String>,
        amount_base_units: u64,
        sponsored: bool,
    ) -> SendOutcome {
        let amount_display = display_amount(base_units_to_decimal(amount_base_units));
        let message = match &recipient_email {
            Some(email) => format!("Sent {amount_display} USDC to {email}"),
            None => format!("Sent {amount_display} USDC"),
        };
        SendOutcome {
            path: SendPath::Direct,
            signature: Some(signature.to_string()),
            intent_id: None,
            recipient_email,
            recipient_wallet,
            amount_base_units,
            amount_display,
            sponsored,
            notification: None,
            resolution_error: None,
            message,
        }
    }

    /// Run a full send with the wallet's own signer.
    pub async fn run(
        &self,
        wallet: &ConnectedWallet,
        request: SendRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<SendOutcome, SendError> {
        let result = self.run_inner(wallet, request, progress).await;
        self.finish(&wallet.address(), &result, progress);
        result
    }

    async fn run_inner(
        &self,
        wallet: &ConnectedWallet,
        request: SendRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<SendOutcome, SendError> {
        let solana = wallet.as_solana().ok_or(SendError::UnsupportedWallet)?;

        progress.report(SendProgress::new(SendState::Validating, "Checking details..."));
        let valid = validate(&request.recipient_email, &request.amount, request.known_balance)
            .map_err(SendError::Validation)?;

        progress.report(SendProgress::new(SendState::Resolving, progress::RESOLVING_MESSAGE));
        match self.resolve_route(&valid.recipient_email).await {
            Route::Direct(recipient) => {
                progress.report(SendProgress::new(SendState::BuildingDirect, progress::PREPARING_MESSAGE));
                let prepared = self
                    .build_direct(solana.address, recipient, valid.amount_base_units)
                    .await?;
                let signed = self
                    .bounded(solana.signer.sign_transaction(prepared.transaction))
                    .await?;

                progress.report(SendProgress::new(SendState::Submitting, progress::SENDING_MESSAGE));
                let signature = self.submit(solana.connection.as_ref(), &signed).await?;
                self.services.balances.invalidate(&solana.address);
                self.services.balances.invalidate(&recipient);
                info!(
                    sender = %solana.address,
                    recipient = %recipient,
                    signature = %signature,
                    amount = valid.amount_base_units,
                    sponsored = prepared.sponsored,
                    "Direct USDC transfer confirmed"
                );
                Ok(self.direct_outcome(
                    signature,
                    Some(valid.recipient_email),
                    Some(recipient.to_string()),
                    valid.amount_base_units,
                    prepared.sponsored,
                ))
            }
            Route::Intent { resolution_error } => {
                self.create_intent(
                    &solana.address,
                    request.sender_email.as_deref(),
                    &valid,
                    resolution_error,
                    progress,
                )
                .await
            }
        }
    }

    /// Validate, resolve, and either build a transfer for the caller to sign
    /// or complete the intent path outright.
    pub async fn prepare(&self, sender_wallet: &str, request: SendRequest) -> Result<PreparedSend, SendError> {
        let result = self.prepare_inner(sender_wallet, request).await;
        match &result {
            Ok(PreparedSend {
                outcome: Some(outcome),
                ..
            }) => self.record(sender_wallet, Ok(outcome)),
            Ok(_) => {}
            Err(e) => self.record(sender_wallet, Err(e)),
        }
        result
    }

    async fn prepare_inner(&self, sender_wallet: &str, request: SendRequest) -> Result<PreparedSend, SendError> {
        let sender = sender_wallet
            .trim()
            .parse::<Pubkey>()
            .map_err(|_| SendError::UnsupportedWallet)?;
        let valid = validate(&request.recipient_email, &request.amount, request.known_balance)
            .map_err(SendError::Validation)?;

        match self.resolve_route(&valid.recipient_email).await {
            Route::Direct(recipient) => {
                let prepared = self.build_direct(sender, recipient, valid.amount_base_units).await?;
                let bytes = bincode::serialize(&prepared.transaction)
                    .map_err(|e| TransferError::Instruction(e.to_string()))?;
                Ok(PreparedSend {
                    path: SendPath::Direct,
                    transaction: Some(Base64::encode_string(&bytes)),
                    fee_payer: Some(prepared.fee_payer.to_string()),
                    sponsored: prepared.sponsored,
                    creates_recipient_account: prepared.creates_recipient_account,
                    recipient_wallet: Some(recipient.to_string()),
                    amount_base_units: valid.amount_base_units,
                    outcome: None,
                })
            }
            Route::Intent { resolution_error } => {
                let outcome = self
                    .create_intent(
                        &sender,
                        request.sender_email.as_deref(),
                        &valid,
                        resolution_error,
                        &(),
                    )
                    .await?;
                Ok(PreparedSend {
                    path: SendPath::Intent,
                    transaction: None,
                    fee_payer: None,
                    sponsored: false,
                    creates_recipient_account: false,
                    recipient_wallet: None,
                    amount_base_units: valid.amount_base_units,
                    outcome: Some(outcome),
                })
            }
        }
    }

    /// Submit a transaction from [`prepare`](Self::prepare) after the sender
    /// signed it.
    pub async fn submit_signed(
        &self,
        sender_wallet: &str,
        transaction: &str,
        recipient_email: Option<&str>,
    ) -> Result<SendOutcome, SendError> {
        let result = self
            .submit_signed_inner(sender_wallet, transaction, recipient_email)
            .await;
        self.record(sender_wallet, result.as_ref());
        result
    }

    async fn submit_signed_inner(
        &self,
        sender_wallet: &str,
        transaction: &str,
        recipient_email: Option<&str>,
    ) -> Result<SendOutcome, SendError> {
        let sender = sender_wallet
            .trim()
            .parse::<Pubkey>()
            .map_err(|_| SendError::UnsupportedWallet)?;
        let bytes = Base64::decode_vec(transaction.trim())
            .map_err(|e| SendError::InvalidTransaction(e.to_string()))?;
        let tx: Transaction =
            bincode::deserialize(&bytes).map_err(|e| SendError::InvalidTransaction(e.to_string()))?;

        let required = usize::from(tx.message.header.num_required_signatures);
        let signed_by_sender = tx
            .message
            .account_keys
            .get(..required)
            .is_some_and(|signers| signers.contains(&sender));
        if !signed_by_sender {
            return Err(SendError::InvalidTransaction("sender is not a signer".to_string()));
        }
        tx.verify()
            .map_err(|e| SendError::InvalidTransaction(e.to_string()))?;
        let amount_base_units = self.usdc_transfer_amount(&tx)?;

        let sponsored = tx.message.account_keys.first() != Some(&sender);
        let signature = self.submit(self.services.rpc.as_ref(), &tx).await?;
        self.services.balances.invalidate(&sender);
        info!(
            sender = %sender,
            signature = %signature,
            amount = amount_base_units,
            sponsored,
            "Signed USDC transfer confirmed"
        );
        Ok(self.direct_outcome(
            signature,
            recipient_email.map(str::to_string),
            None,
            amount_base_units,
            sponsored,
        ))
    }

    /// Amount of the single `transfer_checked` of the configured mint.
    fn usdc_transfer_amount(&self, tx: &Transaction) -> Result<u64, SendError> {
        let keys = &tx.message.account_keys;
        tx.message
            .instructions
            .iter()
            .filter(|ix| keys.get(usize::from(ix.program_id_index)) == Some(&spl_token::id()))
            .find_map(|ix| {
                let mint = ix.accounts.get(1).and_then(|i| keys.get(usize::from(*i)))?;
                match TokenInstruction::unpack(&ix.data) {
                    Ok(TokenInstruction::TransferChecked { amount, .. })
                        if mint == self.services.builder.mint() =>
                    {
                        Some(amount)
                    }
                    _ => None,
                }
            })
            .ok_or_else(|| SendError::InvalidTransaction("not a USDC transfer".to_string()))
    }

    fn finish(&self, wallet: &str, result: &Result<SendOutcome, SendError>, progress: &dyn ProgressReporter) {
        match result {
            Ok(outcome) => progress.report(SendProgress::new(SendState::Succeeded, outcome.message.clone())),
            Err(e) => progress.report(SendProgress::new(SendState::Failed, e.user_message())),
        }
        self.record(wallet, result.as_ref());
    }

    fn record(&self, wallet: &str, result: Result<&SendOutcome, &SendError>) {
        let entry = match result {
            Ok(outcome) => LastSend {
                succeeded: true,
                signature: outcome.signature.clone(),
                intent_id: outcome.intent_id,
                error: None,
                code: None,
                finished_at: Utc::now(),
            },
            Err(e) => {
                warn!(wallet = %wallet, code = e.code(), error = %e, "Send failed");
                LastSend {
                    succeeded: false,
                    signature: None,
                    intent_id: None,
                    error: Some(e.user_message()),
                    code: Some(e.code().to_string()),
                    finished_at: Utc::now(),
                }
            }
        };
        if let Ok(mut last) = self.last.lock() {
            last.put(wallet.trim().to_string(), entry);
        }
    }

    /// Last terminal result for `wallet`.
    pub fn last_result(&self, wallet: &str) -> Option<LastSend> {
        self.last.lock().ok()?.peek(wallet.trim()).cloned()
    }

    /// Drop a failed last result. Returns whether one was cleared.
    pub fn clear_error(&self, wallet: &str) -> bool {
        let Ok(mut last) = self.last.lock() else {
            return false;
        };
        match last.peek(wallet.trim()) {
            Some(entry) if !entry.succeeded => last.pop(wallet.trim()).is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::client::mock::MockChain;
    use crate::blockchain::types::LAMPORTS_PER_SOL;
    use crate::directory::EmailHasher;
    use crate::notify::sender::mock::RecordingSender;
    use crate::storage::testing::InstrumentedStore;
    use crate::storage::{DeliveryStatus, IntentStatus, LocalStore, RecordStore};
    use crate::wallet::{EthereumWallet, KeypairSigner, SolanaWallet};
    use solana_sdk::signature::{Keypair, Signer};
    use spl_associated_token_account::get_associated_token_address;
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;
    use url::Url;

    struct Fixture {
        chain: Arc<MockChain>,
        store: Arc<LocalStore>,
        directory: Arc<EmailDirectory>,
        email: Arc<RecordingSender>,
        orchestrator: SendOrchestrator,
        mint: Pubkey,
        sponsor: Pubkey,
    }

    struct Options {
        sponsored: bool,
        directory_store: Option<Arc<dyn RecordStore>>,
        email: RecordingSender,
        timeout: Duration,
        history: usize,
    }

    impl Default for Options {
        fn default() -> Self {
            Self {
                sponsored: false,
                directory_store: None,
                email: RecordingSender::new(),
                timeout: Duration::from_secs(5),
                history: REMEMBERED_SENDERS,
            }
        }
    }

    fn fixture(options: Options) -> Fixture {
        let chain = Arc::new(MockChain::new());
        let store = Arc::new(LocalStore::in_memory().unwrap());
        let mint = Pubkey::new_unique();
        let sponsor_key = Keypair::new();
        let sponsor = sponsor_key.pubkey();
        chain.set_lamports(sponsor, LAMPORTS_PER_SOL);

        let directory_store = options
            .directory_store
            .unwrap_or_else(|| store.clone() as Arc<dyn RecordStore>);
        let directory = Arc::new(EmailDirectory::new(
            directory_store,
            EmailHasher::new(b"test-key").unwrap(),
            options.timeout,
        ));
        let email = Arc::new(options.email);
        let fee_payer = Arc::new(FeePayerProvisioner::from_keypair(options.sponsored, sponsor_key));
        let rpc: Arc<dyn ChainRpc> = chain.clone();

        let services = SendServices {
            directory: directory.clone(),
            intents: Arc::new(TransferIntentStore::new(store.clone(), &mint, options.timeout, false)),
            notifier: Arc::new(NotificationDispatcher::new(
                store.clone(),
                Some(email.clone()),
                Url::parse("http://localhost:5173").unwrap(),
                options.timeout,
            )),
            builder: Arc::new(TransactionBuilder::new(rpc.clone(), fee_payer.clone(), mint)),
            fee_payer,
            rpc: rpc.clone(),
            balances: Arc::new(BalanceReader::new(rpc, mint)),
        };

        Fixture {
            chain,
            store,
            directory,
            email,
            orchestrator: SendOrchestrator::with_capacity(services, options.timeout, options.history),
            mint,
            sponsor,
        }
    }

    impl Fixture {
        fn wallet(&self, keypair: Keypair) -> ConnectedWallet {
            ConnectedWallet::Solana(SolanaWallet::new(
                Arc::new(KeypairSigner::new(keypair)),
                self.chain.clone(),
            ))
        }

        async fn register(&self, email: &str) -> Pubkey {
            let wallet = Pubkey::new_unique();
            self.directory.register(email, &wallet.to_string()).await.unwrap();
            self.chain
                .add_account(get_associated_token_address(&wallet, &self.mint));
            wallet
        }
    }

    fn request(email: &str, amount: &str) -> SendRequest {
        SendRequest {
            recipient_email: email.to_string(),
            amount: amount.to_string(),
            sender_email: None,
            known_balance: Some(100_000_000),
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SendProgress>) -> Vec<SendProgress> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn registered_recipient_gets_direct_transfer() {
        let fx = fixture(Options::default());
        let bob = fx.register("bob@example.com").await;
        let wallet = fx.wallet(Keypair::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = fx
            .orchestrator
            .run(&wallet, request("bob@example.com", "25.00"), &tx)
            .await
            .unwrap();

        assert_eq!(outcome.path, SendPath::Direct);
        assert!(outcome.signature.is_some());
        assert_eq!(outcome.recipient_wallet, Some(bob.to_string()));
        assert_eq!(outcome.message, "Sent 25.00 USDC to bob@example.com");
        assert!(!outcome.sponsored);

        let sent = fx.chain.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.instructions.len(), 1);
        drop(sent);

        let states: Vec<SendState> = drain(&mut rx).iter().map(|p| p.state).collect();
        assert_eq!(
            states,
            vec![
                SendState::Validating,
                SendState::Resolving,
                SendState::BuildingDirect,
                SendState::Submitting,
                SendState::Succeeded
            ]
        );
        assert!(fx.orchestrator.last_result(&wallet.address()).unwrap().succeeded);
    }

    #[tokio::test]
    async fn sponsored_send_uses_fee_payer() {
        let fx = fixture(Options {
            sponsored: true,
            ..Options::default()
        });
        fx.register("bob@example.com").await;
        let wallet = fx.wallet(Keypair::new());

        let outcome = fx
            .orchestrator
            .run(&wallet, request("bob@example.com", "5"), &())
            .await
            .unwrap();
        assert!(outcome.sponsored);
        let sent = fx.chain.sent.lock().unwrap();
        assert_eq!(sent[0].message.account_keys[0], fx.sponsor);
    }

    #[tokio::test]
    async fn underfunded_sponsor_falls_back_to_sender_pays() {
        let fx = fixture(Options {
            sponsored: true,
            ..Options::default()
        });
        fx.chain.set_lamports(fx.sponsor, 1);
        assert_eq!(fx.orchestrator.choose_fee_mode().await, FeeMode::SenderPays);
    }

    #[tokio::test]
    async fn sponsored_send_to_recipient_without_token_account_fails() {
        let fx = fixture(Options {
            sponsored: true,
            ..Options::default()
        });
        let bob = Pubkey::new_unique();
        fx.directory
            .register("bob@example.com", &bob.to_string())
            .await
            .unwrap();
        let wallet = fx.wallet(Keypair::new());

        let err = fx
            .orchestrator
            .run(&wallet, request("bob@example.com", "5"), &())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "RECIPIENT_ACCOUNT_MISSING");
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
        assert_eq!(fx.chain.sent_count(), 0);
    }

    #[tokio::test]
    async fn unregistered_recipient_gets_intent_and_invitation() {
        let fx = fixture(Options::default());
        let wallet = fx.wallet(Keypair::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = fx
            .orchestrator
            .run(&wallet, request("newuser@example.com", "10.00"), &tx)
            .await
            .unwrap();

        assert_eq!(outcome.path, SendPath::Intent);
        assert_eq!(fx.chain.sent_count(), 0);
        assert!(outcome.notification.as_ref().unwrap().success);
        assert!(outcome.resolution_error.is_none());

        let intent = fx
            .store
            .get_intent(outcome.intent_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.status, IntentStatus::Pending);
        assert_eq!(intent.amount, base_units_to_decimal(10_000_000));
        assert_eq!(intent.expires_at - intent.created_at, chrono::Duration::days(30));
        assert_eq!(fx.email.count(), 1);

        let messages: Vec<String> = drain(&mut rx).into_iter().map(|p| p.message).collect();
        assert!(messages.contains(&progress::CREATING_INTENT_MESSAGE.to_string()));
    }

    #[tokio::test]
    async fn failed_invitation_does_not_fail_the_send() {
        let fx = fixture(Options {
            email: RecordingSender::failing(),
            ..Options::default()
        });
        let wallet = fx.wallet(Keypair::new());

        let outcome = fx
            .orchestrator
            .run(&wallet, request("newuser@example.com", "10"), &())
            .await
            .unwrap();
        let intent_id = outcome.intent_id.unwrap();
        assert!(!outcome.notification.unwrap().success);

        let log = fx.store.list_notifications(intent_id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn lookup_failure_degrades_to_intent_path() {
        let broken = Arc::new(InstrumentedStore::new());
        broken.unavailable.store(true, Ordering::SeqCst);
        let fx = fixture(Options {
            directory_store: Some(broken),
            ..Options::default()
        });
        let wallet = fx.wallet(Keypair::new());

        let outcome = fx
            .orchestrator
            .run(&wallet, request("bob@example.com", "1"), &())
            .await
            .unwrap();
        assert_eq!(outcome.path, SendPath::Intent);
        assert_eq!(outcome.resolution_error.as_deref(), Some("DATABASE_ERROR"));
        let body = serde_json::to_string(&outcome).unwrap();
        assert!(!body.contains("connection refused"));
    }

    #[tokio::test]
    async fn validation_errors_stop_before_network() {
        let fx = fixture(Options::default());
        let wallet = fx.wallet(Keypair::new());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = fx
            .orchestrator
            .run(&wallet, request("not-an-email", "abc"), &tx)
            .await
            .unwrap_err();
        let SendError::Validation(errors) = &err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(errors.email.is_some() && errors.amount.is_some());

        let states: Vec<SendState> = drain(&mut rx).iter().map(|p| p.state).collect();
        assert_eq!(states, vec![SendState::Validating, SendState::Failed]);

        let address = wallet.address();
        assert!(!fx.orchestrator.last_result(&address).unwrap().succeeded);
        assert!(fx.orchestrator.clear_error(&address));
        assert!(fx.orchestrator.last_result(&address).is_none());
        assert!(!fx.orchestrator.clear_error(&address));
    }

    #[test]
    fn last_results_are_bounded() {
        let fx = fixture(Options {
            history: 2,
            ..Options::default()
        });
        let wallets: Vec<String> = (0..3).map(|_| Pubkey::new_unique().to_string()).collect();
        for wallet in &wallets {
            fx.orchestrator.record(wallet, Err(&SendError::UnsupportedWallet));
        }

        assert!(fx.orchestrator.last_result(&wallets[0]).is_none());
        for wallet in &wallets[1..] {
            let last = fx.orchestrator.last_result(wallet).unwrap();
            assert_eq!(last.code.as_deref(), Some("UNSUPPORTED_WALLET"));
        }
    }

    #[tokio::test]
    async fn non_solana_wallet_is_unsupported() {
        let fx = fixture(Options::default());
        let wallet = ConnectedWallet::Ethereum(EthereumWallet {
            address: "0x742d35Cc6634C0532925a3b844Bc454e4438f44e".to_string(),
        });
        let err = fx
            .orchestrator
            .run(&wallet, request("bob@example.com", "1"), &())
            .await
            .unwrap_err();
        assert!(matches!(err, SendError::UnsupportedWallet));
    }

    #[tokio::test]
    async fn stalled_submission_times_out_as_retryable() {
        let fx = fixture(Options {
            timeout: Duration::from_millis(100),
            ..Options::default()
        });
        fx.register("bob@example.com").await;
        fx.chain.stall_send.store(true, Ordering::SeqCst);
        let wallet = fx.wallet(Keypair::new());

        let err = fx
            .orchestrator
            .run(&wallet, request("bob@example.com", "1"), &())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "TIMEOUT");
        assert!(err.is_retryable());
        assert_eq!(err.user_message(), TIMEOUT_MESSAGE);
    }

    #[tokio::test]
    async fn chain_rejection_is_reported_generically() {
        let fx = fixture(Options::default());
        fx.register("bob@example.com").await;
        fx.chain.fail_send.store(true, Ordering::SeqCst);
        let wallet = fx.wallet(Keypair::new());

        let err = fx
            .orchestrator
            .run(&wallet, request("bob@example.com", "1"), &())
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
        assert!(!err.user_message().contains("insufficient"));
    }

    #[tokio::test]
    async fn prepare_then_submit_signed_round_trip() {
        let fx = fixture(Options {
            sponsored: true,
            ..Options::default()
        });
        fx.register("bob@example.com").await;
        let sender = Keypair::new();
        let sender_address = sender.pubkey().to_string();

        let prepared = fx
            .orchestrator
            .prepare(&sender_address, request("bob@example.com", "12.5"))
            .await
            .unwrap();
        assert_eq!(prepared.path, SendPath::Direct);
        assert!(prepared.sponsored);

        let bytes = Base64::decode_vec(prepared.transaction.as_deref().unwrap()).unwrap();
        let mut tx: Transaction = bincode::deserialize(&bytes).unwrap();

        // Unsigned by the sender: refused.
        let unsigned = Base64::encode_string(&bincode::serialize(&tx).unwrap());
        let err = fx
            .orchestrator
            .submit_signed(&sender_address, &unsigned, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSACTION");

        let blockhash = tx.message.recent_blockhash;
        tx.try_partial_sign(&[&sender], blockhash).unwrap();
        let signed = Base64::encode_string(&bincode::serialize(&tx).unwrap());

        let outcome = fx
            .orchestrator
            .submit_signed(&sender_address, &signed, Some("bob@example.com"))
            .await
            .unwrap();
        assert_eq!(outcome.amount_base_units, 12_500_000);
        assert!(outcome.sponsored);
        assert_eq!(outcome.message, "Sent 12.50 USDC to bob@example.com");
        assert_eq!(fx.chain.sent_count(), 1);
    }

    #[tokio::test]
    async fn prepare_for_unregistered_recipient_completes_intent() {
        let fx = fixture(Options::default());
        let sender = Pubkey::new_unique().to_string();

        let prepared = fx
            .orchestrator
            .prepare(&sender, request("newuser@example.com", "3"))
            .await
            .unwrap();
        assert_eq!(prepared.path, SendPath::Intent);
        assert!(prepared.transaction.is_none());
        let outcome = prepared.outcome.unwrap();
        assert!(outcome.intent_id.is_some());
        assert_eq!(
            fx.orchestrator.last_result(&sender).unwrap().intent_id,
            outcome.intent_id
        );
    }
}
