// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! USDC transfer construction.
//!
//! ## Fee modes
//!
//! | Mode | Fee payer | Recipient token account missing |
//! |------|-----------|---------------------------------|
//! | `SenderPays` | sender | created in the same transaction, rent paid by sender |
//! | `Sponsored` | sponsor key, partially signed here | build fails |
//!
//! The sender's signature slot is always left empty for the wallet.

use std::sync::Arc;

use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::Message,
    pubkey::Pubkey,
    signature::{Signature, Signer},
    transaction::Transaction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account,
};
use tracing::{debug, info};

use super::client::{ChainError, ChainRpc};
use super::fee_payer::{FeePayerError, FeePayerProvisioner};
use super::types::{FeeEstimate, USDC_DECIMALS};

/// Message shown for every transaction failure except timeouts.
pub const GENERIC_FAILURE_MESSAGE: &str = "Transaction failed. Please try again.";

/// Message shown when a chain call exceeded its deadline.
pub const TIMEOUT_MESSAGE: &str = "The network took too long to respond. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeMode {
    SenderPays,
    Sponsored,
}

#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub sender: Pubkey,
    pub recipient: Pubkey,
    pub amount_base_units: u64,
    pub fee_mode: FeeMode,
}

/// A transfer ready for the sender's signature.
#[derive(Debug, Clone)]
pub struct PreparedTransfer {
    pub transaction: Transaction,
    pub fee_payer: Pubkey,
    pub sponsored: bool,
    pub creates_recipient_account: bool,
    pub sender_token_account: Pubkey,
    pub recipient_token_account: Pubkey,
    pub blockhash: Hash,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransferError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Recipient does not have a USDC account")]
    RecipientAccountMissing,

    #[error("Fee sponsorship unavailable: {0}")]
    SponsorUnavailable(String),

    #[error("Failed to build instruction: {0}")]
    Instruction(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Confirmation failed: {0}")]
    Confirmation(String),

    #[error("Chain request timed out")]
    Timeout,
}

impl TransferError {
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Timeout => "TIMEOUT",
            TransferError::RecipientAccountMissing => "RECIPIENT_ACCOUNT_MISSING",
            _ => "TRANSACTION_FAILED",
        }
    }

    /// What the end user sees. Technical detail stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            TransferError::Timeout => TIMEOUT_MESSAGE,
            _ => GENERIC_FAILURE_MESSAGE,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Timeout | TransferError::Rpc(_))
    }
}

impl From<ChainError> for TransferError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::InvalidAddress(a) => TransferError::InvalidAddress(a),
            ChainError::TransactionFailed(m) => TransferError::Submission(m),
            ChainError::Unconfirmed(m) => TransferError::Confirmation(m),
            other => TransferError::Rpc(other.to_string()),
        }
    }
}

impl From<FeePayerError> for TransferError {
    fn from(e: FeePayerError) -> Self {
        TransferError::SponsorUnavailable(e.to_string())
    }
}

pub struct TransactionBuilder {
    rpc: Arc<dyn ChainRpc>,
    fee_payer: Arc<FeePayerProvisioner>,
    mint: Pubkey,
}

impl TransactionBuilder {
    pub fn new(rpc: Arc<dyn ChainRpc>, fee_payer: Arc<FeePayerProvisioner>, mint: Pubkey) -> Self {
        Self {
            rpc,
            fee_payer,
            mint,
        }
    }

    pub fn mint(&self) -> &Pubkey {
        &self.mint
    }

    /// Associated USDC account of `owner`.
    pub fn token_account(&self, owner: &Pubkey) -> Pubkey {
        get_associated_token_address(owner, &self.mint)
    }

    pub async fn build(&self, request: TransferRequest) -> Result<PreparedTransfer, TransferError> {
        let sender_token_account = self.token_account(&request.sender);
        let recipient_token_account = self.token_account(&request.recipient);

        let recipient_exists = self.rpc.account_exists(&recipient_token_account).await?;

        let sponsor = match request.fee_mode {
            FeeMode::Sponsored => {
                if !recipient_exists {
                    return Err(TransferError::RecipientAccountMissing);
                }
                Some(self.fee_payer.keypair()?)
            }
            FeeMode::SenderPays => None,
        };

        let mut instructions: Vec<Instruction> = Vec::with_capacity(2);
        let creates_recipient_account = !recipient_exists;
        if creates_recipient_account {
            debug!(
                recipient_token_account = %recipient_token_account,
                "Recipient token account missing, creating it"
            );
            instructions.push(create_associated_token_account(
                &request.sender,
                &request.recipient,
                &self.mint,
                &spl_token::id(),
            ));
        }

        instructions.push(
            spl_token::instruction::transfer_checked(
                &spl_token::id(),
                &sender_token_account,
                &self.mint,
                &recipient_token_account,
                &request.sender,
                &[],
                request.amount_base_units,
                USDC_DECIMALS,
            )
            .map_err(|e| TransferError::Instruction(e.to_string()))?,
        );

        let blockhash = self.rpc.latest_blockhash().await?;

        let fee_payer = sponsor
            .map(|keypair| keypair.pubkey())
            .unwrap_or(request.sender);
        let message = Message::new(&instructions, Some(&fee_payer));
        let mut transaction = Transaction::new_unsigned(message);
        transaction.message.recent_blockhash = blockhash;

        if let Some(keypair) = sponsor {
            transaction
                .try_partial_sign(&[keypair], blockhash)
                .map_err(|e| TransferError::Signing(e.to_string()))?;
        }

        info!(
            sender = %request.sender,
            recipient = %request.recipient,
            amount = request.amount_base_units,
            sponsored = sponsor.is_some(),
            creates_recipient_account,
            "Built USDC transfer"
        );

        Ok(PreparedTransfer {
            transaction,
            fee_payer,
            sponsored: sponsor.is_some(),
            creates_recipient_account,
            sender_token_account,
            recipient_token_account,
            blockhash,
        })
    }

    /// Network cost of sending to `recipient` without sponsorship.
    pub async fn estimate_fee(&self, recipient: &Pubkey) -> Result<FeeEstimate, TransferError> {
        let exists = self.rpc.account_exists(&self.token_account(recipient)).await?;
        Ok(FeeEstimate::new(!exists))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::client::mock::MockChain;
    use solana_sdk::signature::Keypair;
    use std::sync::atomic::Ordering;

    struct Fixture {
        chain: Arc<MockChain>,
        builder: TransactionBuilder,
        sponsor: Pubkey,
        mint: Pubkey,
    }

    fn fixture() -> Fixture {
        let chain = Arc::new(MockChain::new());
        let sponsor_key = Keypair::new();
        let sponsor = sponsor_key.pubkey();
        let mint = Pubkey::new_unique();
        let builder = TransactionBuilder::new(
            chain.clone(),
            Arc::new(FeePayerProvisioner::from_keypair(true, sponsor_key)),
            mint,
        );
        Fixture {
            chain,
            builder,
            sponsor,
            mint,
        }
    }

    fn request(fee_mode: FeeMode) -> TransferRequest {
        TransferRequest {
            sender: Pubkey::new_unique(),
            recipient: Pubkey::new_unique(),
            amount_base_units: 25_000_000,
            fee_mode,
        }
    }

    #[tokio::test]
    async fn existing_recipient_gets_single_transfer_instruction() {
        let fx = fixture();
        let req = request(FeeMode::SenderPays);
        fx.chain.add_account(fx.builder.token_account(&req.recipient));

        let prepared = fx.builder.build(req.clone()).await.unwrap();
        let message = &prepared.transaction.message;
        assert_eq!(message.instructions.len(), 1);
        assert!(!prepared.creates_recipient_account);
        assert_eq!(prepared.fee_payer, req.sender);
        assert_eq!(message.account_keys[0], req.sender);

        let program = message.account_keys[message.instructions[0].program_id_index as usize];
        assert_eq!(program, spl_token::id());
        assert_eq!(
            prepared.recipient_token_account,
            get_associated_token_address(&req.recipient, &fx.mint)
        );
    }

    #[tokio::test]
    async fn sender_pays_mode_creates_missing_account() {
        let fx = fixture();
        let req = request(FeeMode::SenderPays);

        let prepared = fx.builder.build(req).await.unwrap();
        let message = &prepared.transaction.message;
        assert_eq!(message.instructions.len(), 2);
        assert!(prepared.creates_recipient_account);
        let program = message.account_keys[message.instructions[0].program_id_index as usize];
        assert_eq!(program, spl_associated_token_account::id());
        // Nothing signed yet; the wallet supplies the only signature.
        assert!(prepared
            .transaction
            .signatures
            .iter()
            .all(|s| *s == Signature::default()));
    }

    #[tokio::test]
    async fn sponsored_mode_fails_when_recipient_account_missing() {
        let fx = fixture();
        let err = fx.builder.build(request(FeeMode::Sponsored)).await.unwrap_err();
        assert!(matches!(err, TransferError::RecipientAccountMissing));
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn sponsored_mode_is_partially_signed_by_sponsor() {
        let fx = fixture();
        let req = request(FeeMode::Sponsored);
        fx.chain.add_account(fx.builder.token_account(&req.recipient));

        let prepared = fx.builder.build(req.clone()).await.unwrap();
        let tx = &prepared.transaction;
        assert!(prepared.sponsored);
        assert_eq!(prepared.fee_payer, fx.sponsor);
        assert_eq!(tx.message.account_keys[0], fx.sponsor);
        assert_eq!(tx.signatures.len(), 2);
        assert_ne!(tx.signatures[0], Signature::default());
        // Sender slot still empty.
        assert_eq!(tx.signatures[1], Signature::default());
        assert_eq!(tx.message.account_keys[1], req.sender);
    }

    #[tokio::test]
    async fn sponsored_mode_without_key_is_unavailable() {
        let chain = Arc::new(MockChain::new());
        let builder = TransactionBuilder::new(
            chain.clone(),
            Arc::new(FeePayerProvisioner::disabled()),
            Pubkey::new_unique(),
        );
        let req = request(FeeMode::Sponsored);
        chain.add_account(builder.token_account(&req.recipient));

        let err = builder.build(req).await.unwrap_err();
        assert!(matches!(err, TransferError::SponsorUnavailable(_)));
    }

    #[tokio::test]
    async fn rpc_failure_collapses_to_generic_message() {
        let fx = fixture();
        fx.chain.fail_blockhash.store(true, Ordering::SeqCst);
        let err = fx.builder.build(request(FeeMode::SenderPays)).await.unwrap_err();
        assert!(matches!(err, TransferError::Rpc(_)));
        assert_eq!(err.user_message(), GENERIC_FAILURE_MESSAGE);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn fee_estimate_depends_on_recipient_account() {
        let fx = fixture();
        let recipient = Pubkey::new_unique();
        assert_eq!(fx.builder.estimate_fee(&recipient).await.unwrap().total_lamports, 2_044_280);
        fx.chain.add_account(fx.builder.token_account(&recipient));
        assert_eq!(fx.builder.estimate_fee(&recipient).await.unwrap().total_lamports, 5_000);
    }
}
