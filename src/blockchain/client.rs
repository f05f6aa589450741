// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Solana JSON-RPC client for blockchain interactions.

use std::time::Duration;

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::Transaction,
};
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Account as TokenAccount;

/// Interval between signature status polls while confirming.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Chain operations the service depends on.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn latest_blockhash(&self) -> Result<Hash, ChainError>;

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ChainError>;

    /// Native balance in lamports.
    async fn balance(&self, address: &Pubkey) -> Result<u64, ChainError>;

    /// Amount held by an SPL token account, `None` if the account does not exist.
    async fn token_account_balance(&self, token_account: &Pubkey) -> Result<Option<u64>, ChainError>;

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, ChainError>;

    /// Resolve once the signature reaches the client's commitment level.
    async fn confirm_transaction(&self, signature: &Signature) -> Result<(), ChainError>;
}

/// [`ChainRpc`] over a Solana RPC node.
pub struct SolanaRpc {
    client: RpcClient,
    commitment: CommitmentConfig,
    max_confirm_polls: u32,
}

impl SolanaRpc {
    pub fn new(rpc_url: &str, timeout: Duration) -> Result<Self, ChainError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| ChainError::InvalidRpcUrl(e.to_string()))?;
        let commitment = CommitmentConfig::confirmed();
        let client = RpcClient::new_with_timeout_and_commitment(url.to_string(), timeout, commitment);
        let polls = timeout.as_millis() / CONFIRM_POLL_INTERVAL.as_millis();
        Ok(Self {
            client,
            commitment,
            max_confirm_polls: u32::try_from(polls).unwrap_or(u32::MAX).max(1),
        })
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<Hash, ChainError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, ChainError> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;
        Ok(response.value.is_some())
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64, ChainError> {
        self.client
            .get_balance(address)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))
    }

    async fn token_account_balance(&self, token_account: &Pubkey) -> Result<Option<u64>, ChainError> {
        let response = self
            .client
            .get_account_with_commitment(token_account, self.commitment)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;
        let Some(account) = response.value else {
            return Ok(None);
        };
        let state = TokenAccount::unpack(&account.data)
            .map_err(|e| ChainError::RpcError(format!("invalid token account data: {e}")))?;
        Ok(Some(state.amount))
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature, ChainError> {
        self.client
            .send_transaction(transaction)
            .await
            .map_err(|e| ChainError::TransactionFailed(e.to_string()))
    }

    async fn confirm_transaction(&self, signature: &Signature) -> Result<(), ChainError> {
        for _ in 0..self.max_confirm_polls {
            let status = self
                .client
                .get_signature_status_with_commitment(signature, self.commitment)
                .await
                .map_err(|e| ChainError::RpcError(e.to_string()))?;
            match status {
                Some(Ok(())) => return Ok(()),
                Some(Err(e)) => return Err(ChainError::TransactionFailed(e.to_string())),
                None => tokio::time::sleep(CONFIRM_POLL_INTERVAL).await,
            }
        }
        Err(ChainError::Unconfirmed(signature.to_string()))
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid RPC URL: {0}")]
    InvalidRpcUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("RPC error: {0}")]
    RpcError(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Transaction {0} was not confirmed in time")]
    Unconfirmed(String),
}
