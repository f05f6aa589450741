// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Connected wallet capabilities.
//!
//! The auth provider hands the service a wallet of some chain. Only Solana
//! wallets can drive a USDC send; other chains are carried so callers can
//! report an unsupported wallet instead of guessing from the address shape.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    transaction::Transaction,
};
use utoipa::ToSchema;

use crate::blockchain::ChainRpc;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SignerError {
    #[error("Signature request was rejected: {0}")]
    Rejected(String),

    #[error("Signing failed: {0}")]
    Failed(String),
}

/// Signs transactions on behalf of the wallet owner.
///
/// Implementations add the owner's signature and must keep any signature
/// already present (a sponsor may have signed first).
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    async fn sign_transaction(&self, transaction: Transaction) -> Result<Transaction, SignerError>;
}

/// Signer holding the owner's key in process.
pub struct KeypairSigner {
    keypair: Keypair,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }
}

#[async_trait]
impl TransactionSigner for KeypairSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_transaction(&self, mut transaction: Transaction) -> Result<Transaction, SignerError> {
        let blockhash = transaction.message.recent_blockhash;
        transaction
            .try_partial_sign(&[&self.keypair], blockhash)
            .map_err(|e| SignerError::Failed(e.to_string()))?;
        Ok(transaction)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WalletChain {
    Solana,
    Ethereum,
}

impl WalletChain {
    /// Parse the chain tag reported by the auth provider ("SOL", "solana", "EVM", ...).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "sol" | "solana" => Some(WalletChain::Solana),
            "eth" | "evm" | "ethereum" => Some(WalletChain::Ethereum),
            _ => None,
        }
    }
}

pub struct SolanaWallet {
    pub address: Pubkey,
    pub signer: Arc<dyn TransactionSigner>,
    pub connection: Arc<dyn ChainRpc>,
}

impl SolanaWallet {
    pub fn new(signer: Arc<dyn TransactionSigner>, connection: Arc<dyn ChainRpc>) -> Self {
        Self {
            address: signer.pubkey(),
            signer,
            connection,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EthereumWallet {
    pub address: String,
}

pub enum ConnectedWallet {
    Solana(SolanaWallet),
    Ethereum(EthereumWallet),
}

impl ConnectedWallet {
    pub fn address(&self) -> String {
        match self {
            ConnectedWallet::Solana(w) => w.address.to_string(),
            ConnectedWallet::Ethereum(w) => w.address.clone(),
        }
    }

    pub fn chain(&self) -> WalletChain {
        match self {
            ConnectedWallet::Solana(_) => WalletChain::Solana,
            ConnectedWallet::Ethereum(_) => WalletChain::Ethereum,
        }
    }

    pub fn signer(&self) -> Option<Arc<dyn TransactionSigner>> {
        match self {
            ConnectedWallet::Solana(w) => Some(w.signer.clone()),
            ConnectedWallet::Ethereum(_) => None,
        }
    }

    pub fn connection(&self) -> Option<Arc<dyn ChainRpc>> {
        match self {
            ConnectedWallet::Solana(w) => Some(w.connection.clone()),
            ConnectedWallet::Ethereum(_) => None,
        }
    }

    pub fn as_solana(&self) -> Option<&SolanaWallet> {
        match self {
            ConnectedWallet::Solana(w) => Some(w),
            ConnectedWallet::Ethereum(_) => None,
        }
    }
}
