// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Sponsor keypair for fee-sponsored ("gasless") transfers.
//!
//! Built once in `main` from configuration and shared by reference. A secret
//! that is present but malformed is a deployment error and stops startup;
//! a missing secret or a disabled flag only turns sponsorship off.

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use tracing::{info, warn};

use super::client::ChainRpc;
use super::types::{FeePayerInfo, LAMPORTS_PER_SOL, MIN_FEE_PAYER_BALANCE_LAMPORTS};

#[derive(Debug, thiserror::Error)]
pub enum FeePayerError {
    #[error("Fee payer is not configured")]
    NotConfigured,

    #[error("Invalid fee payer secret: {0}")]
    InvalidSecret(String),

    #[error("Failed to read fee payer balance: {0}")]
    Balance(String),
}

pub struct FeePayerProvisioner {
    enabled_flag: bool,
    keypair: Option<Keypair>,
}

impl FeePayerProvisioner {
    /// `secret` is a base58 64-byte keypair, or the JSON byte array written
    /// by `solana-keygen`.
    pub fn new(enabled_flag: bool, secret: Option<&str>) -> Result<Self, FeePayerError> {
        let keypair = match secret.map(str::trim).filter(|s| !s.is_empty()) {
            Some(secret) => Some(decode_keypair(secret)?),
            None => None,
        };
        let provisioner = Self {
            enabled_flag,
            keypair,
        };
        match (provisioner.is_enabled(), provisioner.pubkey()) {
            (true, Some(pubkey)) => info!(fee_payer = %pubkey, "Fee sponsorship enabled"),
            (false, Some(pubkey)) => {
                info!(fee_payer = %pubkey, "Fee payer key loaded but sponsorship disabled")
            }
            (_, None) if enabled_flag => {
                warn!("Fee sponsorship requested but no fee payer key configured")
            }
            _ => {}
        }
        Ok(provisioner)
    }

    pub fn disabled() -> Self {
        Self {
            enabled_flag: false,
            keypair: None,
        }
    }

    pub fn from_keypair(enabled_flag: bool, keypair: Keypair) -> Self {
        Self {
            enabled_flag,
            keypair: Some(keypair),
        }
    }

    /// Flag set AND key present.
    pub fn is_enabled(&self) -> bool {
        self.enabled_flag && self.keypair.is_some()
    }

    pub fn keypair(&self) -> Result<&Keypair, FeePayerError> {
        self.keypair.as_ref().ok_or(FeePayerError::NotConfigured)
    }

    pub fn pubkey(&self) -> Option<Pubkey> {
        self.keypair.as_ref().map(Keypair::pubkey)
    }

    /// Whether the sponsor can currently afford to pay fees.
    /// Any RPC failure reads as unavailable.
    pub async fn check_availability(&self, rpc: &dyn ChainRpc) -> bool {
        let Some(pubkey) = self.pubkey() else {
            return false;
        };
        match rpc.balance(&pubkey).await {
            Ok(lamports) => lamports >= MIN_FEE_PAYER_BALANCE_LAMPORTS,
            Err(e) => {
                warn!(error = %e, "Fee payer balance check failed");
                false
            }
        }
    }

    pub async fn info(&self, rpc: &dyn ChainRpc) -> Result<FeePayerInfo, FeePayerError> {
        let pubkey = self.pubkey().ok_or(FeePayerError::NotConfigured)?;
        let lamports = rpc
            .balance(&pubkey)
            .await
            .map_err(|e| FeePayerError::Balance(e.to_string()))?;
        Ok(FeePayerInfo {
            public_key: pubkey.to_string(),
            balance_lamports: lamports,
            balance_sol: lamports as f64 / LAMPORTS_PER_SOL as f64,
            enabled: self.is_enabled(),
            available: self.is_enabled() && lamports >= MIN_FEE_PAYER_BALANCE_LAMPORTS,
        })
    }
}

impl std::fmt::Debug for FeePayerProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeePayerProvisioner")
            .field("enabled_flag", &self.enabled_flag)
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

fn decode_keypair(secret: &str) -> Result<Keypair, FeePayerError> {
    let bytes: Vec<u8> = if secret.starts_with('[') {
        serde_json::from_str(secret).map_err(|e| FeePayerError::InvalidSecret(e.to_string()))?
    } else {
        bs58::decode(secret)
            .into_vec()
            .map_err(|e| FeePayerError::InvalidSecret(e.to_string()))?
    };
    if bytes.len() != 64 {
        return Err(FeePayerError::InvalidSecret(format!(
            "expected 64 bytes, got {}",
            bytes.len()
        )));
    }
    Keypair::from_bytes(&bytes).map_err(|e| FeePayerError::InvalidSecret(e.to_string()))
}
