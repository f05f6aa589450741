// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! USDC balance reads for wallet owners.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;

use super::amount::format_base_units;
use super::client::{ChainError, ChainRpc};
use super::types::{TokenBalance, USDC_DECIMALS, USDC_SYMBOL};
use crate::storage::BalanceCache;

const CACHE_CAPACITY: usize = 1_000;
const CACHE_TTL: Duration = Duration::from_secs(10);

pub struct BalanceReader {
    rpc: Arc<dyn ChainRpc>,
    mint: Pubkey,
    cache: BalanceCache,
}

impl BalanceReader {
    pub fn new(rpc: Arc<dyn ChainRpc>, mint: Pubkey) -> Self {
        Self {
            rpc,
            mint,
            cache: BalanceCache::new(CACHE_CAPACITY, CACHE_TTL),
        }
    }

    /// Base units held by `owner`'s associated token account. An owner
    /// without a token account holds zero.
    pub async fn usdc_balance(&self, owner: &Pubkey) -> Result<u64, ChainError> {
        let key = owner.to_string();
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached);
        }
        let token_account = get_associated_token_address(owner, &self.mint);
        let amount = self
            .rpc
            .token_account_balance(&token_account)
            .await?
            .unwrap_or(0);
        self.cache.put(&key, amount);
        Ok(amount)
    }

    pub async fn token_balance(&self, owner: &Pubkey) -> Result<TokenBalance, ChainError> {
        let raw = self.usdc_balance(owner).await?;
        Ok(TokenBalance {
            address: owner.to_string(),
            symbol: USDC_SYMBOL.to_string(),
            balance_raw: raw,
            balance_formatted: format_base_units(raw),
            decimals: USDC_DECIMALS,
            mint: self.mint.to_string(),
        })
    }

    pub fn invalidate(&self, owner: &Pubkey) {
        self.cache.invalidate(&owner.to_string());
    }
}
