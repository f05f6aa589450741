// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blockchain types and constants.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use utoipa::ToSchema;

pub use solana_sdk::native_token::LAMPORTS_PER_SOL;

/// Fractional digits of the USDC mint.
pub const USDC_DECIMALS: u8 = 6;

/// Token symbol recorded on transfer intents.
pub const USDC_SYMBOL: &str = "USDC";

/// Minimum sponsor balance before sponsored sends are offered (0.01 SOL).
pub const MIN_FEE_PAYER_BALANCE_LAMPORTS: u64 = 10_000_000;

/// Base signature fee of a single-signer transaction.
pub const BASE_FEE_LAMPORTS: u64 = 5_000;

/// Rent-exempt minimum of an SPL token account (165 bytes).
pub const TOKEN_ACCOUNT_RENT_LAMPORTS: u64 = 2_039_280;

/// Chain settings resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub usdc_mint: Pubkey,
}

/// Token balance information.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenBalance {
    /// Owner wallet address
    pub address: String,
    /// Token symbol
    pub symbol: String,
    /// Balance in base units
    pub balance_raw: u64,
    /// Balance formatted with decimals
    pub balance_formatted: String,
    /// Number of decimals
    pub decimals: u8,
    /// Mint address
    pub mint: String,
}

/// Sponsor account status.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FeePayerInfo {
    pub public_key: String,
    pub balance_lamports: u64,
    pub balance_sol: f64,
    pub enabled: bool,
    pub available: bool,
}

/// Estimated network cost of a transfer, in lamports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct FeeEstimate {
    pub base_fee_lamports: u64,
    pub account_creation_lamports: u64,
    pub total_lamports: u64,
}

impl FeeEstimate {
    pub fn new(needs_account: bool) -> Self {
        let account_creation_lamports = if needs_account {
            TOKEN_ACCOUNT_RENT_LAMPORTS
        } else {
            0
        };
        Self {
            base_fee_lamports: BASE_FEE_LAMPORTS,
            account_creation_lamports,
            total_lamports: BASE_FEE_LAMPORTS + account_creation_lamports,
        }
    }
}
