// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Solana integration.
//!
//! This module provides functionality for:
//! - Reading USDC balances of wallet owners
//! - Building SPL token transfers, optionally fee-sponsored
//! - Submitting and confirming signed transactions

pub mod amount;
pub mod balance;
pub mod client;
pub mod fee_payer;
pub mod transactions;
pub mod types;

pub use amount::{parse_amount, AmountError};
pub use balance::BalanceReader;
pub use client::{ChainError, ChainRpc, SolanaRpc};
pub use fee_payer::{FeePayerError, FeePayerProvisioner};
pub use transactions::{FeeMode, PreparedTransfer, TransactionBuilder, TransferError, TransferRequest};
pub use types::*;
