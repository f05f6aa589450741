// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Mailpay - Email-addressed USDC transfers on Solana
//!
//! Senders pay an email address. A registered recipient gets a direct SPL
//! transfer (optionally with a sponsored fee); an unregistered one gets a
//! durable transfer intent and an invitation email.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `directory` - Email to wallet directory
//! - `intents` - Transfer intents for unregistered recipients
//! - `notify` - Invitation and payment-request emails
//! - `blockchain` - Solana RPC, fee sponsorship, transfer building
//! - `send` - Send orchestration
//! - `storage` - Record store backends (redb, hosted REST)

pub mod account;
pub mod api;
pub mod auth;
pub mod blockchain;
pub mod config;
pub mod directory;
pub mod earn;
pub mod error;
pub mod intents;
pub mod notify;
pub mod registration;
pub mod send;
pub mod state;
pub mod storage;
pub mod telemetry;
pub mod wallet;
