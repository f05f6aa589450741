// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Proof of wallet control for mutating routes.
//!
//! The email itself is vouched for by the auth provider. What this module
//! checks is that the caller holds the wallet it acts for:
//!
//! 1. `POST /v1/auth/challenge` issues a single-use nonce for a wallet.
//! 2. The client signs [`challenge_message`] with the wallet (ed25519).
//! 3. The request carries `X-Wallet-Address`, `X-Wallet-Nonce` and
//!    `X-Wallet-Signature` (base58); [`WalletAuth`] verifies and consumes it.
//!
//! ```rust,ignore
//! async fn cancel(WalletAuth(wallet): WalletAuth, ...) -> Result<..., ApiError> {
//!     // `wallet` signed this request's challenge
//! }
//! ```

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

pub const WALLET_HEADER: &str = "x-wallet-address";
pub const NONCE_HEADER: &str = "x-wallet-nonce";
pub const SIGNATURE_HEADER: &str = "x-wallet-signature";

/// How long an issued challenge stays usable.
pub const CHALLENGE_TTL: Duration = Duration::from_secs(300);

/// Outstanding challenges kept; the oldest are dropped first.
const MAX_OUTSTANDING: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Wallet signature headers are required")]
    MissingProof,

    #[error("Invalid wallet address")]
    InvalidWallet,

    #[error("Unknown or already used challenge")]
    UnknownChallenge,

    #[error("Challenge has expired")]
    ChallengeExpired,

    #[error("Wallet signature is invalid")]
    InvalidSignature,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingProof => "MISSING_WALLET_PROOF",
            AuthError::InvalidWallet => "INVALID_WALLET",
            AuthError::UnknownChallenge => "UNKNOWN_CHALLENGE",
            AuthError::ChallengeExpired => "CHALLENGE_EXPIRED",
            AuthError::InvalidSignature => "INVALID_SIGNATURE",
        }
    }
}

/// Text the wallet signs.
pub fn challenge_message(wallet: &Pubkey, nonce: &str) -> String {
    format!("Mailpay wallet verification\nWallet: {wallet}\nNonce: {nonce}")
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Challenge {
    pub wallet: String,
    pub nonce: String,
    /// Exact bytes to sign, UTF-8.
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

struct Issued {
    wallet: Pubkey,
    issued_at: Instant,
}

/// Single-use nonces keyed by value.
pub struct ChallengeStore {
    issued: Mutex<LruCache<String, Issued>>,
    ttl: Duration,
}

impl ChallengeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            issued: Mutex::new(LruCache::new(
                NonZeroUsize::new(MAX_OUTSTANDING).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    pub fn issue(&self, wallet: &Pubkey) -> Challenge {
        let nonce = Uuid::new_v4().simple().to_string();
        if let Ok(mut issued) = self.issued.lock() {
            issued.put(
                nonce.clone(),
                Issued {
                    wallet: *wallet,
                    issued_at: Instant::now(),
                },
            );
        }
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());
        Challenge {
            wallet: wallet.to_string(),
            message: challenge_message(wallet, &nonce),
            nonce,
            expires_at: Utc::now() + ttl,
        }
    }

    /// Check `signature` over the challenge for `nonce`. The nonce is spent
    /// whatever the outcome.
    pub fn verify(&self, wallet: &Pubkey, nonce: &str, signature: &str) -> Result<(), AuthError> {
        let issued = self
            .issued
            .lock()
            .ok()
            .and_then(|mut issued| issued.pop(nonce))
            .ok_or(AuthError::UnknownChallenge)?;
        if issued.wallet != *wallet {
            return Err(AuthError::UnknownChallenge);
        }
        if issued.issued_at.elapsed() >= self.ttl {
            return Err(AuthError::ChallengeExpired);
        }
        let signature = Signature::from_str(signature).map_err(|_| AuthError::InvalidSignature)?;
        if !signature.verify(wallet.as_ref(), challenge_message(wallet, nonce).as_bytes()) {
            return Err(AuthError::InvalidSignature);
        }
        Ok(())
    }
}

/// Extractor for a wallet whose holder signed this request's challenge.
pub struct WalletAuth(pub Pubkey);

impl WalletAuth {
    /// 403 unless the proven wallet is `claimed`.
    pub fn require(&self, claimed: &str) -> Result<(), ApiError> {
        if self.0.to_string() == claimed.trim() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Signed wallet does not match the request"))
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AuthError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingProof)
}

impl FromRequestParts<AppState> for WalletAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let wallet = Pubkey::from_str(header(parts, WALLET_HEADER)?).map_err(|_| AuthError::InvalidWallet)?;
        let nonce = header(parts, NONCE_HEADER)?;
        let signature = header(parts, SIGNATURE_HEADER)?;
        state.challenges.verify(&wallet, nonce, signature)?;
        Ok(WalletAuth(wallet))
    }
}
