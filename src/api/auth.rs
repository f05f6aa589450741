// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::str::FromStr;

use axum::{extract::State, Json};
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use utoipa::ToSchema;

use crate::{
    auth::{AuthError, Challenge},
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ChallengeRequest {
    pub wallet: String,
}

/// Issue a single-use message for the wallet to sign.
#[utoipa::path(
    post,
    path = "/v1/auth/challenge",
    request_body = ChallengeRequest,
    tag = "Auth",
    responses(
        (status = 200, body = Challenge),
        (status = 401, description = "Malformed wallet address")
    )
)]
pub async fn issue_challenge(
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<Challenge>, ApiError> {
    let wallet = Pubkey::from_str(request.wallet.trim()).map_err(|_| AuthError::InvalidWallet)?;
    Ok(Json(state.challenges.issue(&wallet)))
}
