// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Read-only chain views: balances, fee estimates and sponsor status.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    blockchain::{FeeEstimate, FeePayerInfo, TokenBalance},
    directory::parse_wallet,
    error::ApiError,
    state::AppState,
};

/// USDC balance of a wallet. Served from a short-lived cache.
#[utoipa::path(
    get,
    path = "/v1/balances/{address}",
    params(("address" = String, Path, description = "Owner wallet address")),
    tag = "Chain",
    responses(
        (status = 200, body = TokenBalance),
        (status = 400, description = "Malformed address"),
        (status = 503, description = "Blockchain network unavailable")
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<TokenBalance>, ApiError> {
    let owner = parse_wallet(&address)?;
    Ok(Json(state.balances.token_balance(&owner).await?))
}

/// Network cost of a sender-paid transfer to `recipient`.
#[utoipa::path(
    get,
    path = "/v1/fee-estimate/{recipient}",
    params(("recipient" = String, Path, description = "Recipient wallet address")),
    tag = "Chain",
    responses(
        (status = 200, body = FeeEstimate),
        (status = 400, description = "Malformed address")
    )
)]
pub async fn get_fee_estimate(
    State(state): State<AppState>,
    Path(recipient): Path<String>,
) -> Result<Json<FeeEstimate>, ApiError> {
    let recipient = parse_wallet(&recipient)?;
    Ok(Json(state.builder.estimate_fee(&recipient).await?))
}

#[utoipa::path(
    get,
    path = "/v1/fee-payer",
    tag = "Chain",
    responses(
        (status = 200, body = FeePayerInfo),
        (status = 404, description = "No fee payer configured")
    )
)]
pub async fn get_fee_payer(State(state): State<AppState>) -> Result<Json<FeePayerInfo>, ApiError> {
    Ok(Json(state.fee_payer.info(state.rpc.as_ref()).await?))
}
