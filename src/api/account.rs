// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    account::{AccountSummary, DeletionResult},
    auth::WalletAuth,
    earn::EarnProjection,
    error::ApiError,
    state::AppState,
};

#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema)]
pub struct AccountQuery {
    pub email: String,
    pub wallet: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EarnQuery {
    /// USDC principal in human units; empty projects zero.
    #[serde(default)]
    pub amount: String,
}

#[utoipa::path(
    get,
    path = "/v1/account/summary",
    params(AccountQuery),
    tag = "Account",
    responses(
        (status = 200, body = AccountSummary),
        (status = 400, description = "Missing or malformed email or wallet")
    )
)]
pub async fn account_summary(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<AccountSummary>, ApiError> {
    Ok(Json(state.account.summary(&query.email, &query.wallet).await?))
}

#[utoipa::path(
    post,
    path = "/v1/account/delete",
    request_body = AccountQuery,
    params(
        ("x-wallet-address" = String, Header, description = "Wallet being deleted"),
        ("x-wallet-nonce" = String, Header, description = "Nonce from /v1/auth/challenge"),
        ("x-wallet-signature" = String, Header, description = "Base58 signature of the challenge")
    ),
    tag = "Account",
    responses(
        (status = 200, body = DeletionResult),
        (status = 401, description = "Missing or invalid wallet signature"),
        (status = 403, description = "Signer does not own the wallet or email")
    )
)]
pub async fn delete_account(
    State(state): State<AppState>,
    auth: WalletAuth,
    Json(request): Json<AccountQuery>,
) -> Result<Json<DeletionResult>, ApiError> {
    auth.require(&request.wallet)?;
    Ok(Json(state.account.delete(&request.email, &request.wallet).await?))
}

#[utoipa::path(
    get,
    path = "/v1/earn/estimate",
    params(EarnQuery),
    tag = "Account",
    responses(
        (status = 200, body = EarnProjection),
        (status = 400, description = "Malformed amount")
    )
)]
pub async fn earn_estimate(Query(query): Query<EarnQuery>) -> Result<Json<EarnProjection>, ApiError> {
    Ok(Json(EarnProjection::parse(&query.amount)?))
}
