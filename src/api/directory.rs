// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Email directory endpoints and the auth-success registration hook.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    auth::WalletAuth,
    directory::{normalize_email, DirectoryError, EmailWalletMapping},
    error::ApiError,
    registration::{AuthSuccessEvent, RegistrationOutcome},
    state::AppState,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub wallet_address: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ResolveQuery {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ResolveResponse {
    pub email: String,
    /// Registered wallet, absent when the email has none.
    pub wallet_address: Option<String>,
    pub registered: bool,
}

#[utoipa::path(
    post,
    path = "/v1/directory/register",
    request_body = RegisterRequest,
    tag = "Directory",
    responses(
        (status = 201, description = "Mapping registered or already present", body = EmailWalletMapping),
        (status = 400, description = "Malformed email or wallet"),
        (status = 409, description = "Email or wallet bound elsewhere")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<EmailWalletMapping>), ApiError> {
    let mapping = state
        .directory
        .register(&request.email, &request.wallet_address)
        .await?;
    Ok((StatusCode::CREATED, Json(mapping)))
}

#[utoipa::path(
    get,
    path = "/v1/directory/resolve",
    params(ResolveQuery),
    tag = "Directory",
    responses(
        (status = 200, body = ResolveResponse),
        (status = 400, description = "Malformed email")
    )
)]
pub async fn resolve(
    State(state): State<AppState>,
    Query(query): Query<ResolveQuery>,
) -> Result<Json<ResolveResponse>, ApiError> {
    let wallet_address = state.directory.resolve(&query.email).await?;
    Ok(Json(ResolveResponse {
        email: normalize_email(&query.email),
        registered: wallet_address.is_some(),
        wallet_address,
    }))
}

#[utoipa::path(
    put,
    path = "/v1/directory/wallet",
    request_body = RegisterRequest,
    params(
        ("x-wallet-address" = String, Header, description = "Currently registered wallet"),
        ("x-wallet-nonce" = String, Header, description = "Nonce from /v1/auth/challenge"),
        ("x-wallet-signature" = String, Header, description = "Base58 signature of the challenge")
    ),
    tag = "Directory",
    responses(
        (status = 200, body = EmailWalletMapping),
        (status = 401, description = "Missing or invalid wallet signature"),
        (status = 403, description = "Signer is not the registered wallet"),
        (status = 404, description = "Email not registered"),
        (status = 409, description = "Wallet bound to another email")
    )
)]
pub async fn update_wallet(
    State(state): State<AppState>,
    auth: WalletAuth,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<EmailWalletMapping>, ApiError> {
    let current = state
        .directory
        .lookup(&request.email)
        .await?
        .ok_or(DirectoryError::NotFound)?;
    auth.require(&current.wallet_address)?;

    let mapping = state
        .directory
        .update_wallet(&request.email, &request.wallet_address)
        .await?;
    Ok(Json(mapping))
}

/// Auth provider callback. Incomplete events answer 200 with a skip reason.
#[utoipa::path(
    post,
    path = "/v1/auth/events",
    request_body = AuthSuccessEvent,
    tag = "Directory",
    responses(
        (status = 200, body = RegistrationOutcome),
        (status = 409, description = "Email or wallet bound elsewhere")
    )
)]
pub async fn auth_event(
    State(state): State<AppState>,
    Json(event): Json<AuthSuccessEvent>,
) -> Result<Json<RegistrationOutcome>, ApiError> {
    Ok(Json(state.registration.handle(&event).await?))
}
