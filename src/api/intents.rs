// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    auth::WalletAuth,
    error::ApiError,
    intents::{TransferIntent, UnclaimedSummary},
    notify::InvitationOutcome,
    state::AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
pub struct RecipientQuery {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClaimRequest {
    pub claimant_wallet: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CancelRequest {
    pub sender_wallet: String,
}

async fn find(state: &AppState, id: Uuid) -> Result<TransferIntent, ApiError> {
    state
        .intents
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Transfer not found"))
}

/// Pending, unexpired intents for a recipient, newest first, with their total.
#[utoipa::path(
    get,
    path = "/v1/intents",
    params(RecipientQuery),
    tag = "Intents",
    responses(
        (status = 200, body = UnclaimedSummary),
        (status = 400, description = "Malformed email")
    )
)]
pub async fn list_unclaimed(
    State(state): State<AppState>,
    Query(query): Query<RecipientQuery>,
) -> Result<Json<UnclaimedSummary>, ApiError> {
    Ok(Json(state.intents.unclaimed_summary(&query.email).await?))
}

#[utoipa::path(
    get,
    path = "/v1/intents/sent/{wallet}",
    params(("wallet" = String, Path, description = "Sender wallet address")),
    tag = "Intents",
    responses((status = 200, body = [TransferIntent]))
)]
pub async fn list_sent(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<Vec<TransferIntent>>, ApiError> {
    Ok(Json(state.intents.list_sent(wallet.trim()).await?))
}

#[utoipa::path(
    get,
    path = "/v1/intents/{intent_id}",
    params(("intent_id" = Uuid, Path, description = "Transfer intent id")),
    tag = "Intents",
    responses(
        (status = 200, body = TransferIntent),
        (status = 404, description = "Unknown intent")
    )
)]
pub async fn get_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<Uuid>,
) -> Result<Json<TransferIntent>, ApiError> {
    Ok(Json(find(&state, intent_id).await?))
}

#[utoipa::path(
    post,
    path = "/v1/intents/{intent_id}/claim",
    params(("intent_id" = Uuid, Path, description = "Transfer intent id")),
    request_body = ClaimRequest,
    tag = "Intents",
    responses(
        (status = 200, body = TransferIntent),
        (status = 404, description = "Unknown intent"),
        (status = 409, description = "Intent is no longer pending"),
        (status = 501, description = "Claiming is disabled")
    )
)]
pub async fn claim_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<Uuid>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<TransferIntent>, ApiError> {
    Ok(Json(
        state.intents.claim(intent_id, &request.claimant_wallet).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/v1/intents/{intent_id}/cancel",
    params(
        ("intent_id" = Uuid, Path, description = "Transfer intent id"),
        ("x-wallet-address" = String, Header, description = "Sender wallet"),
        ("x-wallet-nonce" = String, Header, description = "Nonce from /v1/auth/challenge"),
        ("x-wallet-signature" = String, Header, description = "Base58 signature of the challenge")
    ),
    request_body = CancelRequest,
    tag = "Intents",
    responses(
        (status = 200, body = TransferIntent),
        (status = 401, description = "Missing or invalid wallet signature"),
        (status = 403, description = "Caller is not the sender"),
        (status = 409, description = "Intent is no longer pending")
    )
)]
pub async fn cancel_intent(
    State(state): State<AppState>,
    auth: WalletAuth,
    Path(intent_id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<TransferIntent>, ApiError> {
    auth.require(&request.sender_wallet)?;
    Ok(Json(
        state.intents.cancel(intent_id, &request.sender_wallet).await?,
    ))
}

/// Re-send the invitation email for a pending intent.
#[utoipa::path(
    post,
    path = "/v1/intents/{intent_id}/remind",
    params(("intent_id" = Uuid, Path, description = "Transfer intent id")),
    tag = "Intents",
    responses(
        (status = 200, body = InvitationOutcome),
        (status = 404, description = "Unknown intent")
    )
)]
pub async fn remind_intent(
    State(state): State<AppState>,
    Path(intent_id): Path<Uuid>,
) -> Result<Json<InvitationOutcome>, ApiError> {
    let intent = find(&state, intent_id).await?;
    Ok(Json(state.notifier.send_reminder(&intent).await))
}
