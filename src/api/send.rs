// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Send flow split at the signing boundary.
//!
//! `prepare` either returns an unsigned transfer for the browser wallet to
//! sign, or completes the intent path outright. `submit` takes the signed
//! transfer back.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::ApiError,
    send::{LastSend, PreparedSend, SendOutcome, SendRequest},
    state::AppState,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct PrepareSendRequest {
    /// Base58 address of the connected Solana wallet.
    pub sender_wallet: String,
    #[serde(flatten)]
    pub send: SendRequest,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitSendRequest {
    pub sender_wallet: String,
    /// Base64 bincode transaction signed by the sender.
    pub transaction: String,
    /// Echoed into the success message.
    #[serde(default)]
    pub recipient_email: Option<String>,
}

#[utoipa::path(
    post,
    path = "/v1/send/prepare",
    request_body = PrepareSendRequest,
    tag = "Send",
    responses(
        (status = 200, body = PreparedSend),
        (status = 400, description = "Sender wallet not usable"),
        (status = 422, description = "Per-field validation errors"),
        (status = 502, description = "Transaction or intent creation failed")
    )
)]
pub async fn prepare_send(
    State(state): State<AppState>,
    Json(request): Json<PrepareSendRequest>,
) -> Result<Json<PreparedSend>, ApiError> {
    let prepared = state.sends.prepare(&request.sender_wallet, request.send).await?;
    Ok(Json(prepared))
}

#[utoipa::path(
    post,
    path = "/v1/send/submit",
    request_body = SubmitSendRequest,
    tag = "Send",
    responses(
        (status = 200, body = SendOutcome),
        (status = 400, description = "Transaction malformed or not signed by the sender"),
        (status = 502, description = "Submission failed"),
        (status = 504, description = "Submission timed out")
    )
)]
pub async fn submit_send(
    State(state): State<AppState>,
    Json(request): Json<SubmitSendRequest>,
) -> Result<Json<SendOutcome>, ApiError> {
    let outcome = state
        .sends
        .submit_signed(
            &request.sender_wallet,
            &request.transaction,
            request.recipient_email.as_deref(),
        )
        .await?;
    Ok(Json(outcome))
}

#[utoipa::path(
    get,
    path = "/v1/send/last/{wallet}",
    params(("wallet" = String, Path, description = "Sender wallet address")),
    tag = "Send",
    responses(
        (status = 200, body = LastSend),
        (status = 404, description = "No finished send for this wallet")
    )
)]
pub async fn last_send(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<LastSend>, ApiError> {
    state
        .sends
        .last_result(&wallet)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No finished send for this wallet"))
}

/// Dismiss a failed result. Successful results stay.
#[utoipa::path(
    delete,
    path = "/v1/send/last/{wallet}",
    params(("wallet" = String, Path, description = "Sender wallet address")),
    tag = "Send",
    responses(
        (status = 204, description = "Failed result cleared"),
        (status = 404, description = "No failed result to clear")
    )
)]
pub async fn clear_send_error(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.sends.clear_error(&wallet) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found("No failed result to clear"))
    }
}
