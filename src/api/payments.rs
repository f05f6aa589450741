// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Payment requests: ask someone, by email, to send you USDC.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    blockchain::parse_amount,
    directory::{is_valid_email, normalize_email},
    error::ApiError,
    notify::{PaymentRequest, PaymentRequestOutcome},
    state::AppState,
    storage::PaymentRequestRow,
};

fn check_request(request: &PaymentRequest) -> Result<(), ApiError> {
    for email in [&request.requester_email, &request.target_email] {
        if !is_valid_email(&normalize_email(email)) {
            return Err(ApiError::bad_request("Invalid email format"));
        }
    }
    if request.requester_wallet.trim().is_empty() {
        return Err(ApiError::bad_request("Requester wallet is required"));
    }
    parse_amount(&request.amount)?;
    Ok(())
}

/// Persist the request and email the target. A persisted request whose email
/// failed answers 502 and carries its id.
#[utoipa::path(
    post,
    path = "/v1/payment-requests",
    request_body = PaymentRequest,
    tag = "Payment Requests",
    responses(
        (status = 201, body = PaymentRequestOutcome),
        (status = 400, description = "Malformed email or amount"),
        (status = 502, body = PaymentRequestOutcome, description = "Request saved or email failed")
    )
)]
pub async fn create_payment_request(
    State(state): State<AppState>,
    Json(request): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentRequestOutcome>), ApiError> {
    check_request(&request)?;
    let outcome = state.notifier.send_payment_request(request).await;
    let status = if outcome.success {
        StatusCode::CREATED
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(outcome)))
}

#[utoipa::path(
    get,
    path = "/v1/payment-requests/{request_id}",
    params(("request_id" = Uuid, Path, description = "Payment request id")),
    tag = "Payment Requests",
    responses(
        (status = 200, body = PaymentRequestRow),
        (status = 404, description = "Unknown payment request")
    )
)]
pub async fn get_payment_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<PaymentRequestRow>, ApiError> {
    let row = tokio::time::timeout(state.timeout, state.store.get_payment_request(request_id))
        .await
        .map_err(|_| ApiError::new(StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", "Request timed out"))?
        .map_err(ApiError::internal)?;
    row.map(Json)
        .ok_or_else(|| ApiError::not_found("Payment request not found"))
}

#[utoipa::path(
    get,
    path = "/v1/payment-requests/by-wallet/{wallet}",
    params(("wallet" = String, Path, description = "Requester wallet address")),
    tag = "Payment Requests",
    responses((status = 200, body = [PaymentRequestRow]))
)]
pub async fn list_payment_requests(
    State(state): State<AppState>,
    Path(wallet): Path<String>,
) -> Result<Json<Vec<PaymentRequestRow>>, ApiError> {
    let rows = tokio::time::timeout(
        state.timeout,
        state.store.list_payment_requests_by_requester(wallet.trim()),
    )
    .await
    .map_err(|_| ApiError::new(StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", "Request timed out"))?
    .map_err(ApiError::internal)?;
    Ok(Json(rows))
}
