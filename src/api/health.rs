// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

/// Health check response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub service: String,
    /// Record store reachability.
    pub store: String,
    /// Solana RPC reachability.
    pub chain: String,
    /// Fee sponsorship: "available", "unfunded" or "disabled". Informational.
    pub fee_payer: String,
    /// Email function: "configured" or "disabled". Informational.
    pub email: String,
}

/// Simple health check response for liveness probes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

fn label(ok: bool) -> String {
    if ok { "ok" } else { "unavailable" }.to_string()
}

async fn check_store(state: &AppState) -> bool {
    matches!(
        tokio::time::timeout(state.timeout, state.store.ping()).await,
        Ok(Ok(()))
    )
}

async fn check_chain(state: &AppState) -> bool {
    matches!(
        tokio::time::timeout(state.timeout, state.rpc.latest_blockhash()).await,
        Ok(Ok(_))
    )
}

async fn fee_payer_status(state: &AppState) -> String {
    if !state.fee_payer.is_enabled() {
        "disabled"
    } else if state.fee_payer.check_availability(state.rpc.as_ref()).await {
        "available"
    } else {
        "unfunded"
    }
    .to_string()
}

/// Health check endpoint handler.
///
/// Returns 200 if the store and the chain are reachable, 503 otherwise.
/// Sponsorship and email status never fail the check.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = ReadyResponse),
        (status = 503, description = "Service is unhealthy", body = ReadyResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let (store_ok, chain_ok, fee_payer) = tokio::join!(
        check_store(&state),
        check_chain(&state),
        fee_payer_status(&state)
    );
    let all_ok = store_ok && chain_ok;

    let response = ReadyResponse {
        status: if all_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            store: label(store_ok),
            chain: label(chain_ok),
            fee_payer,
            email: if state.notifier.is_configured() {
                "configured"
            } else {
                "disabled"
            }
            .to_string(),
        },
    };

    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Liveness probe handler. Always 200 while the process runs.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe handler.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(state: State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    health(state).await
}
