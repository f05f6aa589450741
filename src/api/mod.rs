// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    account::{AccountSummary, DeletionResult},
    auth::Challenge,
    blockchain::{FeeEstimate, FeePayerInfo, TokenBalance},
    earn::EarnProjection,
    intents::UnclaimedSummary,
    notify::{InvitationOutcome, PaymentRequest, PaymentRequestOutcome},
    registration::{AuthSuccessEvent, RegistrationOutcome, SkipReason},
    send::{LastSend, PreparedSend, SendOutcome, SendPath, SendRequest, ValidationErrors},
    state::AppState,
    storage::{DeliveryStatus, EmailWalletRow, IntentStatus, PaymentRequestRow, TransferIntentRow},
};

pub mod account;
pub mod auth;
pub mod chain;
pub mod directory;
pub mod health;
pub mod intents;
pub mod payments;
pub mod send;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/directory/register", post(directory::register))
        .route("/directory/resolve", get(directory::resolve))
        .route("/directory/wallet", put(directory::update_wallet))
        .route("/auth/events", post(directory::auth_event))
        .route("/auth/challenge", post(auth::issue_challenge))
        .route("/send/prepare", post(send::prepare_send))
        .route("/send/submit", post(send::submit_send))
        .route(
            "/send/last/{wallet}",
            get(send::last_send).delete(send::clear_send_error),
        )
        .route("/intents", get(intents::list_unclaimed))
        .route("/intents/sent/{wallet}", get(intents::list_sent))
        .route("/intents/{intent_id}", get(intents::get_intent))
        .route("/intents/{intent_id}/claim", post(intents::claim_intent))
        .route("/intents/{intent_id}/cancel", post(intents::cancel_intent))
        .route("/intents/{intent_id}/remind", post(intents::remind_intent))
        .route("/payment-requests", post(payments::create_payment_request))
        .route(
            "/payment-requests/by-wallet/{wallet}",
            get(payments::list_payment_requests),
        )
        .route(
            "/payment-requests/{request_id}",
            get(payments::get_payment_request),
        )
        .route("/fee-payer", get(chain::get_fee_payer))
        .route("/fee-estimate/{recipient}", get(chain::get_fee_estimate))
        .route("/balances/{address}", get(chain::get_balance))
        .route("/earn/estimate", get(account::earn_estimate))
        .route("/account/summary", get(account::account_summary))
        .route("/account/delete", post(account::delete_account));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/v1", v1_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http()),
        )
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        directory::register,
        directory::resolve,
        directory::update_wallet,
        directory::auth_event,
        auth::issue_challenge,
        send::prepare_send,
        send::submit_send,
        send::last_send,
        send::clear_send_error,
        intents::list_unclaimed,
        intents::list_sent,
        intents::get_intent,
        intents::claim_intent,
        intents::cancel_intent,
        intents::remind_intent,
        payments::create_payment_request,
        payments::get_payment_request,
        payments::list_payment_requests,
        chain::get_fee_payer,
        chain::get_fee_estimate,
        chain::get_balance,
        account::earn_estimate,
        account::account_summary,
        account::delete_account
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            directory::RegisterRequest,
            directory::ResolveResponse,
            auth::ChallengeRequest,
            Challenge,
            send::PrepareSendRequest,
            send::SubmitSendRequest,
            intents::ClaimRequest,
            intents::CancelRequest,
            account::AccountQuery,
            EmailWalletRow,
            TransferIntentRow,
            IntentStatus,
            DeliveryStatus,
            PaymentRequestRow,
            AuthSuccessEvent,
            RegistrationOutcome,
            SkipReason,
            SendRequest,
            SendPath,
            SendOutcome,
            PreparedSend,
            LastSend,
            ValidationErrors,
            InvitationOutcome,
            UnclaimedSummary,
            PaymentRequest,
            PaymentRequestOutcome,
            TokenBalance,
            FeeEstimate,
            FeePayerInfo,
            AccountSummary,
            DeletionResult,
            EarnProjection
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Directory", description = "Email to wallet directory"),
        (name = "Auth", description = "Wallet signature challenges"),
        (name = "Send", description = "Send USDC to an email address"),
        (name = "Intents", description = "Transfers waiting for an unregistered recipient"),
        (name = "Payment Requests", description = "Ask someone to send you USDC"),
        (name = "Chain", description = "Balances, fees and sponsorship"),
        (name = "Account", description = "Account data and simulated yield")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::{Keypair, Signer};
    use tower::ServiceExt;

    use crate::auth::testing::signed_headers;

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = router(AppState::default());
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn openapi_lists_send_routes() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        assert!(paths.contains_key("/v1/send/prepare"));
        assert!(paths.contains_key("/v1/intents/{intent_id}/claim"));
    }

    #[tokio::test]
    async fn liveness_over_http() {
        let app = router(AppState::default());
        let (status, body) = call(
            app,
            Request::get("/health/live").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn register_resolve_and_send_to_unregistered_over_http() {
        let app = router(AppState::default());
        let alice = Pubkey::new_unique().to_string();

        let (status, body) = call(
            app.clone(),
            post_json(
                "/v1/directory/register",
                json!({"email": "Alice@Example.com", "wallet_address": alice}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], "alice@example.com");

        let (status, body) = call(
            app.clone(),
            Request::get("/v1/directory/resolve?email=alice%40example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["wallet_address"], alice);

        let (status, body) = call(
            app.clone(),
            post_json(
                "/v1/send/prepare",
                json!({
                    "sender_wallet": alice,
                    "recipient_email": "carol@example.com",
                    "amount": "4.20"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["path"], "intent");

        let (status, body) = call(
            app,
            Request::get("/v1/intents?email=carol%40example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["total_display"], "4.20");
    }

    #[tokio::test]
    async fn errors_carry_code_in_body() {
        let app = router(AppState::default());
        let (status, body) = call(
            app,
            post_json(
                "/v1/send/prepare",
                json!({
                    "sender_wallet": Pubkey::new_unique().to_string(),
                    "recipient_email": "not-an-email",
                    "amount": "abc"
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"].as_str().unwrap().contains("valid email"));
    }

    fn put_json(uri: &str, body: Value) -> Request<Body> {
        Request::put(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn unsigned_wallet_change_is_refused() {
        let state = AppState::default();
        let owner = Keypair::new();
        state
            .directory
            .register("alice@example.com", &owner.pubkey().to_string())
            .await
            .unwrap();
        let app = router(state.clone());
        let body = json!({
            "email": "alice@example.com",
            "wallet_address": Pubkey::new_unique().to_string()
        });

        let (status, response) =
            call(app.clone(), put_json("/v1/directory/wallet", body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response["code"], "MISSING_WALLET_PROOF");

        let (status, _) = call(
            app.clone(),
            post_json(
                "/v1/account/delete",
                json!({"email": "alice@example.com", "wallet": owner.pubkey().to_string()}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut request = put_json("/v1/directory/wallet", body.clone());
        request
            .headers_mut()
            .extend(signed_headers(&state.challenges, &Keypair::new()));
        let (status, _) = call(app, request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            state.directory.resolve("alice@example.com").await.unwrap(),
            Some(owner.pubkey().to_string())
        );
    }

    #[tokio::test]
    async fn signed_wallet_change_is_applied_once() {
        let state = AppState::default();
        let owner = Keypair::new();
        state
            .directory
            .register("alice@example.com", &owner.pubkey().to_string())
            .await
            .unwrap();
        let app = router(state.clone());
        let replacement = Pubkey::new_unique().to_string();
        let body = json!({"email": "alice@example.com", "wallet_address": replacement});

        let headers = signed_headers(&state.challenges, &owner);
        let mut request = put_json("/v1/directory/wallet", body.clone());
        request.headers_mut().extend(headers.clone());
        let (status, response) = call(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["wallet_address"], replacement);

        let mut replayed = put_json("/v1/directory/wallet", body);
        replayed.headers_mut().extend(headers);
        let (status, response) = call(app, replayed).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response["code"], "UNKNOWN_CHALLENGE");
    }

    #[tokio::test]
    async fn challenge_route_returns_signable_message() {
        let app = router(AppState::default());
        let wallet = Pubkey::new_unique().to_string();
        let (status, body) =
            call(app, post_json("/v1/auth/challenge", json!({"wallet": wallet}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["wallet"], wallet);
        assert!(body["message"].as_str().unwrap().contains(body["nonce"].as_str().unwrap()));
    }
}
