// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Hosted record store reached through a PostgREST-style HTTP API.
//!
//! Uniqueness is enforced by the database. A violation comes back as
//! `409` with Postgres code `23505`; some proxies answer `406` for a write
//! that did commit, which is surfaced as [`StorageError::Rejected`] so the
//! caller can re-query before deciding.
//!
//! Writes ask for `count=exact` and log the affected row count read from
//! `Content-Range`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, CONTENT_RANGE};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use url::Url;
use uuid::Uuid;

use super::{
    DeliveryStatus, EmailWalletRow, IntentStatus, IntentTransition, PaymentRequestRow,
    RecordStore, StorageError, StorageResult, TransferIntentRow, TransferNotificationRow,
    EMAIL_WALLETS_TABLE, PAYMENT_REQUESTS_TABLE, TRANSFER_INTENTS_TABLE,
    TRANSFER_NOTIFICATIONS_TABLE,
};

const UNIQUE_VIOLATION: &str = "23505";
const PREFER_READ: &str = "return=representation";
const PREFER_WRITE: &str = "return=representation,count=exact";

#[derive(Debug, Deserialize)]
struct PostgrestError {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RestStore {
    base_url: Url,
    api_key: String,
    http: Client,
}

impl RestStore {
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> StorageResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| StorageError::Backend(format!("invalid store URL: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::Backend(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url,
            api_key: api_key.into(),
            http,
        })
    }

    fn table_url(&self, table: &str, filters: &[(&str, String)]) -> StorageResult<Url> {
        let mut url = self
            .base_url
            .join(&format!("rest/v1/{table}"))
            .map_err(|e| StorageError::Backend(format!("invalid table URL: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in filters {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let prefer = if method == Method::GET {
            PREFER_READ
        } else {
            PREFER_WRITE
        };
        self.http
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", prefer)
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> StorageResult<Response> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                StorageError::Backend(format!("{what} timed out"))
            } else {
                StorageError::Backend(format!("{what} failed: {e}"))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_ACCEPTABLE {
            return Err(StorageError::Rejected {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        if let Ok(err) = serde_json::from_str::<PostgrestError>(&body) {
            if err.code.as_deref() == Some(UNIQUE_VIOLATION) {
                let message = err.message.unwrap_or_default();
                return Err(StorageError::Conflict {
                    constraint: constraint_name(&message).to_string(),
                });
            }
        }
        Err(StorageError::Backend(format!("{what} returned {status}: {body}")))
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> StorageResult<Vec<T>> {
        let url = self.table_url(table, filters)?;
        let response = self
            .send(self.request(Method::GET, url), &format!("GET {table}"))
            .await?;
        read_rows(response).await
    }

    async fn insert<T: Serialize + DeserializeOwned>(&self, table: &str, row: &T) -> StorageResult<T> {
        let url = self.table_url(table, &[])?;
        let response = self
            .send(self.request(Method::POST, url).json(row), &format!("POST {table}"))
            .await?;
        let counted = affected_rows(response.headers());
        let rows = read_rows::<T>(response).await?;
        info!(table, rows = counted.unwrap_or(rows.len() as u64), "Inserted rows");
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::Backend(format!("POST {table} returned no row")))
    }

    async fn patch<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        body: serde_json::Value,
    ) -> StorageResult<Vec<T>> {
        let url = self.table_url(table, filters)?;
        let response = self
            .send(self.request(Method::PATCH, url).json(&body), &format!("PATCH {table}"))
            .await?;
        let counted = affected_rows(response.headers());
        let rows = read_rows(response).await?;
        info!(table, rows = counted.unwrap_or(rows.len() as u64), "Updated rows");
        Ok(rows)
    }
}

/// Total from `Content-Range: 0-1/2` or `*/1`. `None` when the backend did
/// not count.
fn affected_rows(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .parse()
        .ok()
}

async fn read_rows<T: DeserializeOwned>(response: Response) -> StorageResult<Vec<T>> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| StorageError::Backend(format!("failed to read response: {e}")))?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

/// `duplicate key value violates unique constraint "name"` → `name`.
fn constraint_name(message: &str) -> &str {
    message
        .split('"')
        .nth(1)
        .filter(|name| !name.is_empty())
        .unwrap_or(message)
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl RecordStore for RestStore {
    async fn ping(&self) -> StorageResult<()> {
        let _: Vec<serde_json::Value> = self
            .select(EMAIL_WALLETS_TABLE, &[("select", "id".to_string()), ("limit", "1".to_string())])
            .await?;
        Ok(())
    }

    async fn find_mapping_by_hash(&self, email_hash: &str) -> StorageResult<Option<EmailWalletRow>> {
        let rows = self
            .select(
                EMAIL_WALLETS_TABLE,
                &[
                    ("email_hash", eq(email_hash)),
                    ("is_active", eq(true)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_mapping_by_wallet(&self, wallet: &str) -> StorageResult<Option<EmailWalletRow>> {
        let rows = self
            .select(
                EMAIL_WALLETS_TABLE,
                &[
                    ("wallet_address", eq(wallet)),
                    ("is_active", eq(true)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_mapping(&self, row: EmailWalletRow) -> StorageResult<EmailWalletRow> {
        self.insert(EMAIL_WALLETS_TABLE, &row).await
    }

    async fn update_mapping_wallet(
        &self,
        email_hash: &str,
        wallet: &str,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<EmailWalletRow>> {
        let rows = self
            .patch(
                EMAIL_WALLETS_TABLE,
                &[("email_hash", eq(email_hash)), ("is_active", eq(true))],
                json!({ "wallet_address": wallet, "last_updated_at": timestamp(now) }),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn deactivate_mapping(&self, email_hash: &str, now: DateTime<Utc>) -> StorageResult<bool> {
        let rows: Vec<EmailWalletRow> = self
            .patch(
                EMAIL_WALLETS_TABLE,
                &[("email_hash", eq(email_hash)), ("is_active", eq(true))],
                json!({ "is_active": false, "last_updated_at": timestamp(now) }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn insert_intent(&self, row: TransferIntentRow) -> StorageResult<TransferIntentRow> {
        self.insert(TRANSFER_INTENTS_TABLE, &row).await
    }

    async fn get_intent(&self, id: Uuid) -> StorageResult<Option<TransferIntentRow>> {
        let rows = self
            .select(TRANSFER_INTENTS_TABLE, &[("id", eq(id)), ("limit", "1".to_string())])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_pending_intents(
        &self,
        recipient_email: &str,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StorageResult<Vec<TransferIntentRow>> {
        self.select(
            TRANSFER_INTENTS_TABLE,
            &[
                ("recipient_email", eq(recipient_email)),
                ("status", eq(IntentStatus::Pending.as_str())),
                ("expires_at", format!("gt.{}", timestamp(now))),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn list_intents_by_sender(&self, sender_wallet: &str) -> StorageResult<Vec<TransferIntentRow>> {
        self.select(
            TRANSFER_INTENTS_TABLE,
            &[
                ("sender_wallet", eq(sender_wallet)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }

    async fn transition_intent(
        &self,
        id: Uuid,
        transition: IntentTransition,
    ) -> StorageResult<Option<TransferIntentRow>> {
        let filters = [
            ("id", eq(id)),
            ("status", eq(IntentStatus::Pending.as_str())),
            ("expires_at", format!("gt.{}", timestamp(transition.now))),
        ];

        let mut body = json!({ "status": transition.to.as_str() });
        if transition.to == IntentStatus::Claimed {
            body["claimed_at"] = json!(timestamp(transition.now));
            body["claimed_by_wallet"] = json!(transition.claimed_by_wallet);
            body["claim_tx_hash"] = json!(transition.claim_tx_hash);
        }

        let rows = self.patch(TRANSFER_INTENTS_TABLE, &filters, body).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_notification(&self, row: TransferNotificationRow) -> StorageResult<()> {
        self.insert(TRANSFER_NOTIFICATIONS_TABLE, &row).await.map(|_| ())
    }

    async fn list_notifications(&self, intent_id: Uuid) -> StorageResult<Vec<TransferNotificationRow>> {
        self.select(
            TRANSFER_NOTIFICATIONS_TABLE,
            &[
                ("transfer_intent_id", eq(intent_id)),
                ("order", "sent_at.asc".to_string()),
            ],
        )
        .await
    }

    async fn insert_payment_request(&self, row: PaymentRequestRow) -> StorageResult<PaymentRequestRow> {
        self.insert(PAYMENT_REQUESTS_TABLE, &row).await
    }

    async fn update_payment_request_status(&self, id: Uuid, status: DeliveryStatus) -> StorageResult<()> {
        let rows: Vec<PaymentRequestRow> = self
            .patch(PAYMENT_REQUESTS_TABLE, &[("id", eq(id))], json!({ "status": status }))
            .await?;
        if rows.is_empty() {
            return Err(StorageError::NotFound(format!("Payment request {id}")));
        }
        Ok(())
    }

    async fn get_payment_request(&self, id: Uuid) -> StorageResult<Option<PaymentRequestRow>> {
        let rows = self
            .select(PAYMENT_REQUESTS_TABLE, &[("id", eq(id)), ("limit", "1".to_string())])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn list_payment_requests_by_requester(
        &self,
        requester_wallet: &str,
    ) -> StorageResult<Vec<PaymentRequestRow>> {
        self.select(
            PAYMENT_REQUESTS_TABLE,
            &[
                ("requester_wallet", eq(requester_wallet)),
                ("order", "created_at.desc".to_string()),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{DirectoryError, EmailDirectory, EmailHasher};
    use axum::{
        body::Bytes,
        extract::State,
        http::{header, HeaderValue, Uri},
        response::IntoResponse,
        Router,
    };
    use solana_sdk::pubkey::Pubkey;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    const WALLET_CONFLICT: &str = r#"{"code":"23505","message":"duplicate key value violates unique constraint \"email_wallets_wallet_address_key\"","details":null,"hint":null}"#;

    struct Seen {
        method: Method,
        uri: Uri,
        prefer: Option<String>,
        body: String,
    }

    /// Local PostgREST stand-in answering queued replies in order.
    #[derive(Default)]
    struct Backend {
        replies: Mutex<VecDeque<(StatusCode, String, Option<&'static str>)>>,
        seen: Mutex<Vec<Seen>>,
    }

    impl Backend {
        fn reply(&self, status: StatusCode, body: impl Into<String>) {
            self.replies.lock().unwrap().push_back((status, body.into(), None));
        }

        fn reply_counted(&self, status: StatusCode, body: impl Into<String>, range: &'static str) {
            self.replies
                .lock()
                .unwrap()
                .push_back((status, body.into(), Some(range)));
        }
    }

    async fn answer(
        State(backend): State<Arc<Backend>>,
        method: Method,
        uri: Uri,
        headers: axum::http::HeaderMap,
        body: Bytes,
    ) -> axum::response::Response {
        backend.seen.lock().unwrap().push(Seen {
            method,
            uri,
            prefer: headers
                .get("prefer")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            body: String::from_utf8_lossy(&body).into_owned(),
        });
        let next = backend.replies.lock().unwrap().pop_front();
        match next {
            Some((status, body, range)) => {
                let mut response =
                    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response();
                if let Some(range) = range {
                    response
                        .headers_mut()
                        .insert(header::CONTENT_RANGE, HeaderValue::from_static(range));
                }
                response
            }
            None => (StatusCode::INTERNAL_SERVER_ERROR, "no reply queued").into_response(),
        }
    }

    async fn backend() -> (Arc<Backend>, RestStore) {
        let backend = Arc::new(Backend::default());
        let app = Router::new().fallback(answer).with_state(backend.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let store = RestStore::new(&format!("http://{addr}"), "key", Duration::from_secs(5)).unwrap();
        (backend, store)
    }

    fn mapping(email_hash: &str, wallet: &str) -> EmailWalletRow {
        let now = Utc::now();
        EmailWalletRow {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            email_hash: email_hash.to_string(),
            wallet_address: wallet.to_string(),
            first_registered_at: now,
            last_updated_at: now,
            is_active: true,
        }
    }

    fn rows(row: &EmailWalletRow) -> String {
        serde_json::to_string(&[row]).unwrap()
    }

    #[test]
    fn constraint_name_is_extracted_from_postgres_message() {
        let msg = r#"duplicate key value violates unique constraint "email_wallets_wallet_address_key""#;
        assert_eq!(constraint_name(msg), "email_wallets_wallet_address_key");
        assert_eq!(constraint_name("no quotes here"), "no quotes here");
    }

    #[test]
    fn table_url_encodes_filters() {
        let store = RestStore::new("https://db.example.com", "key", Duration::from_secs(5)).unwrap();
        let url = store
            .table_url(EMAIL_WALLETS_TABLE, &[("email_hash", eq("a+b/c"))])
            .unwrap();
        assert_eq!(url.path(), "/rest/v1/email_wallets");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs, vec![("email_hash".to_string(), "eq.a+b/c".to_string())]);
    }

    #[test]
    fn base_url_with_path_keeps_prefix() {
        let store = RestStore::new("https://proxy.example.com/db", "key", Duration::from_secs(5)).unwrap();
        let url = store.table_url(TRANSFER_INTENTS_TABLE, &[]).unwrap();
        assert_eq!(url.path(), "/db/rest/v1/transfer_intents");
    }

    #[test]
    fn affected_rows_reads_content_range_total() {
        let mut headers = HeaderMap::new();
        assert_eq!(affected_rows(&headers), None);

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("0-1/2"));
        assert_eq!(affected_rows(&headers), Some(2));

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("*/0"));
        assert_eq!(affected_rows(&headers), Some(0));

        headers.insert(CONTENT_RANGE, HeaderValue::from_static("0-0/*"));
        assert_eq!(affected_rows(&headers), None);
    }

    #[tokio::test]
    async fn unique_violation_maps_to_named_conflict() {
        let (backend, store) = backend().await;
        backend.reply(StatusCode::CONFLICT, WALLET_CONFLICT);

        let err = store
            .insert_mapping(mapping("hash", "wallet"))
            .await
            .unwrap_err();
        assert!(
            matches!(&err, StorageError::Conflict { constraint } if constraint == "email_wallets_wallet_address_key")
        );
        assert!(err.is_wallet_conflict());

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(seen[0].uri.path(), "/rest/v1/email_wallets");
        assert_eq!(seen[0].prefer.as_deref(), Some(PREFER_WRITE));
        assert!(seen[0].body.contains("\"email_hash\":\"hash\""));
    }

    #[tokio::test]
    async fn not_acceptable_maps_to_rejected() {
        let (backend, store) = backend().await;
        backend.reply(StatusCode::NOT_ACCEPTABLE, "");

        let err = store
            .insert_mapping(mapping("hash", "wallet"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Rejected { status: 406 }));
    }

    #[tokio::test]
    async fn other_failures_are_backend_errors() {
        let (backend, store) = backend().await;
        backend.reply(StatusCode::INTERNAL_SERVER_ERROR, r#"{"message":"relation missing"}"#);
        backend.reply(StatusCode::CONFLICT, r#"{"code":"23503","message":"foreign key"}"#);

        let err = store.find_mapping_by_hash("hash").await.unwrap_err();
        assert!(matches!(&err, StorageError::Backend(detail) if detail.contains("500")));

        let err = store
            .insert_mapping(mapping("hash", "wallet"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)));
    }

    #[tokio::test]
    async fn empty_bodies_read_as_no_rows() {
        let (backend, store) = backend().await;
        backend.reply(StatusCode::OK, "");
        backend.reply(StatusCode::CREATED, "");

        assert_eq!(store.find_mapping_by_hash("hash").await.unwrap(), None);
        let err = store
            .insert_mapping(mapping("hash", "wallet"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(detail) if detail.contains("no row")));

        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].prefer.as_deref(), Some(PREFER_READ));
    }

    #[tokio::test]
    async fn transitions_patch_only_pending_rows() {
        let (backend, store) = backend().await;
        backend.reply_counted(StatusCode::OK, "[]", "*/0");
        backend.reply_counted(StatusCode::OK, "[]", "*/0");

        let id = Uuid::new_v4();
        let now = Utc::now();
        let claimed = store
            .transition_intent(id, IntentTransition::claim("ClaimantWallet", now))
            .await
            .unwrap();
        assert!(claimed.is_none());
        store
            .transition_intent(id, IntentTransition::cancel(now))
            .await
            .unwrap();

        let seen = backend.seen.lock().unwrap();
        for request in seen.iter() {
            assert_eq!(request.method, Method::PATCH);
            let query = request.uri.query().unwrap();
            assert!(query.contains(&format!("id=eq.{id}")));
            assert!(query.contains("status=eq.pending"));
            assert!(query.contains("expires_at=gt."));
        }
        assert!(seen[0].body.contains("\"claimed_by_wallet\":\"ClaimantWallet\""));
        assert!(seen[1].body.contains("\"status\":\"cancelled\""));
        assert!(!seen[1].body.contains("claimed_by_wallet"));
    }

    #[tokio::test]
    async fn payment_request_status_update_requires_a_row() {
        let (backend, store) = backend().await;
        backend.reply_counted(StatusCode::OK, "[]", "*/0");

        let err = store
            .update_payment_request_status(Uuid::new_v4(), DeliveryStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    fn directory(store: RestStore) -> EmailDirectory {
        EmailDirectory::new(
            Arc::new(store),
            EmailHasher::new(b"test-key").unwrap(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn register_recovers_a_rejected_write_that_committed() {
        let (backend, store) = backend().await;
        let directory = directory(store);
        let hash = directory.email_hash("alice@example.com").unwrap();
        let wallet = Pubkey::new_unique().to_string();
        let committed = mapping(&hash, &wallet);

        backend.reply(StatusCode::OK, "[]");
        backend.reply(StatusCode::OK, "[]");
        backend.reply(StatusCode::NOT_ACCEPTABLE, "");
        backend.reply(StatusCode::OK, rows(&committed));

        let registered = directory.register("alice@example.com", &wallet).await.unwrap();
        assert_eq!(registered, committed);
        assert_eq!(backend.seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn register_reports_unconfirmed_rejected_write() {
        let (backend, store) = backend().await;
        let directory = directory(store);
        let wallet = Pubkey::new_unique().to_string();

        backend.reply(StatusCode::OK, "[]");
        backend.reply(StatusCode::OK, "[]");
        backend.reply(StatusCode::NOT_ACCEPTABLE, "");
        backend.reply(StatusCode::OK, "[]");

        let err = directory.register("alice@example.com", &wallet).await.unwrap_err();
        assert_eq!(err.code(), "DATABASE_ERROR");
    }

    #[tokio::test]
    async fn register_maps_wallet_constraint_to_wallet_exists() {
        let (backend, store) = backend().await;
        let directory = directory(store);
        let wallet = Pubkey::new_unique().to_string();

        backend.reply(StatusCode::OK, "[]");
        backend.reply(StatusCode::OK, "[]");
        backend.reply(StatusCode::CONFLICT, WALLET_CONFLICT);
        backend.reply(StatusCode::OK, "[]");

        let err = directory.register("alice@example.com", &wallet).await.unwrap_err();
        assert_eq!(err, DirectoryError::WalletExists);
    }
}
