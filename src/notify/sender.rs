// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound email transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::NotifyError;

/// One email handed to the send function. The function owns the template;
/// only the fields it fills in are supplied here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub app_url: String,
    pub template_data: Value,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Returns the provider's email id.
    async fn send(&self, email: &OutgoingEmail) -> Result<String, NotifyError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    #[serde(default)]
    email_id: Option<String>,
}

/// Hosted email function reached over HTTPS.
pub struct HttpEmailFunction {
    http: Client,
    url: Url,
    api_key: Option<String>,
}

impl HttpEmailFunction {
    pub fn new(url: Url, api_key: Option<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Request(e.to_string()))?;
        Ok(Self { http, url, api_key })
    }
}

#[async_trait]
impl EmailSender for HttpEmailFunction {
    async fn send(&self, email: &OutgoingEmail) -> Result<String, NotifyError> {
        let mut request = self.http.post(self.url.clone()).json(email);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NotifyError::Timeout
            } else {
                NotifyError::Request(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected(format!(
                "email function returned {status}: {body}"
            )));
        }

        let parsed: SendResponse = response
            .json()
            .await
            .map_err(|e| NotifyError::InvalidResponse(e.to_string()))?;
        Ok(parsed.email_id.unwrap_or_default())
    }
}
