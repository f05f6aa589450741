// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup. Missing chain
//! settings are fatal; a missing email function or fee payer only disables
//! that feature.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `SOLANA_RPC_URL` | Solana JSON-RPC endpoint | Required |
//! | `USDC_MINT_ADDRESS` | USDC mint (base58) | Required |
//! | `FEE_PAYER_ENABLED` | `true` enables sponsored fees | `false` |
//! | `FEE_PAYER_PRIVATE_KEY` | Sponsor secret, base58 64-byte keypair | Optional |
//! | `APP_URL` | Base URL for claim and payment links | `http://localhost:5173` |
//! | `STORE_URL` | Hosted REST backend for directory rows | Local store |
//! | `STORE_API_KEY` | API key for `STORE_URL` | Required with `STORE_URL` |
//! | `DATA_DIR` | Directory holding the local redb file | In-memory |
//! | `EMAIL_FUNCTION_URL` | Hosted email send function | Emails disabled |
//! | `EMAIL_FUNCTION_KEY` | Bearer key for the email function | Optional |
//! | `EMAIL_HASH_KEY` | HMAC key for email lookup hashes | Development key |
//! | `EXTERNAL_CALL_TIMEOUT_SECS` | Bound on every store, RPC and email call | `15` |
//! | `TRANSFER_CLAIMS_ENABLED` | `true` enables intent claims | `false` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use url::Url;

use crate::blockchain::ChainConfig;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const SOLANA_RPC_URL_ENV: &str = "SOLANA_RPC_URL";
pub const USDC_MINT_ENV: &str = "USDC_MINT_ADDRESS";
pub const FEE_PAYER_ENABLED_ENV: &str = "FEE_PAYER_ENABLED";
pub const FEE_PAYER_KEY_ENV: &str = "FEE_PAYER_PRIVATE_KEY";
pub const APP_URL_ENV: &str = "APP_URL";
pub const STORE_URL_ENV: &str = "STORE_URL";
pub const STORE_API_KEY_ENV: &str = "STORE_API_KEY";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const EMAIL_FUNCTION_URL_ENV: &str = "EMAIL_FUNCTION_URL";
pub const EMAIL_FUNCTION_KEY_ENV: &str = "EMAIL_FUNCTION_KEY";
pub const EMAIL_HASH_KEY_ENV: &str = "EMAIL_HASH_KEY";
pub const TIMEOUT_ENV: &str = "EXTERNAL_CALL_TIMEOUT_SECS";
pub const CLAIMS_ENABLED_ENV: &str = "TRANSFER_CLAIMS_ENABLED";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_APP_URL: &str = "http://localhost:5173";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// HMAC key used when `EMAIL_HASH_KEY` is unset. Not for production.
pub const DEVELOPMENT_HASH_KEY: &str = "mailpay-development-email-hash-key";

/// Name of the redb file under `DATA_DIR`.
pub const LOCAL_STORE_FILE: &str = "mailpay.redb";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Where directory, intent and notification rows live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Rest { url: String, api_key: String },
    LocalFile(PathBuf),
    InMemory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailFunctionConfig {
    pub url: Url,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub chain: ChainConfig,
    pub fee_payer_enabled: bool,
    pub fee_payer_secret: Option<String>,
    pub app_url: Url,
    pub store: StoreConfig,
    pub email_function: Option<EmailFunctionConfig>,
    /// `None` means the development key is in use.
    pub email_hash_key: Option<String>,
    pub external_call_timeout: Duration,
    pub claims_enabled: bool,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Build from an explicit variable map. Empty values count as unset.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let rpc_url = get(SOLANA_RPC_URL_ENV).ok_or(ConfigError::Missing(SOLANA_RPC_URL_ENV))?;
        Url::parse(&rpc_url).map_err(|e| invalid(SOLANA_RPC_URL_ENV, e))?;
        let mint = get(USDC_MINT_ENV).ok_or(ConfigError::Missing(USDC_MINT_ENV))?;
        let usdc_mint = Pubkey::from_str(&mint).map_err(|e| invalid(USDC_MINT_ENV, e))?;

        let port = match get(PORT_ENV) {
            Some(p) => p.parse().map_err(|e| invalid(PORT_ENV, e))?,
            None => 8080,
        };

        let app_url = Url::parse(get(APP_URL_ENV).as_deref().unwrap_or(DEFAULT_APP_URL))
            .map_err(|e| invalid(APP_URL_ENV, e))?;

        let store = match (get(STORE_URL_ENV), get(DATA_DIR_ENV)) {
            (Some(url), _) => StoreConfig::Rest {
                url,
                api_key: get(STORE_API_KEY_ENV).ok_or(ConfigError::Missing(STORE_API_KEY_ENV))?,
            },
            (None, Some(dir)) => StoreConfig::LocalFile(PathBuf::from(dir).join(LOCAL_STORE_FILE)),
            (None, None) => StoreConfig::InMemory,
        };

        let email_function = match get(EMAIL_FUNCTION_URL_ENV) {
            Some(url) => Some(EmailFunctionConfig {
                url: Url::parse(&url).map_err(|e| invalid(EMAIL_FUNCTION_URL_ENV, e))?,
                api_key: get(EMAIL_FUNCTION_KEY_ENV),
            }),
            None => None,
        };

        let timeout_secs = match get(TIMEOUT_ENV) {
            Some(t) => match t.parse::<u64>() {
                Ok(0) => return Err(invalid(TIMEOUT_ENV, "must be positive")),
                Ok(secs) => secs,
                Err(e) => return Err(invalid(TIMEOUT_ENV, e)),
            },
            None => DEFAULT_TIMEOUT_SECS,
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => return Err(invalid(LOG_FORMAT_ENV, format!("unknown format {other}"))),
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            chain: ChainConfig { rpc_url, usdc_mint },
            fee_payer_enabled: flag(get(FEE_PAYER_ENABLED_ENV)),
            fee_payer_secret: get(FEE_PAYER_KEY_ENV),
            app_url,
            store,
            email_function,
            email_hash_key: get(EMAIL_HASH_KEY_ENV),
            external_call_timeout: Duration::from_secs(timeout_secs),
            claims_enabled: flag(get(CLAIMS_ENABLED_ENV)),
            log_format,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn email_hash_key(&self) -> &[u8] {
        self.email_hash_key
            .as_deref()
            .unwrap_or(DEVELOPMENT_HASH_KEY)
            .as_bytes()
    }
}

fn invalid(name: &'static str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        reason: reason.to_string(),
    }
}

/// Only the literal `true` (any case) turns a flag on.
fn flag(value: Option<String>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}
