// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::account::AccountError;
use crate::auth::AuthError;
use crate::blockchain::{AmountError, ChainError, FeePayerError, TransferError};
use crate::directory::DirectoryError;
use crate::intents::IntentError;
use crate::notify::NotifyError;
use crate::send::SendError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_INPUT", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    /// Logs the detail and answers with a generic message.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "Internal error");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "Internal server error",
        )
    }

    fn retryable_or(retryable: bool, status: StatusCode) -> StatusCode {
        if retryable {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            status
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            code: self.code,
        });
        (self.status, body).into_response()
    }
}

impl From<DirectoryError> for ApiError {
    fn from(e: DirectoryError) -> Self {
        let status = match &e {
            DirectoryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            DirectoryError::EmailExists | DirectoryError::WalletExists => StatusCode::CONFLICT,
            DirectoryError::NotFound => StatusCode::NOT_FOUND,
            DirectoryError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            DirectoryError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        };
        if let DirectoryError::Database(detail) = &e {
            error!(error = %detail, "Directory storage failed");
        }
        Self::new(status, e.code(), e.user_message())
    }
}

impl From<IntentError> for ApiError {
    fn from(e: IntentError) -> Self {
        let status = match &e {
            IntentError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            IntentError::NotFound => StatusCode::NOT_FOUND,
            IntentError::NotClaimable | IntentError::NotCancellable => StatusCode::CONFLICT,
            IntentError::ClaimsDisabled => StatusCode::NOT_IMPLEMENTED,
            IntentError::NotSender => StatusCode::FORBIDDEN,
            IntentError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            IntentError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        };
        if let IntentError::Database(detail) = &e {
            error!(error = %detail, "Transfer intent storage failed");
        }
        Self::new(status, e.code(), e.user_message())
    }
}

impl From<SendError> for ApiError {
    fn from(e: SendError) -> Self {
        let status = match &e {
            SendError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            SendError::UnsupportedWallet | SendError::InvalidTransaction(_) => StatusCode::BAD_REQUEST,
            SendError::Transfer(TransferError::Timeout) | SendError::Intent(IntentError::Timeout) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            SendError::Transfer(TransferError::InvalidAddress(_)) => StatusCode::BAD_REQUEST,
            SendError::Transfer(_) | SendError::Intent(_) => {
                Self::retryable_or(e.is_retryable(), StatusCode::BAD_GATEWAY)
            }
        };
        if matches!(e, SendError::Transfer(_) | SendError::InvalidTransaction(_)) {
            error!(code = e.code(), error = %e, "Send failed");
        }
        Self::new(status, e.code(), e.user_message())
    }
}

impl From<TransferError> for ApiError {
    fn from(e: TransferError) -> Self {
        SendError::Transfer(e).into()
    }
}

impl From<ChainError> for ApiError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::InvalidAddress(_) => Self::new(StatusCode::BAD_REQUEST, "INVALID_ADDRESS", e.to_string()),
            other => {
                error!(error = %other, "Chain request failed");
                Self::service_unavailable("Blockchain network unavailable")
            }
        }
    }
}

impl From<FeePayerError> for ApiError {
    fn from(e: FeePayerError) -> Self {
        match e {
            FeePayerError::NotConfigured => Self::not_found(e.to_string()),
            FeePayerError::Balance(_) => {
                error!(error = %e, "Fee payer balance lookup failed");
                Self::service_unavailable("Blockchain network unavailable")
            }
            other => Self::internal(other),
        }
    }
}

impl From<NotifyError> for ApiError {
    fn from(e: NotifyError) -> Self {
        let status = match &e {
            NotifyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            NotifyError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            NotifyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };
        if status == StatusCode::BAD_GATEWAY {
            error!(error = %e, "Email function failed");
        }
        Self::new(status, e.code(), e.user_message())
    }
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Directory(inner) => inner.into(),
            AccountError::Intent(inner) => inner.into(),
            AccountError::InvalidInput(_) => Self::new(StatusCode::BAD_REQUEST, e.code(), e.to_string()),
            AccountError::WalletMismatch => Self::new(StatusCode::FORBIDDEN, e.code(), e.to_string()),
            AccountError::Database(ref detail) => {
                error!(error = %detail, "Account storage failed");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, e.code(), e.user_message())
            }
            AccountError::Timeout => Self::new(StatusCode::GATEWAY_TIMEOUT, e.code(), e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, e.code(), e.to_string())
    }
}

impl From<AmountError> for ApiError {
    fn from(e: AmountError) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_AMOUNT", e.to_string())
    }
}
