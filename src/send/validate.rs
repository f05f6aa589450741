// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Field validation run before any network call.

use serde::Serialize;
use utoipa::ToSchema;

use crate::blockchain::amount::parse_amount;
use crate::directory::{is_valid_email, normalize_email};

pub const INVALID_EMAIL_MESSAGE: &str = "Please enter a valid email address";
pub const INSUFFICIENT_BALANCE_MESSAGE: &str = "Insufficient balance";

/// Independent per-field errors. Both fields are always checked.
#[derive(Debug, Clone, Default, Serialize, ToSchema, PartialEq, Eq)]
pub struct ValidationErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.amount.is_none()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<&str> = [self.email.as_deref(), self.amount.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Validated send input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSend {
    pub recipient_email: String,
    pub amount_base_units: u64,
}

pub fn validate(
    recipient_email: &str,
    amount: &str,
    known_balance: Option<u64>,
) -> Result<ValidSend, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let email = normalize_email(recipient_email);
    if !is_valid_email(&email) {
        errors.email = Some(INVALID_EMAIL_MESSAGE.to_string());
    }

    let base_units = match parse_amount(amount) {
        Ok(units) => match known_balance {
            Some(balance) if units > balance => {
                errors.amount = Some(INSUFFICIENT_BALANCE_MESSAGE.to_string());
                None
            }
            _ => Some(units),
        },
        Err(e) => {
            errors.amount = Some(e.to_string());
            None
        }
    };

    match base_units {
        Some(amount_base_units) if errors.is_empty() => Ok(ValidSend {
            recipient_email: email,
            amount_base_units,
        }),
        _ => Err(errors),
    }
}
