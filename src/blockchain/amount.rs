// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Conversions between user-facing decimal amounts and token base units.
//!
//! Input with more than six fractional digits is rounded half away from
//! zero to the nearest base unit. An input that rounds to zero base units
//! is rejected as non-positive.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use super::types::USDC_DECIMALS;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Please enter a valid amount")]
    Invalid,

    #[error("Amount must be greater than zero")]
    NonPositive,

    #[error("Amount is too large")]
    Overflow,

    #[error("Amount has more than 6 decimal places")]
    TooPrecise,
}

fn scale_factor() -> Decimal {
    Decimal::from(10u64.pow(u32::from(USDC_DECIMALS)))
}

/// Parse a user-entered amount into base units.
pub fn parse_amount(input: &str) -> Result<u64, AmountError> {
    let value = Decimal::from_str(input.trim()).map_err(|_| AmountError::Invalid)?;
    if value <= Decimal::ZERO {
        return Err(AmountError::NonPositive);
    }
    let rounded =
        value.round_dp_with_strategy(u32::from(USDC_DECIMALS), RoundingStrategy::MidpointAwayFromZero);
    let base = rounded
        .checked_mul(scale_factor())
        .and_then(|scaled| scaled.to_u64())
        .ok_or(AmountError::Overflow)?;
    if base == 0 {
        return Err(AmountError::NonPositive);
    }
    Ok(base)
}

/// Exact human-unit value of a base-unit amount.
pub fn base_units_to_decimal(base_units: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(base_units), u32::from(USDC_DECIMALS))
}

/// Exact inverse of [`base_units_to_decimal`]; refuses values that do not
/// land on a whole base unit.
pub fn decimal_to_base_units(value: Decimal) -> Result<u64, AmountError> {
    if value.is_sign_negative() {
        return Err(AmountError::NonPositive);
    }
    let scaled = value.checked_mul(scale_factor()).ok_or(AmountError::Overflow)?;
    if !scaled.fract().is_zero() {
        return Err(AmountError::TooPrecise);
    }
    scaled.to_u64().ok_or(AmountError::Overflow)
}

/// Two-decimal display form, e.g. `25.00`.
pub fn display_amount(value: Decimal) -> String {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

/// Full-precision display with trailing zeros removed, e.g. `1.5`.
pub fn format_base_units(base_units: u64) -> String {
    base_units_to_decimal(base_units).normalize().to_string()
}
