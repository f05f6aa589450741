// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Simulated yield projection. No funds move; figures are simple interest
//! at a fixed APY.

use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;

use crate::blockchain::amount::AmountError;

/// Advertised APY, in percent.
pub const EARN_APY_PERCENT: Decimal = Decimal::from_parts(55, 0, 0, false, 1);

#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct EarnProjection {
    #[schema(value_type = String)]
    pub principal: Decimal,
    #[schema(value_type = String)]
    pub apy_percent: Decimal,
    /// Annual / 365, three decimals.
    #[schema(value_type = String)]
    pub daily: Decimal,
    /// Annual / 12, two decimals.
    #[schema(value_type = String)]
    pub monthly: Decimal,
    #[schema(value_type = String)]
    pub annual: Decimal,
}

impl EarnProjection {
    pub fn for_principal(principal: Decimal) -> Result<Self, AmountError> {
        if principal.is_sign_negative() {
            return Err(AmountError::NonPositive);
        }
        let annual = principal
            .checked_mul(EARN_APY_PERCENT)
            .ok_or(AmountError::Overflow)?
            / Decimal::ONE_HUNDRED;
        let round = |v: Decimal, dp: u32| v.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
        Ok(Self {
            principal,
            apy_percent: EARN_APY_PERCENT,
            daily: round(annual / Decimal::from(365), 3),
            monthly: round(annual / Decimal::from(12), 2),
            annual: round(annual, 2),
        })
    }

    /// Projection for a user-entered amount. Empty input projects zero.
    pub fn parse(input: &str) -> Result<Self, AmountError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Self::for_principal(Decimal::ZERO);
        }
        let principal = Decimal::from_str(trimmed).map_err(|_| AmountError::Invalid)?;
        Self::for_principal(principal)
    }
}
