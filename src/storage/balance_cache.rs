// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Recently read USDC balances, keyed by owner wallet.
//!
//! The dashboard polls the sender's balance on a timer, and each send reads
//! it again for the pre-flight check. A balance read within the TTL is served
//! from here instead of the token account. A confirmed send from a wallet
//! drops its entry so the next read reflects the debit.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

struct Observed {
    /// USDC held by the wallet's associated token account, in base units.
    base_units: u64,
    read_at: Instant,
}

pub struct BalanceCache {
    balances: Mutex<LruCache<String, Observed>>,
    ttl: Duration,
}

impl BalanceCache {
    /// Remembers up to `wallets` balances, each trusted for `ttl` after the read.
    pub fn new(wallets: usize, ttl: Duration) -> Self {
        Self {
            balances: Mutex::new(LruCache::new(
                NonZeroUsize::new(wallets).unwrap_or(NonZeroUsize::MIN),
            )),
            ttl,
        }
    }

    /// Balance in base units from a read younger than the TTL.
    pub fn get(&self, wallet: &str) -> Option<u64> {
        let mut balances = self.balances.lock().ok()?;
        if let Some(observed) = balances.get(wallet) {
            if observed.read_at.elapsed() < self.ttl {
                return Some(observed.base_units);
            }
            balances.pop(wallet);
        }
        None
    }

    /// Record a balance just read from chain.
    pub fn put(&self, wallet: &str, base_units: u64) {
        if let Ok(mut balances) = self.balances.lock() {
            balances.put(
                wallet.to_string(),
                Observed {
                    base_units,
                    read_at: Instant::now(),
                },
            );
        }
    }

    /// Forget the balance after the wallet's funds moved.
    pub fn invalidate(&self, wallet: &str) {
        if let Ok(mut balances) = self.balances.lock() {
            balances.pop(wallet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_balance_is_served_until_ttl() {
        let cache = BalanceCache::new(10, Duration::from_secs(300));
        assert!(cache.get("WalletA").is_none());
        cache.put("WalletA", 25_000_000);
        assert_eq!(cache.get("WalletA"), Some(25_000_000));
    }

    #[test]
    fn debit_invalidates_balance() {
        let cache = BalanceCache::new(10, Duration::from_secs(300));
        cache.put("WalletA", 1);
        cache.invalidate("WalletA");
        assert!(cache.get("WalletA").is_none());
    }

    #[test]
    fn stale_balance_is_not_served() {
        let cache = BalanceCache::new(10, Duration::from_millis(1));
        cache.put("WalletA", 1);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("WalletA").is_none());
    }

    #[test]
    fn addresses_are_case_sensitive() {
        // Base58 addresses differ by case.
        let cache = BalanceCache::new(10, Duration::from_secs(300));
        cache.put("Abc", 7);
        assert!(cache.get("abc").is_none());
    }

    #[test]
    fn least_recently_read_wallet_is_dropped() {
        let cache = BalanceCache::new(1, Duration::from_secs(300));
        cache.put("WalletA", 1);
        cache.put("WalletB", 2);
        assert!(cache.get("WalletA").is_none());
        assert_eq!(cache.get("WalletB"), Some(2));
    }
}
