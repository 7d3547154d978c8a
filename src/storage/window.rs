//! Per-key window state shared by every counter store.
//!
//! `expired_at` is persisted as Unix milliseconds. Records holding any other
//! representation (such as an RFC 3339 timestamp written by another service
//! sharing the Redis database) fail to decode and are replaced by a fresh
//! window.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RateLimitError, Result, StorageError};
use crate::quota::Quota;
use crate::token::Token;

/// Remaining quota and expiry of one key's current window.
///
/// This is also the persisted record of the Redis store:
/// `{"expired_at": <unix millis>, "tokens": <remaining>}`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WindowState {
    /// Window expiry (Unix milliseconds).
    pub expired_at: u64,

    /// Units left in the window.
    pub tokens: u64,
}

impl WindowState {
    /// A full window starting at `now`.
    pub fn fresh(quota: &Quota, now: u64) -> Self {
        Self {
            expired_at: now.saturating_add(quota.frequency_ms()),
            tokens: quota.limit(),
        }
    }

    /// A window is expired once `now` reaches its expiry.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expired_at
    }

    /// Resolve a stored window: live windows are kept, anything expired or
    /// missing becomes a fresh one.
    pub fn current(stored: Option<Self>, quota: &Quota, now: u64) -> Self {
        match stored {
            Some(window) if !window.is_expired(now) => window,
            _ => Self::fresh(quota, now),
        }
    }

    /// How long the stored entry must outlive `now`.
    ///
    /// Never shorter than the window itself, so lowering the frequency cannot
    /// evict a live window early.
    pub fn ttl(&self, quota: &Quota, now: u64) -> Duration {
        let live_ms = self.expired_at.saturating_sub(now);
        Duration::from_millis(live_ms.max(quota.frequency_ms()))
    }

    /// Deduct `n` units and issue their tokens.
    ///
    /// Tokens are numbered after the units already granted in this window, so
    /// the first grant of a window is number 1. On failure nothing is deducted.
    pub fn take(&mut self, limit: u64, n: u64, now: u64) -> Result<Vec<Token>> {
        check_amount(n)?;

        // A lowered limit must never leave more than `limit` units in a window.
        let remaining = self.tokens.min(limit);
        if remaining < n {
            self.tokens = remaining;
            return Err(RateLimitError::QuotaExhausted {
                requested: n,
                remaining,
                limit,
                retry_after: Some(Duration::from_millis(self.expired_at.saturating_sub(now))),
            });
        }

        let granted = limit - remaining;
        self.tokens = remaining - n;

        Ok((1..=n)
            .map(|i| Token::new(granted + i, self.expired_at))
            .collect())
    }

    /// Encode for persistence.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()).into())
    }

    /// Decode a persisted record. Malformed data, including bytes that are
    /// not UTF-8, decodes to `None`.
    pub fn decode(raw: &[u8]) -> Option<Self> {
        serde_json::from_slice(raw).ok()
    }
}

/// Reject acquisitions of zero units.
pub(crate) fn check_amount(n: u64) -> Result<()> {
    if n == 0 {
        return Err(RateLimitError::InvalidRequest(
            "must acquire at least one unit".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota() -> Quota {
        Quota::per_second(3)
    }

    #[test]
    fn test_fresh_window() {
        let window = WindowState::fresh(&quota(), 1000);
        assert_eq!(window.tokens, 3);
        assert_eq!(window.expired_at, 2000);
        assert!(!window.is_expired(1999));
        assert!(window.is_expired(2000));
    }

    #[test]
    fn test_current_replaces_expired() {
        let stale = WindowState {
            expired_at: 1500,
            tokens: 0,
        };
        let window = WindowState::current(Some(stale), &quota(), 1500);
        assert_eq!(window, WindowState::fresh(&quota(), 1500));

        let live = WindowState {
            expired_at: 1600,
            tokens: 1,
        };
        assert_eq!(WindowState::current(Some(live), &quota(), 1500), live);
        assert_eq!(
            WindowState::current(None, &quota(), 1500),
            WindowState::fresh(&quota(), 1500)
        );
    }

    #[test]
    fn test_take_numbers_sequentially() {
        let mut window = WindowState::fresh(&quota(), 0);

        let numbers: Vec<u64> = (0..3)
            .map(|_| window.take(3, 1, 0).unwrap()[0].number())
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(window.tokens, 0);

        let err = window.take(3, 1, 400).unwrap_err();
        match err {
            RateLimitError::QuotaExhausted {
                requested,
                remaining,
                limit,
                retry_after,
            } => {
                assert_eq!(requested, 1);
                assert_eq!(remaining, 0);
                assert_eq!(limit, 3);
                assert_eq!(retry_after, Some(Duration::from_millis(600)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_take_many_deducts_all() {
        let mut window = WindowState::fresh(&Quota::per_second(10), 0);

        let tokens = window.take(10, 4, 0).unwrap();
        let numbers: Vec<u64> = tokens.iter().map(Token::number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert!(tokens.iter().all(|t| t.expires_at_ms() == 1000));
        assert_eq!(window.tokens, 6);

        let tokens = window.take(10, 2, 0).unwrap();
        assert_eq!(tokens[0].number(), 5);
        assert_eq!(tokens[1].number(), 6);
    }

    #[test]
    fn test_take_rejects_partial_grant() {
        let mut window = WindowState {
            expired_at: 1000,
            tokens: 2,
        };
        assert!(window.take(3, 3, 0).unwrap_err().is_quota_exhausted());
        assert_eq!(window.tokens, 2);
    }

    #[test]
    fn test_take_zero_is_invalid() {
        let mut window = WindowState::fresh(&quota(), 0);
        assert!(matches!(
            window.take(3, 0, 0),
            Err(RateLimitError::InvalidRequest(_))
        ));
        assert_eq!(window.tokens, 3);
    }

    #[test]
    fn test_take_clamps_to_lowered_limit() {
        let mut window = WindowState {
            expired_at: 1000,
            tokens: 10,
        };
        let tokens = window.take(4, 1, 0).unwrap();
        assert_eq!(tokens[0].number(), 1);
        assert_eq!(window.tokens, 3);
    }

    #[test]
    fn test_take_after_raised_limit_skips_ahead() {
        let mut window = WindowState::fresh(&quota(), 0);
        window.take(3, 2, 0).unwrap();

        let tokens = window.take(10, 1, 0).unwrap();
        assert_eq!(tokens[0].number(), 10);
        assert_eq!(window.tokens, 0);
    }

    #[test]
    fn test_record_format() {
        let window = WindowState {
            expired_at: 1234,
            tokens: 5,
        };
        let json = window.encode().unwrap();
        assert_eq!(json, r#"{"expired_at":1234,"tokens":5}"#);
        assert_eq!(WindowState::decode(json.as_bytes()), Some(window));
    }

    #[test]
    fn test_decode_malformed() {
        assert_eq!(WindowState::decode(b""), None);
        assert_eq!(WindowState::decode(b"not json"), None);
        assert_eq!(WindowState::decode(br#"{"tokens":"many"}"#), None);
        assert_eq!(WindowState::decode(&[0xff, 0xfe, b'{']), None);
        assert_eq!(
            WindowState::decode(br#"{"expired_at":"2024-05-01T10:00:00Z","tokens":3}"#),
            None
        );
    }

    #[test]
    fn test_ttl_covers_live_window() {
        let window = WindowState::fresh(&Quota::new(1, Duration::from_secs(60)), 0);

        // Frequency lowered after the window was created.
        let lowered = Quota::new(1, Duration::from_millis(10));
        assert_eq!(window.ttl(&lowered, 1_000), Duration::from_millis(59_000));

        // Idle keys still live one full window past their last write.
        let raised = Quota::new(1, Duration::from_secs(120));
        assert_eq!(window.ttl(&raised, 1_000), Duration::from_secs(120));
    }
}
