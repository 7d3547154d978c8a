//! Proof-of-grant tokens.
//!
//! Every successful acquisition hands back one [`Token`] per granted unit. A
//! token is immutable and owned by the caller that received it.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::storage::current_timestamp_ms;

/// One unit of quota granted within a window.
///
/// Tokens in a window are numbered `1..=limit` in the order they were granted,
/// and all tokens of a window share its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    number: u64,
    expires_at_ms: u64,
}

impl Token {
    pub(crate) fn new(number: u64, expires_at_ms: u64) -> Self {
        Self {
            number,
            expires_at_ms,
        }
    }

    /// Sequence number of this grant within its window, starting at 1.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// When the window this token belongs to expires.
    pub fn expires_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.expires_at_ms)
    }

    /// Window expiry as milliseconds since the Unix epoch.
    pub fn expires_at_ms(&self) -> u64 {
        self.expires_at_ms
    }

    /// Time left until the window expires, zero once it has.
    pub fn time_until_expiry(&self) -> Duration {
        Duration::from_millis(self.expires_at_ms.saturating_sub(current_timestamp_ms()))
    }

    /// Whether the window this token belongs to has already rolled over.
    pub fn is_expired(&self) -> bool {
        current_timestamp_ms() >= self.expires_at_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_accessors() {
        let token = Token::new(3, 1_700_000_000_000);

        assert_eq!(token.number(), 3);
        assert_eq!(token.expires_at_ms(), 1_700_000_000_000);
        assert_eq!(
            token.expires_at(),
            UNIX_EPOCH + Duration::from_secs(1_700_000_000)
        );
        assert!(token.is_expired());
        assert_eq!(token.time_until_expiry(), Duration::ZERO);
    }

    #[test]
    fn test_token_in_future() {
        let token = Token::new(1, current_timestamp_ms() + 60_000);

        assert!(!token.is_expired());
        assert!(token.time_until_expiry() > Duration::from_secs(50));
    }
}
