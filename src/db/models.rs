use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;

/// Shortest lifetime a message may have.
pub const MIN_TTL_SECS: i64 = 1;

/// Longest lifetime a message may have (7 days).
pub const MAX_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Lifetime substituted for a non-positive request when nothing else is configured.
pub const DEFAULT_TTL_SECS: i64 = 24 * 60 * 60;

/// Stored one-time message. Contents are opaque to the server.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub ciphertext: String,
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
}

impl Message {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Message as handed to the store for creation
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub ciphertext: String,
    pub nonce: String,
    /// Requested lifetime; clamped by the store
    pub ttl_secs: i64,
}

/// Receipt for a stored message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMessage {
    pub id: String,
    pub expires_at: DateTime<Utc>,
    /// Lifetime actually applied after clamping
    pub ttl_secs: i64,
}

/// Clamp a requested lifetime into `[MIN_TTL_SECS, MAX_TTL_SECS]`.
///
/// Non-positive requests get `default_secs`, which is clamped the same way.
pub fn clamp_ttl(requested_secs: i64, default_secs: i64) -> Duration {
    let secs = if requested_secs <= 0 {
        default_secs
    } else {
        requested_secs
    };
    Duration::seconds(secs.clamp(MIN_TTL_SECS, MAX_TTL_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clamp_zero_uses_default() {
        assert_eq!(clamp_ttl(0, DEFAULT_TTL_SECS), Duration::hours(24));
    }

    #[test]
    fn test_clamp_negative_uses_default() {
        assert_eq!(clamp_ttl(-30, DEFAULT_TTL_SECS), Duration::hours(24));
        assert_eq!(clamp_ttl(i64::MIN, 3600), Duration::hours(1));
    }

    #[test]
    fn test_clamp_caps_at_seven_days() {
        assert_eq!(clamp_ttl(999_999_999, DEFAULT_TTL_SECS), Duration::days(7));
        assert_eq!(clamp_ttl(i64::MAX, DEFAULT_TTL_SECS), Duration::days(7));
    }

    #[test]
    fn test_clamp_passes_through_in_range() {
        assert_eq!(clamp_ttl(60, DEFAULT_TTL_SECS), Duration::seconds(60));
        assert_eq!(clamp_ttl(1, DEFAULT_TTL_SECS), Duration::seconds(1));
        assert_eq!(clamp_ttl(MAX_TTL_SECS, DEFAULT_TTL_SECS), Duration::days(7));
    }

    #[test]
    fn test_clamp_bad_default_is_clamped_too() {
        assert_eq!(clamp_ttl(0, 0), Duration::seconds(MIN_TTL_SECS));
        assert_eq!(clamp_ttl(0, 30 * 86_400), Duration::days(7));
    }

    #[test]
    fn test_message_expiry_boundary() {
        let now = Utc::now();
        let message = Message {
            id: "id".to_string(),
            ciphertext: "c".to_string(),
            nonce: "n".to_string(),
            expires_at: now,
        };
        assert!(message.is_expired_at(now));
        assert!(!message.is_expired_at(now - Duration::seconds(1)));
    }

    proptest! {
        #[test]
        fn prop_clamp_always_in_range(requested in any::<i64>(), default in any::<i64>()) {
            let ttl = clamp_ttl(requested, default).num_seconds();
            prop_assert!((MIN_TTL_SECS..=MAX_TTL_SECS).contains(&ttl));
        }

        #[test]
        fn prop_clamp_identity_inside_range(requested in MIN_TTL_SECS..=MAX_TTL_SECS) {
            prop_assert_eq!(clamp_ttl(requested, DEFAULT_TTL_SECS).num_seconds(), requested);
        }
    }
}
