//! Message identifier generation.
//!
//! Identifiers carry 128 bits from the OS random source, encoded as
//! URL-safe base64 without padding so they fit in a path segment and a
//! link fragment unchanged.

use crate::error::{AppError, AppResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes behind every identifier.
pub const ID_BYTES: usize = 16;

/// Length of an encoded identifier.
pub const ID_LEN: usize = 22;

/// Source of message identifiers.
pub trait IdGenerator: Send + Sync {
    fn new_id(&self) -> AppResult<String>;
}

/// Identifier generator backed by the operating system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRngIdGenerator;

impl IdGenerator for OsRngIdGenerator {
    fn new_id(&self) -> AppResult<String> {
        let mut bytes = [0u8; ID_BYTES];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| AppError::EntropyUnavailable(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Check that a string has the shape of a generated identifier.
pub fn is_well_formed(id: &str) -> bool {
    id.len() == ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_is_url_safe_and_unpadded() {
        let id = OsRngIdGenerator.new_id().unwrap();
        assert_eq!(id.len(), ID_LEN);
        assert!(!id.contains('='));
        assert!(!id.contains('+'));
        assert!(!id.contains('/'));
        assert!(is_well_formed(&id));
    }

    #[test]
    fn test_id_decodes_to_sixteen_bytes() {
        let id = OsRngIdGenerator.new_id().unwrap();
        let bytes = URL_SAFE_NO_PAD.decode(id).unwrap();
        assert_eq!(bytes.len(), ID_BYTES);
    }

    #[test]
    fn test_ids_do_not_repeat() {
        let ids: HashSet<String> = (0..1000)
            .map(|_| OsRngIdGenerator.new_id().unwrap())
            .collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_is_well_formed_rejects_other_shapes() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("short"));
        assert!(!is_well_formed("aaaaaaaaaaaaaaaaaaaa=="));
        assert!(!is_well_formed("aaaaaaaaaaaaaaaaaaaaa/"));
        assert!(is_well_formed("AbCdEfGhIjKlMnOpQr-_09"));
    }
}
