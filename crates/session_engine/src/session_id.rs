//! Session id minting.

use contracts::SessionId;
use uuid::Uuid;

/// Mint a fresh session id: `{device_id}-{unix_seconds}-{8 hex chars}`
///
/// Unique across restarts within the same second.
pub fn mint_session_id(device_id: &str, epoch_secs: i64) -> SessionId {
    let suffix = Uuid::new_v4().simple().to_string();
    SessionId::from(format!("{device_id}-{epoch_secs}-{}", &suffix[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format() {
        let id = mint_session_id("pi-01", 1_700_000_000);
        let s = id.as_str();
        assert!(s.starts_with("pi-01-1700000000-"), "got {s}");

        let suffix = s.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_same_second_ids_differ() {
        let a = mint_session_id("pi-01", 1_700_000_000);
        let b = mint_session_id("pi-01", 1_700_000_000);
        assert_ne!(a, b);
    }
}
