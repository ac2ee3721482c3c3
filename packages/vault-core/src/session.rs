//! The unlocked vault's single in-memory session and its 30-minute TTL
//! (spec §4.2, §5). A vault has at most one live session at a time; there
//! is no multi-session registry the way a multi-tenant key service needs.

use std::fmt;

use zeroize::Zeroize;

/// Holds the vault key while the vault is unlocked. `Drop` zeroizes it, so
/// a lock (or a session expiring) leaves no readable copy behind.
pub struct VaultSession {
    pub unlocked_at_ms: u64,
    pub expires_at_ms: u64,
    vault_key: Vec<u8>,
}

impl fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSession")
            .field("unlocked_at_ms", &self.unlocked_at_ms)
            .field("expires_at_ms", &self.expires_at_ms)
            .field("vault_key", &"<redacted>")
            .finish()
    }
}

impl VaultSession {
    pub const DEFAULT_TTL_MS: u64 = 30 * 60 * 1000;

    pub fn new(now_ms: u64, vault_key: Vec<u8>, ttl_ms: u64) -> Self {
        Self {
            unlocked_at_ms: now_ms,
            expires_at_ms: now_ms + ttl_ms,
            vault_key,
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    pub fn extend(&mut self, now_ms: u64, ttl_ms: u64) {
        self.expires_at_ms = now_ms + ttl_ms;
    }

    pub fn vault_key(&self) -> &[u8] {
        &self.vault_key
    }
}

impl Drop for VaultSession {
    fn drop(&mut self) {
        self.vault_key.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_expires_after_ttl() {
        let session = VaultSession::new(1_000, vec![0u8; 32], 500);
        assert!(!session.is_expired(1_499));
        assert!(session.is_expired(1_500));
    }

    #[test]
    fn extend_pushes_expiry_forward() {
        let mut session = VaultSession::new(1_000, vec![0u8; 32], 500);
        session.extend(1_400, 500);
        assert_eq!(session.expires_at_ms, 1_900);
    }
}
