//! Cached snapshots for the CACHED sharing tier (spec §4.5): a recipient
//! gets an encrypted point-in-time copy of a resource instead of live
//! access, refreshed on a timer rather than on every read.
//!
//! Each snapshot is sealed under a fresh one-shot X25519 keypair, never
//! the vault's long-term encryption key, and carries a detached signature
//! over `capability_id || ciphertext || ephemeral_pub` so a recipient can
//! reject a tampered snapshot before attempting to decrypt it.

use crate::crypto::{
    aead_decrypt, aead_encrypt, derive_snapshot_key, ed25519_verify, random_nonce, x25519_diffie_hellman, x25519_generate,
};
use crate::error::VaultResult;
use crate::identity::VersionedIdentity;
use crate::types::ResourceName;

#[derive(Clone, Debug)]
pub struct CachedSnapshot {
    pub capability_id: String,
    pub resource: ResourceName,
    pub recipient_pub: [u8; 32],
    pub ephemeral_pub: [u8; 32],
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub signature: [u8; 64],
    pub created_at_ms: u64,
    pub pushed_to_relay: bool,
}

/// Default refresh interval (spec §4.5): a cached snapshot older than this
/// is due for a rebuild the next time the refresh loop runs.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 3_600_000;

fn signable_bytes(capability_id: &str, ciphertext: &[u8], ephemeral_pub: &[u8; 32]) -> Vec<u8> {
    let mut signable = Vec::with_capacity(capability_id.len() + ciphertext.len() + 32);
    signable.extend_from_slice(capability_id.as_bytes());
    signable.extend_from_slice(ciphertext);
    signable.extend_from_slice(ephemeral_pub);
    signable
}

/// Generates a fresh ephemeral X25519 keypair, encrypts `plaintext` under
/// `ECDH(ephemeral_priv, recipient_pub) || "ocmt-cached-snapshot-v1"`
/// (spec §4.1/§4.5), and signs `capability_id || ciphertext || ephemeral_pub`
/// with the vault's signing key. The ephemeral private key is discarded
/// immediately — it is never stored.
pub fn create_cached_snapshot(
    identity: &VersionedIdentity,
    capability_id: &str,
    resource: ResourceName,
    recipient_pub: [u8; 32],
    plaintext: &[u8],
    now_ms: u64,
) -> VaultResult<CachedSnapshot> {
    let (ephemeral_priv, ephemeral_pub) = x25519_generate()?;
    let shared = x25519_diffie_hellman(&ephemeral_priv, &recipient_pub);
    let key = derive_snapshot_key(&shared);
    let nonce = random_nonce()?;
    let aad = resource.0.as_bytes();
    let ciphertext = aead_encrypt(&key, aad, plaintext, &nonce)?;
    let signature = identity.sign(&signable_bytes(capability_id, &ciphertext, &ephemeral_pub))?;
    Ok(CachedSnapshot {
        capability_id: capability_id.to_string(),
        resource,
        recipient_pub,
        ephemeral_pub,
        nonce: nonce.to_vec(),
        ciphertext,
        signature,
        created_at_ms: now_ms,
        pushed_to_relay: false,
    })
}

/// Recipient-side decrypt: verifies the detached signature under the
/// issuer's signing key first, then derives the shared key from the
/// recipient's own private key and the snapshot's ephemeral public key —
/// never the issuer's long-term key (spec §8 scenario 4: tampering any
/// one byte of ciphertext, ephemeral_pub, or signature must be rejected).
pub fn decrypt_cached_snapshot(
    snapshot: &CachedSnapshot,
    recipient_priv: &[u8; 32],
    issuer_signing_pub: &[u8; 32],
) -> VaultResult<Vec<u8>> {
    let signable = signable_bytes(&snapshot.capability_id, &snapshot.ciphertext, &snapshot.ephemeral_pub);
    ed25519_verify(issuer_signing_pub, &signable, &snapshot.signature)?;
    let shared = x25519_diffie_hellman(recipient_priv, &snapshot.ephemeral_pub);
    let key = derive_snapshot_key(&shared);
    let aad = snapshot.resource.0.as_bytes();
    Ok(aead_decrypt(&key, aad, &snapshot.nonce, &snapshot.ciphertext)?)
}

pub fn refresh_due(snapshot: &CachedSnapshot, now_ms: u64, interval_ms: u64) -> bool {
    now_ms.saturating_sub(snapshot.created_at_ms) >= interval_ms
}

pub fn mark_pushed(snapshot: &mut CachedSnapshot) {
    snapshot.pushed_to_relay = true;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::x25519_generate;
    use crate::error::VaultError;

    #[test]
    fn recipient_can_decrypt_what_issuer_encrypted() {
        let identity = VersionedIdentity::generate().unwrap();
        let (recipient_priv, recipient_pub) = x25519_generate().unwrap();
        let snapshot = create_cached_snapshot(
            &identity,
            "cap-1",
            ResourceName("doc-1".to_string()),
            recipient_pub,
            b"plaintext payload",
            1_000,
        )
        .unwrap();
        let plaintext = decrypt_cached_snapshot(&snapshot, &recipient_priv, &identity.signing_pub).unwrap();
        assert_eq!(plaintext, b"plaintext payload");
    }

    #[test]
    fn tampered_signature_byte_is_rejected() {
        let identity = VersionedIdentity::generate().unwrap();
        let (recipient_priv, recipient_pub) = x25519_generate().unwrap();
        let mut snapshot =
            create_cached_snapshot(&identity, "cap-1", ResourceName("doc-1".to_string()), recipient_pub, b"secret", 0).unwrap();
        snapshot.signature[0] ^= 0x01;
        let err = decrypt_cached_snapshot(&snapshot, &recipient_priv, &identity.signing_pub).unwrap_err();
        assert!(matches!(err, VaultError::BadSignature));
    }

    #[test]
    fn tampered_ephemeral_pub_is_rejected() {
        let identity = VersionedIdentity::generate().unwrap();
        let (recipient_priv, recipient_pub) = x25519_generate().unwrap();
        let mut snapshot =
            create_cached_snapshot(&identity, "cap-1", ResourceName("doc-1".to_string()), recipient_pub, b"secret", 0).unwrap();
        snapshot.ephemeral_pub[0] ^= 0x01;
        let err = decrypt_cached_snapshot(&snapshot, &recipient_priv, &identity.signing_pub).unwrap_err();
        assert!(matches!(err, VaultError::BadSignature));
    }

    #[test]
    fn tampered_ciphertext_byte_is_rejected() {
        let identity = VersionedIdentity::generate().unwrap();
        let (recipient_priv, recipient_pub) = x25519_generate().unwrap();
        let mut snapshot =
            create_cached_snapshot(&identity, "cap-1", ResourceName("doc-1".to_string()), recipient_pub, b"secret", 0).unwrap();
        let last = snapshot.ciphertext.len() - 1;
        snapshot.ciphertext[last] ^= 0x01;
        let err = decrypt_cached_snapshot(&snapshot, &recipient_priv, &identity.signing_pub).unwrap_err();
        assert!(matches!(err, VaultError::BadSignature));
    }

    #[test]
    fn refresh_due_respects_interval() {
        let snapshot = CachedSnapshot {
            capability_id: "cap-1".to_string(),
            resource: ResourceName("doc-1".to_string()),
            recipient_pub: [0u8; 32],
            ephemeral_pub: [0u8; 32],
            nonce: vec![],
            ciphertext: vec![],
            signature: [0u8; 64],
            created_at_ms: 0,
            pushed_to_relay: false,
        };
        assert!(!refresh_due(&snapshot, 100, 3_600_000));
        assert!(refresh_due(&snapshot, 3_600_001, 3_600_000));
    }
}
