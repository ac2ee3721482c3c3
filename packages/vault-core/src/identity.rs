//! Versioned identity and the key-rotation state machine (spec §3, §4.3).
//!
//! A vault owns one signing identity (Ed25519) and one encryption identity
//! (X25519), each tagged with a monotonically increasing `KeyVersion`.
//! Rotating either key does not invalidate capabilities signed under the
//! previous version immediately — there is a bounded transition window
//! during which both the old and new key verify, so in-flight capabilities
//! have time to be reissued.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::{ed25519_generate, ed25519_sign, ed25519_verify, x25519_generate};
use crate::error::{VaultError, VaultResult};
use crate::hash::key_id_fingerprint;
use crate::types::KeyVersion;
use crate::wire::{b64_decode_fixed32, b64_encode, decode_private_key_pem, encode_private_key_pem, KeyAlgorithm};

/// A retired signing key, kept around for the duration of a rotation's
/// transition window so signatures it produced keep verifying.
#[derive(Clone, Serialize, Deserialize)]
pub struct ArchivedKey {
    pub key_version: KeyVersion,
    pub public_key: [u8; 32],
    pub archived_at_ms: u64,
}

/// Steady -> Transitioning -> Complete (spec §4.3). `Complete` folds back
/// into `Steady` once the caller acknowledges it via `complete_transition`;
/// the engine never auto-advances out of `Transitioning`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationState {
    Steady,
    Transitioning { transition_ends_at_ms: u64 },
    Complete,
}

/// Raw key material in a form that can be serialized into the vault's
/// encrypted document blob and reconstructed on unlock.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityKeyMaterial {
    pub key_version: KeyVersion,
    pub signing_priv: [u8; 32],
    pub signing_pub: [u8; 32],
    pub encryption_priv: [u8; 32],
    pub encryption_pub: [u8; 32],
    pub rotation_state: RotationState,
    pub archived_signing_keys: Vec<ArchivedKey>,
}

/// On-disk form of `IdentityKeyMaterial`: private keys PEM/PKCS#8-encoded
/// (spec §6), public keys base64. Converted at the `DocumentPlain`
/// serialization boundary in `vault.rs` — the in-memory representation
/// stays raw bytes throughout the rest of the crate.
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentityKeyMaterialWire {
    pub key_version: KeyVersion,
    pub signing_priv_pem: String,
    pub signing_pub: String,
    pub encryption_priv_pem: String,
    pub encryption_pub: String,
    pub rotation_state: RotationState,
    pub archived_signing_keys: Vec<ArchivedKeyWire>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ArchivedKeyWire {
    pub key_version: KeyVersion,
    pub public_key: String,
    pub archived_at_ms: u64,
}

impl IdentityKeyMaterial {
    pub fn to_wire(&self) -> VaultResult<IdentityKeyMaterialWire> {
        Ok(IdentityKeyMaterialWire {
            key_version: self.key_version,
            signing_priv_pem: encode_private_key_pem(KeyAlgorithm::Ed25519, &self.signing_priv)?,
            signing_pub: b64_encode(&self.signing_pub),
            encryption_priv_pem: encode_private_key_pem(KeyAlgorithm::X25519, &self.encryption_priv)?,
            encryption_pub: b64_encode(&self.encryption_pub),
            rotation_state: self.rotation_state.clone(),
            archived_signing_keys: self
                .archived_signing_keys
                .iter()
                .map(|k| ArchivedKeyWire {
                    key_version: k.key_version,
                    public_key: b64_encode(&k.public_key),
                    archived_at_ms: k.archived_at_ms,
                })
                .collect(),
        })
    }

    pub fn from_wire(wire: IdentityKeyMaterialWire) -> VaultResult<Self> {
        let archived_signing_keys = wire
            .archived_signing_keys
            .into_iter()
            .map(|k| {
                Ok(ArchivedKey {
                    key_version: k.key_version,
                    public_key: b64_decode_fixed32(&k.public_key)?,
                    archived_at_ms: k.archived_at_ms,
                })
            })
            .collect::<VaultResult<Vec<_>>>()?;
        Ok(Self {
            key_version: wire.key_version,
            signing_priv: decode_private_key_pem(KeyAlgorithm::Ed25519, &wire.signing_priv_pem)?,
            signing_pub: b64_decode_fixed32(&wire.signing_pub)?,
            encryption_priv: decode_private_key_pem(KeyAlgorithm::X25519, &wire.encryption_priv_pem)?,
            encryption_pub: b64_decode_fixed32(&wire.encryption_pub)?,
            rotation_state: wire.rotation_state,
            archived_signing_keys,
        })
    }
}

pub struct VersionedIdentity {
    pub key_version: KeyVersion,
    signing_priv: [u8; 32],
    pub signing_pub: [u8; 32],
    encryption_priv: [u8; 32],
    pub encryption_pub: [u8; 32],
    pub rotation_state: RotationState,
    pub archived_signing_keys: Vec<ArchivedKey>,
}

impl Drop for VersionedIdentity {
    fn drop(&mut self) {
        self.signing_priv.zeroize();
        self.encryption_priv.zeroize();
    }
}

impl VersionedIdentity {
    pub fn generate() -> VaultResult<Self> {
        let (signing_priv, signing_pub) = ed25519_generate()?;
        let (encryption_priv, encryption_pub) = x25519_generate()?;
        Ok(Self {
            key_version: KeyVersion(1),
            signing_priv,
            signing_pub,
            encryption_priv,
            encryption_pub,
            rotation_state: RotationState::Steady,
            archived_signing_keys: Vec::new(),
        })
    }

    pub fn key_id(&self) -> [u8; 16] {
        key_id_fingerprint(&self.signing_pub)
    }

    pub fn sign(&self, data: &[u8]) -> VaultResult<[u8; 64]> {
        Ok(ed25519_sign(&self.signing_priv, data)?)
    }

    pub fn encryption_private_key(&self) -> &[u8; 32] {
        &self.encryption_priv
    }

    /// Exports the raw key material for persistence inside the vault's
    /// AEAD-encrypted document blob. Never serialize this to the plaintext
    /// envelope — only `vault.rs`'s encrypted `document` field may hold it.
    pub fn export_key_material(&self) -> IdentityKeyMaterial {
        IdentityKeyMaterial {
            key_version: self.key_version,
            signing_priv: self.signing_priv,
            signing_pub: self.signing_pub,
            encryption_priv: self.encryption_priv,
            encryption_pub: self.encryption_pub,
            rotation_state: self.rotation_state.clone(),
            archived_signing_keys: self.archived_signing_keys.clone(),
        }
    }

    pub fn from_key_material(material: IdentityKeyMaterial) -> Self {
        Self {
            key_version: material.key_version,
            signing_priv: material.signing_priv,
            signing_pub: material.signing_pub,
            encryption_priv: material.encryption_priv,
            encryption_pub: material.encryption_pub,
            rotation_state: material.rotation_state,
            archived_signing_keys: material.archived_signing_keys,
        }
    }

    /// Checks `signature` against the current signing key, or — while a
    /// rotation transition is open — against the archived key that matches
    /// `key_version` (spec §4.3: "both keys verify during the window").
    pub fn verify_with_any_valid_key(
        &self,
        key_version: KeyVersion,
        data: &[u8],
        signature: &[u8],
        now_ms: u64,
    ) -> VaultResult<()> {
        if key_version == self.key_version {
            return Ok(ed25519_verify(&self.signing_pub, data, signature)?);
        }
        let within_window = match &self.rotation_state {
            RotationState::Transitioning { transition_ends_at_ms } => now_ms < *transition_ends_at_ms,
            _ => false,
        };
        if !within_window {
            return Err(VaultError::BadSignature);
        }
        let archived = self
            .archived_signing_keys
            .iter()
            .find(|k| k.key_version == key_version)
            .ok_or(VaultError::BadSignature)?;
        Ok(ed25519_verify(&archived.public_key, data, signature)?)
    }

    /// Begins rotating the signing key: archives the current key, mints a
    /// fresh one, opens a transition window of `window_ms`.
    pub fn rotate_signing_key(&mut self, now_ms: u64, window_ms: u64) -> VaultResult<()> {
        let (new_priv, new_pub) = ed25519_generate()?;
        self.archived_signing_keys.push(ArchivedKey {
            key_version: self.key_version,
            public_key: self.signing_pub,
            archived_at_ms: now_ms,
        });
        self.signing_priv.zeroize();
        self.signing_priv = new_priv;
        self.signing_pub = new_pub;
        self.key_version = KeyVersion(self.key_version.0 + 1);
        self.rotation_state = RotationState::Transitioning {
            transition_ends_at_ms: now_ms + window_ms,
        };
        Ok(())
    }

    /// Rotates the encryption key. Encryption keys have no transition
    /// window of their own: previously shared snapshot keys simply stop
    /// being derivable once this runs (spec §4.3/§4.5), so callers must
    /// re-push snapshots to recipients after rotating.
    pub fn rotate_encryption_key(&mut self) -> VaultResult<()> {
        let (new_priv, new_pub) = x25519_generate()?;
        self.encryption_priv.zeroize();
        self.encryption_priv = new_priv;
        self.encryption_pub = new_pub;
        Ok(())
    }

    /// Closes an open transition window, moving `Transitioning -> Complete`.
    /// Errors if no transition is in progress (spec §7).
    pub fn complete_transition(&mut self) -> VaultResult<()> {
        match self.rotation_state {
            RotationState::Transitioning { .. } => {
                self.rotation_state = RotationState::Complete;
                Ok(())
            }
            _ => Err(VaultError::NoTransitionInProgress),
        }
    }

    /// Acknowledges a `Complete` rotation, returning the identity to
    /// `Steady` and dropping keys archived outside any still-open window.
    pub fn acknowledge_complete(&mut self, now_ms: u64, retention_ms: u64) {
        if self.rotation_state == RotationState::Complete {
            self.rotation_state = RotationState::Steady;
        }
        self.archived_signing_keys
            .retain(|k| now_ms.saturating_sub(k.archived_at_ms) < retention_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_identity_verifies_its_own_signature() {
        let identity = VersionedIdentity::generate().unwrap();
        let sig = identity.sign(b"payload").unwrap();
        identity
            .verify_with_any_valid_key(identity.key_version, b"payload", &sig, 0)
            .unwrap();
    }

    #[test]
    fn rotation_keeps_old_signature_valid_within_window() {
        let mut identity = VersionedIdentity::generate().unwrap();
        let old_version = identity.key_version;
        let sig = identity.sign(b"payload").unwrap();
        identity.rotate_signing_key(1_000, 60_000).unwrap();
        assert_ne!(identity.key_version, old_version);
        identity
            .verify_with_any_valid_key(old_version, b"payload", &sig, 1_500)
            .expect("archived key still verifies inside window");
    }

    #[test]
    fn rotation_rejects_old_signature_after_window_closes() {
        let mut identity = VersionedIdentity::generate().unwrap();
        let old_version = identity.key_version;
        let sig = identity.sign(b"payload").unwrap();
        identity.rotate_signing_key(1_000, 60_000).unwrap();
        let err = identity
            .verify_with_any_valid_key(old_version, b"payload", &sig, 100_000)
            .unwrap_err();
        assert!(matches!(err, VaultError::BadSignature));
    }

    #[test]
    fn key_material_survives_a_pem_wire_round_trip() {
        let identity = VersionedIdentity::generate().unwrap();
        let material = identity.export_key_material();
        let wire = material.to_wire().unwrap();
        assert!(wire.signing_priv_pem.contains("PRIVATE KEY"));
        let restored = IdentityKeyMaterial::from_wire(wire).unwrap();
        assert_eq!(restored.signing_priv, material.signing_priv);
        assert_eq!(restored.encryption_priv, material.encryption_priv);
        assert_eq!(restored.signing_pub, material.signing_pub);
    }

    #[test]
    fn complete_transition_requires_one_in_progress() {
        let mut identity = VersionedIdentity::generate().unwrap();
        assert!(matches!(
            identity.complete_transition(),
            Err(VaultError::NoTransitionInProgress)
        ));
        identity.rotate_signing_key(0, 1_000).unwrap();
        identity.complete_transition().unwrap();
        assert_eq!(identity.rotation_state, RotationState::Complete);
    }
}
