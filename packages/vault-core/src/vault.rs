//! The vault document store (spec §5, §6): password-unlocked at-rest
//! encryption of the vault key, atomic file persistence, and the single
//! coarse-grained lock over the decrypted in-memory document.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::adapters::{ClockAdapter, EntropyAdapter};
use crate::audit::{AuditEntry, AuditLog, DEFAULT_RING_CAPACITY};
use crate::capability::{GrantTable, ReceivedCapability};
use crate::ceiling::{AgentCeiling, EscalationRequest, UserGrantCeiling};
use crate::crypto::{aead_decrypt, aead_encrypt, derive_key_scrypt, random_nonce, KdfParams};
use crate::error::{VaultError, VaultResult};
use crate::identity::{IdentityKeyMaterialWire, VersionedIdentity};
use crate::integration::IntegrationTable;
use crate::session::VaultSession;
use crate::snapshot::CachedSnapshot;
use crate::types::{AgentId, EscalationId, ResourceName, SharingTier};
use crate::wire::{b64_decode, b64_encode, EncryptedBlobWire, KdfParamsWire, VaultEnvelope};

const VAULT_ENVELOPE_VERSION: u32 = 1;
const VAULT_AAD: &[u8] = b"ocmt-vault-envelope-v1";

/// Tunables (spec §4.2/§4.5/§4.6/§6, SPEC_FULL §B). Library callers build
/// one of these; reading environment variables is the CLI binary's job.
#[derive(Clone, Debug)]
pub struct VaultConfig {
    pub session_ttl_ms: u64,
    pub refresh_loop_period_ms: u64,
    pub snapshot_refresh_interval_ms: u64,
    pub relay_rpc_timeout_ms: u64,
    pub escalation_cleanup_max_age_ms: u64,
    pub rotation_transition_window_ms: u64,
    /// Overrides the scrypt cost for tests (spec §6, §8). Never set outside tests.
    pub scrypt_log_n_override: Option<u8>,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            session_ttl_ms: VaultSession::DEFAULT_TTL_MS,
            refresh_loop_period_ms: 5 * 60 * 1000,
            snapshot_refresh_interval_ms: crate::snapshot::DEFAULT_REFRESH_INTERVAL_MS,
            relay_rpc_timeout_ms: 10_000,
            escalation_cleanup_max_age_ms: crate::ceiling::DEFAULT_ESCALATION_MAX_AGE_MS,
            rotation_transition_window_ms: 7 * 24 * 60 * 60 * 1000,
            scrypt_log_n_override: None,
        }
    }
}

/// The decrypted, in-memory state of the vault (spec §5: one document, one
/// coarse-grained lock). Every other module's persistent state hangs off
/// this struct so a single mutex protects it all.
pub struct VaultInner {
    pub identity: VersionedIdentity,
    pub capabilities: GrantTable,
    pub snapshots: HashMap<String, CachedSnapshot>,
    pub agent_ceilings: HashMap<AgentId, AgentCeiling>,
    pub user_grant_ceiling: UserGrantCeiling,
    pub escalations: HashMap<EscalationId, EscalationRequest>,
    pub integrations: IntegrationTable,
    pub received_capabilities: HashMap<String, ReceivedCapability>,
    pub audit_log: AuditLog,
}

/// Plaintext shape persisted inside the envelope's encrypted `document`
/// blob — every piece of `VaultInner` state, including the identity's
/// private key material, which never appears anywhere else on disk. The
/// audit log is persisted too (spec §6/C8): it must survive a lock/unlock
/// cycle, not reset to empty on every unlock.
#[derive(serde::Serialize, serde::Deserialize)]
struct DocumentPlain {
    identity: IdentityKeyMaterialWire,
    capabilities: GrantTable,
    #[serde(default)]
    snapshots: HashMap<String, CachedSnapshotWire>,
    #[serde(default)]
    escalations: HashMap<String, EscalationRequestWire>,
    #[serde(default)]
    agent_ceilings: HashMap<String, Vec<String>>,
    user_grant_ceiling: Vec<String>,
    #[serde(default)]
    integrations: IntegrationTable,
    #[serde(default)]
    received_capabilities: HashMap<String, ReceivedCapability>,
    #[serde(default)]
    audit_log: Vec<AuditEntry>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CachedSnapshotWire {
    capability_id: String,
    resource: String,
    recipient_pub: [u8; 32],
    ephemeral_pub: [u8; 32],
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
    signature: [u8; 64],
    created_at_ms: u64,
    pushed_to_relay: bool,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct EscalationRequestWire {
    agent_id: String,
    requested: Vec<String>,
    escalated: Vec<String>,
    status: String,
    created_at_ms: u64,
    decided_at_ms: Option<u64>,
    resource: String,
    subject: String,
    sub_enc: Option<String>,
    tier: SharingTier,
    ttl_ms: u64,
}

pub struct VaultStore {
    path: PathBuf,
    document_lock: Mutex<Option<VaultInner>>,
    writer_lock: Mutex<()>,
    session: Mutex<Option<VaultSession>>,
    config: VaultConfig,
}

impl VaultStore {
    pub fn new(path: impl Into<PathBuf>, config: VaultConfig) -> Self {
        Self {
            path: path.into(),
            document_lock: Mutex::new(None),
            writer_lock: Mutex::new(()),
            session: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Creates a brand-new vault at `path` (spec §6 `initialize`). Fails if
    /// one already exists there.
    pub fn initialize(
        &self,
        password: &[u8],
        entropy: &dyn EntropyAdapter,
        clock: &dyn ClockAdapter,
    ) -> VaultResult<()> {
        if self.exists() {
            return Err(VaultError::AlreadyExists);
        }
        let identity = VersionedIdentity::generate()?;
        let vault_key = entropy.random_bytes(32);
        let document = DocumentPlain {
            identity: identity.export_key_material().to_wire()?,
            capabilities: GrantTable::new(),
            snapshots: HashMap::new(),
            escalations: HashMap::new(),
            agent_ceilings: HashMap::new(),
            user_grant_ceiling: crate::types::full_grant_ceiling().iter().map(|l| l.as_str().to_string()).collect(),
            integrations: IntegrationTable::new(),
            received_capabilities: HashMap::new(),
            audit_log: Vec::new(),
        };
        self.persist(&identity, &vault_key, password, &document)?;
        let inner = VaultInner {
            identity,
            capabilities: GrantTable::new(),
            snapshots: HashMap::new(),
            agent_ceilings: HashMap::new(),
            user_grant_ceiling: UserGrantCeiling {
                user_id: crate::types::UserId(String::new()),
                levels: crate::types::full_grant_ceiling(),
            },
            escalations: HashMap::new(),
            integrations: IntegrationTable::new(),
            received_capabilities: HashMap::new(),
            audit_log: AuditLog::default(),
        };
        *self.document_lock.lock().expect("document lock poisoned") = Some(inner);
        *self.session.lock().expect("session lock poisoned") =
            Some(VaultSession::new(clock.now_ms(), vault_key, self.config.session_ttl_ms));
        Ok(())
    }

    /// Unlocks with a password, deriving the vault key via scrypt and
    /// decrypting the envelope (spec §6 `unlock`).
    pub fn unlock(&self, password: &[u8], clock: &dyn ClockAdapter) -> VaultResult<()> {
        let envelope = self.read_envelope()?;
        let kdf_params = KdfParams {
            salt: b64_decode(&envelope.kdf.salt)?,
            log_n: envelope.kdf.log_n,
            r: envelope.kdf.r,
            p: envelope.kdf.p,
        };
        let password_key = derive_key_scrypt(password, &kdf_params)?;
        let vault_key = aead_decrypt(
            &password_key,
            VAULT_AAD,
            &b64_decode(&envelope.wrapped_vault_key.nonce)?,
            &b64_decode(&envelope.wrapped_vault_key.ciphertext)?,
        )
        .map_err(|_| VaultError::BadPassword)?;
        let inner = self.decrypt_document(&envelope, &vault_key)?;
        *self.document_lock.lock().expect("document lock poisoned") = Some(inner);
        *self.session.lock().expect("session lock poisoned") =
            Some(VaultSession::new(clock.now_ms(), vault_key, self.config.session_ttl_ms));
        Ok(())
    }

    /// Locks the vault: drops the session (zeroizing the vault key) and
    /// the decrypted document (spec §6 `lock`).
    pub fn lock(&self) -> VaultResult<()> {
        *self.session.lock().expect("session lock poisoned") = None;
        *self.document_lock.lock().expect("document lock poisoned") = None;
        Ok(())
    }

    pub fn is_unlocked(&self, now_ms: u64) -> bool {
        match &*self.session.lock().expect("session lock poisoned") {
            Some(session) => !session.is_expired(now_ms),
            None => false,
        }
    }

    pub fn extend_session(&self, now_ms: u64) -> VaultResult<()> {
        let mut guard = self.session.lock().expect("session lock poisoned");
        match guard.as_mut() {
            Some(session) if !session.is_expired(now_ms) => {
                session.extend(now_ms, self.config.session_ttl_ms);
                Ok(())
            }
            _ => Err(VaultError::Locked),
        }
    }

    /// Expires the session (and the decrypted document with it) if the TTL
    /// has elapsed. Called by the host on every operation and by the
    /// background lock timer (spec §4.2/§5).
    pub fn expire_if_due(&self, now_ms: u64) {
        let expired = matches!(
            &*self.session.lock().expect("session lock poisoned"),
            Some(session) if session.is_expired(now_ms)
        );
        if expired {
            let _ = self.lock();
        }
    }

    /// Runs `f` with exclusive access to the decrypted document, erroring
    /// with `VaultError::Locked` if the vault isn't currently unlocked.
    pub fn with_document<R>(&self, now_ms: u64, f: impl FnOnce(&mut VaultInner) -> VaultResult<R>) -> VaultResult<R> {
        self.expire_if_due(now_ms);
        let mut guard = self.document_lock.lock().expect("document lock poisoned");
        let inner = guard.as_mut().ok_or(VaultError::Locked)?;
        f(inner)
    }

    /// Persists the current in-memory document back to disk, re-wrapping
    /// the vault key under the same password-derived key (spec §5: writer
    /// lock acquired strictly after the document lock).
    pub fn save(&self) -> VaultResult<()> {
        let vault_key = {
            let guard = self.session.lock().expect("session lock poisoned");
            guard.as_ref().ok_or(VaultError::Locked)?.vault_key().to_vec()
        };
        let existing = self.read_envelope()?;
        let guard = self.document_lock.lock().expect("document lock poisoned");
        let inner = guard.as_ref().ok_or(VaultError::Locked)?;
        let document = to_document_plain(inner)?;
        let _writer_guard = self.writer_lock.lock().expect("writer lock poisoned");
        self.persist_with_existing_kdf(&inner.identity, &vault_key, &existing, &document)
    }

    /// Rotates the password-derived wrapping key without touching the
    /// vault key or any capability state (spec §4.2).
    pub fn rotate_encryption_key(&self, old_password: &[u8], new_password: &[u8]) -> VaultResult<()> {
        let envelope = self.read_envelope()?;
        let kdf_params = KdfParams {
            salt: b64_decode(&envelope.kdf.salt)?,
            log_n: envelope.kdf.log_n,
            r: envelope.kdf.r,
            p: envelope.kdf.p,
        };
        let old_key = derive_key_scrypt(old_password, &kdf_params)?;
        let vault_key = aead_decrypt(
            &old_key,
            VAULT_AAD,
            &b64_decode(&envelope.wrapped_vault_key.nonce)?,
            &b64_decode(&envelope.wrapped_vault_key.ciphertext)?,
        )
        .map_err(|_| VaultError::BadPassword)?;
        let guard = self.document_lock.lock().expect("document lock poisoned");
        let inner = guard.as_ref().ok_or(VaultError::Locked)?;
        let document = to_document_plain(inner)?;
        let _writer_guard = self.writer_lock.lock().expect("writer lock poisoned");
        self.persist(&inner.identity, &vault_key, new_password, &document)
    }

    fn read_envelope(&self) -> VaultResult<VaultEnvelope> {
        if !self.exists() {
            return Err(VaultError::NotInitialized);
        }
        let bytes = fs::read(&self.path).map_err(|e| VaultError::Storage(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| VaultError::Format(e.to_string()))
    }

    fn decrypt_document(&self, envelope: &VaultEnvelope, vault_key: &[u8]) -> VaultResult<VaultInner> {
        let plaintext = aead_decrypt(
            vault_key,
            VAULT_AAD,
            &b64_decode(&envelope.document.nonce)?,
            &b64_decode(&envelope.document.ciphertext)?,
        )?;
        let document: DocumentPlain = serde_json::from_slice(&plaintext).map_err(|e| VaultError::Format(e.to_string()))?;
        let identity = VersionedIdentity::from_key_material(crate::identity::IdentityKeyMaterial::from_wire(document.identity)?);
        let user_grant_ceiling = document
            .user_grant_ceiling
            .iter()
            .filter_map(|s| crate::types::PermissionLevel::try_from(s.as_str()).ok())
            .collect();
        let agent_ceilings = document
            .agent_ceilings
            .into_iter()
            .map(|(agent_id, levels)| {
                let parsed = levels.iter().filter_map(|s| crate::types::PermissionLevel::try_from(s.as_str()).ok()).collect();
                (
                    AgentId(agent_id.clone()),
                    AgentCeiling { agent_id: AgentId(agent_id), levels: parsed },
                )
            })
            .collect();
        let escalations = document
            .escalations
            .into_iter()
            .map(|(id, wire)| {
                let requested = wire.requested.iter().filter_map(|s| crate::types::PermissionLevel::try_from(s.as_str()).ok()).collect();
                let escalated = wire.escalated.iter().filter_map(|s| crate::types::PermissionLevel::try_from(s.as_str()).ok()).collect();
                let status = match wire.status.as_str() {
                    "approved" => crate::ceiling::EscalationStatus::Approved,
                    "denied" => crate::ceiling::EscalationStatus::Denied,
                    _ => crate::ceiling::EscalationStatus::Pending,
                };
                (
                    EscalationId(id.clone()),
                    EscalationRequest {
                        id: EscalationId(id),
                        agent_id: AgentId(wire.agent_id),
                        requested,
                        escalated,
                        status,
                        created_at_ms: wire.created_at_ms,
                        decided_at_ms: wire.decided_at_ms,
                        resource: ResourceName(wire.resource),
                        subject: wire.subject,
                        sub_enc: wire.sub_enc,
                        tier: wire.tier,
                        ttl_ms: wire.ttl_ms,
                    },
                )
            })
            .collect();
        let snapshots = document
            .snapshots
            .into_iter()
            .map(|(id, wire)| {
                (
                    id,
                    CachedSnapshot {
                        capability_id: wire.capability_id,
                        resource: ResourceName(wire.resource),
                        recipient_pub: wire.recipient_pub,
                        ephemeral_pub: wire.ephemeral_pub,
                        nonce: wire.nonce,
                        ciphertext: wire.ciphertext,
                        signature: wire.signature,
                        created_at_ms: wire.created_at_ms,
                        pushed_to_relay: wire.pushed_to_relay,
                    },
                )
            })
            .collect();
        Ok(VaultInner {
            identity,
            capabilities: document.capabilities,
            snapshots,
            agent_ceilings,
            user_grant_ceiling: UserGrantCeiling { user_id: crate::types::UserId(String::new()), levels: user_grant_ceiling },
            escalations,
            integrations: document.integrations,
            received_capabilities: document.received_capabilities,
            audit_log: AuditLog::from_entries(DEFAULT_RING_CAPACITY, document.audit_log),
        })
    }

    fn persist(&self, identity: &VersionedIdentity, vault_key: &[u8], password: &[u8], document: &DocumentPlain) -> VaultResult<()> {
        let kdf_params = match self.config.scrypt_log_n_override {
            Some(log_n) => KdfParams { log_n, ..KdfParams::new_random()? },
            None => KdfParams::new_random()?,
        };
        self.persist_with_kdf(identity, vault_key, password, &kdf_params, document)
    }

    fn persist_with_existing_kdf(
        &self,
        identity: &VersionedIdentity,
        vault_key: &[u8],
        existing: &VaultEnvelope,
        document: &DocumentPlain,
    ) -> VaultResult<()> {
        let password_nonce = b64_decode(&existing.wrapped_vault_key.nonce)?;
        let password_ciphertext = existing.wrapped_vault_key.ciphertext.clone();
        let document_nonce = random_nonce()?;
        let document_plaintext = serde_json::to_vec(document).map_err(|e| VaultError::Format(e.to_string()))?;
        let document_ciphertext = aead_encrypt(vault_key, VAULT_AAD, &document_plaintext, &document_nonce)?;
        let envelope = VaultEnvelope {
            version: VAULT_ENVELOPE_VERSION,
            kdf: existing.kdf.clone(),
            wrapped_vault_key: EncryptedBlobWire {
                nonce: b64_encode(&password_nonce),
                ciphertext: password_ciphertext,
            },
            identity: identity_to_envelope(identity),
            document: EncryptedBlobWire {
                nonce: b64_encode(&document_nonce),
                ciphertext: b64_encode(&document_ciphertext),
            },
        };
        self.write_atomic(&envelope)
    }

    fn persist_with_kdf(
        &self,
        identity: &VersionedIdentity,
        vault_key: &[u8],
        password: &[u8],
        kdf_params: &KdfParams,
        document: &DocumentPlain,
    ) -> VaultResult<()> {
        let password_key = derive_key_scrypt(password, kdf_params)?;
        let wrap_nonce = random_nonce()?;
        let wrapped = aead_encrypt(&password_key, VAULT_AAD, vault_key, &wrap_nonce)?;
        let document_nonce = random_nonce()?;
        let document_plaintext = serde_json::to_vec(document).map_err(|e| VaultError::Format(e.to_string()))?;
        let document_ciphertext = aead_encrypt(vault_key, VAULT_AAD, &document_plaintext, &document_nonce)?;
        let envelope = VaultEnvelope {
            version: VAULT_ENVELOPE_VERSION,
            kdf: KdfParamsWire {
                algorithm: "scrypt".to_string(),
                salt: b64_encode(&kdf_params.salt),
                log_n: kdf_params.log_n,
                r: kdf_params.r,
                p: kdf_params.p,
            },
            wrapped_vault_key: EncryptedBlobWire {
                nonce: b64_encode(&wrap_nonce),
                ciphertext: b64_encode(&wrapped),
            },
            identity: identity_to_envelope(identity),
            document: EncryptedBlobWire {
                nonce: b64_encode(&document_nonce),
                ciphertext: b64_encode(&document_ciphertext),
            },
        };
        self.write_atomic(&envelope)
    }

    /// Atomic temp-file + fsync + rename, file mode 0600, parent directory
    /// mode 0700 (spec §6).
    fn write_atomic(&self, envelope: &VaultEnvelope) -> VaultResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::DirBuilder::new()
                    .recursive(true)
                    .mode(0o700)
                    .create(parent)
                    .map_err(|e| VaultError::Storage(e.to_string()))?;
            }
        }
        let bytes = serde_json::to_vec_pretty(envelope).map_err(|e| VaultError::Format(e.to_string()))?;
        let tmp_path = tmp_path_for(&self.path);
        write_file_with_fsync(&tmp_path, &bytes).map_err(|e| VaultError::Storage(e.to_string()))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| VaultError::Storage(e.to_string()))?;
        Ok(())
    }
}

fn write_file_with_fsync(path: &Path, bytes: &[u8]) -> io::Result<()> {
    use std::io::Write;
    let mut file = fs::OpenOptions::new().write(true).create(true).truncate(true).mode(0o600).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn identity_to_envelope(identity: &VersionedIdentity) -> Value {
    serde_json::json!({
        "keyVersion": identity.key_version.0,
        "signingPub": b64_encode(&identity.signing_pub),
        "encryptionPub": b64_encode(&identity.encryption_pub),
    })
}

fn to_document_plain(inner: &VaultInner) -> VaultResult<DocumentPlain> {
    Ok(DocumentPlain {
        identity: inner.identity.export_key_material().to_wire()?,
        capabilities: inner.capabilities.clone(),
        snapshots: inner
            .snapshots
            .iter()
            .map(|(id, snapshot)| {
                (
                    id.clone(),
                    CachedSnapshotWire {
                        capability_id: snapshot.capability_id.clone(),
                        resource: snapshot.resource.0.clone(),
                        recipient_pub: snapshot.recipient_pub,
                        ephemeral_pub: snapshot.ephemeral_pub,
                        nonce: snapshot.nonce.clone(),
                        ciphertext: snapshot.ciphertext.clone(),
                        signature: snapshot.signature,
                        created_at_ms: snapshot.created_at_ms,
                        pushed_to_relay: snapshot.pushed_to_relay,
                    },
                )
            })
            .collect(),
        escalations: inner
            .escalations
            .iter()
            .map(|(id, req)| {
                let status = match req.status {
                    crate::ceiling::EscalationStatus::Pending => "pending",
                    crate::ceiling::EscalationStatus::Approved => "approved",
                    crate::ceiling::EscalationStatus::Denied => "denied",
                };
                (
                    id.0.clone(),
                    EscalationRequestWire {
                        agent_id: req.agent_id.0.clone(),
                        requested: req.requested.iter().map(|l| l.as_str().to_string()).collect(),
                        escalated: req.escalated.iter().map(|l| l.as_str().to_string()).collect(),
                        status: status.to_string(),
                        created_at_ms: req.created_at_ms,
                        decided_at_ms: req.decided_at_ms,
                        resource: req.resource.0.clone(),
                        subject: req.subject.clone(),
                        sub_enc: req.sub_enc.clone(),
                        tier: req.tier,
                        ttl_ms: req.ttl_ms,
                    },
                )
            })
            .collect(),
        agent_ceilings: inner
            .agent_ceilings
            .iter()
            .map(|(id, ceiling)| (id.0.clone(), ceiling.levels.iter().map(|l| l.as_str().to_string()).collect()))
            .collect(),
        user_grant_ceiling: inner.user_grant_ceiling.levels.iter().map(|l| l.as_str().to_string()).collect(),
        integrations: inner.integrations.clone(),
        received_capabilities: inner.received_capabilities.clone(),
        audit_log: inner.audit_log.durable_entries().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::fakes::{FixedClock, FixedEntropy};

    fn test_store(dir: &Path) -> VaultStore {
        let mut config = VaultConfig::default();
        config.scrypt_log_n_override = Some(4);
        VaultStore::new(dir.join("vault.json"), config)
    }

    #[test]
    fn initialize_then_unlock_round_trips() {
        let tmp = std::env::temp_dir().join(format!("ocmt-vault-test-{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        let store = test_store(&tmp);
        let clock = FixedClock::new(1_000);
        let entropy = FixedEntropy;
        store.initialize(b"correct horse battery staple", &entropy, &clock).unwrap();
        store.save().unwrap();
        store.lock().unwrap();
        assert!(!store.is_unlocked(1_000));
        store.unlock(b"correct horse battery staple", &clock).unwrap();
        assert!(store.is_unlocked(1_000));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn wrong_password_is_rejected() {
        let tmp = std::env::temp_dir().join(format!("ocmt-vault-test-wrong-pw-{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        let store = test_store(&tmp);
        let clock = FixedClock::new(1_000);
        let entropy = FixedEntropy;
        store.initialize(b"correct horse battery staple", &entropy, &clock).unwrap();
        store.save().unwrap();
        store.lock().unwrap();
        let err = store.unlock(b"wrong password", &clock).unwrap_err();
        assert!(matches!(err, VaultError::BadPassword));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn session_expires_and_blocks_document_access() {
        let tmp = std::env::temp_dir().join(format!("ocmt-vault-test-ttl-{}", std::process::id()));
        let _ = fs::remove_dir_all(&tmp);
        let mut config = VaultConfig::default();
        config.scrypt_log_n_override = Some(4);
        config.session_ttl_ms = 100;
        let store = VaultStore::new(tmp.join("vault.json"), config);
        let clock = FixedClock::new(0);
        let entropy = FixedEntropy;
        store.initialize(b"pw", &entropy, &clock).unwrap();
        assert!(store.with_document(50, |_| Ok(())).is_ok());
        let err = store.with_document(200, |_| Ok(())).unwrap_err();
        assert!(matches!(err, VaultError::Locked));
        let _ = fs::remove_dir_all(&tmp);
    }
}
