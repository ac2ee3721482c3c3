//! End-to-end lifecycle scenarios against the public `VaultCore` API:
//! initialize/unlock/lock, capability issuance/execution/revocation,
//! ceiling escalation, and relay-unreachable snapshot pushes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ocmt_vault_core::adapters::{ClockAdapter, EntropyAdapter};
use ocmt_vault_core::approval::AlwaysDenyGateway;
use ocmt_vault_core::relay::NullRelayClient;
use ocmt_vault_core::types::{PermissionLevel, ResourceName, SharingTier};
use ocmt_vault_core::vault::{VaultConfig, VaultStore};
use ocmt_vault_core::vault_service::VaultCore;
use ocmt_vault_core::VaultError;

struct FixedClock(AtomicU64);

impl FixedClock {
    fn new(start_ms: u64) -> Self {
        Self(AtomicU64::new(start_ms))
    }

    fn advance(&self, delta_ms: u64) {
        self.0.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl ClockAdapter for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

struct FixedEntropy;

impl EntropyAdapter for FixedEntropy {
    fn random_bytes(&self, len: usize) -> Vec<u8> {
        ocmt_vault_core::crypto::random_bytes(len).expect("entropy source")
    }
}

fn temp_vault_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("ocmt-vault-core-{label}-{}.json", std::process::id()))
}

fn test_core(label: &str) -> (VaultCore, std::path::PathBuf) {
    let path = temp_vault_path(label);
    let _ = std::fs::remove_file(&path);
    let mut config = VaultConfig::default();
    config.scrypt_log_n_override = Some(4);
    let store = VaultStore::new(path.clone(), config);
    let core = VaultCore::new(store, Arc::new(NullRelayClient), Arc::new(AlwaysDenyGateway));
    (core, path)
}

fn test_integration() -> ocmt_vault_core::integration::Integration {
    ocmt_vault_core::integration::Integration {
        access_token: "tok-live".to_string(),
        refresh_token: None,
        expires_at: u64::MAX,
        email: None,
        scopes: None,
        metadata: None,
    }
}

/// Scenario: initialize, lock, unlock with the right password, fail with
/// the wrong one (spec §8 scenario 1).
#[test]
fn initialize_unlock_lock_cycle() {
    let (core, path) = test_core("cycle");
    let clock = FixedClock::new(0);
    let entropy = FixedEntropy;

    core.initialize(b"pw-correct-horse", &entropy, &clock).unwrap();
    core.lock().unwrap();
    assert!(!core.status(0).unlocked);

    core.unlock(b"pw-correct-horse", &clock).unwrap();
    assert!(core.status(0).unlocked);

    core.lock().unwrap();
    let _ = core.unlock(b"wrong-password", &clock);
    assert!(!core.status(0).unlocked);

    let _ = std::fs::remove_file(&path);
}

/// Scenario: mint a capability, execute it within its scope and budget,
/// then hit the budget limit (spec §8 scenario covering C2-C4).
#[test]
fn capability_mint_execute_budget() {
    let (core, path) = test_core("budget");
    let clock = FixedClock::new(1_000);
    let entropy = FixedEntropy;
    core.initialize(b"pw", &entropy, &clock).unwrap();
    core.set_integration(ResourceName("doc-1".to_string()), test_integration(), 1_000).unwrap();

    let scope = [PermissionLevel::Read].into_iter().collect();
    let token = core
        .issue_capability(
            "agent-1".to_string(),
            None,
            ResourceName("doc-1".to_string()),
            scope,
            SharingTier::Live,
            Some(2),
            60_000,
            1_000,
        )
        .unwrap();

    core.execute(&token.id, PermissionLevel::Read, serde_json::Value::Null, 1_100).unwrap();
    core.execute(&token.id, PermissionLevel::Read, serde_json::Value::Null, 1_200).unwrap();
    let err = core.execute(&token.id, PermissionLevel::Read, serde_json::Value::Null, 1_300).unwrap_err();
    assert!(matches!(err, VaultError::Overused));

    let _ = std::fs::remove_file(&path);
}

/// Scenario: revoking a capability blocks further execution immediately.
#[test]
fn revoked_capability_stops_working() {
    let (core, path) = test_core("revoke");
    let clock = FixedClock::new(0);
    let entropy = FixedEntropy;
    core.initialize(b"pw", &entropy, &clock).unwrap();
    core.set_integration(ResourceName("doc-1".to_string()), test_integration(), 0).unwrap();

    let scope = [PermissionLevel::Read].into_iter().collect();
    let token = core
        .issue_capability("agent-1".to_string(), None, ResourceName("doc-1".to_string()), scope, SharingTier::Live, None, 60_000, 0)
        .unwrap();

    core.execute(&token.id, PermissionLevel::Read, serde_json::Value::Null, 10).unwrap();
    core.revoke(&token.id, 20).unwrap();
    let err = core.execute(&token.id, PermissionLevel::Read, serde_json::Value::Null, 30).unwrap_err();
    assert!(matches!(err, VaultError::Revoked));

    let _ = std::fs::remove_file(&path);
}

/// Scenario: an agent request exceeding its ceiling files an escalation
/// while still granting the within-ceiling subset immediately (spec §4.6).
#[test]
fn agent_request_over_ceiling_escalates_partially() {
    let (core, path) = test_core("escalate");
    let clock = FixedClock::new(0);
    let entropy = FixedEntropy;
    core.initialize(b"pw", &entropy, &clock).unwrap();
    core.set_integration(ResourceName("doc-1".to_string()), test_integration(), 0).unwrap();

    let requested: std::collections::BTreeSet<_> = [PermissionLevel::Read, PermissionLevel::Admin].into_iter().collect();
    let (token, escalation_id) = core
        .issue_capability_as_agent(
            ocmt_vault_core::types::AgentId("agent-1".to_string()),
            "agent-1".to_string(),
            None,
            ResourceName("doc-1".to_string()),
            requested.clone(),
            SharingTier::Live,
            60_000,
            0,
        )
        .unwrap();

    assert!(token.scope.contains(&"read".to_string()));
    assert!(!token.scope.contains(&"admin".to_string()));
    let escalation_id = escalation_id.expect("escalation expected for over-ceiling admin request");
    let approved = core.approve_escalation(&escalation_id, 100).unwrap();
    let approved_scope: std::collections::BTreeSet<_> =
        approved.scope.iter().filter_map(|s| PermissionLevel::try_from(s.as_str()).ok()).collect();
    assert_eq!(approved_scope, requested);
    let err = core.approve_escalation(&escalation_id, 200).unwrap_err();
    assert!(matches!(err, VaultError::EscalationAlreadyResolved));

    let _ = std::fs::remove_file(&path);
}

/// Scenario: relay unreachable is a non-fatal signal — snapshot creation
/// and the refresh loop both succeed locally even though the relay never
/// receives anything (spec §8 scenario 2, C7).
#[test]
fn relay_unreachable_does_not_fail_snapshot_flow() {
    let (core, path) = test_core("relay");
    let clock = FixedClock::new(0);
    let entropy = FixedEntropy;
    core.initialize(b"pw", &entropy, &clock).unwrap();
    core.set_integration(ResourceName("doc-1".to_string()), test_integration(), 0).unwrap();

    let (_priv, recipient_pub) = ocmt_vault_core::crypto::x25519_generate().unwrap();
    let sub_enc = ocmt_vault_core::wire::b64_encode(&recipient_pub);
    let token = core
        .issue_capability(
            "agent-1".to_string(),
            Some(sub_enc),
            ResourceName("doc-1".to_string()),
            [PermissionLevel::Read].into_iter().collect(),
            SharingTier::Cached,
            None,
            60_000,
            0,
        )
        .unwrap();
    core.create_cached_snapshot(&token.id, 0).unwrap();

    clock.advance(10_000_000);
    core.refresh_and_push_snapshots(clock.now_ms()).unwrap();
    assert!(!core.status(clock.now_ms()).relay_reachable);

    let _ = std::fs::remove_file(&path);
}

/// Scenario: session expiry locks the vault automatically after the TTL,
/// requiring another unlock before further operations succeed.
#[test]
fn session_expires_after_ttl_and_requires_unlock() {
    let (core, path) = test_core("ttl");
    let clock = FixedClock::new(0);
    let entropy = FixedEntropy;
    core.initialize(b"pw", &entropy, &clock).unwrap();
    assert!(core.status(0).unlocked);

    let ttl_ms = core.config().session_ttl_ms;
    let err = core
        .issue_capability(
            "agent-1".to_string(),
            None,
            ResourceName("doc-1".to_string()),
            [PermissionLevel::Read].into_iter().collect(),
            SharingTier::Live,
            None,
            60_000,
            ttl_ms + 1,
        )
        .unwrap_err();
    assert!(matches!(err, VaultError::Locked));

    let _ = std::fs::remove_file(&path);
}
