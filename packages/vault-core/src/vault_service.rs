//! `VaultCore`: the top-level orchestrator wiring the vault store, the
//! capability engine, ceilings/escalations, the relay client, and the
//! audit log into the single object a host process depends on — the
//! counterpart to the teacher's `KeyService`.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::adapters::{ClockAdapter, EntropyAdapter};
use crate::approval::ApprovalGateway;
use crate::capability::{
    encode_token, execute_capability, mint_capability, reissue_capability, revoke_capability, verify_and_load_received,
    verify_capability, CachedSnapshotRef, CapabilityExecutionResult, CapabilityGrant, CapabilityToken, MintRequest,
};
use crate::ceiling::{cleanup_old, issue_capability_as_agent, poll_gateway, set_agent_ceiling_with_validation, validate_approver_ceiling, AgentCeiling, UserGrantCeiling};
use crate::error::{VaultError, VaultResult};
use crate::integration::{Integration, IntegrationTable};
use crate::relay::RelayClient;
use crate::snapshot::{create_cached_snapshot, decrypt_cached_snapshot, mark_pushed, refresh_due};
use crate::types::{AgentId, CapabilityId, EscalationId, PermissionLevel, ResourceName, SharingTier};
use crate::vault::{VaultConfig, VaultStore};
use crate::wire::b64_decode_fixed32;

pub struct VaultCore {
    store: VaultStore,
    relay: Arc<dyn RelayClient>,
    approval: Arc<dyn ApprovalGateway>,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct VaultStatus {
    pub unlocked: bool,
    pub relay_reachable: bool,
}

/// The result of `access_cached` (spec §4.5): the decrypted payload plus
/// where it came from, so a caller can tell a live relay fetch from a
/// stale local fallback.
#[derive(Clone, Debug, serde::Serialize)]
pub struct AccessCachedResult {
    pub data: Vec<u8>,
    pub source: String,
    pub staleness_ms: u64,
}

impl VaultCore {
    pub fn new(store: VaultStore, relay: Arc<dyn RelayClient>, approval: Arc<dyn ApprovalGateway>) -> Self {
        Self { store, relay, approval }
    }

    pub fn config(&self) -> &VaultConfig {
        self.store.config()
    }

    #[instrument(skip(self, password, entropy, clock))]
    pub fn initialize(&self, password: &[u8], entropy: &dyn EntropyAdapter, clock: &dyn ClockAdapter) -> VaultResult<()> {
        self.store.initialize(password, entropy, clock)?;
        self.store.save()?;
        info!("vault initialized");
        Ok(())
    }

    #[instrument(skip(self, password, clock))]
    pub fn unlock(&self, password: &[u8], clock: &dyn ClockAdapter) -> VaultResult<()> {
        self.store.unlock(password, clock)?;
        info!("vault unlocked");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn lock(&self) -> VaultResult<()> {
        self.store.lock()?;
        info!("vault locked");
        Ok(())
    }

    pub fn status(&self, now_ms: u64) -> VaultStatus {
        VaultStatus {
            unlocked: self.store.is_unlocked(now_ms),
            relay_reachable: self.relay.list_snapshots().relay_reachable,
        }
    }

    /// Registers or replaces the third-party credential backing a resource
    /// (spec §3/§4.4). A capability cannot be minted against a resource
    /// until its `Integration` is on file.
    #[instrument(skip(self, integration))]
    pub fn set_integration(&self, resource: ResourceName, integration: Integration, now_ms: u64) -> VaultResult<()> {
        self.store.with_document(now_ms, |inner| {
            inner.integrations.insert(resource.0.clone(), integration);
            inner.audit_log.record("integration.set", now_ms, None, Some(resource.0), serde_json::Value::Null);
            Ok(())
        })?;
        self.store.save()
    }

    /// Directly issues a capability as the vault owner (no ceiling check —
    /// the owner's grant ceiling is the outermost bound, spec §4.6).
    #[instrument(skip(self))]
    pub fn issue_capability(
        &self,
        subject: String,
        sub_enc: Option<String>,
        resource: ResourceName,
        scope: BTreeSet<PermissionLevel>,
        tier: SharingTier,
        max_calls: Option<u64>,
        ttl_ms: u64,
        now_ms: u64,
    ) -> VaultResult<CapabilityToken> {
        let token = self.store.with_document(now_ms, |inner| {
            if !inner.integrations.contains_key(&resource.0) {
                return Err(VaultError::ResourceMissing(resource.0.clone()));
            }
            let id = CapabilityId(hex::encode(inner.identity.key_id()) + &format!("-{now_ms}"));
            let token = mint_capability(
                &inner.identity,
                MintRequest {
                    id: id.clone(),
                    subject,
                    sub_enc,
                    resource: resource.clone(),
                    scope,
                    wildcard: false,
                    tier,
                    max_calls,
                    ttl_ms,
                },
                now_ms,
            )?;
            inner
                .capabilities
                .insert(id.0.clone(), CapabilityGrant { token: token.clone(), calls_made: 0, revoked: false, last_snapshot_at: None });
            inner
                .audit_log
                .record("capability.issued", now_ms, None, Some(resource.0), serde_json::json!({"id": id.0}));
            Ok(token)
        })?;
        self.store.save()?;
        Ok(token)
    }

    /// Issues a capability on behalf of an agent, subject to the agent's
    /// ceiling. Returns the grantable token plus, if the request exceeded
    /// the ceiling, the id of the `EscalationRequest` filed for the rest.
    #[instrument(skip(self))]
    pub fn issue_capability_as_agent(
        &self,
        agent_id: AgentId,
        subject: String,
        sub_enc: Option<String>,
        resource: ResourceName,
        scope: BTreeSet<PermissionLevel>,
        tier: SharingTier,
        ttl_ms: u64,
        now_ms: u64,
    ) -> VaultResult<(CapabilityToken, Option<EscalationId>)> {
        let outcome = self.store.with_document(now_ms, |inner| {
            if !inner.integrations.contains_key(&resource.0) {
                return Err(VaultError::ResourceMissing(resource.0.clone()));
            }
            let ceiling = inner
                .agent_ceilings
                .get(&agent_id)
                .cloned()
                .unwrap_or_else(|| AgentCeiling { agent_id: agent_id.clone(), levels: crate::types::default_agent_ceiling() });
            let escalation_id = EscalationId(format!("esc-{}-{now_ms}", agent_id.0));
            let check = issue_capability_as_agent(
                &ceiling,
                &scope,
                escalation_id.clone(),
                resource.clone(),
                subject.clone(),
                sub_enc.clone(),
                tier,
                ttl_ms,
                now_ms,
            );
            let cap_id = CapabilityId(format!("cap-{}-{now_ms}", agent_id.0));
            let token = mint_capability(
                &inner.identity,
                MintRequest {
                    id: cap_id.clone(),
                    subject,
                    sub_enc,
                    resource: resource.clone(),
                    scope: check.partition.grantable.clone(),
                    wildcard: false,
                    tier,
                    max_calls: None,
                    ttl_ms,
                },
                now_ms,
            )?;
            inner.capabilities.insert(
                cap_id.0.clone(),
                CapabilityGrant { token: token.clone(), calls_made: 0, revoked: false, last_snapshot_at: None },
            );
            let escalation_logged = check.escalation.is_some();
            if let Some(escalation) = check.escalation {
                inner.escalations.insert(escalation.id.clone(), escalation);
            }
            inner
                .audit_log
                .record("capability.issued", now_ms, Some(agent_id.0.clone()), Some(resource.0), serde_json::json!({"id": cap_id.0}));
            if escalation_logged {
                inner
                    .audit_log
                    .record("escalation.requested", now_ms, Some(agent_id.0), None, serde_json::json!({"id": escalation_id.0}));
            }
            Ok((token, escalation_id, escalation_logged))
        })?;
        self.store.save()?;
        let (token, escalation_id, escalation_logged) = outcome;
        Ok((token, escalation_logged.then_some(escalation_id)))
    }

    #[instrument(skip(self, params))]
    pub fn execute(
        &self,
        capability_id: &str,
        op: PermissionLevel,
        params: serde_json::Value,
        now_ms: u64,
    ) -> VaultResult<CapabilityExecutionResult> {
        let result = self.store.with_document(now_ms, |inner| {
            let grant = inner.capabilities.get_mut(capability_id).ok_or_else(|| VaultError::ResourceMissing(capability_id.to_string()))?;
            let resource = grant.token.resource.clone();
            let exec_result = execute_capability(grant, &inner.identity, &inner.integrations, op, params, now_ms);
            inner.audit_log.record(
                "capability.executed",
                now_ms,
                None,
                Some(resource),
                serde_json::json!({"id": capability_id, "ok": exec_result.is_ok()}),
            );
            Ok(exec_result)
        })?;
        self.store.save()?;
        result
    }

    #[instrument(skip(self))]
    pub fn revoke(&self, capability_id: &str, now_ms: u64) -> VaultResult<()> {
        self.store.with_document(now_ms, |inner| {
            let grant = inner.capabilities.get_mut(capability_id).ok_or_else(|| VaultError::ResourceMissing(capability_id.to_string()))?;
            revoke_capability(grant);
            self.relay.notify_revocation(capability_id);
            inner
                .audit_log
                .record("capability.revoked", now_ms, None, Some(grant.token.resource.clone()), serde_json::Value::Null);
            Ok(())
        })?;
        self.store.save()
    }

    #[instrument(skip(self))]
    pub fn reissue(&self, capability_id: &str, ttl_ms: u64, now_ms: u64) -> VaultResult<CapabilityToken> {
        let token = self.store.with_document(now_ms, |inner| {
            let previous = inner
                .capabilities
                .get(capability_id)
                .map(|g| g.token.clone())
                .ok_or_else(|| VaultError::ResourceMissing(capability_id.to_string()))?;
            verify_capability(&previous, &inner.identity, now_ms).or_else(|e| match e {
                VaultError::Expired => Ok(()),
                other => Err(other),
            })?;
            let new_id = CapabilityId(format!("{capability_id}-r{now_ms}"));
            let token = reissue_capability(&inner.identity, &previous, new_id.clone(), ttl_ms, now_ms)?;
            inner.capabilities.insert(
                new_id.0.clone(),
                CapabilityGrant { token: token.clone(), calls_made: 0, revoked: false, last_snapshot_at: None },
            );
            inner
                .audit_log
                .record("capability.reissued", now_ms, None, Some(token.resource.clone()), serde_json::json!({"old": capability_id, "new": new_id.0}));
            Ok(token)
        })?;
        self.store.save()?;
        Ok(token)
    }

    #[instrument(skip(self))]
    pub fn rotate_signing_key(&self, now_ms: u64) -> VaultResult<()> {
        let window_ms = self.store.config().rotation_transition_window_ms;
        self.store.with_document(now_ms, |inner| {
            inner.identity.rotate_signing_key(now_ms, window_ms)?;
            inner.audit_log.record("identity.rotated", now_ms, None, None, serde_json::Value::Null);
            Ok(())
        })?;
        self.store.save()
    }

    #[instrument(skip(self, new_password, old_password))]
    pub fn rotate_encryption_password(&self, old_password: &[u8], new_password: &[u8]) -> VaultResult<()> {
        self.store.rotate_encryption_key(old_password, new_password)
    }

    #[instrument(skip(self))]
    pub fn set_agent_ceiling(&self, user_id: crate::types::UserId, agent_id: AgentId, levels: BTreeSet<PermissionLevel>, now_ms: u64) -> VaultResult<()> {
        self.store.with_document(now_ms, |inner| {
            let user_ceiling = UserGrantCeiling { user_id, levels: inner.user_grant_ceiling.levels.clone() };
            let validated = set_agent_ceiling_with_validation(&user_ceiling, levels)?;
            inner
                .agent_ceilings
                .insert(agent_id.clone(), AgentCeiling { agent_id: agent_id.clone(), levels: validated });
            inner.audit_log.record("ceiling.updated", now_ms, Some(agent_id.0), None, serde_json::Value::Null);
            Ok(())
        })?;
        self.store.save()
    }

    /// Approves a pending escalation: validates that the vault owner's own
    /// grant ceiling covers the *full* originally requested scope, flips
    /// the escalation's status, then mints a fresh capability over the
    /// whole requested set — not merely the previously-escalated subset
    /// (spec §4.6).
    #[instrument(skip(self))]
    pub fn approve_escalation(&self, escalation_id: &EscalationId, now_ms: u64) -> VaultResult<CapabilityToken> {
        let token = self.store.with_document(now_ms, |inner| {
            let request = inner.escalations.get(escalation_id).cloned().ok_or(VaultError::EscalationNotFound)?;
            validate_approver_ceiling(&inner.user_grant_ceiling.levels, &request.requested)?;
            if !inner.integrations.contains_key(&request.resource.0) {
                return Err(VaultError::ResourceMissing(request.resource.0.clone()));
            }
            let stored = inner.escalations.get_mut(escalation_id).ok_or(VaultError::EscalationNotFound)?;
            crate::ceiling::approve_escalation(stored, now_ms)?;
            let cap_id = CapabilityId(format!("cap-esc-{}", escalation_id.0));
            let token = mint_capability(
                &inner.identity,
                MintRequest {
                    id: cap_id.clone(),
                    subject: request.subject.clone(),
                    sub_enc: request.sub_enc.clone(),
                    resource: request.resource.clone(),
                    scope: request.requested.clone(),
                    wildcard: false,
                    tier: request.tier,
                    max_calls: None,
                    ttl_ms: request.ttl_ms,
                },
                now_ms,
            )?;
            inner.capabilities.insert(
                cap_id.0.clone(),
                CapabilityGrant { token: token.clone(), calls_made: 0, revoked: false, last_snapshot_at: None },
            );
            inner
                .audit_log
                .record("escalation.approved", now_ms, None, Some(request.resource.0), serde_json::json!({"id": escalation_id.0, "capability": cap_id.0}));
            Ok(token)
        })?;
        self.store.save()?;
        Ok(token)
    }

    #[instrument(skip(self))]
    pub fn deny_escalation(&self, escalation_id: &EscalationId, now_ms: u64) -> VaultResult<()> {
        self.store.with_document(now_ms, |inner| {
            let request = inner.escalations.get_mut(escalation_id).ok_or(VaultError::EscalationNotFound)?;
            crate::ceiling::deny_escalation(request, now_ms)?;
            inner.audit_log.record("escalation.denied", now_ms, None, None, serde_json::json!({"id": escalation_id.0}));
            Ok(())
        })?;
        self.store.save()
    }

    /// Polls the approval gateway for every still-pending escalation and
    /// sweeps resolved ones older than the configured retention (spec §4.6,
    /// called by the background cleanup task).
    pub fn poll_escalations_and_cleanup(&self, now_ms: u64) -> VaultResult<()> {
        let max_age_ms = self.store.config().escalation_cleanup_max_age_ms;
        self.store.with_document(now_ms, |inner| {
            for request in inner.escalations.values_mut() {
                if let Err(err) = poll_gateway(request, self.approval.as_ref(), now_ms) {
                    warn!(error = %err, "escalation poll failed");
                }
            }
            cleanup_old(&mut inner.escalations, now_ms, max_age_ms);
            Ok(())
        })?;
        self.store.save()
    }

    /// Seals a point-in-time copy of a CACHED-tier capability's backing
    /// integration for offline sharing (spec §4.5). Requires the grant to
    /// carry a subject encryption key.
    #[instrument(skip(self))]
    pub fn create_cached_snapshot(&self, capability_id: &str, now_ms: u64) -> VaultResult<()> {
        self.store.with_document(now_ms, |inner| {
            let grant = inner.capabilities.get(capability_id).ok_or_else(|| VaultError::ResourceMissing(capability_id.to_string()))?;
            if grant.token.tier != SharingTier::Cached {
                return Err(VaultError::CachedRequiresEncKey);
            }
            let sub_enc = grant.token.sub_enc.clone().ok_or(VaultError::CachedRequiresEncKey)?;
            let recipient_pub = b64_decode_fixed32(&sub_enc)?;
            let resource = ResourceName(grant.token.resource.clone());
            let integration = inner
                .integrations
                .get(&resource.0)
                .ok_or_else(|| VaultError::ResourceMissing(resource.0.clone()))?;
            let plaintext = serde_json::to_vec(integration).map_err(|e| VaultError::Format(e.to_string()))?;
            let snapshot = create_cached_snapshot(&inner.identity, capability_id, resource.clone(), recipient_pub, &plaintext, now_ms)?;
            inner.snapshots.insert(capability_id.to_string(), snapshot);
            if let Some(grant) = inner.capabilities.get_mut(capability_id) {
                grant.last_snapshot_at = Some(now_ms);
            }
            inner.audit_log.record("snapshot.created", now_ms, None, Some(resource.0), serde_json::Value::Null);
            Ok(())
        })?;
        self.store.save()
    }

    /// Pushes every snapshot due for refresh to the relay (spec §4.5,
    /// called by the 5-minute background refresh loop).
    pub fn refresh_and_push_snapshots(&self, now_ms: u64) -> VaultResult<()> {
        let interval_ms = self.store.config().snapshot_refresh_interval_ms;
        self.store.with_document(now_ms, |inner| {
            let due: Vec<String> = inner
                .snapshots
                .iter()
                .filter(|(_, snapshot)| refresh_due(snapshot, now_ms, interval_ms))
                .map(|(capability_id, _)| capability_id.clone())
                .collect();
            for capability_id in due {
                if let Some(snapshot) = inner.snapshots.get_mut(&capability_id) {
                    let outcome = self.relay.store_snapshot(crate::relay::SnapshotBlob {
                        capability_id: snapshot.capability_id.clone(),
                        resource: snapshot.resource.clone(),
                        ephemeral_pub: snapshot.ephemeral_pub,
                        ciphertext: snapshot.ciphertext.clone(),
                        nonce: snapshot.nonce.clone(),
                        signature: snapshot.signature,
                        created_at_ms: snapshot.created_at_ms,
                    });
                    if outcome.relay_reachable {
                        mark_pushed(snapshot);
                        inner
                            .audit_log
                            .record("snapshot.pushed", now_ms, None, Some(snapshot.resource.0.clone()), serde_json::Value::Null);
                    }
                }
            }
            Ok(())
        })?;
        self.store.save()
    }

    /// Verifies an opaque capability token received from another container,
    /// indexes it as a `ReceivedCapability`, and returns its id (spec §3,
    /// §4.4 — the subject side of the protocol).
    #[instrument(skip(self, token_str))]
    pub fn load_received_capability(&self, token_str: &str, issuer_container_id: &str, now_ms: u64) -> VaultResult<String> {
        let received = verify_and_load_received(token_str, issuer_container_id, now_ms)?;
        let id = received.id.clone();
        self.store.with_document(now_ms, |inner| {
            inner
                .audit_log
                .record("capability.received", now_ms, None, Some(received.resource.clone()), serde_json::json!({"id": received.id}));
            inner.received_capabilities.insert(id.clone(), received);
            Ok(())
        })?;
        self.store.save()?;
        Ok(id)
    }

    /// Pure passthrough to the relay's revocation check — no document
    /// access needed, so no save (spec C7).
    pub fn check_relay_revocation(&self, capability_id: &str) -> crate::relay::RelayOutcome<bool> {
        self.relay.check_revocation(capability_id)
    }

    /// Reads a CACHED-tier received capability's data: tries a live relay
    /// fetch and verify first, falls back to the last successfully
    /// decrypted snapshot if the relay is unreachable or the fetch fails,
    /// and fails with `NoCachedData` if neither is available (spec §4.5).
    #[instrument(skip(self, recipient_priv))]
    pub fn access_cached(&self, capability_id: &str, recipient_priv: [u8; 32], now_ms: u64) -> VaultResult<AccessCachedResult> {
        let result = self.store.with_document(now_ms, |inner| {
            let received = inner
                .received_capabilities
                .get(capability_id)
                .ok_or_else(|| VaultError::ResourceMissing(capability_id.to_string()))?
                .clone();
            let issuer_signing_pub = b64_decode_fixed32(&received.issuer_signing_pub)?;
            let outcome = self.relay.get_snapshot(&ResourceName(received.resource.clone()));
            if outcome.relay_reachable {
                if let Some(blob) = outcome.value {
                    let snapshot = crate::snapshot::CachedSnapshot {
                        capability_id: blob.capability_id,
                        resource: blob.resource,
                        recipient_pub: [0u8; 32],
                        ephemeral_pub: blob.ephemeral_pub,
                        nonce: blob.nonce,
                        ciphertext: blob.ciphertext,
                        signature: blob.signature,
                        created_at_ms: blob.created_at_ms,
                        pushed_to_relay: true,
                    };
                    if let Ok(plaintext) = decrypt_cached_snapshot(&snapshot, &recipient_priv, &issuer_signing_pub) {
                        let data_json: serde_json::Value =
                            serde_json::from_slice(&plaintext).unwrap_or(serde_json::Value::Null);
                        if let Some(received_mut) = inner.received_capabilities.get_mut(capability_id) {
                            received_mut.cached_snapshot = Some(CachedSnapshotRef { data_json, updated_at_ms: now_ms });
                        }
                        inner
                            .audit_log
                            .record("snapshot.accessed", now_ms, None, Some(received.resource.clone()), serde_json::json!({"source": "relay"}));
                        return Ok(AccessCachedResult { data: plaintext, source: "relay".to_string(), staleness_ms: 0 });
                    }
                }
            }
            match received.cached_snapshot {
                Some(cached) => {
                    let data = serde_json::to_vec(&cached.data_json).map_err(|e| VaultError::Format(e.to_string()))?;
                    inner
                        .audit_log
                        .record("snapshot.accessed", now_ms, None, Some(received.resource.clone()), serde_json::json!({"source": "cache"}));
                    Ok(AccessCachedResult {
                        data,
                        source: "cache".to_string(),
                        staleness_ms: now_ms.saturating_sub(cached.updated_at_ms),
                    })
                }
                None => Err(VaultError::NoCachedData),
            }
        })?;
        self.store.save()?;
        Ok(result)
    }

    /// Encodes a minted token as the opaque base64url string a host hands
    /// to the subject container (spec §6).
    pub fn encode_capability_token(&self, token: &CapabilityToken) -> VaultResult<String> {
        encode_token(token)
    }

    pub fn save(&self) -> VaultResult<()> {
        self.store.save()
    }
}
