//! Capability tokens (spec §4.4): self-describing, Ed25519-signed JSON
//! grants a vault mints for a subject to act on one resource at one
//! permission scope, optionally bounded by a call budget.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};
use crate::identity::VersionedIdentity;
use crate::integration::IntegrationTable;
use crate::types::{CapabilityId, KeyVersion, PermissionLevel, ResourceName, SharingTier};
use crate::wire::{b64_decode_fixed32, b64_encode, b64url_decode, b64url_encode, canonical_json_without_sig};

/// A scope entry matching any requested operation (spec §4.4's tie-break
/// rule). Not a `PermissionLevel` — it has no place in the lattice.
pub const WILDCARD_SCOPE: &str = "*";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenConstraints {
    #[serde(rename = "maxCalls", skip_serializing_if = "Option::is_none")]
    pub max_calls: Option<u64>,
}

/// The wire shape of a capability token (spec §4.4). Field names match the
/// pinned JSON exactly; `sig` is produced over every other field.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilityToken {
    pub v: u32,
    pub id: String,
    pub iss: String,
    #[serde(rename = "issEnc")]
    pub iss_enc: String,
    pub sub: String,
    #[serde(rename = "subEnc", skip_serializing_if = "Option::is_none")]
    pub sub_enc: Option<String>,
    pub resource: String,
    pub scope: Vec<String>,
    pub tier: SharingTier,
    pub iat: u64,
    pub exp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<TokenConstraints>,
    #[serde(rename = "keyVersion")]
    pub key_version: u64,
    #[serde(rename = "keyId")]
    pub key_id: String,
    pub sig: String,
}

/// Server-side bookkeeping for a minted capability: the signed token plus
/// the mutable state (call count, revocation) the vault tracks locally.
/// The token itself is immutable once minted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CapabilityGrant {
    pub token: CapabilityToken,
    pub calls_made: u64,
    pub revoked: bool,
    #[serde(default)]
    pub last_snapshot_at: Option<u64>,
}

pub struct MintRequest {
    pub id: CapabilityId,
    pub subject: String,
    pub sub_enc: Option<String>,
    pub resource: ResourceName,
    pub scope: BTreeSet<PermissionLevel>,
    pub wildcard: bool,
    pub tier: SharingTier,
    pub max_calls: Option<u64>,
    pub ttl_ms: u64,
}

/// Rejects minting a CACHED-tier capability with no subject encryption key
/// on file (spec §3: tier=CACHED requires `subject_encryption_pub`).
pub fn check_cached_requires_enc_key(tier: SharingTier, sub_enc: &Option<String>) -> VaultResult<()> {
    if tier == SharingTier::Cached && sub_enc.is_none() {
        Err(VaultError::CachedRequiresEncKey)
    } else {
        Ok(())
    }
}

pub fn mint_capability(identity: &VersionedIdentity, request: MintRequest, now_ms: u64) -> VaultResult<CapabilityToken> {
    check_cached_requires_enc_key(request.tier, &request.sub_enc)?;
    let iat = now_ms;
    let exp = now_ms + request.ttl_ms;
    let scope = if request.wildcard {
        vec![WILDCARD_SCOPE.to_string()]
    } else {
        request.scope.iter().map(|level| level.as_str().to_string()).collect()
    };
    let mut token = CapabilityToken {
        v: 1,
        id: request.id.0,
        iss: b64_encode(&identity.signing_pub),
        iss_enc: b64_encode(&identity.encryption_pub),
        sub: request.subject,
        sub_enc: request.sub_enc,
        resource: request.resource.0,
        scope,
        tier: request.tier,
        iat,
        exp,
        constraints: request.max_calls.map(|max_calls| TokenConstraints { max_calls: Some(max_calls) }),
        key_version: identity.key_version.0,
        key_id: hex::encode(identity.key_id()),
        sig: String::new(),
    };
    let signable = canonical_json_without_sig(&serde_json::to_value(&token).map_err(|e| VaultError::Format(e.to_string()))?)?;
    let sig = identity.sign(&signable)?;
    token.sig = b64_encode(&sig);
    Ok(token)
}

/// Verifies the token's signature and expiry, but NOT revocation or call
/// budget — those require the mutable `CapabilityGrant`/relay state and
/// are checked separately by `execute_capability`.
pub fn verify_capability(token: &CapabilityToken, identity: &VersionedIdentity, now_ms: u64) -> VaultResult<()> {
    if now_ms >= token.exp {
        return Err(VaultError::Expired);
    }
    let mut unsigned = token.clone();
    unsigned.sig = String::new();
    let signable = canonical_json_without_sig(&serde_json::to_value(&unsigned).map_err(|e| VaultError::Format(e.to_string()))?)?;
    let sig_bytes = crate::wire::b64_decode(&token.sig)?;
    identity.verify_with_any_valid_key(KeyVersion(token.key_version), &signable, &sig_bytes, now_ms)
}

/// Checks scope containment: `op` must be at or below the token's granted
/// scope ceiling (spec §4.4 — the scope array names the exact levels
/// granted, not a single ceiling, so containment is membership). `"*"`
/// matches any operation (spec §4.4's explicit tie-break rule).
pub fn check_scope(token: &CapabilityToken, op: PermissionLevel) -> VaultResult<()> {
    if token.scope.iter().any(|s| s == WILDCARD_SCOPE || s == op.as_str()) {
        Ok(())
    } else {
        Err(VaultError::ScopeViolation)
    }
}

/// What executing a capability against its backing integration returns to
/// the caller (spec §4.4, §8 scenario 1): the integration's access token,
/// the operation performed, and the caller-supplied params.
#[derive(Clone, Debug, Serialize)]
pub struct CapabilityExecutionResult {
    pub access_token: String,
    pub operation: String,
    pub params: serde_json::Value,
}

/// Executes one call against a grant: verifies the token, checks
/// revocation, scope, and the call budget, then looks up the resource's
/// `Integration` and returns its access token alongside the operation and
/// params (spec §4.4/§8 scenario 1).
pub fn execute_capability(
    grant: &mut CapabilityGrant,
    identity: &VersionedIdentity,
    integrations: &IntegrationTable,
    op: PermissionLevel,
    params: serde_json::Value,
    now_ms: u64,
) -> VaultResult<CapabilityExecutionResult> {
    if grant.revoked {
        return Err(VaultError::Revoked);
    }
    verify_capability(&grant.token, identity, now_ms)?;
    check_scope(&grant.token, op)?;
    if let Some(constraints) = &grant.token.constraints {
        if let Some(max_calls) = constraints.max_calls {
            if grant.calls_made >= max_calls {
                return Err(VaultError::Overused);
            }
        }
    }
    let integration = integrations
        .get(&grant.token.resource)
        .ok_or_else(|| VaultError::ResourceMissing(grant.token.resource.clone()))?;
    grant.calls_made += 1;
    Ok(CapabilityExecutionResult {
        access_token: integration.access_token.clone(),
        operation: op.as_str().to_string(),
        params,
    })
}

pub fn revoke_capability(grant: &mut CapabilityGrant) {
    grant.revoked = true;
}

/// Reissues a capability under the vault's current signing key, preserving
/// scope/resource/tier/constraints but minting a fresh id and signature
/// (spec §4.3: capabilities survive a rotation by being reissued, not by
/// magically re-verifying under a key they were never signed with).
pub fn reissue_capability(
    identity: &VersionedIdentity,
    previous: &CapabilityToken,
    new_id: CapabilityId,
    ttl_ms: u64,
    now_ms: u64,
) -> VaultResult<CapabilityToken> {
    let wildcard = previous.scope.iter().any(|s| s == WILDCARD_SCOPE);
    let scope = previous
        .scope
        .iter()
        .filter_map(|s| PermissionLevel::try_from(s.as_str()).ok())
        .collect::<BTreeSet<_>>();
    let request = MintRequest {
        id: new_id,
        subject: previous.sub.clone(),
        sub_enc: previous.sub_enc.clone(),
        resource: ResourceName(previous.resource.clone()),
        scope,
        wildcard,
        tier: previous.tier,
        max_calls: previous.constraints.as_ref().and_then(|c| c.max_calls),
        ttl_ms,
    };
    mint_capability(identity, request, now_ms)
}

pub type GrantTable = HashMap<String, CapabilityGrant>;

/// The subject side's cached fallback for a `ReceivedCapability` of tier
/// CACHED: the last successfully decrypted snapshot payload, kept around
/// for `access_cached` to fall back to when the relay is unreachable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedSnapshotRef {
    pub data_json: serde_json::Value,
    pub updated_at_ms: u64,
}

/// The subject/recipient-side index record for a capability received from
/// another container (spec §3, §4.4) — built by `verify_and_load_received`,
/// never by the issuer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReceivedCapability {
    pub id: String,
    pub issuer_signing_pub: String,
    #[serde(rename = "issuerEncryptionPub", skip_serializing_if = "Option::is_none")]
    pub issuer_encryption_pub: Option<String>,
    pub issuer_container_id: String,
    pub resource: String,
    pub scope: Vec<String>,
    pub expires: u64,
    pub token: String,
    pub tier: SharingTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_snapshot: Option<CachedSnapshotRef>,
}

/// Encodes a capability token as the opaque base64url string passed around
/// outside the vault (spec §6: "base64url of the JSON object").
pub fn encode_token(token: &CapabilityToken) -> VaultResult<String> {
    let bytes = serde_json::to_vec(token).map_err(|e| VaultError::Format(e.to_string()))?;
    Ok(b64url_encode(&bytes))
}

pub fn decode_token(token_str: &str) -> VaultResult<CapabilityToken> {
    let bytes = b64url_decode(token_str)?;
    serde_json::from_slice(&bytes).map_err(|e| VaultError::Format(e.to_string()))
}

/// Decodes an opaque capability token, verifies its signature under the
/// issuer signing key embedded in the token, checks expiry, and builds the
/// subject-side index record (spec §4.4). Grants no access by itself —
/// `execute`/`access_cached` are what actually use a received capability.
pub fn verify_and_load_received(token_str: &str, issuer_container_id: &str, now_ms: u64) -> VaultResult<ReceivedCapability> {
    let token = decode_token(token_str)?;
    if now_ms >= token.exp {
        return Err(VaultError::Expired);
    }
    let issuer_signing_pub = b64_decode_fixed32(&token.iss)?;
    let mut unsigned = token.clone();
    unsigned.sig = String::new();
    let signable = canonical_json_without_sig(&serde_json::to_value(&unsigned).map_err(|e| VaultError::Format(e.to_string()))?)?;
    let sig_bytes = crate::wire::b64_decode(&token.sig)?;
    crate::crypto::ed25519_verify(&issuer_signing_pub, &signable, &sig_bytes)?;
    Ok(ReceivedCapability {
        id: token.id.clone(),
        issuer_signing_pub: token.iss.clone(),
        issuer_encryption_pub: Some(token.iss_enc.clone()),
        issuer_container_id: issuer_container_id.to_string(),
        resource: token.resource.clone(),
        scope: token.scope.clone(),
        expires: token.exp,
        token: token_str.to_string(),
        tier: token.tier,
        cached_snapshot: None,
    })
}
