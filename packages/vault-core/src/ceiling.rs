//! Agent ceilings and the escalation workflow (spec §4.6).
//!
//! An agent minting a capability on a user's behalf is capped by an
//! `AgentCeiling`. A request that exceeds the ceiling doesn't fail outright:
//! it is partitioned into the grantable subset and an `EscalationRequest`
//! covering the rest, which a human approves or denies out of band via the
//! `ApprovalGateway`.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::approval::{ApprovalGateway, ApprovalStatus};
use crate::error::{VaultError, VaultResult};
use crate::types::{partition_against_ceiling, AgentId, CeilingPartition, EscalationId, PermissionLevel, ResourceName, SharingTier, UserId};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentCeiling {
    pub agent_id: AgentId,
    pub levels: BTreeSet<PermissionLevel>,
}

/// The ceiling a user themself may grant without any escalation — the
/// outer bound that even a ceiling update cannot exceed (spec §4.6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserGrantCeiling {
    pub user_id: UserId,
    pub levels: BTreeSet<PermissionLevel>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscalationStatus {
    Pending,
    Approved,
    Denied,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EscalationRequest {
    pub id: EscalationId,
    pub agent_id: AgentId,
    pub requested: BTreeSet<PermissionLevel>,
    pub escalated: BTreeSet<PermissionLevel>,
    pub status: EscalationStatus,
    pub created_at_ms: u64,
    pub decided_at_ms: Option<u64>,
    /// Context carried so approval can re-synthesize the capability against
    /// the full original request (spec §4.6) rather than just the
    /// previously-escalated subset.
    pub resource: ResourceName,
    pub subject: String,
    pub sub_enc: Option<String>,
    pub tier: SharingTier,
    pub ttl_ms: u64,
}

/// Outcome of asking an agent's ceiling for a requested permission set:
/// the grantable part can proceed immediately; the escalated part needs
/// an `EscalationRequest` before it can.
pub struct CeilingCheck {
    pub partition: CeilingPartition,
    pub escalation: Option<EscalationRequest>,
}

#[allow(clippy::too_many_arguments)]
pub fn issue_capability_as_agent(
    ceiling: &AgentCeiling,
    requested: &BTreeSet<PermissionLevel>,
    escalation_id: EscalationId,
    resource: ResourceName,
    subject: String,
    sub_enc: Option<String>,
    tier: SharingTier,
    ttl_ms: u64,
    now_ms: u64,
) -> CeilingCheck {
    let partition = partition_against_ceiling(requested, &ceiling.levels);
    let escalation = if partition.escalated.is_empty() {
        None
    } else {
        Some(EscalationRequest {
            id: escalation_id,
            agent_id: ceiling.agent_id.clone(),
            requested: requested.clone(),
            escalated: partition.escalated.clone(),
            status: EscalationStatus::Pending,
            created_at_ms: now_ms,
            decided_at_ms: None,
            resource,
            subject,
            sub_enc,
            tier,
            ttl_ms,
        })
    };
    CeilingCheck { partition, escalation }
}

/// Checks that the approver's own grant ceiling covers the full originally
/// requested scope, not merely the already-escalated subset (spec §4.6:
/// `InsufficientPermissions` when it doesn't).
pub fn validate_approver_ceiling(approver_ceiling: &BTreeSet<PermissionLevel>, requested: &BTreeSet<PermissionLevel>) -> VaultResult<()> {
    if requested.is_subset(approver_ceiling) {
        Ok(())
    } else {
        Err(VaultError::InsufficientPermissions {
            requested: requested.clone(),
            ceiling: approver_ceiling.clone(),
            escalated: requested.clone(),
        })
    }
}

/// A user may only raise an agent's ceiling up to their own grant ceiling
/// (spec §4.6) — never beyond it, even for their own agents.
pub fn set_agent_ceiling_with_validation(
    user_ceiling: &UserGrantCeiling,
    requested_levels: BTreeSet<PermissionLevel>,
) -> VaultResult<BTreeSet<PermissionLevel>> {
    let user_max = user_ceiling.levels.iter().max().copied();
    let exceeds = requested_levels.iter().any(|level| match user_max {
        Some(max) => *level > max,
        None => true,
    });
    if exceeds {
        return Err(VaultError::InsufficientPermissions {
            requested: requested_levels.clone(),
            ceiling: user_ceiling.levels.clone(),
            escalated: requested_levels,
        });
    }
    Ok(requested_levels)
}

pub fn approve_escalation(request: &mut EscalationRequest, now_ms: u64) -> VaultResult<()> {
    if request.status != EscalationStatus::Pending {
        return Err(VaultError::EscalationAlreadyResolved);
    }
    request.status = EscalationStatus::Approved;
    request.decided_at_ms = Some(now_ms);
    Ok(())
}

pub fn deny_escalation(request: &mut EscalationRequest, now_ms: u64) -> VaultResult<()> {
    if request.status != EscalationStatus::Pending {
        return Err(VaultError::EscalationAlreadyResolved);
    }
    request.status = EscalationStatus::Denied;
    request.decided_at_ms = Some(now_ms);
    Ok(())
}

/// Resolves a pending escalation against a real gateway rather than an
/// explicit operator call (used by the background cleanup/poll task).
pub fn poll_gateway(request: &mut EscalationRequest, gateway: &dyn ApprovalGateway, now_ms: u64) -> VaultResult<()> {
    if request.status != EscalationStatus::Pending {
        return Ok(());
    }
    let outcome = gateway.check(&request.id.0);
    match outcome.status {
        ApprovalStatus::Approved => approve_escalation(request, outcome.decided_at_ms.unwrap_or(now_ms)),
        ApprovalStatus::Denied => deny_escalation(request, outcome.decided_at_ms.unwrap_or(now_ms)),
        ApprovalStatus::Pending => Ok(()),
    }
}

/// Evicts resolved escalations older than `max_age_ms` (default 30 days,
/// spec §4.6) so the escalation table doesn't grow without bound.
pub fn cleanup_old(escalations: &mut HashMap<EscalationId, EscalationRequest>, now_ms: u64, max_age_ms: u64) {
    escalations.retain(|_, request| {
        request.status == EscalationStatus::Pending
            || now_ms.saturating_sub(request.decided_at_ms.unwrap_or(request.created_at_ms)) < max_age_ms
    });
}

pub const DEFAULT_ESCALATION_MAX_AGE_MS: u64 = 30 * 24 * 60 * 60 * 1000;

#[cfg(test)]
mod tests {
    use super::*;

    fn ceiling() -> AgentCeiling {
        AgentCeiling {
            agent_id: AgentId("agent-1".to_string()),
            levels: [PermissionLevel::Read, PermissionLevel::List].into_iter().collect(),
        }
    }

    fn test_request(resource: &str, subject: &str) -> EscalationRequest {
        EscalationRequest {
            id: EscalationId("e1".to_string()),
            agent_id: AgentId("agent-1".to_string()),
            requested: BTreeSet::new(),
            escalated: BTreeSet::new(),
            status: EscalationStatus::Pending,
            created_at_ms: 0,
            decided_at_ms: None,
            resource: ResourceName(resource.to_string()),
            subject: subject.to_string(),
            sub_enc: None,
            tier: SharingTier::Live,
            ttl_ms: 60_000,
        }
    }

    #[test]
    fn within_ceiling_request_needs_no_escalation() {
        let requested = [PermissionLevel::Read].into_iter().collect();
        let check = issue_capability_as_agent(
            &ceiling(),
            &requested,
            EscalationId("e1".to_string()),
            ResourceName("doc-1".to_string()),
            "agent-1".to_string(),
            None,
            SharingTier::Live,
            60_000,
            0,
        );
        assert!(check.escalation.is_none());
        assert_eq!(check.partition.grantable, requested);
    }

    #[test]
    fn over_ceiling_request_produces_escalation() {
        let requested: BTreeSet<_> = [PermissionLevel::Read, PermissionLevel::Admin].into_iter().collect();
        let check = issue_capability_as_agent(
            &ceiling(),
            &requested,
            EscalationId("e1".to_string()),
            ResourceName("doc-1".to_string()),
            "agent-1".to_string(),
            None,
            SharingTier::Live,
            60_000,
            0,
        );
        let escalation = check.escalation.expect("escalation expected");
        assert!(escalation.escalated.contains(&PermissionLevel::Admin));
        assert!(check.partition.grantable.contains(&PermissionLevel::Read));
    }

    #[test]
    fn approve_then_approve_again_fails() {
        let mut request = test_request("doc-1", "agent-1");
        approve_escalation(&mut request, 100).unwrap();
        assert!(matches!(
            approve_escalation(&mut request, 200),
            Err(VaultError::EscalationAlreadyResolved)
        ));
    }

    #[test]
    fn approver_ceiling_must_cover_full_request() {
        let approver_ceiling: BTreeSet<_> = [PermissionLevel::Read].into_iter().collect();
        let requested: BTreeSet<_> = [PermissionLevel::Read, PermissionLevel::Admin].into_iter().collect();
        assert!(matches!(
            validate_approver_ceiling(&approver_ceiling, &requested),
            Err(VaultError::InsufficientPermissions { .. })
        ));
        let full_ceiling = crate::types::full_grant_ceiling();
        assert!(validate_approver_ceiling(&full_ceiling, &requested).is_ok());
    }

    #[test]
    fn user_cannot_set_agent_ceiling_above_their_own() {
        let user_ceiling = UserGrantCeiling {
            user_id: UserId("u1".to_string()),
            levels: [PermissionLevel::Read].into_iter().collect(),
        };
        let requested: BTreeSet<_> = [PermissionLevel::Admin].into_iter().collect();
        assert!(set_agent_ceiling_with_validation(&user_ceiling, requested).is_err());
    }
}
