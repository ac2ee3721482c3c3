//! Approval gateway contract (spec C9): the human-in-the-loop check an
//! escalated ceiling request waits on. The host wires a real gateway
//! (Slack approval, a ticketing system, whatever); the default here never
//! silently approves.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

#[derive(Clone, Debug)]
pub struct ApprovalOutcome {
    pub status: ApprovalStatus,
    pub decided_at_ms: Option<u64>,
}

pub trait ApprovalGateway: Send + Sync {
    fn check(&self, approval_id: &str) -> ApprovalOutcome;
}

/// Default gateway for hosts that haven't wired a real approval backend.
/// Always denies — an escalation request under this gateway simply stays
/// open until a real gateway is configured.
pub struct AlwaysDenyGateway;

impl ApprovalGateway for AlwaysDenyGateway {
    fn check(&self, _approval_id: &str) -> ApprovalOutcome {
        ApprovalOutcome { status: ApprovalStatus::Denied, decided_at_ms: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_deny_never_approves() {
        let gateway = AlwaysDenyGateway;
        let outcome = gateway.check("approval-1");
        assert_eq!(outcome.status, ApprovalStatus::Denied);
    }
}
