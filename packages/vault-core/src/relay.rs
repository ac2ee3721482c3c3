//! Relay client contract (spec C7). The vault core never talks to a relay
//! socket directly — the host process implements this trait over whatever
//! transport it has (HTTP, gRPC, a message bus) and hands the vault an
//! instance. `relay_reachable: false` is a normal, non-fatal outcome.

use crate::types::ResourceName;

#[derive(Clone, Debug)]
pub struct SnapshotBlob {
    pub capability_id: String,
    pub resource: ResourceName,
    pub ephemeral_pub: [u8; 32],
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
    pub signature: [u8; 64],
    pub created_at_ms: u64,
}

#[derive(Clone, Debug)]
pub struct RelayOutcome<T> {
    pub relay_reachable: bool,
    pub value: Option<T>,
}

impl<T> RelayOutcome<T> {
    pub fn unreachable() -> Self {
        Self { relay_reachable: false, value: None }
    }

    pub fn ok(value: T) -> Self {
        Self { relay_reachable: true, value: Some(value) }
    }
}

pub trait RelayClient: Send + Sync {
    fn store_snapshot(&self, blob: SnapshotBlob) -> RelayOutcome<()>;
    fn get_snapshot(&self, resource: &ResourceName) -> RelayOutcome<SnapshotBlob>;
    fn list_snapshots(&self) -> RelayOutcome<Vec<ResourceName>>;
    fn notify_revocation(&self, capability_id: &str) -> RelayOutcome<()>;
    fn check_revocation(&self, capability_id: &str) -> RelayOutcome<bool>;
    fn notify_key_rotation(&self, key_id_hex: &str, key_version: u64) -> RelayOutcome<()>;
}

/// Reference adapter for hosts that haven't wired a relay yet, and for the
/// relay-unreachable scenarios in the test suite (spec §8 scenario 2).
pub struct NullRelayClient;

impl RelayClient for NullRelayClient {
    fn store_snapshot(&self, _blob: SnapshotBlob) -> RelayOutcome<()> {
        RelayOutcome::unreachable()
    }

    fn get_snapshot(&self, _resource: &ResourceName) -> RelayOutcome<SnapshotBlob> {
        RelayOutcome::unreachable()
    }

    fn list_snapshots(&self) -> RelayOutcome<Vec<ResourceName>> {
        RelayOutcome::unreachable()
    }

    fn notify_revocation(&self, _capability_id: &str) -> RelayOutcome<()> {
        RelayOutcome::unreachable()
    }

    fn check_revocation(&self, _capability_id: &str) -> RelayOutcome<bool> {
        RelayOutcome::unreachable()
    }

    fn notify_key_rotation(&self, _key_id_hex: &str, _key_version: u64) -> RelayOutcome<()> {
        RelayOutcome::unreachable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_relay_always_reports_unreachable() {
        let relay = NullRelayClient;
        assert!(!relay.store_snapshot(SnapshotBlob {
            capability_id: "cap-1".to_string(),
            resource: ResourceName("r".to_string()),
            ephemeral_pub: [0u8; 32],
            ciphertext: vec![],
            nonce: vec![],
            signature: [0u8; 64],
            created_at_ms: 0,
        }).relay_reachable);
        assert!(!relay.check_revocation("cap-1").relay_reachable);
    }
}
