//! Append-only audit log (spec C8): a bounded in-memory ring mirrored to a
//! durable store, with actions namespaced as `group_vault.<verb>`. This is
//! the user-facing contract — distinct from the operator-facing `tracing`
//! spans the rest of the crate emits.

use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_RING_CAPACITY: usize = 2_000;
const UNKNOWN_ACTION_PREFIX: &str = "group_vault.unknown_";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub action: String,
    pub at_ms: u64,
    pub actor: Option<String>,
    pub resource: Option<String>,
    pub detail: serde_json::Value,
}

/// Maps the internal verb used at a call site to the namespaced action name
/// a host's audit viewer expects (spec C8: "implementers provide the
/// mapping table"). Anything not in this table still gets logged, under
/// the `group_vault.unknown_<verb>` fallback, rather than being dropped.
pub fn namespaced_action(verb: &str) -> String {
    let known = [
        "vault.created",
        "vault.unlocked",
        "vault.locked",
        "identity.rotated",
        "capability.issued",
        "capability.executed",
        "capability.revoked",
        "capability.reissued",
        "snapshot.created",
        "snapshot.pushed",
        "escalation.requested",
        "escalation.approved",
        "escalation.denied",
        "ceiling.updated",
        "integration.set",
        "capability.received",
        "snapshot.accessed",
    ];
    if known.contains(&verb) {
        format!("group_vault.{verb}")
    } else {
        format!("{UNKNOWN_ACTION_PREFIX}{verb}")
    }
}

pub struct AuditLog {
    ring: Vec<AuditEntry>,
    capacity: usize,
    durable: Vec<AuditEntry>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_RING_CAPACITY)
    }
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self { ring: Vec::new(), capacity, durable: Vec::new() }
    }

    /// Rebuilds a log from persisted entries (spec §6: the audit trail must
    /// survive a lock/unlock cycle, not reset to empty). `ring` is seeded
    /// with the tail of `entries` so eviction behaves the same as if they'd
    /// been recorded one at a time.
    pub fn from_entries(capacity: usize, entries: Vec<AuditEntry>) -> Self {
        let ring_start = entries.len().saturating_sub(capacity);
        let ring = entries[ring_start..].to_vec();
        Self { ring, capacity, durable: entries }
    }

    pub fn record(&mut self, verb: &str, at_ms: u64, actor: Option<String>, resource: Option<String>, detail: serde_json::Value) {
        let entry = AuditEntry {
            action: namespaced_action(verb),
            at_ms,
            actor,
            resource,
            detail,
        };
        if self.ring.len() >= self.capacity {
            self.ring.remove(0);
        }
        self.ring.push(entry.clone());
        self.durable.push(entry);
    }

    pub fn recent(&self) -> &[AuditEntry] {
        &self.ring
    }

    pub fn durable_entries(&self) -> &[AuditEntry] {
        &self.durable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_verb_gets_namespaced() {
        assert_eq!(namespaced_action("vault.unlocked"), "group_vault.vault.unlocked");
    }

    #[test]
    fn unknown_verb_falls_back_without_dropping() {
        assert_eq!(namespaced_action("something.new"), "group_vault.unknown_something.new");
    }

    #[test]
    fn ring_evicts_oldest_but_durable_keeps_everything() {
        let mut log = AuditLog::new(2);
        log.record("vault.unlocked", 1, None, None, serde_json::Value::Null);
        log.record("vault.locked", 2, None, None, serde_json::Value::Null);
        log.record("capability.issued", 3, None, None, serde_json::Value::Null);
        assert_eq!(log.recent().len(), 2);
        assert_eq!(log.recent()[0].action, "group_vault.vault.locked");
        assert_eq!(log.durable_entries().len(), 3);
    }

    #[test]
    fn from_entries_reconstructs_ring_and_durable() {
        let entries = vec![
            AuditEntry { action: "group_vault.vault.unlocked".to_string(), at_ms: 1, actor: None, resource: None, detail: serde_json::Value::Null },
            AuditEntry { action: "group_vault.vault.locked".to_string(), at_ms: 2, actor: None, resource: None, detail: serde_json::Value::Null },
            AuditEntry { action: "group_vault.capability.issued".to_string(), at_ms: 3, actor: None, resource: None, detail: serde_json::Value::Null },
        ];
        let log = AuditLog::from_entries(2, entries);
        assert_eq!(log.recent().len(), 2);
        assert_eq!(log.recent()[0].action, "group_vault.vault.locked");
        assert_eq!(log.durable_entries().len(), 3);
    }
}
