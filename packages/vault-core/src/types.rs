//! Shared identifiers and the fixed permission lattice (spec §3, §4.6).

use std::collections::BTreeSet;
use std::fmt;

#[derive(Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CapabilityId(pub String);

#[derive(Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct EscalationId(pub String);

#[derive(Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ResourceName(pub String);

#[derive(Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct AgentId(pub String);

#[derive(Clone, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct KeyVersion(pub u64);

/// A raw 32-byte public key, displayed redacted to keep it out of logs by accident.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKeyBytes(pub [u8; 32]);

impl fmt::Debug for PublicKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyBytes({})", crate::wire::b64_encode(&self.0))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AeadId {
    Aes256Gcm,
}

impl AeadId {
    pub fn as_str(&self) -> &'static str {
        match self {
            AeadId::Aes256Gcm => "aes-256-gcm",
        }
    }
}

impl TryFrom<&str> for AeadId {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "aes-256-gcm" => Ok(AeadId::Aes256Gcm),
            other => Err(format!("unknown aead id: {other}")),
        }
    }
}

/// The three sharing tiers of spec §3/GLOSSARY. DELEGATED is reserved: the
/// engine accepts and stores it but §4.4/§4.5 never act on it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SharingTier {
    Live,
    Cached,
    Delegated,
}

/// The totally ordered permission lattice of spec §3. Order is the
/// discriminant; "within ceiling" means `level as u8 <= max(ceiling)`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionLevel {
    Read = 0,
    List = 1,
    Write = 2,
    Delete = 3,
    Admin = 4,
    ShareFurther = 5,
}

impl PermissionLevel {
    pub const ALL: [PermissionLevel; 6] = [
        PermissionLevel::Read,
        PermissionLevel::List,
        PermissionLevel::Write,
        PermissionLevel::Delete,
        PermissionLevel::Admin,
        PermissionLevel::ShareFurther,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionLevel::Read => "read",
            PermissionLevel::List => "list",
            PermissionLevel::Write => "write",
            PermissionLevel::Delete => "delete",
            PermissionLevel::Admin => "admin",
            PermissionLevel::ShareFurther => "share-further",
        }
    }
}

impl TryFrom<&str> for PermissionLevel {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        PermissionLevel::ALL
            .iter()
            .find(|level| level.as_str() == value)
            .copied()
            .ok_or_else(|| format!("unknown permission level: {value}"))
    }
}

/// Result of partitioning a requested permission set against a ceiling
/// (spec §4.6, §8: "ceiling partition is total").
#[derive(Clone, Debug, Default)]
pub struct CeilingPartition {
    pub grantable: BTreeSet<PermissionLevel>,
    pub escalated: BTreeSet<PermissionLevel>,
}

/// Splits `requested` into the subset within `ceiling` and the subset
/// outside it. `grantable ⊎ escalated = requested` always holds; unknown
/// strings in `requested` that don't parse as a `PermissionLevel` are the
/// caller's problem (they fail to parse before reaching this function).
pub fn partition_against_ceiling(
    requested: &BTreeSet<PermissionLevel>,
    ceiling: &BTreeSet<PermissionLevel>,
) -> CeilingPartition {
    let ceiling_max = ceiling.iter().max().copied();
    let mut partition = CeilingPartition::default();
    for level in requested {
        let within = match ceiling_max {
            Some(max) => *level <= max,
            None => false,
        };
        if within {
            partition.grantable.insert(*level);
        } else {
            partition.escalated.insert(*level);
        }
    }
    partition
}

pub fn default_agent_ceiling() -> BTreeSet<PermissionLevel> {
    [PermissionLevel::Read, PermissionLevel::List].into_iter().collect()
}

pub fn full_grant_ceiling() -> BTreeSet<PermissionLevel> {
    PermissionLevel::ALL.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_is_total() {
        let ceiling: BTreeSet<_> = [PermissionLevel::Read, PermissionLevel::List].into_iter().collect();
        let requested: BTreeSet<_> = [PermissionLevel::Read, PermissionLevel::Delete].into_iter().collect();
        let partition = partition_against_ceiling(&requested, &ceiling);
        let mut union: BTreeSet<_> = partition.grantable.iter().copied().collect();
        union.extend(partition.escalated.iter().copied());
        assert_eq!(union, requested);
        assert!(partition.grantable.contains(&PermissionLevel::Read));
        assert!(partition.escalated.contains(&PermissionLevel::Delete));
    }

    #[test]
    fn empty_ceiling_escalates_everything() {
        let ceiling = BTreeSet::new();
        let requested: BTreeSet<_> = [PermissionLevel::Read].into_iter().collect();
        let partition = partition_against_ceiling(&requested, &ceiling);
        assert!(partition.grantable.is_empty());
        assert_eq!(partition.escalated, requested);
    }

    #[test]
    fn ordering_matches_spec_table() {
        assert!(PermissionLevel::Read < PermissionLevel::List);
        assert!(PermissionLevel::List < PermissionLevel::Write);
        assert!(PermissionLevel::Write < PermissionLevel::Delete);
        assert!(PermissionLevel::Delete < PermissionLevel::Admin);
        assert!(PermissionLevel::Admin < PermissionLevel::ShareFurther);
    }
}
