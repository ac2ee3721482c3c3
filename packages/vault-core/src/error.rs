//! Error taxonomy (spec §7). `CryptoError` is the low-level primitive
//! failure; `VaultError` is the only error type public operations return.

use std::collections::BTreeSet;

use crate::types::PermissionLevel;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("bad key length")]
    BadKeyLength,
    #[error("bad signature")]
    BadSignature,
    #[error("decrypt failed")]
    DecryptFailed,
    #[error("entropy error: {0}")]
    Entropy(String),
    #[error("encode error: {0}")]
    Encode(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("vault is locked")]
    Locked,
    #[error("vault already exists")]
    AlreadyExists,
    #[error("vault not initialized")]
    NotInitialized,
    #[error("incorrect password")]
    BadPassword,
    #[error("bad signature")]
    BadSignature,
    #[error("bad key length")]
    BadKeyLength,
    #[error("decrypt failed")]
    DecryptFailed,
    #[error("capability expired")]
    Expired,
    #[error("capability revoked")]
    Revoked,
    #[error("capability call budget exhausted")]
    Overused,
    #[error("operation outside capability scope")]
    ScopeViolation,
    #[error("request exceeds agent ceiling")]
    CeilingExceeded {
        requested: BTreeSet<PermissionLevel>,
        ceiling: BTreeSet<PermissionLevel>,
        escalated: BTreeSet<PermissionLevel>,
    },
    #[error("caller lacks permission to grant this ceiling")]
    InsufficientPermissions {
        requested: BTreeSet<PermissionLevel>,
        ceiling: BTreeSet<PermissionLevel>,
        escalated: BTreeSet<PermissionLevel>,
    },
    #[error("no rotation transition in progress")]
    NoTransitionInProgress,
    #[error("resource not found: {0}")]
    ResourceMissing(String),
    #[error("cached tier requires a subject encryption key")]
    CachedRequiresEncKey,
    #[error("no cached data available")]
    NoCachedData,
    #[error("relay unreachable")]
    RelayUnreachable,
    #[error("escalation request not found")]
    EscalationNotFound,
    #[error("escalation request already resolved")]
    EscalationAlreadyResolved,
    #[error("approval not granted")]
    ApprovalNotGranted,
    #[error("unknown key handle or session")]
    SessionInvalid,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("invalid format: {0}")]
    Format(String),
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::BadKeyLength => VaultError::BadKeyLength,
            CryptoError::BadSignature => VaultError::BadSignature,
            CryptoError::DecryptFailed => VaultError::DecryptFailed,
            CryptoError::Entropy(msg) => VaultError::Storage(msg),
            CryptoError::Encode(msg) => VaultError::Format(msg),
        }
    }
}

pub type VaultResult<T> = Result<T, VaultError>;
