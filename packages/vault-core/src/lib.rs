#![forbid(unsafe_code)]
//! Password-unlocked secret vault and capability-token core for a
//! single-tenant container: identity and key rotation, capability
//! issuance/execution/revocation, cached snapshots for offline sharing,
//! agent ceilings with human-in-the-loop escalation, and an audit trail.

pub mod adapters;
pub mod approval;
pub mod audit;
pub mod background;
pub mod capability;
pub mod ceiling;
pub mod crypto;
pub mod error;
pub mod hash;
pub mod identity;
pub mod integration;
pub mod relay;
pub mod session;
pub mod snapshot;
pub mod types;
pub mod vault;
pub mod vault_service;
pub mod wire;

pub use error::{CryptoError, CryptoResult, VaultError, VaultResult};
pub use vault::{VaultConfig, VaultStore};
pub use vault_service::{VaultCore, VaultStatus};
