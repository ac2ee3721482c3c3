//! On-the-wire encodings (spec §6): base64 for raw public keys, PEM/PKCS#8
//! (with a fixed SPKI-DER prefix per algorithm) for private keys, and the
//! canonical JSON shapes for the vault envelope and capability tokens.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CryptoError, CryptoResult};

/// `302a300506032b6570032100` — Ed25519 SubjectPublicKeyInfo prefix (spec §6).
const ED25519_SPKI_PREFIX: &str = "302a300506032b6570032100";
/// `302a300506032b656e032100` — X25519 SubjectPublicKeyInfo prefix (spec §6).
const X25519_SPKI_PREFIX: &str = "302a300506032b656e032100";

pub fn b64_encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn b64_decode(value: &str) -> CryptoResult<Vec<u8>> {
    BASE64.decode(value).map_err(|e| CryptoError::Encode(e.to_string()))
}

pub fn b64_decode_fixed32(value: &str) -> CryptoResult<[u8; 32]> {
    let raw = b64_decode(value)?;
    raw.try_into().map_err(|_| CryptoError::BadKeyLength)
}

/// base64url, no padding — the opaque wire form of a capability token
/// (spec §6: "base64url of the JSON object"), distinct from the STANDARD
/// engine used for raw key bytes elsewhere in this module.
pub fn b64url_encode(bytes: &[u8]) -> String {
    BASE64URL.encode(bytes)
}

pub fn b64url_decode(value: &str) -> CryptoResult<Vec<u8>> {
    BASE64URL.decode(value).map_err(|e| CryptoError::Encode(e.to_string()))
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KeyAlgorithm {
    Ed25519,
    X25519,
}

impl KeyAlgorithm {
    fn spki_prefix_hex(self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519 => ED25519_SPKI_PREFIX,
            KeyAlgorithm::X25519 => X25519_SPKI_PREFIX,
        }
    }

    fn pem_tag(self) -> &'static str {
        "PRIVATE KEY"
    }
}

/// Wraps a raw 32-byte seed in an (abbreviated, fixed-prefix) PKCS#8 SPKI
/// envelope and PEM-encodes it, matching the literal encoding spec §6 pins.
pub fn encode_private_key_pem(algorithm: KeyAlgorithm, seed: &[u8; 32]) -> CryptoResult<String> {
    let prefix = hex::decode(algorithm.spki_prefix_hex()).map_err(|e| CryptoError::Encode(e.to_string()))?;
    let mut der = Vec::with_capacity(prefix.len() + 32);
    der.extend_from_slice(&prefix);
    der.extend_from_slice(seed);
    let pem_obj = pem::Pem::new(algorithm.pem_tag(), der);
    Ok(pem::encode(&pem_obj))
}

pub fn decode_private_key_pem(algorithm: KeyAlgorithm, pem_text: &str) -> CryptoResult<[u8; 32]> {
    let parsed = pem::parse(pem_text).map_err(|e| CryptoError::Encode(e.to_string()))?;
    let der = parsed.contents();
    let prefix = hex::decode(algorithm.spki_prefix_hex()).map_err(|e| CryptoError::Encode(e.to_string()))?;
    if der.len() != prefix.len() + 32 || &der[..prefix.len()] != prefix.as_slice() {
        return Err(CryptoError::Encode("unexpected SPKI prefix or length".to_string()));
    }
    der[prefix.len()..].try_into().map_err(|_| CryptoError::BadKeyLength)
}

/// The on-disk vault envelope (spec §6): an outer JSON object carrying KDF
/// parameters, the wrapped vault key, and identity material.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultEnvelope {
    pub version: u32,
    pub kdf: KdfParamsWire,
    #[serde(rename = "wrappedVaultKey")]
    pub wrapped_vault_key: EncryptedBlobWire,
    pub identity: serde_json::Value,
    #[serde(default)]
    pub document: EncryptedBlobWire,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KdfParamsWire {
    pub algorithm: String,
    pub salt: String,
    #[serde(rename = "logN")]
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EncryptedBlobWire {
    pub nonce: String,
    pub ciphertext: String,
}

/// Serializes a capability token's signable fields to the pinned JSON
/// encoding (spec §4.4): object keys sorted, `sig` excluded. `serde_json`'s
/// default `Map` (no `preserve_order`) is backed by a `BTreeMap`, which
/// gives us alphabetical key order for free — this is the fixed canonical
/// ordering this build settles on for §9's open question.
pub fn canonical_json_without_sig(value: &Value) -> CryptoResult<Vec<u8>> {
    let object = value.as_object().ok_or_else(|| CryptoError::Encode("expected JSON object".to_string()))?;
    let mut canonical: Map<String, Value> = Map::new();
    for (key, val) in object {
        if key == "sig" {
            continue;
        }
        canonical.insert(key.clone(), val.clone());
    }
    serde_json::to_vec(&Value::Object(canonical)).map_err(|e| CryptoError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_key_pem_round_trips() {
        let seed = [7u8; 32];
        let pem_text = encode_private_key_pem(KeyAlgorithm::Ed25519, &seed).unwrap();
        assert!(pem_text.contains("PRIVATE KEY"));
        let decoded = decode_private_key_pem(KeyAlgorithm::Ed25519, &pem_text).unwrap();
        assert_eq!(decoded, seed);
    }

    #[test]
    fn mismatched_algorithm_prefix_is_rejected() {
        let seed = [7u8; 32];
        let pem_text = encode_private_key_pem(KeyAlgorithm::Ed25519, &seed).unwrap();
        assert!(decode_private_key_pem(KeyAlgorithm::X25519, &pem_text).is_err());
    }

    #[test]
    fn canonical_json_drops_sig_and_sorts_keys() {
        let value = serde_json::json!({"sub": "a", "sig": "deadbeef", "iss": "b"});
        let bytes = canonical_json_without_sig(&value).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"iss":"b","sub":"a"}"#);
    }

    #[test]
    fn b64_round_trip() {
        let raw = [1u8, 2, 3, 4];
        let encoded = b64_encode(&raw);
        assert_eq!(b64_decode(&encoded).unwrap(), raw);
    }

    #[test]
    fn b64url_round_trip() {
        let raw = [1u8, 2, 3, 4, 255];
        let encoded = b64url_encode(&raw);
        assert!(!encoded.contains('+') && !encoded.contains('/'));
        assert_eq!(b64url_decode(&encoded).unwrap(), raw);
    }
}
