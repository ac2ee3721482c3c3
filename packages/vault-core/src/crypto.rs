//! Fixed cryptographic suite (spec §4.1): Ed25519 signatures, X25519 key
//! agreement, AES-256-GCM AEAD, scrypt password KDF. No pluggable cipher
//! suites — every algorithm choice here is load-bearing, not configurable.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use getrandom::getrandom;
use scrypt::Params as ScryptParams;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519Secret};

use crate::error::{CryptoError, CryptoResult};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
pub const SNAPSHOT_KEY_INFO: &[u8] = b"ocmt-cached-snapshot-v1";

/// Password-KDF parameters. Production always uses `N=2^16, r=8, p=1`
/// (spec §4.1); tests may shrink `log_n` only through the explicit hook
/// `ScryptCost`, never by any other mechanism (spec §8).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdfParams {
    pub salt: Vec<u8>,
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl KdfParams {
    pub const PRODUCTION_LOG_N: u8 = 16;
    pub const R: u32 = 8;
    pub const P: u32 = 1;

    pub fn new_random() -> CryptoResult<Self> {
        Ok(Self {
            salt: random_bytes(16)?,
            log_n: Self::PRODUCTION_LOG_N,
            r: Self::R,
            p: Self::P,
        })
    }

    /// Test-only constructor honoring the §6/§8 cost override hook. Never
    /// call this from a production code path.
    #[doc(hidden)]
    pub fn new_random_with_log_n(log_n: u8) -> CryptoResult<Self> {
        Ok(Self {
            salt: random_bytes(16)?,
            log_n,
            r: Self::R,
            p: Self::P,
        })
    }
}

pub fn derive_key_scrypt(password: &[u8], params: &KdfParams) -> CryptoResult<[u8; 32]> {
    let scrypt_params = ScryptParams::new(params.log_n, params.r, params.p, 32)
        .map_err(|e| CryptoError::Encode(e.to_string()))?;
    let mut out = [0u8; 32];
    scrypt::scrypt(password, &params.salt, &scrypt_params, &mut out)
        .map_err(|e| CryptoError::Encode(e.to_string()))?;
    Ok(out)
}

pub fn random_bytes(len: usize) -> CryptoResult<Vec<u8>> {
    let mut out = vec![0u8; len];
    getrandom(&mut out).map_err(|e| CryptoError::Entropy(e.to_string()))?;
    Ok(out)
}

pub fn random_nonce() -> CryptoResult<[u8; NONCE_LEN]> {
    let mut out = [0u8; NONCE_LEN];
    getrandom(&mut out).map_err(|e| CryptoError::Entropy(e.to_string()))?;
    Ok(out)
}

/// AES-256-GCM seal. Nonce must be fresh per (key, nonce) pair — callers
/// must never reuse a nonce under the same key.
pub fn aead_encrypt(key: &[u8], aad: &[u8], plaintext: &[u8], nonce: &[u8]) -> CryptoResult<Vec<u8>> {
    if key.len() != 32 {
        return Err(CryptoError::BadKeyLength);
    }
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::Encode("nonce must be 12 bytes".to_string()));
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::Encode("aead encrypt failed".to_string()))
}

/// AES-256-GCM open. Never leaks which step failed beyond `DecryptFailed`.
pub fn aead_decrypt(key: &[u8], aad: &[u8], nonce: &[u8], ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    if key.len() != 32 {
        return Err(CryptoError::BadKeyLength);
    }
    if nonce.len() != NONCE_LEN {
        return Err(CryptoError::DecryptFailed);
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CryptoError::DecryptFailed)
}

pub fn ed25519_generate() -> CryptoResult<([u8; 32], [u8; 32])> {
    let seed: [u8; 32] = random_bytes(32)?
        .try_into()
        .map_err(|_| CryptoError::BadKeyLength)?;
    let signing_key = SigningKey::from_bytes(&seed);
    let verifying_key = signing_key.verifying_key();
    Ok((signing_key.to_bytes(), verifying_key.to_bytes()))
}

/// Deterministic: `sign(d) == sign(d)` byte-for-byte for a fixed key (spec §4.1/§8).
pub fn ed25519_sign(signing_priv: &[u8; 32], data: &[u8]) -> CryptoResult<[u8; 64]> {
    let signing_key = SigningKey::from_bytes(signing_priv);
    Ok(signing_key.sign(data).to_bytes())
}

/// Rejects signatures whose length isn't 64 bytes without panicking (spec §4.1/§8).
pub fn ed25519_verify(verifying_pub: &[u8; 32], data: &[u8], signature: &[u8]) -> CryptoResult<()> {
    if signature.len() != 64 {
        return Err(CryptoError::BadSignature);
    }
    let verifying_key = VerifyingKey::from_bytes(verifying_pub).map_err(|_| CryptoError::BadKeyLength)?;
    let sig_bytes: [u8; 64] = signature.try_into().map_err(|_| CryptoError::BadSignature)?;
    let sig = Signature::from_bytes(&sig_bytes);
    verifying_key
        .verify(data, &sig)
        .map_err(|_| CryptoError::BadSignature)
}

pub fn x25519_generate() -> CryptoResult<([u8; 32], [u8; 32])> {
    let seed: [u8; 32] = random_bytes(32)?
        .try_into()
        .map_err(|_| CryptoError::BadKeyLength)?;
    let secret = X25519Secret::from(seed);
    let public = X25519PublicKey::from(&secret);
    Ok((secret.to_bytes(), public.to_bytes()))
}

pub fn x25519_diffie_hellman(priv_key: &[u8; 32], peer_pub: &[u8; 32]) -> [u8; 32] {
    let secret = X25519Secret::from(*priv_key);
    let peer = X25519PublicKey::from(*peer_pub);
    secret.diffie_hellman(&peer).to_bytes()
}

/// `SHA-256(ECDH(ephemeral_priv, recipient_pub) || "ocmt-cached-snapshot-v1")` (spec §4.1).
pub fn derive_snapshot_key(shared_secret: &[u8; 32]) -> [u8; 32] {
    let mut ikm = Vec::with_capacity(32 + SNAPSHOT_KEY_INFO.len());
    ikm.extend_from_slice(shared_secret);
    ikm.extend_from_slice(SNAPSHOT_KEY_INFO);
    crate::hash::sha256(&ikm)
}
