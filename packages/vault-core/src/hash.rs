use sha2::{Digest, Sha256};

pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// First 16 bytes of `sha256(pub_key)`, used as a `key_id` fingerprint (spec §3).
pub fn key_id_fingerprint(signing_pub: &[u8]) -> [u8; 16] {
    let digest = sha256(signing_pub);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_empty_is_well_known() {
        let digest = sha256(b"");
        assert_eq!(
            hex::encode(digest),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn key_id_is_first_half_of_digest() {
        let digest = sha256(b"signing-pub");
        let fp = key_id_fingerprint(b"signing-pub");
        assert_eq!(&fp[..], &digest[..16]);
    }
}
