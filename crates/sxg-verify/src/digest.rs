use sha2::{Digest, Sha256};

pub(crate) const SHA256_LEN: usize = 32;

/// SHA-256 over the concatenation of `parts`.
pub(crate) fn sha256_parts(parts: &[&[u8]]) -> [u8; SHA256_LEN] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0_u8; SHA256_LEN];
    out.copy_from_slice(&hasher.finalize());
    out
}

pub(crate) fn sha256(bytes: &[u8]) -> [u8; SHA256_LEN] {
    sha256_parts(&[bytes])
}

/// Lowercase hex SHA-256, as certificate fingerprints are displayed.
pub fn fingerprint_hex(der: &[u8]) -> String {
    hex::encode(sha256(der))
}
