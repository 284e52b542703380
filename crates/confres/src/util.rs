use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compact JSON with object keys in sorted order.
pub fn canonical_json(value: &Value) -> String {
    // serde_json's default map keeps keys sorted.
    value.to_string()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
