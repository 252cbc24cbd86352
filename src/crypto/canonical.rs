//! Canonical JSON serialization.
//!
//! The signed/hashed byte sequence for every payload in the system. Keys are
//! recursively sorted and no incidental whitespace is emitted, so the same
//! logical value always produces the same bytes regardless of how the map
//! was built or which serde features are enabled.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::VaultError;

/// Serialize a JSON value to its canonical byte form.
pub fn canonical_bytes(value: &Value) -> Result<Vec<u8>, VaultError> {
    let mut out = String::new();
    write_canonical(value, &mut out)?;
    Ok(out.into_bytes())
}

fn write_canonical(value: &Value, out: &mut String) -> Result<(), VaultError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            let escaped = serde_json::to_string(s)?;
            out.push_str(&escaped);
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let escaped = serde_json::to_string(key)?;
                out.push_str(&escaped);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

/// SHA-256 over arbitrary bytes, rendered as `sha256:<hex>`.
pub fn sha256_tagged(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Content hash of a JSON value over its canonical bytes.
pub fn content_hash(value: &Value) -> Result<String, VaultError> {
    Ok(sha256_tagged(&canonical_bytes(value)?))
}

/// Check that a string is a well-formed `sha256:<64 hex>` tag.
pub fn is_sha256_tag(s: &str) -> bool {
    match s.strip_prefix("sha256:") {
        Some(rest) => rest.len() == 64 && rest.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
