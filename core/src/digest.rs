//! Canonical JSON and the result verification digest
//!
//! Canonical rules: UTF-8, lexicographically sorted keys at every object
//! level, no insignificant whitespace, integers in plain decimal, no
//! floating point. Re-running the digest over a published result must
//! reproduce its stored `verification_hash` exactly, so the creation
//! timestamp is deliberately not part of the pre-image.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{Error, Result};

/// Render `value` in canonical form.
///
/// In strict mode any floating-point number is rejected; otherwise floats
/// with a zero fraction are coerced to integers and the rest rejected.
pub fn canonical_json(value: &Value, strict: bool) -> Result<String> {
    let mut out = String::new();
    write_canonical(value, strict, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, strict: bool, out: &mut String) -> Result<()> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if n.is_f64() {
                let coerced = (!strict)
                    .then(|| n.as_f64())
                    .flatten()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64);
                match coerced {
                    Some(int) => out.push_str(&int.to_string()),
                    None => {
                        return Err(Error::InvalidArgument(
                            "canonical JSON forbids floating-point numbers".into(),
                        ))
                    }
                }
            } else {
                out.push_str(&n.to_string());
            }
        }
        Value::String(s) => {
            let escaped = serde_json::to_string(s)
                .map_err(|e| Error::Internal(format!("string escaping failed: {e}")))?;
            out.push_str(&escaped);
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, strict, out)?;
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
                let escaped = serde_json::to_string(key)
                    .map_err(|e| Error::Internal(format!("key escaping failed: {e}")))?;
                out.push_str(&escaped);
                out.push(':');
                write_canonical(&map[key.as_str()], strict, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

/// Verification digest over a published result:
/// hex(SHA-256(canonical `{"election_id", "final_tally", "total_votes"}`)).
pub fn result_digest(
    election_id: &Uuid,
    final_tally: &BTreeMap<String, u64>,
    total_votes: u64,
    strict: bool,
) -> Result<String> {
    let value = serde_json::json!({
        "election_id": election_id.to_string(),
        "final_tally": final_tally,
        "total_votes": total_votes,
    });
    let canonical = canonical_json(&value, strict)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}
