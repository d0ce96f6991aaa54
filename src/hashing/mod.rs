//! Content hashing for reproducibility artifacts.
//!
//! Two families live here:
//!
//! - **SHA-256** ([`sha256_hex`], [`metrics_hash`]): published in artifacts (metrics, calibration,
//!   medoid sets) and compared across runs, so the canonical form must never drift.
//! - **BLAKE3** ([`hash_to_u64`], [`seed_from_text`]): internal, used to derive RNG seeds.
//!
//! # Canonical metrics form
//!
//! [`canonical_json`] renders a JSON value with:
//!
//! - object keys sorted lexicographically (at every depth)
//! - every floating-point number replaced by a string with exactly 9 decimals
//! - integers, booleans, strings and nulls left as-is
//! - compact separators (`,` and `:`) and non-ASCII characters unescaped
//!
//! [`metrics_hash`] is the lowercase hex SHA-256 of that rendering.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
#[inline]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Canonical string form of `value` (see module docs).
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// SHA-256 over the canonical form of `value`.
pub fn metrics_hash(value: &Value) -> String {
    sha256_hex(canonical_json(value).as_bytes())
}

/// Serializes `value` and returns its [`metrics_hash`].
pub fn metrics_hash_of<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    Ok(metrics_hash(&value))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            if n.is_f64() {
                let f = n.as_f64().unwrap_or(0.0);
                write_str(&format_float(f), out);
            } else {
                let _ = write!(out, "{}", n);
            }
        }
        Value::String(s) => write_str(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_str(key, out);
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
    }
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        }
    } else {
        format!("{:.9}", f)
    }
}

fn write_str(s: &str, out: &mut String) {
    // serde_json escapes control characters and quotes but leaves non-ASCII as-is.
    match serde_json::to_string(s) {
        Ok(encoded) => out.push_str(&encoded),
        Err(_) => out.push_str("\"\""),
    }
}

/// First 8 bytes of a BLAKE3 digest as a little-endian `u64`.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}

/// Derives an RNG seed from `text` and a base `seed`.
#[inline]
pub fn seed_from_text(text: &str, seed: u64) -> u64 {
    let mut data = Vec::with_capacity(9 + text.len());
    data.extend_from_slice(&seed.to_le_bytes());
    data.push(b'|');
    data.extend_from_slice(text.as_bytes());
    hash_to_u64(&data)
}
