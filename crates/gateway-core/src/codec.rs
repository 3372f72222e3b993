//! Gzip + base64 helpers for JSON payloads carried as text.

use crate::error::{GatewayError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::io::{Read, Write};

/// Base64 text of raw bytes.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Serialize, gzip and base64-encode a JSON value.
///
/// Returns the compressed length in bytes together with the encoded text.
pub fn compress_json(value: &Value) -> Result<(usize, String)> {
    let serialized = serde_json::to_vec(value)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&serialized)?;
    let compressed = encoder.finish()?;
    Ok((compressed.len(), encode_base64(&compressed)))
}

/// Reverse of [`compress_json`].
pub fn decompress_json(encoded: &str) -> Result<Value> {
    let compressed = STANDARD.decode(encoded.trim())?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| GatewayError::Codec {
            message: format!("gunzip failed: {}", e),
        })?;
    Ok(serde_json::from_str(&text)?)
}
