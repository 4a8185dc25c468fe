#[cfg(test)]
#[path = "compress_test.rs"]
mod tests;

use std::io::Read;
use std::io::Write;

use anyhow::Context;
use anyhow::Result;
use base64::engine::general_purpose;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Values written through the embedded host are gzipped and base64d, tagged
/// with this prefix so readers can tell packed payloads from raw ones.
pub const COMPRESSED_PREFIX: &str = "lz:";

pub fn is_packed(raw: &str) -> bool {
    return raw.starts_with(COMPRESSED_PREFIX);
}

/// Packing never fails a write. If the encoder errors the raw value is
/// stored instead, which every reader accepts.
pub fn pack(value: &str) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    if let Err(err) = encoder.write_all(value.as_bytes()) {
        tracing::warn!(error = ?err, "failed to compress value, storing raw");
        return value.to_string();
    }

    match encoder.finish() {
        Ok(bytes) => {
            let encoded = general_purpose::STANDARD.encode(bytes);
            return format!("{COMPRESSED_PREFIX}{encoded}");
        }
        Err(err) => {
            tracing::warn!(error = ?err, "failed to compress value, storing raw");
            return value.to_string();
        }
    }
}

/// Unpacks a stored value, passing untagged payloads through untouched. A
/// tagged payload that fails to decode is corrupt and becomes an error.
pub fn unpack(raw: &str) -> Result<String> {
    let Some(encoded) = raw.strip_prefix(COMPRESSED_PREFIX) else {
        return Ok(raw.to_string());
    };

    let bytes = general_purpose::STANDARD
        .decode(encoded)
        .context("stored value is tagged compressed but is not valid base64")?;

    let mut decoder = GzDecoder::new(bytes.as_slice());
    let mut value = String::new();
    decoder
        .read_to_string(&mut value)
        .context("stored value is tagged compressed but failed to inflate")?;

    return Ok(value);
}
