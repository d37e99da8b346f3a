use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::error::{StoreError, StoreResult};

/// Segment bytes as they arrive from a fetcher or a host bridge.
///
/// Resolved once into a single canonical byte buffer before entering the
/// pipeline.
#[derive(Debug, Clone)]
pub enum Payload {
    Raw(Vec<u8>),
    /// Standard base64, optionally wrapped in a `data:` URL.
    Base64(String),
    View {
        buffer: Arc<Vec<u8>>,
        offset: usize,
        len: usize,
    },
}

impl Payload {
    pub fn into_bytes(self) -> StoreResult<Vec<u8>> {
        match self {
            Payload::Raw(bytes) => Ok(bytes),
            Payload::Base64(text) => STANDARD
                .decode(strip_data_url(&text).trim())
                .map_err(|err| StoreError::Payload(format!("base64 decode failed: {err}"))),
            Payload::View {
                buffer,
                offset,
                len,
            } => {
                let end = offset
                    .checked_add(len)
                    .filter(|end| *end <= buffer.len())
                    .ok_or_else(|| {
                        StoreError::Payload(format!(
                            "view {offset}+{len} exceeds buffer of {} bytes",
                            buffer.len()
                        ))
                    })?;
                Ok(buffer[offset..end].to_vec())
            }
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Raw(bytes)
    }
}

fn strip_data_url(text: &str) -> &str {
    if text.starts_with("data:") {
        text.split_once(',').map(|(_, data)| data).unwrap_or(text)
    } else {
        text
    }
}
