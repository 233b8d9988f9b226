//! Document codec seam
//!
//! All logical documents passing through the chunked write/read path go
//! through the codec. The trait is the seam for alternative encodings;
//! [`JsonCodec`] is the default and encodes canonical JSON bytes.

use chunkstore_core::{Error, Result};
use serde_json::Value;

/// Byte-exact document codec.
///
/// Required to round-trip exactly for every logical document shape the
/// layer stores (objects, arrays, primitives): same input, same bytes,
/// same value back.
///
/// # Thread Safety
///
/// Codecs must be `Send + Sync` to allow concurrent encoding/decoding
/// from multiple tasks.
pub trait DocumentCodec: Send + Sync {
    /// Encode a logical document to the bytes that get chunked and stored.
    fn encode(&self, value: &Value) -> Result<Vec<u8>>;

    /// Decode stored bytes back into the logical document.
    ///
    /// Returns an error if the bytes cannot be decoded (corruption,
    /// truncation, wrong codec).
    fn decode(&self, bytes: &[u8]) -> Result<Value>;

    /// Unique codec identifier, for diagnostics and mismatch detection.
    fn codec_id(&self) -> &str;
}

/// Default codec: canonical JSON bytes via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl DocumentCodec for JsonCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| Error::Codec(e.to_string()))
    }

    fn codec_id(&self) -> &str {
        "json"
    }
}
