use std::collections::{BTreeMap, HashMap};

use crate::error::{TypeError, TypeResult};

/// Flexible string attribute bag attached to every stored object.
pub type Metadata = HashMap<String, String>;

/// Key holding the commit timestamp; required on data commits and deletes.
pub const X_TIMESTAMP: &str = "X-Timestamp";

/// Key conventionally holding the payload size as a decimal string.
pub const CONTENT_LENGTH: &str = "Content-Length";

const DIGEST_DOMAIN: &[u8] = b"kestrel-metadata-v1:";

/// Serialize metadata to its JSON wire form.
pub fn encode_metadata(metadata: &Metadata) -> TypeResult<Vec<u8>> {
    serde_json::to_vec(metadata).map_err(|e| TypeError::Serialization(e.to_string()))
}

/// Deserialize metadata from its JSON wire form.
///
/// The document must be an object of string values.
pub fn decode_metadata(bytes: &[u8]) -> TypeResult<Metadata> {
    serde_json::from_slice(bytes).map_err(|e| TypeError::Serialization(e.to_string()))
}

/// Order-independent digest of a metadata map.
pub fn metadata_digest(metadata: &Metadata) -> [u8; 32] {
    let sorted: BTreeMap<&str, &str> = metadata
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    let mut hasher = blake3::Hasher::new();
    hasher.update(DIGEST_DOMAIN);
    for (k, v) in sorted {
        hasher.update(&(k.len() as u64).to_le_bytes());
        hasher.update(k.as_bytes());
        hasher.update(&(v.len() as u64).to_le_bytes());
        hasher.update(v.as_bytes());
    }
    *hasher.finalize().as_bytes()
}
