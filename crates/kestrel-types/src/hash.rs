use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};
use crate::vars::ObjectVars;

/// Length of an [`ObjectHash`] rendered as hex.
pub const HASH_HEX_LEN: usize = 32;

/// Deterministic 128-bit identity of a stored object.
///
/// Always rendered as 32 lowercase hex characters. An `ObjectHash` is derived
/// once per object handle and never changes afterwards; the leading bits pick
/// the ring partition the object lives in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectHash([u8; 16]);

impl ObjectHash {
    /// Create a hash from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parse a hash from its hex form.
    ///
    /// Upper-case input is accepted and normalized. Fails unless the input is
    /// exactly 32 characters of valid hex.
    pub fn parse(s: &str) -> TypeResult<Self> {
        if s.len() != HASH_HEX_LEN {
            return Err(TypeError::InvalidHashLength {
                hash: s.to_string(),
                actual: s.len(),
            });
        }
        let mut arr = [0u8; 16];
        hex::decode_to_slice(s.to_ascii_lowercase(), &mut arr).map_err(|e| {
            TypeError::InvalidHex {
                hash: s.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self(arr))
    }

    /// The raw 16 bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Lowercase hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The first four bytes as a big-endian integer.
    pub fn upper_u32(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Ring partition of this hash for a ring using `part_power` bits.
    pub fn partition(&self, part_power: u32) -> TypeResult<u32> {
        if part_power > 32 {
            return Err(TypeError::InvalidPartPower(part_power));
        }
        if part_power == 0 {
            return Ok(0);
        }
        Ok(self.upper_u32() >> (32 - part_power))
    }
}

impl fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHash({})", self.to_hex())
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectHash {
    type Err = TypeError;

    fn from_str(s: &str) -> TypeResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectHash {
    type Error = TypeError;

    fn try_from(s: String) -> TypeResult<Self> {
        Self::parse(&s)
    }
}

impl From<ObjectHash> for String {
    fn from(hash: ObjectHash) -> Self {
        hash.to_hex()
    }
}

/// Derive the identity of the object named by `vars`.
///
/// A raw hash carried in `vars` wins over derivation but is still validated.
/// Otherwise the identity is the first 16 bytes of BLAKE3 over
/// `prefix/account[/container[/object]]suffix`.
pub fn derive_hash(vars: &ObjectVars, prefix: &str, suffix: &str) -> TypeResult<ObjectHash> {
    if let Some(raw) = vars.hash.as_deref() {
        return ObjectHash::parse(raw);
    }
    let account = match vars.account.as_deref() {
        Some(a) if !a.is_empty() => a,
        _ => return Err(TypeError::InvalidIdentity("missing account".into())),
    };
    if vars.object.is_some() && vars.container.is_none() {
        return Err(TypeError::InvalidIdentity(
            "object given without a container".into(),
        ));
    }

    let mut hasher = blake3::Hasher::new();
    hasher.update(prefix.as_bytes());
    hasher.update(b"/");
    hasher.update(account.as_bytes());
    if let Some(container) = vars.container.as_deref() {
        hasher.update(b"/");
        hasher.update(container.as_bytes());
    }
    if let Some(object) = vars.object.as_deref() {
        hasher.update(b"/");
        hasher.update(object.as_bytes());
    }
    hasher.update(suffix.as_bytes());

    let mut out = [0u8; 16];
    out.copy_from_slice(&hasher.finalize().as_bytes()[..16]);
    Ok(ObjectHash(out))
}

/// Ring partition of a hex hash string.
///
/// The first four decoded bytes are read as a big-endian `u32` and shifted
/// right by `32 - part_power`.
pub fn partition_of(hash: &str, part_power: u32) -> TypeResult<u32> {
    ObjectHash::parse(hash)?.partition(part_power)
}

/// Number of leading hash bits needed to address `partition_count` partitions.
pub fn ring_part_power(partition_count: u64) -> u32 {
    if partition_count <= 1 {
        return 0;
    }
    64 - (partition_count - 1).leading_zeros()
}
