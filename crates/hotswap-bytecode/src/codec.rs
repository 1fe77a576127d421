//! Binary codec for compiled units
//!
//! Layout: 4-byte magic `HSWU`, big-endian u16 format version, then the
//! bincode-serialized [`UnitNode`].

use crate::unit::UnitNode;

/// Leading bytes of every encoded unit
pub const MAGIC: [u8; 4] = *b"HSWU";

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = MAGIC.len() + 2;

/// Errors while encoding or decoding units
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Input contained no bytes
    #[error("empty unit content")]
    Empty,

    /// Input too short for the header or wrong magic
    #[error("not a compiled unit (bad magic)")]
    BadMagic,

    /// Header names a version this codec does not read
    #[error("unsupported unit format version {0}")]
    UnsupportedVersion(u16),

    /// Body failed to deserialize
    #[error("malformed unit body: {0}")]
    Malformed(String),

    /// Body failed to serialize
    #[error("failed to encode unit {name}: {reason}")]
    Encode { name: String, reason: String },
}

impl CodecError {
    /// Create a malformed-body error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed(reason.into())
    }
}

/// Encode a unit into its binary form
///
/// # Errors
/// Returns error if the body cannot be serialized
pub fn encode(unit: &UnitNode) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serialize(unit).map_err(|e| CodecError::Encode {
        name: unit.name.clone(),
        reason: e.to_string(),
    })?;

    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a unit from its binary form
///
/// # Errors
/// Returns error if the content is empty, lacks the header, carries an
/// unknown version, or the body is malformed
pub fn decode(bytes: &[u8]) -> Result<UnitNode, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }
    if bytes.len() < HEADER_LEN || bytes[..MAGIC.len()] != MAGIC {
        return Err(CodecError::BadMagic);
    }

    let version = u16::from_be_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let unit: UnitNode =
        bincode::deserialize(&bytes[HEADER_LEN..]).map_err(|e| CodecError::malformed(e.to_string()))?;
    if unit.name.is_empty() {
        return Err(CodecError::malformed("unit has no name"));
    }
    Ok(unit)
}

/// Read only the unit name, for callers that route on identity
///
/// # Errors
/// Same as [`decode`]
pub fn peek_name(bytes: &[u8]) -> Result<String, CodecError> {
    decode(bytes).map(|u| u.name)
}
