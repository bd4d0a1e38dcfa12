//! MessagePack codec for save files.
//!
//! Thin wrappers around `rmp-serde`. Structs are written with named fields so
//! that saves stay readable by tools and tolerant of field reordering.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// Encode a value to MessagePack bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialisation fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    rmp_serde::to_vec_named(value).map_err(CodecError::Encode)
}

/// Decode a value from MessagePack bytes.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if deserialisation fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    rmp_serde::from_slice(bytes).map_err(CodecError::Decode)
}
