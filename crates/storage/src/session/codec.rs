//! Byte encoding of [`SessionRecord`]s.
//!
//! A stored value is one envelope byte followed by the body: `J` for plain JSON,
//! `Z` for DEFLATE-compressed JSON.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::record::SessionRecord;

pub const ENVELOPE_JSON: u8 = b'J';
pub const ENVELOPE_DEFLATE: u8 = b'Z';

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    #[error("stored value is empty")]
    Empty,
    #[error("unknown envelope byte {0:#04x}")]
    Envelope(u8),
    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),
    #[error("decompression failed: {0}")]
    Decompression(#[source] std::io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed record: {0}")]
    Structure(String),
}

/// Bytes ready to hand to a key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub compressed: bool,
}

/// Lowercase hex SHA-256 over the record serialised with an empty checksum.
///
/// # Errors
///
/// Returns `CodecError::Json` if the record cannot be serialised.
pub fn checksum(record: &SessionRecord) -> Result<String, CodecError> {
    let mut blank = record.clone();
    blank.checksum.clear();
    let json = serde_json::to_vec(&blank)?;
    Ok(hex::encode(Sha256::digest(&json)))
}

/// Stores a fresh checksum on `record`.
///
/// # Errors
///
/// Returns `CodecError::Json` if the record cannot be serialised.
pub fn seal(record: &mut SessionRecord) -> Result<(), CodecError> {
    record.checksum = checksum(record)?;
    Ok(())
}

/// Whether the stored checksum matches the record's contents.
///
/// # Errors
///
/// Returns `CodecError::Json` if the record cannot be serialised.
pub fn verify(record: &SessionRecord) -> Result<bool, CodecError> {
    Ok(checksum(record)? == record.checksum)
}

/// Serialises a sealed record, compressing when the JSON is longer than
/// `compression_threshold` bytes.
///
/// # Errors
///
/// Returns `CodecError` if serialisation or compression fails.
pub fn encode(record: &SessionRecord, compression_threshold: usize) -> Result<Encoded, CodecError> {
    let json = serde_json::to_vec(record)?;
    if json.len() <= compression_threshold {
        let mut bytes = Vec::with_capacity(json.len() + 1);
        bytes.push(ENVELOPE_JSON);
        bytes.extend_from_slice(&json);
        return Ok(Encoded {
            bytes,
            compressed: false,
        });
    }

    let mut encoder = DeflateEncoder::new(vec![ENVELOPE_DEFLATE], Compression::default());
    encoder.write_all(&json).map_err(CodecError::Compression)?;
    let bytes = encoder.finish().map_err(CodecError::Compression)?;
    Ok(Encoded {
        bytes,
        compressed: true,
    })
}

/// Unwraps the envelope, returning the JSON body.
///
/// # Errors
///
/// Returns `CodecError` for an empty value, an unknown envelope or a corrupt
/// compressed stream.
pub fn body(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let (&envelope, body) = bytes.split_first().ok_or(CodecError::Empty)?;
    match envelope {
        ENVELOPE_JSON => Ok(body.to_vec()),
        ENVELOPE_DEFLATE => {
            let mut json = Vec::new();
            DeflateDecoder::new(body)
                .read_to_end(&mut json)
                .map_err(CodecError::Decompression)?;
            Ok(json)
        }
        other => Err(CodecError::Envelope(other)),
    }
}

/// Unwraps the envelope and parses the body as untyped JSON.
///
/// # Errors
///
/// Returns `CodecError` for an unknown envelope, a corrupt compressed stream or
/// invalid JSON.
pub fn decode_value(bytes: &[u8]) -> Result<Value, CodecError> {
    Ok(serde_json::from_slice(&body(bytes)?)?)
}

#[derive(Clone, Copy)]
enum Expect {
    String,
    Number,
    Object,
}

impl Expect {
    fn matches(self, value: &Value) -> bool {
        match self {
            Expect::String => value.is_string(),
            Expect::Number => value.is_u64() || value.is_i64(),
            Expect::Object => value.is_object(),
        }
    }
}

const REQUIRED: &[(&str, Expect)] = &[
    ("sessionId", Expect::String),
    ("version", Expect::String),
    ("testState", Expect::Object),
    ("selectedQuestions", Expect::Object),
    ("selectionMetadata", Expect::Object),
    ("expiresAt", Expect::Number),
    ("metadata", Expect::Object),
    ("checksum", Expect::String),
];

const REQUIRED_METADATA: &[(&str, Expect)] = &[
    ("createdAt", Expect::Number),
    ("lastUpdated", Expect::Number),
    ("saveCount", Expect::Number),
];

fn check_fields(
    object: &serde_json::Map<String, Value>,
    fields: &[(&str, Expect)],
    path: &str,
) -> Result<(), CodecError> {
    for (name, expect) in fields {
        match object.get(*name) {
            None => {
                return Err(CodecError::Structure(format!("missing field {path}{name}")));
            }
            Some(value) if !expect.matches(value) => {
                return Err(CodecError::Structure(format!(
                    "field {path}{name} has the wrong type"
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Checks that the top-level fields exist with the right JSON types.
///
/// # Errors
///
/// Returns `CodecError::Structure` naming the first offending field.
pub fn validate_structure(value: &Value) -> Result<(), CodecError> {
    let object = value
        .as_object()
        .ok_or_else(|| CodecError::Structure("record is not an object".into()))?;
    check_fields(object, REQUIRED, "")?;
    let metadata = object
        .get("metadata")
        .and_then(Value::as_object)
        .ok_or_else(|| CodecError::Structure("metadata is not an object".into()))?;
    check_fields(metadata, REQUIRED_METADATA, "metadata.")
}

/// A parsed record together with the JSON body it was read from.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub record: SessionRecord,
    body: Vec<u8>,
}

impl Decoded {
    /// Whether the stored body is exactly what sealing `record` writes and the
    /// checksum matches.
    ///
    /// Parsing normalises some edits away (the letter case of a uuid, extra
    /// whitespace), so comparing the typed record alone is not enough.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Json` if the record cannot be serialised.
    pub fn is_authentic(&self) -> Result<bool, CodecError> {
        Ok(serde_json::to_vec(&self.record)? == self.body && verify(&self.record)?)
    }

    #[must_use]
    pub fn into_record(self) -> SessionRecord {
        self.record
    }
}

/// Full decode: envelope, decompression, structural check, typed parse.
///
/// Does not check the checksum, version or expiry.
///
/// # Errors
///
/// Returns `CodecError` for any decoding failure.
pub fn decode(bytes: &[u8]) -> Result<Decoded, CodecError> {
    let body = body(bytes)?;
    let value: Value = serde_json::from_slice(&body)?;
    validate_structure(&value)?;
    Ok(Decoded {
        record: serde_json::from_value(value)?,
        body,
    })
}
