//! Self-describing envelope for encrypted data
//!
//! Binary layout, transported as standard base64 with padding:
//! - key tier: 1 byte
//! - cipher tier: 1 byte
//! - supplement length: u32, big endian
//! - supplement: supplement length bytes
//! - ciphertext segment: the remainder
//!
//! Everything before the segment is the header, which the engine binds to the
//! ciphertext as associated data.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::{CompatError, ErrorCategory, ErrorKind, Result};

/// Size of the fixed part of the header (two tags and the length)
const FIXED_HEADER_LEN: usize = 6;

/// A decoded envelope. Tags are raw bytes; resolving them to tiers is up to
/// the engine so that unknown values surface as unsupported tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub key_tier: u8,
    pub cipher_tier: u8,
    pub supplement: Vec<u8>,
    pub segment: Vec<u8>,
}

impl Envelope {
    /// Header bytes: both tags, the supplement length and the supplement.
    pub fn header(&self) -> Result<Vec<u8>> {
        header_bytes(self.key_tier, self.cipher_tier, &self.supplement)
    }
}

/// Builds the header for the given tags and supplement.
///
/// Fails with `InternalInvariant` if the supplement does not fit the u32
/// length field.
pub fn header_bytes(key_tier: u8, cipher_tier: u8, supplement: &[u8]) -> Result<Vec<u8>> {
    let len = encode_len(supplement.len())?;
    let mut header = Vec::with_capacity(FIXED_HEADER_LEN + supplement.len());
    header.push(key_tier);
    header.push(cipher_tier);
    header.extend_from_slice(&len);
    header.extend_from_slice(supplement);
    Ok(header)
}

fn encode_len(len: usize) -> Result<[u8; 4]> {
    let len = u32::try_from(len).map_err(|_| {
        CompatError::new(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            format!("supplement of {} bytes exceeds the envelope length field", len),
        )
    })?;
    Ok(len.to_be_bytes())
}

/// Serializes an envelope and encodes it as base64.
pub fn assemble(
    key_tier: u8,
    cipher_tier: u8,
    supplement: &[u8],
    segment: &[u8],
) -> Result<String> {
    let mut body = header_bytes(key_tier, cipher_tier, supplement)?;
    body.extend_from_slice(segment);
    Ok(STANDARD.encode(body))
}

/// Decodes base64 text and splits it into its envelope parts.
pub fn disassemble(encoded: &str) -> Result<Envelope> {
    let body = STANDARD.decode(encoded).map_err(|e| {
        CompatError::malformed_envelope(format!("base64 decoding failed: {}", e))
    })?;

    if body.len() < FIXED_HEADER_LEN {
        return Err(CompatError::malformed_envelope(
            "input size smaller than envelope header; likely truncated",
        ));
    }

    let key_tier = body[0];
    let cipher_tier = body[1];
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&body[2..FIXED_HEADER_LEN]);
    let supplement_len = u32::from_be_bytes(len_bytes) as usize;

    let rest = &body[FIXED_HEADER_LEN..];
    if supplement_len > rest.len() {
        return Err(CompatError::malformed_envelope(format!(
            "supplement length {} exceeds remaining {} bytes",
            supplement_len,
            rest.len()
        )));
    }
    let (supplement, segment) = rest.split_at(supplement_len);

    Ok(Envelope {
        key_tier,
        cipher_tier,
        supplement: supplement.to_vec(),
        segment: segment.to_vec(),
    })
}
