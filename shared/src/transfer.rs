//! Chunked base64 transfer codec
//!
//! Scripts cross the control channel as base64 text written in bounded
//! chunks, one shell request per chunk:
//!
//! ```text
//! echo '<chunk 0>' >  <staging>
//! echo '<chunk 1>' >> <staging>
//! ...
//! base64 -d <staging> > <script>
//! ```
//!
//! The base64 alphabet contains no shell metacharacters, so a chunk can sit
//! inside single quotes without escaping.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Errors that can occur during chunking/decoding
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Chunk size must be positive")]
    ZeroChunkSize,

    #[error("Base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Encode a payload and split it into chunks of at most `chunk_size` characters
pub fn encode_chunks(payload: &[u8], chunk_size: usize) -> Result<Vec<String>, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::ZeroChunkSize);
    }

    let encoded = STANDARD.encode(payload);
    if encoded.is_empty() {
        return Ok(vec![String::new()]);
    }

    // The alphabet is ASCII, so byte offsets are char offsets
    Ok(encoded
        .as_bytes()
        .chunks(chunk_size)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect())
}
