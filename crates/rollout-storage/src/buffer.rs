// crates/rollout-storage/src/buffer.rs
// ============================================================================
// Module: Upload Buffering
// Description: Fixed-size chunk reads for multipart and block uploads.
// Purpose: Split a streamed payload into provider-sized parts.
// Dependencies: tokio
// ============================================================================

//! ## Overview
//! [`fill_buffer`] reads up to one part from a payload stream. A short read
//! means the stream is exhausted, which lets backends issue a single-shot
//! upload when the whole payload fits in the first part.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rollout_core::ObjectStorageError;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One chunk read from a payload stream.
#[derive(Debug)]
pub struct Chunk {
    /// Bytes read, at most the requested part size.
    pub data: Vec<u8>,
    /// True when the stream ended before the part filled up.
    pub eof: bool,
}

// ============================================================================
// SECTION: Reading
// ============================================================================

/// Reads up to `size` bytes from `reader`.
///
/// # Errors
///
/// Returns [`ObjectStorageError::Io`] when reading fails.
pub async fn fill_buffer(
    reader: &mut (dyn AsyncRead + Send + Unpin),
    size: usize,
) -> Result<Chunk, ObjectStorageError> {
    let mut data = Vec::with_capacity(size);
    let limit = u64::try_from(size).unwrap_or(u64::MAX);
    let mut limited = (&mut *reader).take(limit);
    limited.read_to_end(&mut data).await.map_err(|err| ObjectStorageError::Io(err.to_string()))?;
    let eof = data.len() < size;
    Ok(Chunk {
        data,
        eof,
    })
}
