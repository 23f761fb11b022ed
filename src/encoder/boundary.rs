//! Boundary token generation.

use bytes::Bytes;
use tracing::debug;

use crate::error::{FormError, Result};

/// Random bytes per generated boundary (hex-encoded to 32 ASCII characters).
pub const BOUNDARY_ENTROPY_BYTES: usize = 16;

/// A source of random bytes for boundary tokens.
pub trait EntropySource {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()>;
}

/// Operating system randomness via `getrandom`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        getrandom::getrandom(dest).map_err(|e| FormError::Entropy(e.to_string()))
    }
}

impl<F: FnMut(&mut [u8]) -> Result<()>> EntropySource for F {
    fn fill_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        self(dest)
    }
}

/// Generate a boundary: 16 random bytes, lowercase hex.
pub fn generate_boundary(entropy: &mut dyn EntropySource) -> Result<Bytes> {
    let mut raw = [0u8; BOUNDARY_ENTROPY_BYTES];
    entropy.fill_bytes(&mut raw)?;
    let boundary = hex::encode(raw);
    debug!(boundary = %boundary, "Generated multipart boundary");
    Ok(Bytes::from(boundary))
}

/// Check a caller-supplied boundary. It ends up in a header value, so it
/// must be ASCII.
pub fn validate_boundary(boundary: &[u8]) -> Result<()> {
    if boundary.is_ascii() {
        Ok(())
    } else {
        Err(FormError::validation(format!(
            "boundary must be ASCII, got {:?}",
            String::from_utf8_lossy(boundary)
        )))
    }
}
