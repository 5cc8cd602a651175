//! Domain records exercised by the CRUD workload.

mod author;
mod book;

pub use author::Author;
pub use book::Book;

use anyhow::{Context, Result};
use bincode::{Decode, Encode};

/// Encode a record via bincode (standard config) for key-value storage.
pub(crate) fn encode_record<T: Encode>(kind: &str, val: &T) -> Result<Vec<u8>> {
    bincode::encode_to_vec(val, bincode::config::standard())
        .with_context(|| format!("Failed to encode {kind}"))
}

/// Decode a bincode blob produced by [`encode_record`].
pub(crate) fn decode_record<T: Decode<()>>(kind: &str, bytes: &[u8]) -> Result<T> {
    let (val, _consumed) = bincode::decode_from_slice(bytes, bincode::config::standard())
        .with_context(|| format!("Failed to decode {kind}"))?;
    Ok(val)
}
