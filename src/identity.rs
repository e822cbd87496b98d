//! Deterministic document and chunk identity.
//!
//! A document is content-addressed by its source URI: `doc_id` is the
//! lowercase hex SHA-256 of the URI bytes. A chunk id is a UUID derived from
//! `doc_id` and the chunk's dense 0-based index, so re-indexing the same
//! source overwrites chunks in place and every subsystem (vector store,
//! purchase ledger, range fetches) keys on the same value.

use sha1::{Digest, Sha1};
use sha2::Sha256;
use uuid::Uuid;

/// `doc_id` for a source path or URL: lowercase hex SHA-256 of the UTF-8 bytes.
pub fn doc_id(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

/// Stable chunk id for `(doc_id, chunk_index)`.
///
/// SHA-1 of `"{doc_id}:{chunk_index}"`, hex-truncated to 32 characters and
/// read as a UUID. Compact, collision-resistant at this scale, and a pure
/// function of its inputs.
pub fn chunk_id(doc_id: &str, chunk_index: u32) -> Uuid {
    let digest = Sha1::digest(format!("{doc_id}:{chunk_index}").as_bytes());
    let hex32 = &hex::encode(digest)[..32];
    Uuid::parse_str(hex32).expect("32 hex chars form a valid UUID")
}
