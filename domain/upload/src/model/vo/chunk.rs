use std::path::PathBuf;

use crate::model::entity::SessionKey;

/// One received chunk of an upload session.
pub struct Chunk {
    pub key: SessionKey,
    /// 1-indexed.
    pub nth: u32,
    pub content: Vec<u8>,
}

/// Result of persisting a chunk to temp storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkWrite {
    Written { bytes: u64 },
    /// The session directory no longer exists, the session was reclaimed concurrently.
    SessionGone,
}

/// All chunks of a session concatenated into one local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedArtifact {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// BLAKE3 hex of the whole artifact.
    pub digest: String,
}
