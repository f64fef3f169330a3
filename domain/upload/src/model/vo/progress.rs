use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Acknowledged chunks of a session, measured against its chunk count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkProgress {
    pub uploaded_count: u32,
    pub total_chunks: u32,
    /// Ascending.
    pub missing_chunks: Vec<u32>,
}

impl ChunkProgress {
    /// Build progress from the acknowledged members; members outside `[1, total]` are ignored.
    pub fn from_members(total_chunks: u32, members: impl IntoIterator<Item = u32>) -> Self {
        let present = members
            .into_iter()
            .filter(|n| (1..=total_chunks).contains(n))
            .collect::<BTreeSet<_>>();
        let missing_chunks = (1..=total_chunks).filter(|n| !present.contains(n)).collect();
        Self {
            uploaded_count: present.len() as u32,
            total_chunks,
            missing_chunks,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.uploaded_count == self.total_chunks
    }

    pub fn progress_percent(&self) -> f64 {
        percent(self.uploaded_count, self.total_chunks)
    }
}

/// Result of atomically marking one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkOutcome {
    pub uploaded_count: u32,
    pub total_chunks: u32,
    /// The chunk was already a member; the count did not change.
    pub already_marked: bool,
    pub is_complete: bool,
}

impl MarkOutcome {
    pub fn progress_percent(&self) -> f64 {
        percent(self.uploaded_count, self.total_chunks)
    }
}

pub(crate) fn percent(uploaded: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(uploaded) / f64::from(total) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_is_the_complement() {
        let progress = ChunkProgress::from_members(5, [4, 2, 2, 9]);
        assert_eq!(progress.uploaded_count, 2);
        assert_eq!(progress.missing_chunks, vec![1, 3, 5]);
        assert!(!progress.is_complete());
        assert_eq!(progress.progress_percent(), 40.0);
    }

    #[test]
    fn complete_only_when_every_chunk_present() {
        assert!(ChunkProgress::from_members(3, [3, 1, 2]).is_complete());
        assert!(!ChunkProgress::from_members(3, [1, 2]).is_complete());
    }
}
