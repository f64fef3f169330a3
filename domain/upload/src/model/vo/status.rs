use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, no chunk received yet.
    Pending,
    /// At least one chunk received.
    Uploading,
    /// Every chunk acknowledged, waiting for completion.
    ReadyToMerge,
    /// Merge and handoff in progress under a lease.
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 7] = [
        SessionStatus::Pending,
        SessionStatus::Uploading,
        SessionStatus::ReadyToMerge,
        SessionStatus::Processing,
        SessionStatus::Completed,
        SessionStatus::Failed,
        SessionStatus::Cancelled,
    ];

    /// Statuses from which a merge may begin.
    pub const MERGEABLE: [SessionStatus; 3] = [
        SessionStatus::Pending,
        SessionStatus::Uploading,
        SessionStatus::ReadyToMerge,
    ];

    /// Statuses from which a session may be cancelled.
    pub const CANCELLABLE: [SessionStatus; 4] = [
        SessionStatus::Pending,
        SessionStatus::Uploading,
        SessionStatus::ReadyToMerge,
        SessionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Uploading => "uploading",
            SessionStatus::ReadyToMerge => "ready_to_merge",
            SessionStatus::Processing => "processing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Whether new chunks are still accepted and recorded.
    pub fn accepts_chunks(&self) -> bool {
        matches!(
            self,
            SessionStatus::Pending | SessionStatus::Uploading | SessionStatus::ReadyToMerge
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown session status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_status() {
        for status in SessionStatus::ALL {
            assert_eq!(status, status.as_str().parse::<SessionStatus>().unwrap());
        }
        assert!("merged".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&SessionStatus::ReadyToMerge).unwrap();
        assert_eq!(json, r#""ready_to_merge""#);
    }

    #[test]
    fn only_open_statuses_accept_chunks() {
        assert!(SessionStatus::Pending.accepts_chunks());
        assert!(SessionStatus::ReadyToMerge.accepts_chunks());
        assert!(!SessionStatus::Processing.accepts_chunks());
        assert!(!SessionStatus::Failed.accepts_chunks());
        assert!(!SessionStatus::Cancelled.accepts_chunks());
    }
}
