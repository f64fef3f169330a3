use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::vo::SessionStatus;

static SESSION_ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid session id pattern"));

/// Identity of an upload session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub owner_id: i64,
    pub session_id: String,
}

impl SessionKey {
    /// Fresh key with a random 128-bit token.
    pub fn generate(owner_id: i64) -> Self {
        Self {
            owner_id,
            session_id: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Key with a caller supplied token, which must be safe as a path component.
    pub fn explicit(owner_id: i64, session_id: &str) -> anyhow::Result<Self> {
        if !SESSION_ID_PATTERN.is_match(session_id) {
            anyhow::bail!("Session id {session_id:?} must match {}", SESSION_ID_PATTERN.as_str());
        }
        Ok(Self {
            owner_id,
            session_id: session_id.to_owned(),
        })
    }

    /// Shared by every store key of this session.
    pub fn tag(&self) -> String {
        format!("{}_{}", self.owner_id, self.session_id)
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner_id, self.session_id)
    }
}

/// One in-flight upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub key: SessionKey,
    /// Pre-allocated before the artifact exists.
    pub video_id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    /// Fixed for the session's lifetime.
    pub total_chunks: u32,
    /// Temp storage handle, relative to the cache base.
    pub temp_dir: String,
    /// Quota held for this session.
    pub reserved_bytes: u64,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Remaining seconds estimated from the average time per uploaded chunk.
    pub fn eta_seconds(&self, uploaded: u32, missing: usize, now: DateTime<Utc>) -> u64 {
        if uploaded == 0 || missing == 0 {
            return 0;
        }
        let elapsed = (now - self.created_at).num_milliseconds().max(0) as f64 / 1000.0;
        (elapsed / f64::from(uploaded) * missing as f64).round() as u64
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session(created_at: DateTime<Utc>) -> UploadSession {
        UploadSession {
            key: SessionKey::generate(7),
            video_id: 1,
            title: "t".to_string(),
            description: String::new(),
            category: String::new(),
            tags: vec![],
            total_chunks: 10,
            temp_dir: "multipart/7_x".to_string(),
            reserved_bytes: 0,
            status: SessionStatus::Pending,
            created_at,
            expires_at: created_at + Duration::hours(24),
        }
    }

    #[test]
    fn generated_ids_are_unique_hex() {
        let a = SessionKey::generate(1);
        let b = SessionKey::generate(1);
        assert_ne!(a.session_id, b.session_id);
        assert_eq!(a.session_id.len(), 32);
        assert!(SessionKey::explicit(1, &a.session_id).is_ok());
    }

    #[test]
    fn explicit_ids_must_be_path_safe() {
        assert!(SessionKey::explicit(1, "v2_upload-01").is_ok());
        assert!(SessionKey::explicit(1, "../etc").is_err());
        assert!(SessionKey::explicit(1, "").is_err());
        assert!(SessionKey::explicit(1, &"a".repeat(65)).is_err());
    }

    #[test]
    fn eta_scales_with_missing_chunks() {
        let now = Utc::now();
        let session = session(now - Duration::seconds(20));
        assert_eq!(session.eta_seconds(4, 6, now), 30);
        assert_eq!(session.eta_seconds(0, 10, now), 0);
        assert_eq!(session.eta_seconds(10, 0, now), 0);
    }
}
