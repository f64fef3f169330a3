use async_trait::async_trait;

use crate::exception::UploadResult;
use crate::model::entity::{SessionKey, UploadSession};
use crate::model::vo::{CompletedUpload, SessionStatus};

/// # Upload session store
///
/// Session records live in a volatile store with a TTL; expiry and deletion look the same to callers.
/// Every state change is a single atomic operation of the store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the session and its empty acknowledgment set with a lease of `ttl_ms`.
    ///
    /// Error `AlreadyExists` when a session with the same key exists, nothing is overwritten.
    async fn create(&self, session: &UploadSession, ttl_ms: i64) -> UploadResult<()>;

    /// Get the session and, once completed, its outcome.
    async fn get(&self, key: &SessionKey) -> UploadResult<(UploadSession, Option<CompletedUpload>)>;

    /// Move to `to` when the current status is one of `from`, returning the previous status.
    ///
    /// Error `InvalidStatus` carrying the current status otherwise.
    async fn transition(
        &self,
        key: &SessionKey,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> UploadResult<SessionStatus>;

    /// Move to `processing` under a new lease of `lease_ms`, returning its token.
    ///
    /// A session already `processing` is taken over only when its lease has run out.
    /// Taking over invalidates the previous token.
    async fn acquire_processing(&self, key: &SessionKey, lease_ms: i64) -> UploadResult<String>;

    /// Extend the lease held with `lease` to `lease_ms` from now.
    ///
    /// Error `LeaseLost` when the session is no longer processing under that token.
    async fn renew_processing(&self, key: &SessionKey, lease: &str, lease_ms: i64) -> UploadResult<()>;

    /// Move `processing` to `completed` and keep the outcome, under the lease `lease`.
    async fn complete(
        &self,
        key: &SessionKey,
        lease: &str,
        outcome: &CompletedUpload,
    ) -> UploadResult<()>;

    /// Move `processing` to `failed`, under the lease `lease`.
    async fn fail_processing(&self, key: &SessionKey, lease: &str) -> UploadResult<()>;

    /// Remove the session and its acknowledgment set. Idempotent.
    async fn delete(&self, key: &SessionKey) -> UploadResult<()>;
}
