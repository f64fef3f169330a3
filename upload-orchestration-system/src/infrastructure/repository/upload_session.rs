use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use domain_upload::{
    exception::{UploadException, UploadResult},
    model::{
        entity::{SessionKey, UploadSession},
        vo::{CompletedUpload, SessionStatus},
    },
    repository::SessionStore,
};
use once_cell::sync::Lazy;
use redis::{Cmd, Script};
use uuid::Uuid;

use super::{chunks_key, session_key};
use crate::infrastructure::database::RedisRepo;

// KEYS: session, chunks. ARGV: record, total_chunks, status, ttl_ms.
static CREATE_SESSION: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], 'record', ARGV[1], 'total_chunks', ARGV[2], 'status', ARGV[3])
redis.call('PEXPIRE', KEYS[1], ARGV[4])
redis.call('DEL', KEYS[2])
return 1
",
    )
});

// KEYS: session. ARGV: target status, allowed source statuses...
static TRANSITION: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
  return {-1, ''}
end
for i = 2, #ARGV do
  if ARGV[i] == status then
    redis.call('HSET', KEYS[1], 'status', ARGV[1])
    return {1, status}
  end
end
return {0, status}
",
    )
});

// KEYS: session. ARGV: now_ms, lease_ms, lease token, mergeable statuses...
static ACQUIRE_PROCESSING: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
  return {-1, ''}
end
local now = tonumber(ARGV[1])
local acquirable = false
if status == 'processing' then
  local lease_until = tonumber(redis.call('HGET', KEYS[1], 'lease_until') or '0')
  acquirable = now >= lease_until
else
  for i = 4, #ARGV do
    if ARGV[i] == status then
      acquirable = true
    end
  end
end
if not acquirable then
  return {0, status}
end
redis.call('HSET', KEYS[1], 'status', 'processing',
  'lease_until', string.format('%.0f', now + tonumber(ARGV[2])), 'lease_owner', ARGV[3])
return {1, status}
",
    )
});

// KEYS: session. ARGV: lease token, action (renew | complete | fail), lease_until or outcome.
static WITH_LEASE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
  return {-1, ''}
end
if status ~= 'processing' or redis.call('HGET', KEYS[1], 'lease_owner') ~= ARGV[1] then
  return {-2, status}
end
if ARGV[2] == 'renew' then
  redis.call('HSET', KEYS[1], 'lease_until', ARGV[3])
elseif ARGV[2] == 'complete' then
  redis.call('HSET', KEYS[1], 'status', 'completed', 'outcome', ARGV[3])
  redis.call('HDEL', KEYS[1], 'lease_until', 'lease_owner')
else
  redis.call('HSET', KEYS[1], 'status', 'failed')
  redis.call('HDEL', KEYS[1], 'lease_until', 'lease_owner')
end
return {1, status}
",
    )
});

/// Map a `{code, status}` script reply to the previous status.
fn status_reply(key: &SessionKey, (code, status): (i64, String)) -> UploadResult<SessionStatus> {
    let session_id = key.session_id.to_owned();
    match code {
        1 => Ok(status.parse()?),
        0 => Err(UploadException::InvalidStatus {
            session_id,
            status: status.parse()?,
        }),
        -2 => Err(UploadException::LeaseLost { session_id }),
        _ => Err(UploadException::SessionNotFound { session_id }),
    }
}

impl RedisRepo {
    async fn with_lease(
        &self,
        key: &SessionKey,
        lease: &str,
        action: &str,
        arg: String,
    ) -> UploadResult<()> {
        let mut connection = self.connection().await?;
        let mut invocation = WITH_LEASE.prepare_invoke();
        invocation.key(session_key(key)).arg(lease).arg(action).arg(arg);
        let reply = connection
            .invoke(&invocation)
            .await
            .with_context(|| format!("{action} processing lease"))?;
        status_reply(key, reply)?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for RedisRepo {
    async fn create(&self, session: &UploadSession, ttl_ms: i64) -> UploadResult<()> {
        let mut connection = self.connection().await?;
        let mut invocation = CREATE_SESSION.prepare_invoke();
        invocation
            .key(session_key(&session.key))
            .key(chunks_key(&session.key))
            .arg(serde_json::to_string(session).context("serialize upload session")?)
            .arg(session.total_chunks)
            .arg(session.status.as_str())
            .arg(ttl_ms);
        let created: i64 =
            connection.invoke(&invocation).await.context("create upload session")?;
        if created == 0 {
            return Err(UploadException::AlreadyExists {
                session_id: session.key.session_id.to_owned(),
            });
        }
        Ok(())
    }

    async fn get(&self, key: &SessionKey) -> UploadResult<(UploadSession, Option<CompletedUpload>)> {
        let mut connection = self.connection().await?;
        let mut cmd = Cmd::new();
        cmd.arg("HMGET").arg(session_key(key)).arg("record").arg("status").arg("outcome");
        let (record, status, outcome): (Option<String>, Option<String>, Option<String>) =
            connection.query(&cmd).await.context("get upload session")?;
        let (Some(record), Some(status)) = (record, status) else {
            return Err(UploadException::SessionNotFound {
                session_id: key.session_id.to_owned(),
            });
        };
        let mut session = serde_json::from_str::<UploadSession>(&record)
            .with_context(|| format!("malformed record of session {key}"))?;
        // The status field is authoritative; the record keeps the status at creation.
        session.status = status.parse()?;
        let outcome = outcome
            .map(|x| serde_json::from_str::<CompletedUpload>(&x))
            .transpose()
            .with_context(|| format!("malformed outcome of session {key}"))?;
        Ok((session, outcome))
    }

    async fn transition(
        &self,
        key: &SessionKey,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> UploadResult<SessionStatus> {
        let mut connection = self.connection().await?;
        let mut invocation = TRANSITION.prepare_invoke();
        invocation.key(session_key(key)).arg(to.as_str());
        for status in from {
            invocation.arg(status.as_str());
        }
        let reply = connection.invoke(&invocation).await.context("transition upload session")?;
        status_reply(key, reply)
    }

    async fn acquire_processing(&self, key: &SessionKey, lease_ms: i64) -> UploadResult<String> {
        let lease = Uuid::new_v4().simple().to_string();
        let mut connection = self.connection().await?;
        let mut invocation = ACQUIRE_PROCESSING.prepare_invoke();
        invocation
            .key(session_key(key))
            .arg(Utc::now().timestamp_millis())
            .arg(lease_ms)
            .arg(&lease);
        for status in SessionStatus::MERGEABLE {
            invocation.arg(status.as_str());
        }
        let reply = connection.invoke(&invocation).await.context("acquire processing lease")?;
        let previous = status_reply(key, reply)?;
        if previous == SessionStatus::Processing {
            tracing::warn!(session = %key, "Took over a stale processing lease");
        }
        Ok(lease)
    }

    async fn renew_processing(&self, key: &SessionKey, lease: &str, lease_ms: i64) -> UploadResult<()> {
        let lease_until = Utc::now().timestamp_millis().saturating_add(lease_ms);
        self.with_lease(key, lease, "renew", lease_until.to_string()).await
    }

    async fn complete(
        &self,
        key: &SessionKey,
        lease: &str,
        outcome: &CompletedUpload,
    ) -> UploadResult<()> {
        let outcome = serde_json::to_string(outcome).context("serialize upload outcome")?;
        self.with_lease(key, lease, "complete", outcome).await
    }

    async fn fail_processing(&self, key: &SessionKey, lease: &str) -> UploadResult<()> {
        self.with_lease(key, lease, "fail", String::new()).await
    }

    async fn delete(&self, key: &SessionKey) -> UploadResult<()> {
        let mut connection = self.connection().await?;
        let mut cmd = Cmd::new();
        cmd.arg("DEL").arg(session_key(key)).arg(chunks_key(key));
        connection.query::<()>(&cmd).await.context("delete upload session")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use domain_upload::repository::ChunkTracker;
    use redis::{from_redis_value, Value};

    use super::*;
    use crate::infrastructure::database::RedisClient;

    fn reply(code: i64, status: &str) -> (i64, String) {
        from_redis_value(&Value::Bulk(vec![
            Value::Int(code),
            Value::Data(status.as_bytes().to_vec()),
        ]))
        .unwrap()
    }

    #[test]
    fn script_replies_map_to_results() {
        let key = SessionKey::generate(1);
        let previous = status_reply(&key, reply(1, "ready_to_merge")).unwrap();
        assert_eq!(previous, SessionStatus::ReadyToMerge);
        let e = status_reply(&key, reply(0, "completed")).unwrap_err();
        assert!(matches!(
            e,
            UploadException::InvalidStatus {
                status: SessionStatus::Completed,
                ..
            }
        ));
        let e = status_reply(&key, reply(-2, "cancelled")).unwrap_err();
        assert!(matches!(e, UploadException::LeaseLost { .. }));
        let e = status_reply(&key, reply(-1, "")).unwrap_err();
        assert!(matches!(e, UploadException::SessionNotFound { .. }));
        let e = status_reply(&key, reply(1, "merged")).unwrap_err();
        assert!(matches!(e, UploadException::InternalError { .. }));
    }

    // The tests below run against a live server:
    // `REDIS_URL=redis://localhost:6379 cargo test -- --ignored`.

    fn repo() -> RedisRepo {
        let url = std::env::var("REDIS_URL").expect("REDIS_URL");
        RedisRepo::builder()
            .client(Arc::new(RedisClient::open(&[url]).unwrap()))
            .build()
    }

    fn session(total_chunks: u32) -> UploadSession {
        let now = Utc::now();
        let key = SessionKey::generate(1);
        UploadSession {
            temp_dir: format!("multipart/{}", key.tag()),
            key,
            video_id: 1,
            title: "t".to_string(),
            description: String::new(),
            category: String::new(),
            tags: vec![],
            total_chunks,
            reserved_bytes: 0,
            status: SessionStatus::Pending,
            created_at: now,
            expires_at: now + Duration::hours(1),
        }
    }

    #[tokio::test]
    #[ignore]
    async fn second_create_is_rejected() {
        let repo = repo();
        let session = session(2);
        repo.create(&session, 60_000).await.unwrap();
        let e = repo.create(&session, 60_000).await.unwrap_err();
        assert!(matches!(e, UploadException::AlreadyExists { .. }));
        repo.delete(&session.key).await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn marks_drive_status_and_lease() {
        let repo = repo();
        let session = session(2);
        let key = session.key.clone();
        repo.create(&session, 60_000).await.unwrap();

        assert!(!repo.mark_chunk(&key, 2).await.unwrap().already_marked);
        assert!(repo.mark_chunk(&key, 2).await.unwrap().already_marked);
        assert_eq!(repo.get(&key).await.unwrap().0.status, SessionStatus::Uploading);
        let e = repo.mark_chunk(&key, 3).await.unwrap_err();
        assert!(matches!(e, UploadException::InvalidChunkNumber { total_chunks: 2, .. }));
        assert!(repo.mark_chunk(&key, 1).await.unwrap().is_complete);
        assert_eq!(repo.get(&key).await.unwrap().0.status, SessionStatus::ReadyToMerge);

        let lease = repo.acquire_processing(&key, 60_000).await.unwrap();
        assert!(repo.acquire_processing(&key, 60_000).await.is_err());
        repo.renew_processing(&key, &lease, 60_000).await.unwrap();
        repo.delete(&key).await.unwrap();
        let e = repo.progress(&key).await.unwrap_err();
        assert!(matches!(e, UploadException::SessionNotFound { .. }));
    }

    #[tokio::test]
    #[ignore]
    async fn stale_lease_takeover_revokes_old_token() {
        let repo = repo();
        let session = session(1);
        let key = session.key.clone();
        repo.create(&session, 60_000).await.unwrap();
        repo.mark_chunk(&key, 1).await.unwrap();

        let old = repo.acquire_processing(&key, 0).await.unwrap();
        let new = repo.acquire_processing(&key, 60_000).await.unwrap();
        assert_ne!(old, new);
        let e = repo.renew_processing(&key, &old, 60_000).await.unwrap_err();
        assert!(matches!(e, UploadException::LeaseLost { .. }));
        let e = repo.fail_processing(&key, &old).await.unwrap_err();
        assert!(matches!(e, UploadException::LeaseLost { .. }));

        let outcome = CompletedUpload {
            video_id: 1,
            artifact_location: "memory://videos/1/1/source.mp4".to_string(),
            catalog_status: "published".to_string(),
            size_bytes: 1,
            digest: "d".to_string(),
        };
        repo.complete(&key, &new, &outcome).await.unwrap();
        let (stored, kept) = repo.get(&key).await.unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert_eq!(kept.unwrap().video_id, 1);
        repo.delete(&key).await.unwrap();
    }
}
