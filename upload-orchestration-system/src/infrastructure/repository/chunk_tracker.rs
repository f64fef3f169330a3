use anyhow::Context;
use async_trait::async_trait;
use domain_upload::{
    exception::{UploadException, UploadResult},
    model::{
        entity::SessionKey,
        vo::{ChunkProgress, MarkOutcome},
    },
    repository::ChunkTracker,
};
use once_cell::sync::Lazy;
use redis::Script;

use super::{chunks_key, session_key};
use crate::infrastructure::database::RedisRepo;

// KEYS: session, chunks. ARGV: chunk number.
// Replies {added, count, total}, {-1} when the session is gone, {-2, total} when out of range.
static MARK_CHUNK: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local total = tonumber(redis.call('HGET', KEYS[1], 'total_chunks'))
if not total then
  return {-1}
end
local nth = tonumber(ARGV[1])
if nth < 1 or nth > total then
  return {-2, total}
end
local ttl = redis.call('PTTL', KEYS[1])
local added = redis.call('SADD', KEYS[2], nth)
if ttl > 0 then
  redis.call('PEXPIRE', KEYS[2], ttl)
end
local count = redis.call('SCARD', KEYS[2])
local status = redis.call('HGET', KEYS[1], 'status')
if status == 'pending' then
  status = 'uploading'
  redis.call('HSET', KEYS[1], 'status', status)
end
if count == total and status == 'uploading' then
  redis.call('HSET', KEYS[1], 'status', 'ready_to_merge')
end
return {added, count, total}
",
    )
});

// KEYS: session, chunks. Replies {total, members} or {-1, {}}.
static PROGRESS: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local total = redis.call('HGET', KEYS[1], 'total_chunks')
if not total then
  return {-1, {}}
end
return {tonumber(total), redis.call('SMEMBERS', KEYS[2])}
",
    )
});

/// Map a `MARK_CHUNK` reply.
fn mark_reply(key: &SessionKey, nth: u32, reply: &[i64]) -> UploadResult<MarkOutcome> {
    match reply {
        [added, count, total] => Ok(MarkOutcome {
            uploaded_count: *count as u32,
            total_chunks: *total as u32,
            already_marked: *added == 0,
            is_complete: count == total,
        }),
        [-2, total] => Err(UploadException::InvalidChunkNumber {
            chunk_number: nth,
            total_chunks: *total as u32,
        }),
        [-1] => Err(UploadException::SessionNotFound {
            session_id: key.session_id.to_owned(),
        }),
        other => Err(anyhow::anyhow!("Unexpected mark reply: {other:?}").into()),
    }
}

#[async_trait]
impl ChunkTracker for RedisRepo {
    async fn mark_chunk(&self, key: &SessionKey, nth: u32) -> UploadResult<MarkOutcome> {
        let mut connection = self.connection().await?;
        let mut invocation = MARK_CHUNK.prepare_invoke();
        invocation.key(session_key(key)).key(chunks_key(key)).arg(nth);
        let reply: Vec<i64> = connection.invoke(&invocation).await.context("mark chunk")?;
        mark_reply(key, nth, &reply)
    }

    async fn progress(&self, key: &SessionKey) -> UploadResult<ChunkProgress> {
        let mut connection = self.connection().await?;
        let mut invocation = PROGRESS.prepare_invoke();
        invocation.key(session_key(key)).key(chunks_key(key));
        let (total, members): (i64, Vec<u32>) =
            connection.invoke(&invocation).await.context("chunk progress")?;
        if total < 0 {
            return Err(UploadException::SessionNotFound {
                session_id: key.session_id.to_owned(),
            });
        }
        Ok(ChunkProgress::from_members(total as u32, members))
    }
}
