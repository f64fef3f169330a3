use anyhow::Context;
use async_trait::async_trait;
use domain_upload::{model::vo::QuotaDecision, service::QuotaService};
use once_cell::sync::Lazy;
use redis::Script;
use typed_builder::TypedBuilder;

use crate::infrastructure::{config::QuotaConfig, database::RedisRepo};

// KEYS: used bytes, video count. ARGV: bytes, total limit, max video bytes, max video count.
// Replies {1, ''} when reserved, {0, reason} otherwise.
static CHECK_AND_RESERVE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local bytes = tonumber(ARGV[1])
if bytes > tonumber(ARGV[3]) then
  return {0, 'video larger than ' .. ARGV[3] .. ' bytes'}
end
local count = tonumber(redis.call('GET', KEYS[2]) or '0')
if count >= tonumber(ARGV[4]) then
  return {0, 'video count limit ' .. ARGV[4] .. ' reached'}
end
local used = tonumber(redis.call('GET', KEYS[1]) or '0')
if used + bytes > tonumber(ARGV[2]) then
  return {0, 'total quota ' .. ARGV[2] .. ' bytes exceeded'}
end
redis.call('INCRBY', KEYS[1], bytes)
redis.call('INCR', KEYS[2])
return {1, ''}
",
    )
});

// KEYS: used bytes, video count. ARGV: bytes.
static RELEASE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local used = tonumber(redis.call('GET', KEYS[1]) or '0')
redis.call('SET', KEYS[1], math.max(used - tonumber(ARGV[1]), 0))
local count = tonumber(redis.call('GET', KEYS[2]) or '0')
redis.call('SET', KEYS[2], math.max(count - 1, 0))
return 1
",
    )
});

// KEYS: used bytes. ARGV: reserved, actual.
static SETTLE: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r"
local used = tonumber(redis.call('GET', KEYS[1]) or '0')
redis.call('SET', KEYS[1], math.max(used - tonumber(ARGV[1]) + tonumber(ARGV[2]), 0))
return 1
",
    )
});

/// Quota bookkeeping in redis, limited by the configured level of each owner.
#[derive(TypedBuilder)]
pub struct RedisQuotaService {
    repo: RedisRepo,
    config: QuotaConfig,
}

fn used_key(owner_id: i64) -> String {
    format!("upload_quota:{{{owner_id}}}")
}

fn count_key(owner_id: i64) -> String {
    format!("upload_quota_count:{{{owner_id}}}")
}

#[async_trait]
impl QuotaService for RedisQuotaService {
    async fn check_and_reserve(&self, owner_id: i64, bytes: u64) -> anyhow::Result<QuotaDecision> {
        let level = self.config.level_of(owner_id)?;
        let mut connection = self.repo.connection().await?;
        let mut invocation = CHECK_AND_RESERVE.prepare_invoke();
        invocation
            .key(used_key(owner_id))
            .key(count_key(owner_id))
            .arg(bytes)
            .arg(level.total_bytes)
            .arg(level.max_video_bytes)
            .arg(level.max_video_count);
        let (reserved, reason): (i64, String) =
            connection.invoke(&invocation).await.context("reserve quota")?;
        Ok(if reserved == 1 {
            QuotaDecision::Approved
        } else {
            tracing::info!(owner_id, bytes, "Quota denied: {reason}");
            QuotaDecision::Denied { reason }
        })
    }

    async fn release(&self, owner_id: i64, bytes: u64) -> anyhow::Result<()> {
        let mut connection = self.repo.connection().await?;
        let mut invocation = RELEASE.prepare_invoke();
        invocation.key(used_key(owner_id)).key(count_key(owner_id)).arg(bytes);
        connection.invoke::<i64>(&invocation).await.context("release quota")?;
        Ok(())
    }

    async fn settle(&self, owner_id: i64, reserved: u64, actual: u64) -> anyhow::Result<()> {
        let mut connection = self.repo.connection().await?;
        let mut invocation = SETTLE.prepare_invoke();
        invocation.key(used_key(owner_id)).arg(reserved).arg(actual);
        connection.invoke::<i64>(&invocation).await.context("settle quota")?;
        Ok(())
    }
}
