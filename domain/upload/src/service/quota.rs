use async_trait::async_trait;

use crate::model::vo::QuotaDecision;

/// Storage quota of owners.
#[async_trait]
pub trait QuotaService: Send + Sync {
    /// Reserve `bytes` when the owner's quota allows it.
    async fn check_and_reserve(&self, owner_id: i64, bytes: u64) -> anyhow::Result<QuotaDecision>;

    async fn release(&self, owner_id: i64, bytes: u64) -> anyhow::Result<()>;

    /// Replace a reservation with the actual stored size.
    async fn settle(&self, owner_id: i64, reserved: u64, actual: u64) -> anyhow::Result<()>;
}
