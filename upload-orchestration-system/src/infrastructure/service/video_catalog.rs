use anyhow::Context;
use async_trait::async_trait;
use domain_upload::{model::vo::VideoRecord, service::VideoCatalog};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use typed_builder::TypedBuilder;

use crate::infrastructure::database::Database;

#[derive(TypedBuilder)]
pub struct SeaOrmVideoCatalog {
    db: Database,
}

#[async_trait]
impl VideoCatalog for SeaOrmVideoCatalog {
    async fn allocate_video_id(&self) -> anyhow::Result<i64> {
        let stmt = Statement::from_string(
            DatabaseBackend::Postgres,
            "SELECT nextval('video_id_seq') AS id".to_string(),
        );
        let row = self
            .db
            .get_connection()
            .query_one(stmt)
            .await?
            .context("nextval returned no row")?;
        Ok(row.try_get::<i64>("", "id")?)
    }

    /// Upsert keyed by the pre-allocated id, so a retried insert is harmless.
    async fn insert_video_record(
        &self,
        record: &VideoRecord,
        source_url: &str,
    ) -> anyhow::Result<i64> {
        let mut sql = String::from("INSERT INTO videos");
        sql.push_str(" (id, owner_id, title, description, category, tags, size_bytes, digest, source_url)");
        sql.push_str(" VALUES ($1, $2, $3, $4, $5, $6::jsonb, $7, $8, $9)");
        sql.push_str(" ON CONFLICT (id) DO UPDATE SET source_url = EXCLUDED.source_url");
        sql.push_str(" RETURNING id");
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            &sql,
            vec![
                record.video_id.into(),
                record.owner_id.into(),
                record.title.clone().into(),
                record.description.clone().into(),
                record.category.clone().into(),
                serde_json::to_string(&record.tags)?.into(),
                i64::try_from(record.size_bytes)?.into(),
                record.digest.clone().into(),
                source_url.to_string().into(),
            ],
        );
        let row = self
            .db
            .get_connection()
            .query_one(stmt)
            .await?
            .with_context(|| format!("insert of video {} returned no row", record.video_id))?;
        Ok(row.try_get::<i64>("", "id")?)
    }
}
