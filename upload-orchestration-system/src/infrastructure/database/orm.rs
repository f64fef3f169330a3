use anyhow::Context;
use sea_orm::DatabaseConnection;

// sea-orm's `mock` feature (dev-dependency) removes `Clone` from `DatabaseConnection`.
#[cfg_attr(not(test), derive(Clone))]
pub struct Database {
    connection: DatabaseConnection,
}

impl Database {
    pub async fn new(db_url: &str) -> anyhow::Result<Self> {
        let connection = sea_orm::Database::connect(db_url)
            .await
            .context("Could not connect to database")?;
        Ok(Database { connection })
    }

    pub fn get_connection(&self) -> &DatabaseConnection {
        &self.connection
    }
}

impl From<DatabaseConnection> for Database {
    fn from(connection: DatabaseConnection) -> Self {
        Database { connection }
    }
}
