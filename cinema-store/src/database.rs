use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

/// Maps a driver error onto the store taxonomy; uniqueness violations are the
/// only ones callers treat differently.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> cinema_core::StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            cinema_core::StoreError::Duplicate(db.message().to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => cinema_core::StoreError::corrupt(err),
        _ => cinema_core::StoreError::unavailable(err),
    }
}
