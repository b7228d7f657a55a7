use async_trait::async_trait;
use cinema_core::repository::AuditRepository;
use cinema_core::StoreResult;
use serde_json::Value;
use sqlx::PgPool;

use crate::database::map_sqlx_error;

pub struct StoreAuditRepository {
    pool: PgPool,
}

impl StoreAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for StoreAuditRepository {
    async fn insert_audit(&self, event: &str, payload: &Value) -> StoreResult<()> {
        sqlx::query("INSERT INTO audit_logs (event, payload) VALUES ($1, $2)")
            .bind(event)
            .bind(sqlx::types::Json(payload))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}
