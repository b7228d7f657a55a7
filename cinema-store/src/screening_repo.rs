use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::repository::ScreeningRepository;
use cinema_core::{Screening, StoreError, StoreResult};
use sqlx::PgPool;

use crate::database::map_sqlx_error;

pub struct StoreScreeningRepository {
    pool: PgPool,
}

impl StoreScreeningRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ScreeningRow {
    id: String,
    movie_id: String,
    movie_name: String,
    screen_at: DateTime<Utc>,
    rows: i32,
    cols: i32,
    created_at: DateTime<Utc>,
}

#[async_trait]
impl ScreeningRepository for StoreScreeningRepository {
    async fn get_screening(&self, id: &str) -> StoreResult<Option<Screening>> {
        let row = sqlx::query_as::<_, ScreeningRow>(
            "SELECT id, movie_id, movie_name, screen_at, rows, cols, created_at FROM screenings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(|r| {
            Ok(Screening {
                id: r.id,
                movie_id: r.movie_id,
                movie_name: r.movie_name,
                screen_at: r.screen_at,
                rows: u32::try_from(r.rows).map_err(StoreError::corrupt)?,
                cols: u32::try_from(r.cols).map_err(StoreError::corrupt)?,
                created_at: r.created_at,
            })
        })
        .transpose()
    }
}
